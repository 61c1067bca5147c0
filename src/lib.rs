pub mod core;
pub mod scanner;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("idscan_lib_rust"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        let _ = env_logger::try_init();
    }
}
