use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("descriptor fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("descriptor parse error: {0}")]
    DescriptorParse(String),
    #[error("invalid descriptor: {0}")]
    DescriptorInvalid(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ClassifierError {
    /// 推理错误是瞬态的：会话上报后继续跑下一帧；
    /// 其余都属于模型加载失败，当次 start 直接失败。
    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifierError::Inference(_))
    }
}
