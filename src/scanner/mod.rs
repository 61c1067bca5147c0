//! 扫描核心 - 从相机帧到身份核验结果
//!
//! 核心策略：
//! 1. 稳定锁定 - 同一类别在置信度门槛之上撑满时间窗口才算数
//! 2. 会话驱动 - 一次激活独占相机 + 分类器 + 稳定状态
//! 3. 阶段编排 - 扫脸、扫证件两个会话串联，最后显式比对
//! 4. 变化门限 - 画面静止时复用预测，省掉重复推理

pub mod error;
pub mod events;
pub mod sequencer;
pub mod session;
pub mod stability;

pub use error::ScanError;
pub use events::{ErrorKind, LogObserver, NullObserver, RecordingObserver, ScanObserver};
pub use sequencer::{normalize_label, PhaseSequencer, Roster, VerifyOutcome, VerifyPhase};
pub use session::{
    CancelToken, ScannerSession, SessionConfig, SessionState, StepOutcome, RANKED_LIMIT,
};
pub use stability::{LockDecision, LockResult, StabilityConfig, StabilityLock};
