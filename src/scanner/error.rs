use thiserror::Error;

use crate::core::camera::CameraError;
use crate::core::classifier::ClassifierError;

/// 会话/流程层错误边界
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("model load failed: {0}")]
    Model(#[from] ClassifierError),
    #[error("camera unavailable: {0}")]
    Camera(#[from] CameraError),
    #[error("invalid phase: {0}")]
    InvalidPhase(&'static str),
}
