//! 相机采集边界
//!
//! 引擎本身不直接操作摄像头硬件，宿主侧实现 [`CameraSource`]，
//! 把平台相机（CameraX / AVFoundation / getUserMedia）包成按帧拉取的来源。

use std::collections::VecDeque;

use thiserror::Error;

use crate::core::video::Frame;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device for facing mode {0:?}")]
    NoDevice(FacingMode),
    #[error("camera backend error: {0}")]
    Backend(String),
}

/// 请求的物理相机方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// 前置（自拍，扫脸用）
    Front,
    /// 后置（扫证件用）
    Rear,
}

/// 帧来源抽象。`stop` 必须幂等且不失败。
pub trait CameraSource: Send {
    fn setup(&mut self, facing: FacingMode) -> Result<(), CameraError>;

    fn play(&mut self);

    /// 拉取下一帧；`None` 表示流结束
    fn next_frame(&mut self) -> Option<Frame>;

    fn stop(&mut self);
}

/// 回放相机 - 按顺序回放预先准备好的帧序列
///
/// 测试与离线评估用：帧自带时间戳，播放节奏完全由调用方驱动。
pub struct ScriptedCamera {
    frames: VecDeque<Frame>,
    playing: bool,
}

impl ScriptedCamera {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
            playing: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl CameraSource for ScriptedCamera {
    fn setup(&mut self, _facing: FacingMode) -> Result<(), CameraError> {
        Ok(())
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if !self.playing {
            return None;
        }
        self.frames.pop_front()
    }

    fn stop(&mut self) {
        self.playing = false;
    }
}

/// 永远拿不到权限的相机（错误路径测试用）
pub struct DeniedCamera;

impl CameraSource for DeniedCamera {
    fn setup(&mut self, _facing: FacingMode) -> Result<(), CameraError> {
        Err(CameraError::PermissionDenied)
    }

    fn play(&mut self) {}

    fn next_frame(&mut self) -> Option<Frame> {
        None
    }

    fn stop(&mut self) {}
}
