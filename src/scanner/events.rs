//! 引擎 -> 宿主 UI 的单向通知边界
//!
//! 引擎不渲染任何东西；宿主实现 [`ScanObserver`] 把事件翻译成
//! 视图切换、角标、日志流、弹窗。所有回调都有空默认实现，
//! 宿主只挑自己关心的。

use std::sync::Mutex;

use log::{info, warn};

use crate::core::classifier::Prediction;
use crate::scanner::sequencer::VerifyPhase;
use crate::scanner::stability::LockResult;

/// 上报给 UI 的错误类别，三类提示文案不同
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 模型资源拉取/解析失败，可重试 start
    ModelLoad,
    /// 没权限或没设备，需要用户处理
    CameraUnavailable,
    /// 单帧推理失败，会话继续
    Inference,
}

pub trait ScanObserver: Send + Sync {
    fn on_status(&self, _text: &str) {}

    /// 每帧最高置信度类别
    fn on_top_prediction(&self, _label: &str, _probability: f32) {}

    /// 每帧 top-N 排名（N 由会话决定，默认 3）
    fn on_ranked(&self, _ranked: &[Prediction]) {}

    /// 一次激活最多触发一次
    fn on_locked(&self, _lock: &LockResult) {}

    fn on_error(&self, _kind: ErrorKind, _message: &str) {}

    fn on_phase(&self, _phase: VerifyPhase) {}

    fn on_verify_outcome(&self, _success: bool, _label: Option<&str>) {}
}

/// 什么都不做的观察者
#[derive(Debug, Default)]
pub struct NullObserver;

impl ScanObserver for NullObserver {}

/// 把事件打进 log 的观察者（调试用）
#[derive(Debug, Default)]
pub struct LogObserver;

impl ScanObserver for LogObserver {
    fn on_status(&self, text: &str) {
        info!("📋 {}", text);
    }

    fn on_locked(&self, lock: &LockResult) {
        info!(
            "🔒 locked: {} ({:.3}) @ {}ms",
            lock.label, lock.probability, lock.timestamp_ms
        );
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        warn!("⚠️ {:?}: {}", kind, message);
    }

    fn on_phase(&self, phase: VerifyPhase) {
        info!("➡️ phase: {:?}", phase);
    }

    fn on_verify_outcome(&self, success: bool, label: Option<&str>) {
        if success {
            info!("✅ verified: {}", label.unwrap_or(""));
        } else {
            info!("❌ mismatch");
        }
    }
}

#[derive(Debug, Default, Clone)]
struct Recorded {
    statuses: Vec<String>,
    tops: Vec<(String, f32)>,
    locks: Vec<LockResult>,
    errors: Vec<(ErrorKind, String)>,
    phases: Vec<VerifyPhase>,
    outcomes: Vec<(bool, Option<String>)>,
}

/// 录制观察者：把收到的事件都存下来，断言用
#[derive(Debug, Default)]
pub struct RecordingObserver {
    inner: Mutex<Recorded>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.inner.lock().expect("observer mutex").statuses.clone()
    }

    pub fn top_labels(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("observer mutex")
            .tops
            .iter()
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn locks(&self) -> Vec<LockResult> {
        self.inner.lock().expect("observer mutex").locks.clone()
    }

    pub fn lock_count(&self) -> usize {
        self.inner.lock().expect("observer mutex").locks.len()
    }

    pub fn errors(&self) -> Vec<(ErrorKind, String)> {
        self.inner.lock().expect("observer mutex").errors.clone()
    }

    pub fn phases(&self) -> Vec<VerifyPhase> {
        self.inner.lock().expect("observer mutex").phases.clone()
    }

    pub fn outcomes(&self) -> Vec<(bool, Option<String>)> {
        self.inner.lock().expect("observer mutex").outcomes.clone()
    }
}

impl ScanObserver for RecordingObserver {
    fn on_status(&self, text: &str) {
        self.inner
            .lock()
            .expect("observer mutex")
            .statuses
            .push(text.to_string());
    }

    fn on_top_prediction(&self, label: &str, probability: f32) {
        self.inner
            .lock()
            .expect("observer mutex")
            .tops
            .push((label.to_string(), probability));
    }

    fn on_locked(&self, lock: &LockResult) {
        self.inner
            .lock()
            .expect("observer mutex")
            .locks
            .push(lock.clone());
    }

    fn on_error(&self, kind: ErrorKind, message: &str) {
        self.inner
            .lock()
            .expect("observer mutex")
            .errors
            .push((kind, message.to_string()));
    }

    fn on_phase(&self, phase: VerifyPhase) {
        self.inner.lock().expect("observer mutex").phases.push(phase);
    }

    fn on_verify_outcome(&self, success: bool, label: Option<&str>) {
        self.inner
            .lock()
            .expect("observer mutex")
            .outcomes
            .push((success, label.map(String::from)));
    }
}
