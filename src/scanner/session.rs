use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::core::camera::{CameraSource, FacingMode};
use crate::core::classifier::{Classifier, ClassifierLoader, Prediction};
use crate::core::video::{Frame, FrameGate, GateConfig};
use crate::scanner::error::ScanError;
use crate::scanner::events::{ErrorKind, ScanObserver};
use crate::scanner::stability::{LockDecision, LockResult, StabilityConfig, StabilityLock};

/// 每帧上报的排名条数
pub const RANKED_LIMIT: usize = 3;

/// 会话配置
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// 模型 descriptor 路径（文件或 URL）
    pub classifier_path: String,
    pub facing: FacingMode,
    pub stability: StabilityConfig,
    pub gate: GateConfig,
    /// 取证快照 JPEG 质量
    pub snapshot_quality: u8,
}

impl SessionConfig {
    pub fn new(classifier_path: impl Into<String>, facing: FacingMode) -> Self {
        Self {
            classifier_path: classifier_path.into(),
            facing,
            stability: StabilityConfig::default(),
            gate: GateConfig::default(),
            snapshot_quality: 80,
        }
    }
}

/// 会话生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loading,
    Capturing,
    Locked,
}

/// 协作式取消令牌。克隆共享同一份标志，
/// 在帧循环的每次调度前检查，不会打断进行中的推理。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// 单步结果
#[derive(Debug)]
pub enum StepOutcome {
    /// 继续下一帧
    Continue,
    /// 本次激活锁定（只会出现一次）
    Locked(LockResult),
    /// 会话不在采集中：已锁定、已停止或帧流耗尽
    Ended,
}

/// 扫描会话 - 相机 + 分类器 + 稳定锁定的一条流水线
///
/// 一次激活（start -> 若干 tick -> lock/stop）内独占自己的相机与
/// 稳定状态。锁定或停止都会释放相机；重新 start 会重置稳定状态、
/// 复用已加载的分类器并重新申请相机。
pub struct ScannerSession {
    config: SessionConfig,
    camera: Box<dyn CameraSource>,
    loader: Box<dyn ClassifierLoader>,
    observer: Arc<dyn ScanObserver>,
    classifier: Option<Box<dyn Classifier>>,
    cached_path: Option<String>,
    stability: StabilityLock,
    gate: FrameGate,
    state: SessionState,
    cancel: CancelToken,
    last_ranked: Option<Vec<Prediction>>,
    lock: Option<LockResult>,
    lock_frame: Option<Frame>,
}

impl ScannerSession {
    pub fn new(
        config: SessionConfig,
        camera: Box<dyn CameraSource>,
        loader: Box<dyn ClassifierLoader>,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        let stability = StabilityLock::new(config.stability.clone());
        let gate = FrameGate::new(config.gate.clone());
        Self {
            config,
            camera,
            loader,
            observer,
            classifier: None,
            cached_path: None,
            stability,
            gate,
            state: SessionState::Idle,
            cancel: CancelToken::new(),
            last_ranked: None,
            lock: None,
            lock_frame: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn lock_result(&self) -> Option<&LockResult> {
        self.lock.as_ref()
    }

    /// 锁定帧的 JPEG 取证快照，仅锁定后可用，重新 start 时清掉
    pub fn lock_snapshot(&self) -> Option<Vec<u8>> {
        self.lock_frame
            .as_ref()
            .map(|frame| frame.to_jpeg(self.config.snapshot_quality))
    }

    /// 可分发给宿主的取消句柄
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 启动一次激活：加载模型（可能命中缓存）、申请相机、进入采集。
    /// 失败时会话回到 Idle，宿主可重试。
    pub fn start(&mut self) -> Result<(), ScanError> {
        // 顶掉上一次运行
        self.stop();

        self.state = SessionState::Loading;
        self.observer.on_status("loading model");

        if self.cached_path.as_deref() != Some(self.config.classifier_path.as_str()) {
            self.classifier = None;
        }
        if self.classifier.is_none() {
            match self.loader.load(&self.config.classifier_path) {
                Ok(classifier) => {
                    self.classifier = Some(classifier);
                    self.cached_path = Some(self.config.classifier_path.clone());
                }
                Err(err) => {
                    self.state = SessionState::Idle;
                    self.observer.on_error(ErrorKind::ModelLoad, &err.to_string());
                    return Err(ScanError::Model(err));
                }
            }
        }

        if let Err(err) = self.camera.setup(self.config.facing) {
            self.state = SessionState::Idle;
            self.observer
                .on_error(ErrorKind::CameraUnavailable, &err.to_string());
            return Err(ScanError::Camera(err));
        }
        self.camera.play();

        self.stability.reset();
        self.gate.reset();
        self.last_ranked = None;
        self.lock = None;
        self.lock_frame = None;
        self.cancel.clear();
        self.state = SessionState::Capturing;

        info!("🎥 session started ({:?})", self.config.facing);
        self.observer.on_status("capturing");
        Ok(())
    }

    /// 处理一帧。画面没变化时复用上一次的预测（连续计时照常走），
    /// 推理失败只跳过本帧。
    pub fn tick(&mut self) -> StepOutcome {
        if self.cancel.is_cancelled() {
            self.stop();
            return StepOutcome::Ended;
        }
        if self.state != SessionState::Capturing {
            return StepOutcome::Ended;
        }

        let frame = match self.camera.next_frame() {
            Some(frame) => frame,
            None => {
                debug!("📴 frame stream ended without lock");
                self.stop();
                return StepOutcome::Ended;
            }
        };
        let now_ms = frame.timestamp_ms();

        if self.gate.has_changed(&frame) || self.last_ranked.is_none() {
            let predicted = match &self.classifier {
                Some(classifier) => classifier.predict(&frame),
                None => return StepOutcome::Ended,
            };
            match predicted {
                Ok(ranked) => self.last_ranked = Some(ranked),
                Err(err) => {
                    warn!("⚠️ inference failed on frame {}: {}", frame.frame_number, err);
                    self.observer.on_error(ErrorKind::Inference, &err.to_string());
                    return StepOutcome::Continue;
                }
            }
        }

        let ranked = match &self.last_ranked {
            Some(ranked) => ranked.clone(),
            None => return StepOutcome::Continue,
        };

        if let Some(top) = ranked.first() {
            self.observer.on_top_prediction(&top.label, top.probability);
        }
        self.observer
            .on_ranked(&ranked[..ranked.len().min(RANKED_LIMIT)]);

        match self.stability.evaluate(&ranked, now_ms) {
            LockDecision::Lock(lock) => {
                self.state = SessionState::Locked;
                self.camera.stop();
                self.lock_frame = Some(frame);
                self.lock = Some(lock.clone());

                info!(
                    "🔒 locked: {} ({:.3}) @ {}ms",
                    lock.label, lock.probability, lock.timestamp_ms
                );
                self.observer.on_locked(&lock);
                StepOutcome::Locked(lock)
            }
            LockDecision::Continue => StepOutcome::Continue,
        }
    }

    /// 一直跑到锁定、取消或帧流耗尽
    pub fn run(&mut self) -> Option<LockResult> {
        loop {
            match self.tick() {
                StepOutcome::Locked(lock) => return Some(lock),
                StepOutcome::Ended => return None,
                StepOutcome::Continue => {}
            }
        }
    }

    /// 幂等，任意状态可调，绝不失败
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if matches!(self.state, SessionState::Loading | SessionState::Capturing) {
            self.camera.stop();
        }
        self.state = SessionState::Idle;
    }
}
