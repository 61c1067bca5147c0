use std::sync::Arc;

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::scanner::error::ScanError;
use crate::scanner::events::ScanObserver;
use crate::scanner::session::{ScannerSession, StepOutcome};
use crate::scanner::stability::LockResult;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// 标签归一化：去首尾空白、压缩内部空白、小写。幂等。
pub fn normalize_label(raw: &str) -> String {
    WHITESPACE.replace_all(raw.trim(), " ").to_lowercase()
}

/// 验证流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyPhase {
    /// 等第一步（扫脸）锁定
    AwaitingFirst,
    /// 等第二步（扫证件）锁定
    AwaitingSecond,
    /// 两个锁定都在手，等 verify
    ReadyToVerify,
    /// 仅 verify 成功可达
    Verified,
}

/// verify 的结果。Mismatch 是正常的重试路径，不是错误。
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Verified {
        /// 归一化后的标签
        label: String,
        /// 不在白名单时为 false（没配白名单恒为 true）
        authorized: bool,
    },
    Mismatch,
}

/// 准入白名单。空名单放行所有人。
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<String>,
}

impl Roster {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|e| normalize_label(e.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `label` 需是归一化后的标签
    pub fn allows(&self, label: &str) -> bool {
        self.entries.is_empty() || self.entries.iter().any(|e| e == label)
    }
}

/// 阶段编排器 - 扫脸、扫证件、比对，三步串成一条验证流程
///
/// 两个会话各自独占相机资源，编排器是唯一同时看到两个锁定结果的
/// 组件。`Verified` 只能通过显式 `verify` 进入；比对失败保留第一步
/// 的锁定，只重扫第二步。
pub struct PhaseSequencer {
    first: ScannerSession,
    second: ScannerSession,
    observer: Arc<dyn ScanObserver>,
    roster: Roster,
    phase: VerifyPhase,
    first_lock: Option<LockResult>,
    second_lock: Option<LockResult>,
}

impl PhaseSequencer {
    pub fn new(
        first: ScannerSession,
        second: ScannerSession,
        observer: Arc<dyn ScanObserver>,
    ) -> Self {
        Self {
            first,
            second,
            observer,
            roster: Roster::default(),
            phase: VerifyPhase::AwaitingFirst,
            first_lock: None,
            second_lock: None,
        }
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn phase(&self) -> VerifyPhase {
        self.phase
    }

    pub fn first_lock(&self) -> Option<&LockResult> {
        self.first_lock.as_ref()
    }

    pub fn second_lock(&self) -> Option<&LockResult> {
        self.second_lock.as_ref()
    }

    fn set_phase(&mut self, phase: VerifyPhase) {
        self.phase = phase;
        self.observer.on_phase(phase);
    }

    /// 从头开始：两个锁定作废，第一步会话启动
    pub fn begin(&mut self) -> Result<(), ScanError> {
        self.first.stop();
        self.second.stop();
        self.first_lock = None;
        self.second_lock = None;
        self.set_phase(VerifyPhase::AwaitingFirst);
        self.first.start()
    }

    /// 推进当前阶段的会话一帧；锁定时收下结果并切阶段。
    /// 返回这次驱动的单步结果。
    pub fn tick(&mut self) -> Result<StepOutcome, ScanError> {
        match self.phase {
            VerifyPhase::AwaitingFirst => {
                let outcome = self.first.tick();
                if let StepOutcome::Locked(lock) = &outcome {
                    self.first_lock = Some(lock.clone());
                    self.set_phase(VerifyPhase::AwaitingSecond);
                    self.second.start()?;
                }
                Ok(outcome)
            }
            VerifyPhase::AwaitingSecond => {
                let outcome = self.second.tick();
                if let StepOutcome::Locked(lock) = &outcome {
                    self.second_lock = Some(lock.clone());
                    self.set_phase(VerifyPhase::ReadyToVerify);
                }
                Ok(outcome)
            }
            VerifyPhase::ReadyToVerify | VerifyPhase::Verified => Ok(StepOutcome::Ended),
        }
    }

    /// 一直驱动到 ReadyToVerify / Verified，或当前会话帧流耗尽
    pub fn run(&mut self) -> Result<VerifyPhase, ScanError> {
        loop {
            if matches!(self.phase, VerifyPhase::ReadyToVerify | VerifyPhase::Verified) {
                return Ok(self.phase);
            }
            if let StepOutcome::Ended = self.tick()? {
                return Ok(self.phase);
            }
        }
    }

    /// 比对两个锁定的标签（归一化后）。只在 ReadyToVerify 有意义。
    /// 相等且非空 -> Verified；否则作废第二步锁定并重扫第二步。
    pub fn verify(&mut self) -> Result<VerifyOutcome, ScanError> {
        if self.phase != VerifyPhase::ReadyToVerify {
            return Err(ScanError::InvalidPhase("verify requires both locks"));
        }
        let (first, second) = match (&self.first_lock, &self.second_lock) {
            (Some(first), Some(second)) => (first, second),
            _ => return Err(ScanError::InvalidPhase("verify requires both locks")),
        };

        let face = normalize_label(&first.label);
        let id = normalize_label(&second.label);

        if !face.is_empty() && face == id {
            let authorized = self.roster.allows(&face);
            info!("✅ identity verified: {} (authorized: {})", face, authorized);
            self.set_phase(VerifyPhase::Verified);
            self.observer.on_verify_outcome(true, Some(&face));
            Ok(VerifyOutcome::Verified {
                label: face,
                authorized,
            })
        } else {
            info!("❌ label mismatch: '{}' vs '{}'", face, id);
            self.observer.on_verify_outcome(false, None);
            self.second_lock = None;
            self.set_phase(VerifyPhase::AwaitingSecond);
            self.second.start()?;
            Ok(VerifyOutcome::Mismatch)
        }
    }

    /// 任意阶段可调：两个会话都停、两个锁定都清，回到第一步
    pub fn restart_first(&mut self) -> Result<(), ScanError> {
        self.begin()
    }

    /// 只重扫第二步，第一步锁定保留。第一步还没锁定时是前置条件错误。
    pub fn restart_second(&mut self) -> Result<(), ScanError> {
        if self.first_lock.is_none() {
            return Err(ScanError::InvalidPhase("restart_second requires a first lock"));
        }
        self.second.stop();
        self.second_lock = None;
        self.set_phase(VerifyPhase::AwaitingSecond);
        self.second.start()
    }

    /// 宿主收尾用；幂等
    pub fn stop(&mut self) {
        self.first.stop();
        self.second.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::camera::{FacingMode, ScriptedCamera};
    use crate::core::classifier::{MockClassifier, MockLoader, Prediction};
    use crate::core::video::Frame;
    use crate::scanner::events::RecordingObserver;
    use crate::scanner::session::SessionConfig;

    // 每帧亮度都不同，保证变化门限放行所有帧
    fn frames(count: u64) -> Vec<Frame> {
        (0..count)
            .map(|n| {
                let fill = 16 + (n * 37 % 224) as u8;
                Frame::new(64, 64, vec![fill; 64 * 64 * 4], n * 100, n)
            })
            .collect()
    }

    fn fixed_session(
        label: &str,
        facing: FacingMode,
        frame_count: u64,
        observer: Arc<RecordingObserver>,
    ) -> ScannerSession {
        let label = label.to_string();
        ScannerSession::new(
            SessionConfig::new("model.json", facing),
            Box::new(ScriptedCamera::new(frames(frame_count))),
            Box::new(MockLoader::succeeding(move || {
                Box::new(MockClassifier::fixed(&label, 0.99))
            })),
            observer,
        )
    }

    fn sequencer_with(
        face_label: &str,
        id_label: &str,
        observer: Arc<RecordingObserver>,
    ) -> PhaseSequencer {
        let first = fixed_session(face_label, FacingMode::Front, 15, observer.clone());
        let second = fixed_session(id_label, FacingMode::Rear, 15, observer.clone());
        PhaseSequencer::new(first, second, observer)
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Alice  "), "alice");
        assert_eq!(normalize_label("Alice\t Marie \n Smith"), "alice marie smith");
        assert_eq!(normalize_label(""), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_label("  Alice \t Smith ");
        assert_eq!(normalize_label(&once), once);
    }

    #[test]
    fn test_happy_path_verifies() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("Alice ", "alice", observer.clone());

        seq.begin().unwrap();
        assert_eq!(seq.run().unwrap(), VerifyPhase::ReadyToVerify);
        assert!(seq.first_lock().is_some());
        assert!(seq.second_lock().is_some());

        let outcome = seq.verify().unwrap();
        assert_eq!(
            outcome,
            VerifyOutcome::Verified {
                label: "alice".to_string(),
                authorized: true,
            }
        );
        assert_eq!(seq.phase(), VerifyPhase::Verified);
        assert_eq!(observer.outcomes(), vec![(true, Some("alice".to_string()))]);
    }

    #[test]
    fn test_phase_changes_are_observed() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("alice", "alice", observer.clone());

        seq.begin().unwrap();
        seq.run().unwrap();
        seq.verify().unwrap();

        assert_eq!(
            observer.phases(),
            vec![
                VerifyPhase::AwaitingFirst,
                VerifyPhase::AwaitingSecond,
                VerifyPhase::ReadyToVerify,
                VerifyPhase::Verified,
            ]
        );
    }

    #[test]
    fn test_mismatch_keeps_first_lock_and_rescans_second() {
        let observer = Arc::new(RecordingObserver::new());

        // 第二步的分类器前半段认成 Bob，重扫后认成 Alice
        let first = fixed_session("Alice", FacingMode::Front, 15, observer.clone());
        let second = ScannerSession::new(
            SessionConfig::new("model.json", FacingMode::Rear),
            Box::new(ScriptedCamera::new(frames(40))),
            Box::new(MockLoader::succeeding(|| {
                Box::new(MockClassifier::with_pattern(|n| {
                    let label = if n < 15 { "Bob" } else { "Alice" };
                    Ok(vec![Prediction::new(label, 0.99)])
                }))
            })),
            observer.clone(),
        );
        let mut seq = PhaseSequencer::new(first, second, observer.clone());

        seq.begin().unwrap();
        assert_eq!(seq.run().unwrap(), VerifyPhase::ReadyToVerify);

        let outcome = seq.verify().unwrap();
        assert_eq!(outcome, VerifyOutcome::Mismatch);
        assert_eq!(seq.phase(), VerifyPhase::AwaitingSecond);
        assert_eq!(seq.first_lock().unwrap().label, "Alice");
        assert!(seq.second_lock().is_none());

        // 重扫第二步后标签吻合
        assert_eq!(seq.run().unwrap(), VerifyPhase::ReadyToVerify);
        let outcome = seq.verify().unwrap();
        assert!(matches!(outcome, VerifyOutcome::Verified { .. }));
        assert_eq!(observer.outcomes().len(), 2);
    }

    #[test]
    fn test_verify_outside_ready_phase_is_rejected() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("alice", "alice", observer);

        assert!(matches!(seq.verify(), Err(ScanError::InvalidPhase(_))));

        seq.begin().unwrap();
        assert!(matches!(seq.verify(), Err(ScanError::InvalidPhase(_))));
    }

    #[test]
    fn test_restart_second_without_first_lock_is_precondition_error() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("alice", "alice", observer);

        seq.begin().unwrap();
        // 第一步还没锁定
        assert!(matches!(
            seq.restart_second(),
            Err(ScanError::InvalidPhase(_))
        ));
        assert_eq!(seq.phase(), VerifyPhase::AwaitingFirst);
    }

    #[test]
    fn test_restart_first_clears_everything() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("alice", "alice", observer);

        seq.begin().unwrap();
        seq.run().unwrap();
        assert!(seq.first_lock().is_some());

        seq.restart_first().unwrap();
        assert_eq!(seq.phase(), VerifyPhase::AwaitingFirst);
        assert!(seq.first_lock().is_none());
        assert!(seq.second_lock().is_none());
    }

    #[test]
    fn test_roster_gates_verified_outcome() {
        let observer = Arc::new(RecordingObserver::new());
        let mut seq = sequencer_with("Mallory", "mallory", observer)
            .with_roster(Roster::new(["Alice", "Bob"]));

        seq.begin().unwrap();
        seq.run().unwrap();

        match seq.verify().unwrap() {
            VerifyOutcome::Verified { label, authorized } => {
                assert_eq!(label, "mallory");
                assert!(!authorized);
            }
            other => panic!("expected verified, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_roster_allows_everyone() {
        let roster = Roster::default();
        assert!(roster.allows("anyone"));

        let roster = Roster::new(["Alice Smith"]);
        assert!(roster.allows("alice smith"));
        assert!(!roster.allows("bob"));
    }
}
