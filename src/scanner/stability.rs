use crate::core::classifier::Prediction;

/// 稳定锁定配置
#[derive(Debug, Clone)]
pub struct StabilityConfig {
    /// 置信度门槛，等于门槛也算过（>=）
    pub confidence_threshold: f32,
    /// 同一类别需要连续保持在门槛之上的时长（毫秒）
    pub stability_window_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.98,
            stability_window_ms: 1000,
        }
    }
}

impl StabilityConfig {
    /// 证件场景：更严的门槛，更长的窗口
    pub fn strict() -> Self {
        Self {
            confidence_threshold: 0.995,
            stability_window_ms: 1500,
        }
    }

    /// 演示场景：更快出锁
    pub fn quick() -> Self {
        Self {
            confidence_threshold: 0.90,
            stability_window_ms: 600,
        }
    }
}

/// 锁定结果：一次会话激活最多产生一个，产生后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct LockResult {
    pub label: String,
    pub probability: f32,
    pub timestamp_ms: u64,
}

/// 单帧评估结论
#[derive(Debug, Clone, PartialEq)]
pub enum LockDecision {
    Continue,
    Lock(LockResult),
}

#[derive(Debug, Clone)]
struct Candidate {
    label: String,
    since_ms: u64,
}

/// 稳定锁定引擎
///
/// 逐帧吃排好序的预测：最高项掉下门槛或换了类别就重置连续计时；
/// 同一类别在门槛之上撑满窗口即锁定。锁定是终态，`reset` 之前
/// 不再评估。
pub struct StabilityLock {
    config: StabilityConfig,
    candidate: Option<Candidate>,
    locked: bool,
}

impl StabilityLock {
    pub fn new(config: StabilityConfig) -> Self {
        Self {
            config,
            candidate: None,
            locked: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// `predictions` 必须已按概率降序；空列表视为无候选
    pub fn evaluate(&mut self, predictions: &[Prediction], now_ms: u64) -> LockDecision {
        if self.locked {
            return LockDecision::Continue;
        }

        let top = match predictions.first() {
            Some(top) => top,
            None => {
                self.candidate = None;
                return LockDecision::Continue;
            }
        };

        if top.probability < self.config.confidence_threshold {
            self.candidate = None;
            return LockDecision::Continue;
        }

        match &self.candidate {
            Some(candidate) if candidate.label == top.label => {
                if now_ms.saturating_sub(candidate.since_ms) >= self.config.stability_window_ms {
                    self.locked = true;
                    LockDecision::Lock(LockResult {
                        label: top.label.clone(),
                        probability: top.probability,
                        timestamp_ms: now_ms,
                    })
                } else {
                    LockDecision::Continue
                }
            }
            _ => {
                // 新类别，重新计时
                self.candidate = Some(Candidate {
                    label: top.label.clone(),
                    since_ms: now_ms,
                });
                LockDecision::Continue
            }
        }
    }

    pub fn reset(&mut self) {
        self.candidate = None;
        self.locked = false;
    }
}
