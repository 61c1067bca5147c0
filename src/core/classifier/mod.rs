//! 图像分类边界
//!
//! 识别本体放在 [`Classifier`] trait 后面：宿主可以接入任意推理后端
//! （TFLite / ONNX / 远端服务），库内自带轻量的质心分类器作为
//! 降级与测试实现。

pub mod centroid;
pub mod error;
pub mod loader;

use rayon::prelude::*;

use crate::core::video::Frame;

pub use centroid::CentroidClassifier;
pub use error::ClassifierError;
pub use loader::{DescriptorLoader, ModelDescriptor};

/// 单条分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub probability: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, probability: f32) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// 按概率降序排序；稳定排序，同分保持模型输出顺序
pub fn rank_predictions(mut predictions: Vec<Prediction>) -> Vec<Prediction> {
    predictions.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    predictions
}

pub trait Classifier: Send + Sync {
    /// 对一帧做分类，返回按概率降序的结果
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, ClassifierError>;
}

/// 模型加载边界：descriptor 路径 -> 可用的分类器
pub trait ClassifierLoader: Send + Sync {
    fn load(&self, descriptor_path: &str) -> Result<Box<dyn Classifier>, ClassifierError>;
}

/// 批量分类（离线回放 / 连拍评估用），不进实时帧循环
pub fn classify_batch(
    classifier: &dyn Classifier,
    frames: &[Frame],
) -> Vec<Result<Vec<Prediction>, ClassifierError>> {
    frames.par_iter().map(|f| classifier.predict(f)).collect()
}

type MockPattern =
    Box<dyn Fn(u64) -> Result<Vec<Prediction>, ClassifierError> + Send + Sync>;

/// 按帧编号出结果的脚本分类器
pub struct MockClassifier {
    pattern: MockPattern,
}

impl MockClassifier {
    /// 每帧都返回同一个标签与概率
    pub fn fixed(label: &str, probability: f32) -> Self {
        let label = label.to_string();
        Self::with_pattern(move |_| Ok(vec![Prediction::new(label.clone(), probability)]))
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<Prediction>, ClassifierError> + Send + Sync + 'static,
    {
        Self {
            pattern: Box::new(pattern),
        }
    }
}

impl Classifier for MockClassifier {
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, ClassifierError> {
        (self.pattern)(frame.frame_number).map(rank_predictions)
    }
}

/// 脚本加载器：测试会话 start 的两类加载结局
pub struct MockLoader {
    factory: Box<dyn Fn() -> Result<Box<dyn Classifier>, ClassifierError> + Send + Sync>,
}

impl MockLoader {
    pub fn succeeding<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn Classifier> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(move || Ok(factory())),
        }
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self {
            factory: Box::new(move || {
                Err(ClassifierError::DescriptorInvalid(message.clone()))
            }),
        }
    }
}

impl ClassifierLoader for MockLoader {
    fn load(&self, _descriptor_path: &str) -> Result<Box<dyn Classifier>, ClassifierError> {
        (self.factory)()
    }
}
