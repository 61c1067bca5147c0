use log::debug;

use super::error::ClassifierError;
use super::loader::ModelDescriptor;
use super::{rank_predictions, Classifier, Prediction};
use crate::core::video::Frame;

/// 质心特征维度：8x8 块平均灰度网格
pub const FEATURE_DIM: usize = 64;

const GRID: usize = 8;

/// 质心分类器 - 最近质心 + softmax
///
/// 从 descriptor 读入每个类别的特征质心，推理时计算帧特征到各质心的
/// 欧氏距离，softmax 转成概率。没有真实神经网络时的降级实现，
/// 也是确定性的测试后端。
pub struct CentroidClassifier {
    labels: Vec<String>,
    centroids: Vec<Vec<f32>>,
    input_size: u32,
    sharpness: f32,
}

impl CentroidClassifier {
    pub fn from_descriptor(descriptor: ModelDescriptor) -> Result<Self, ClassifierError> {
        descriptor.validate()?;

        Ok(Self {
            labels: descriptor.labels,
            centroids: descriptor.centroids,
            input_size: descriptor.input_size,
            sharpness: descriptor.sharpness,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// 帧 -> 64 维特征：缩放到输入尺寸，取灰度，8x8 块平均，归一化到 [0,1]
    pub fn features(&self, frame: &Frame) -> Vec<f32> {
        let scaled = if frame.width == self.input_size && frame.height == self.input_size {
            frame.clone()
        } else {
            frame.resize_to(self.input_size, self.input_size)
        };

        let gray = scaled.luma();
        let side = self.input_size as usize;
        let block = (side / GRID).max(1);

        let mut features = Vec::with_capacity(FEATURE_DIM);
        for by in 0..GRID {
            for bx in 0..GRID {
                let mut sum = 0u32;
                let mut count = 0u32;
                for y in (by * block)..((by + 1) * block).min(side) {
                    let row = y * side;
                    for x in (bx * block)..((bx + 1) * block).min(side) {
                        if let Some(&v) = gray.get(row + x) {
                            sum += v as u32;
                            count += 1;
                        }
                    }
                }
                let avg = if count > 0 { sum as f32 / count as f32 } else { 0.0 };
                features.push(avg / 255.0);
            }
        }

        features
    }
}

impl Classifier for CentroidClassifier {
    fn predict(&self, frame: &Frame) -> Result<Vec<Prediction>, ClassifierError> {
        let features = self.features(frame);

        let mut scores = Vec::with_capacity(self.centroids.len());
        for centroid in &self.centroids {
            if centroid.len() != features.len() {
                return Err(ClassifierError::Inference(format!(
                    "centroid dim {} != feature dim {}",
                    centroid.len(),
                    features.len()
                )));
            }

            let dist_sq: f32 = centroid
                .iter()
                .zip(features.iter())
                .map(|(c, f)| (c - f) * (c - f))
                .sum();
            scores.push(-self.sharpness * dist_sq.sqrt());
        }

        // softmax（减最大值防溢出）
        let max_score = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores.iter().map(|s| (s - max_score).exp()).collect();
        let total: f32 = exps.iter().sum();

        let predictions = self
            .labels
            .iter()
            .zip(exps.iter())
            .map(|(label, e)| Prediction::new(label.clone(), e / total))
            .collect();

        let ranked = rank_predictions(predictions);
        debug!(
            "🔍 frame {}: top = {} ({:.3})",
            frame.frame_number, ranked[0].label, ranked[0].probability
        );
        Ok(ranked)
    }
}
