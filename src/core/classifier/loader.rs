//! 模型 descriptor 加载
//!
//! descriptor 是一个 JSON/JSON5 文档（类别标签 + 各类特征质心），
//! 可以放在本地文件，也可以挂在静态资源服务器上按 URL 拉取。

use log::info;
use serde::{Deserialize, Serialize};

use super::centroid::{CentroidClassifier, FEATURE_DIM};
use super::error::ClassifierError;
use super::{Classifier, ClassifierLoader};

fn default_name() -> String {
    "unnamed".to_string()
}

fn default_input_size() -> u32 {
    64
}

fn default_sharpness() -> f32 {
    20.0
}

/// 模型 descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default = "default_name")]
    pub name: String,
    /// 分类器输入边长（正方形）
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    pub labels: Vec<String>,
    pub centroids: Vec<Vec<f32>>,
    /// softmax 锐度，越大分布越尖
    #[serde(default = "default_sharpness")]
    pub sharpness: f32,
}

impl ModelDescriptor {
    /// 先按严格 JSON 解析，失败再用 JSON5 容错解析一次
    pub fn from_json(text: &str) -> Result<Self, ClassifierError> {
        match serde_json::from_str(text) {
            Ok(descriptor) => Ok(descriptor),
            Err(strict_err) => json5::from_str(text)
                .map_err(|_| ClassifierError::DescriptorParse(strict_err.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ClassifierError> {
        if self.labels.is_empty() {
            return Err(ClassifierError::DescriptorInvalid(
                "labels must not be empty".to_string(),
            ));
        }
        if self.centroids.len() != self.labels.len() {
            return Err(ClassifierError::DescriptorInvalid(format!(
                "{} centroids for {} labels",
                self.centroids.len(),
                self.labels.len()
            )));
        }
        for (i, centroid) in self.centroids.iter().enumerate() {
            if centroid.len() != FEATURE_DIM {
                return Err(ClassifierError::DescriptorInvalid(format!(
                    "centroid {} has dim {}, expected {}",
                    i,
                    centroid.len(),
                    FEATURE_DIM
                )));
            }
        }
        if self.input_size < 8 {
            return Err(ClassifierError::DescriptorInvalid(format!(
                "input_size {} too small",
                self.input_size
            )));
        }
        if self.sharpness <= 0.0 {
            return Err(ClassifierError::DescriptorInvalid(
                "sharpness must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 默认加载器：文件路径或 http(s) URL -> [`CentroidClassifier`]
#[derive(Debug, Default)]
pub struct DescriptorLoader;

impl DescriptorLoader {
    fn fetch_text(path: &str) -> Result<String, ClassifierError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            let text = reqwest::blocking::get(path)?.error_for_status()?.text()?;
            Ok(text)
        } else {
            Ok(std::fs::read_to_string(path)?)
        }
    }
}

impl ClassifierLoader for DescriptorLoader {
    fn load(&self, descriptor_path: &str) -> Result<Box<dyn Classifier>, ClassifierError> {
        info!("🧠 loading model descriptor: {}", descriptor_path);

        let text = Self::fetch_text(descriptor_path)?;
        let descriptor = ModelDescriptor::from_json(&text)?;
        let classifier = CentroidClassifier::from_descriptor(descriptor)?;

        info!(
            "✅ model loaded: {} classes {:?}",
            classifier.labels().len(),
            classifier.labels()
        );
        Ok(Box::new(classifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroid_json(values: &str) -> String {
        format!(
            r#"{{
                "name": "demo",
                "labels": ["alice", "bob"],
                "centroids": [{values}, {values}]
            }}"#
        )
    }

    fn flat_centroid(v: f32) -> String {
        let entries = vec![format!("{v}"); FEATURE_DIM];
        format!("[{}]", entries.join(","))
    }

    #[test]
    fn test_from_json_strict() {
        let text = centroid_json(&flat_centroid(0.5));
        let descriptor = ModelDescriptor::from_json(&text).unwrap();

        assert_eq!(descriptor.name, "demo");
        assert_eq!(descriptor.labels, vec!["alice", "bob"]);
        assert_eq!(descriptor.input_size, 64);
        assert!(descriptor.validate().is_ok());
    }

    #[test]
    fn test_from_json5_lenient() {
        // 尾逗号 + 注释，严格 JSON 解析不了
        let text = format!(
            r#"{{
                // degraded-mode demo model
                labels: ["alice"],
                centroids: [{}],
            }}"#,
            flat_centroid(0.25)
        );

        let descriptor = ModelDescriptor::from_json(&text).unwrap();
        assert_eq!(descriptor.labels, vec!["alice"]);
        assert_eq!(descriptor.name, "unnamed");
    }

    #[test]
    fn test_from_json_garbage_fails() {
        let err = ModelDescriptor::from_json("not a descriptor").unwrap_err();
        assert!(matches!(err, ClassifierError::DescriptorParse(_)));
    }

    #[test]
    fn test_validate_rejects_label_centroid_mismatch() {
        let text = format!(
            r#"{{"labels": ["a", "b"], "centroids": [{}]}}"#,
            flat_centroid(0.1)
        );
        let descriptor = ModelDescriptor::from_json(&text).unwrap();

        assert!(matches!(
            descriptor.validate(),
            Err(ClassifierError::DescriptorInvalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_dim() {
        let descriptor = ModelDescriptor {
            name: "bad".to_string(),
            input_size: 64,
            labels: vec!["a".to_string()],
            centroids: vec![vec![0.0; 10]],
            sharpness: 20.0,
        };

        assert!(matches!(
            descriptor.validate(),
            Err(ClassifierError::DescriptorInvalid(_))
        ));
    }

    #[test]
    fn test_loader_missing_file_is_not_transient() {
        let loader = DescriptorLoader;
        let err = loader.load("/nonexistent/model.json").err().unwrap();
        assert!(!err.is_transient());
    }
}
