//! Trained classifier loading: `meta.json` feature ordering and, with the
//! `torch` feature, a TorchScript module.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::error::PredictError;
use crate::features::FeatureSchema;

/// Sidecar written next to the exported model by training.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ModelMeta {
    pub feat_list: Vec<String>,
    pub in_dim: Option<usize>,
    pub schema_version: Option<u32>,
}

impl ModelMeta {
    pub fn load(meta_path: impl AsRef<Path>) -> Result<Self> {
        let meta_path = meta_path.as_ref();
        let meta_txt = fs::read_to_string(meta_path)
            .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
        serde_json::from_str(&meta_txt).with_context(|| "failed to parse meta.json")
    }

    pub fn in_dim(&self) -> usize {
        self.in_dim.unwrap_or(self.feat_list.len())
    }

    /// The model must have been trained on exactly this schema's layout.
    pub fn check(&self, schema: &FeatureSchema) -> Result<(), PredictError> {
        if let Some(v) = self.schema_version {
            if v != schema.version() {
                return Err(PredictError::ConfigurationMismatch {
                    expected: format!("schema v{}", schema.version()),
                    actual: format!("schema v{}", v),
                });
            }
        }
        if self.in_dim() != self.feat_list.len() {
            return Err(PredictError::ConfigurationMismatch {
                expected: format!("in_dim {}", self.feat_list.len()),
                actual: format!("in_dim {}", self.in_dim()),
            });
        }
        schema.check_names(&self.feat_list)
    }
}

#[cfg(feature = "torch")]
pub use torch::TorchClassifier;

#[cfg(feature = "torch")]
mod torch {
    use anyhow::{bail, Context, Result};
    use tch::{kind::Kind, CModule, Device, Tensor};

    use super::ModelMeta;
    use crate::error::PredictError;
    use crate::features::FeatureSchema;
    use crate::scoring::{ClassPrediction, Classifier};

    /// TorchScript module mapping one feature row to class logits `[1, C]`.
    pub struct TorchClassifier {
        model: CModule,
        device: Device,
        feat_list: Vec<String>,
        n_classes: i64,
    }

    impl TorchClassifier {
        pub fn load(model_path: &str, meta_path: &str, schema: &FeatureSchema) -> Result<Self> {
            let device = Device::Cpu;
            let meta = ModelMeta::load(meta_path)?;
            meta.check(schema)?;
            let in_dim = meta.in_dim();

            let model = CModule::load_on_device(model_path, device)
                .with_context(|| format!("failed to load TorchScript {}", model_path))?;

            // Probe output shape with a dummy forward: expect [B=1, C]
            let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
            let t = model.forward_ts(&[dummy])?;
            let sz = t.size();
            if sz.len() != 2 || sz[0] != 1 || sz[1] < 1 {
                bail!("unexpected model output size: {:?}", sz);
            }
            tracing::info!(
                "loaded classifier {} with {} classes over {} features",
                model_path,
                sz[1],
                in_dim
            );

            Ok(Self {
                model,
                device,
                feat_list: meta.feat_list,
                n_classes: sz[1],
            })
        }

        fn forward(&self, x: &[f32]) -> Result<ClassPrediction> {
            let input = Tensor::from_slice(x)
                .reshape([1, x.len() as i64])
                .to_device(self.device);
            let probs = self.model.forward_ts(&[input])?.softmax(-1, Kind::Float);
            let class = probs.argmax(-1, false).int64_value(&[0]);
            if !(0..self.n_classes).contains(&class) {
                bail!("class {} outside the model's {} classes", class, self.n_classes);
            }
            let probability = probs.double_value(&[0, class]);
            Ok(ClassPrediction {
                class: class as usize,
                probability,
            })
        }
    }

    impl Classifier for TorchClassifier {
        fn feature_names(&self) -> &[String] {
            &self.feat_list
        }

        fn predict(&self, x: &[f32]) -> Result<ClassPrediction, PredictError> {
            self.forward(x).map_err(|e| PredictError::Model(e.to_string()))
        }
    }
}
