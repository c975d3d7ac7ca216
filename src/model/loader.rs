use std::path::Path;

use parking_lot::Mutex;
use tch::{
    Device, Kind, Tensor,
    nn::{ModuleT, SequentialT, VarStore},
    no_grad,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    error::ServiceError,
    model::{
        checkpoint::{self, LoadReport},
        vgg,
    },
};

/// Anything that maps a preprocessed `[1, 3, 224, 224]` batch to a softmax
/// distribution over the configured classes.
pub trait ImageClassifier: Send + Sync {
    fn probabilities(&self, batch: Tensor) -> Result<Vec<f32>, ServiceError>;
}

pub struct Vgg16Classifier {
    device: Device,
    num_classes: i64,
    // keeps the parameters alive next to the network that shares them
    _vs: VarStore,
    net: Mutex<SequentialT>,
}

impl Vgg16Classifier {
    pub fn load(config: &AppConfig, num_classes: usize) -> Result<Self, ServiceError> {
        let num_classes = num_classes as i64;
        let mut vs = VarStore::new(config.device);
        let net = vgg::vgg16(&vs.root(), num_classes);

        if let Some(report) = load_optional(&mut vs, &config.backbone_path, "backbone")? {
            info!(
                copied = report.copied,
                skipped = report.mismatched.len() + report.missing.len(),
                "backbone weights applied"
            );
        }

        match load_optional(&mut vs, &config.model_path, "checkpoint")? {
            Some(report) => {
                let report = report.require_matching_shapes()?;
                info!(
                    path = %config.model_path.display(),
                    strict = report.strict,
                    copied = report.copied,
                    "loaded fine-tuned weights"
                )
            }
            None => warn!(
                path = %config.model_path.display(),
                "no fine-tuned checkpoint found, train one first"
            ),
        }

        vgg::freeze_features(&vs);

        Ok(Self {
            device: config.device,
            num_classes,
            _vs: vs,
            net: Mutex::new(net),
        })
    }

    pub fn num_classes(&self) -> i64 {
        self.num_classes
    }
}

fn load_optional(
    vs: &mut VarStore,
    path: &Path,
    what: &str,
) -> Result<Option<LoadReport>, ServiceError> {
    if !path.exists() {
        warn!(path = %path.display(), what, "weights file missing");
        return Ok(None);
    }
    checkpoint::load_file(vs, path).map(Some)
}

impl ImageClassifier for Vgg16Classifier {
    fn probabilities(&self, batch: Tensor) -> Result<Vec<f32>, ServiceError> {
        let net = self.net.lock();
        let probs = no_grad(|| {
            net.forward_t(&batch.to_device(self.device), false)
                .softmax(-1, Kind::Float)
        });
        let size = probs.size();
        if size.len() != 2 || size[0] != 1 || size[1] != self.num_classes {
            return Err(ServiceError::Inference(format!(
                "unexpected output shape {size:?}"
            )));
        }
        let probs = probs.squeeze_dim(0).to_device(Device::Cpu);
        Ok(Vec::<f32>::try_from(&probs)?)
    }
}
