//! Fine-tuning VGG16 on an image folder: frozen convolutional features, Adam on
//! the classifier, cross-entropy on logits.

use std::{fs, path::PathBuf, time::Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use tch::{
    Device, Kind, Tensor,
    nn::{self, ModuleT, OptimizerConfig},
};
use tracing::{info, warn};

use crate::{
    dataset::ImageFolder,
    error::ServiceError,
    evaluation::ClassificationReport,
    labels,
    model::{checkpoint, vgg},
    preprocess,
};

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub data_dir: PathBuf,
    pub eval_dir: Option<PathBuf>,
    pub model_path: PathBuf,
    pub classes_path: Option<PathBuf>,
    pub backbone_path: Option<PathBuf>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub device: Device,
    pub show_progress: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("clean_dataset"),
            eval_dir: None,
            model_path: PathBuf::from("model/vgg16_fruit_model.safetensors"),
            classes_path: None,
            backbone_path: Some(PathBuf::from("model/vgg16.safetensors")),
            epochs: 10,
            batch_size: 16,
            learning_rate: 1e-4,
            seed: 42,
            device: Device::cuda_if_available(),
            show_progress: true,
        }
    }
}

impl TrainConfig {
    /// `classes.json` next to the checkpoint unless a path was given.
    pub fn resolved_classes_path(&self) -> PathBuf {
        self.classes_path.clone().unwrap_or_else(|| {
            self.model_path
                .parent()
                .map(|p| p.join("classes.json"))
                .unwrap_or_else(|| PathBuf::from("classes.json"))
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f64,
    pub accuracy_pct: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub classes: Vec<String>,
    pub epochs: Vec<EpochStats>,
    pub elapsed_secs: f64,
    pub model_path: PathBuf,
    pub classes_path: PathBuf,
    pub evaluation: ClassificationReport,
}

pub fn train(config: &TrainConfig) -> Result<TrainReport, ServiceError> {
    if config.batch_size == 0 {
        return Err(ServiceError::BadRequest("batch size must be positive".into()));
    }
    tch::manual_seed(config.seed as i64);

    let dataset = ImageFolder::open(&config.data_dir)?;
    info!(
        num_classes = dataset.classes.len(),
        classes = ?dataset.classes,
        samples = dataset.len(),
        "dataset loaded"
    );

    let mut vs = nn::VarStore::new(config.device);
    let net = vgg::vgg16(&vs.root(), dataset.classes.len() as i64);

    match config.backbone_path.as_deref() {
        Some(path) if path.exists() => {
            let report = checkpoint::load_file(&mut vs, path)?;
            info!(copied = report.copied, path = %path.display(), "pretrained backbone loaded");
        }
        Some(path) => warn!(path = %path.display(), "backbone weights not found, features start random"),
        None => warn!("no backbone weights configured, features start random"),
    }
    let frozen = vgg::freeze_features(&vs);
    info!(frozen, device = ?config.device, "feature extractor frozen");

    let mut opt = nn::Adam::default().build(&vs, config.learning_rate)?;

    let start = Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut epochs = Vec::with_capacity(config.epochs);

    for epoch in 1..=config.epochs {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();
        indices.shuffle(&mut rng);

        let pb = batch_progress(dataset.len(), epoch, config.show_progress);
        let mut running_loss = 0.0;
        let mut correct = 0i64;
        let mut seen = 0i64;

        for chunk in indices.chunks(config.batch_size) {
            let (xs, ys) = load_batch(&dataset.samples, chunk, config.device)?;
            let logits = net.forward_t(&xs, true);
            let loss = logits.cross_entropy_for_logits(&ys);
            opt.backward_step(&loss);

            running_loss += loss.double_value(&[]);
            correct += logits
                .argmax(-1, false)
                .eq_tensor(&ys)
                .sum(Kind::Int64)
                .int64_value(&[]);
            seen += ys.size()[0];
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        let accuracy_pct = 100.0 * correct as f64 / seen.max(1) as f64;
        info!("Epoch {epoch}/{} - Loss: {running_loss:.4} - Acc: {accuracy_pct:.2}%", config.epochs);
        epochs.push(EpochStats {
            epoch,
            loss: running_loss,
            accuracy_pct,
        });
    }
    let elapsed_secs = start.elapsed().as_secs_f64();
    info!(elapsed_secs, "training finished");

    if let Some(parent) = config.model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    vs.save(&config.model_path)?;
    let classes_path = config.resolved_classes_path();
    labels::write_class_names(&classes_path, &dataset.classes)?;
    info!(
        model = %config.model_path.display(),
        classes = %classes_path.display(),
        "model saved"
    );

    let eval_set = match &config.eval_dir {
        Some(dir) => {
            let eval = ImageFolder::open(dir)?;
            if eval.classes != dataset.classes {
                return Err(ServiceError::Dataset(format!(
                    "evaluation classes {:?} differ from training classes {:?}",
                    eval.classes, dataset.classes
                )));
            }
            eval
        }
        None => dataset.clone(),
    };
    let evaluation = evaluate(&net, &eval_set, config.batch_size, config.device)?;
    info!(accuracy = evaluation.accuracy, "evaluation finished");

    Ok(TrainReport {
        classes: dataset.classes,
        epochs,
        elapsed_secs,
        model_path: config.model_path.clone(),
        classes_path,
        evaluation,
    })
}

/// Eval-mode predictions over a whole folder.
pub fn evaluate(
    net: &impl ModuleT,
    dataset: &ImageFolder,
    batch_size: usize,
    device: Device,
) -> Result<ClassificationReport, ServiceError> {
    let mut y_true = Vec::with_capacity(dataset.len());
    let mut y_pred = Vec::with_capacity(dataset.len());
    let indices: Vec<usize> = (0..dataset.len()).collect();

    for chunk in indices.chunks(batch_size.max(1)) {
        let (xs, ys) = load_batch(&dataset.samples, chunk, device)?;
        let preds = tch::no_grad(|| net.forward_t(&xs, false).argmax(-1, false));
        y_pred.extend(Vec::<i64>::try_from(&preds.to_device(Device::Cpu))?);
        y_true.extend(Vec::<i64>::try_from(&ys.to_device(Device::Cpu))?);
    }
    ClassificationReport::from_predictions(&y_true, &y_pred, &dataset.classes)
}

/// Decodes the selected samples in parallel and stacks them into a batch.
pub fn load_batch(
    samples: &[(PathBuf, i64)],
    idxs: &[usize],
    device: Device,
) -> Result<(Tensor, Tensor), ServiceError> {
    let images = idxs
        .par_iter()
        .map(|&i| preprocess::load_image_file(&samples[i].0))
        .collect::<Result<Vec<_>, _>>()?;
    let labels: Vec<i64> = idxs.iter().map(|&i| samples[i].1).collect();
    Ok((
        Tensor::stack(&images, 0).to_device(device),
        Tensor::from_slice(&labels).to_device(device),
    ))
}

fn batch_progress(total: usize, epoch: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "  [ep {prefix}] {elapsed_precise} {bar:40.magenta/blue} {pos}/{len} eta {eta}",
    ) {
        pb.set_style(style);
    }
    pb.set_prefix(epoch.to_string());
    pb
}
