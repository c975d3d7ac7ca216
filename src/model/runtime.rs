use std::{sync::Arc, time::Instant};

use tokio::task;
use tracing::{debug, error, info};

use crate::{
    config::{AppConfig, ModelMeta},
    error::ServiceError,
    labels,
    model::{
        loader::{ImageClassifier, Vgg16Classifier},
        types::{ImageSize, InputInfo, PredictionResponse, Timings},
    },
    preprocess::{self, IMG_SIZE},
    scoring::{ScoreSummary, round_to},
};

pub struct InferenceRuntime {
    classes: Arc<Vec<String>>,
    classifier: Option<Arc<dyn ImageClassifier>>,
    meta: ModelMeta,
    top_k: usize,
    threshold_pct: f64,
}

impl InferenceRuntime {
    /// Loads labels and weights. A model that fails to load leaves the runtime
    /// up but unable to predict.
    pub fn initialize(config: &AppConfig) -> Self {
        let classes = labels::load_or_default(&config.classes_path);
        info!(num_classes = classes.len(), "loading VGG16");

        let classifier = match Vgg16Classifier::load(config, classes.len()) {
            Ok(model) => Some(Arc::new(model) as Arc<dyn ImageClassifier>),
            Err(err) => {
                error!(error = %err, "failed to load model");
                None
            }
        };

        Self::new(config, classes, classifier)
    }

    pub fn new(
        config: &AppConfig,
        classes: Vec<String>,
        classifier: Option<Arc<dyn ImageClassifier>>,
    ) -> Self {
        Self {
            classes: Arc::new(classes),
            classifier,
            meta: config.model_meta(),
            top_k: config.top_k,
            threshold_pct: config.threshold_pct,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn is_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    pub async fn predict(&self, bytes: Vec<u8>) -> Result<PredictionResponse, ServiceError> {
        let classifier = self
            .classifier
            .clone()
            .ok_or(ServiceError::ModelUnavailable)?;
        let classes = self.classes.clone();
        let meta = self.meta.clone();
        let (top_k, threshold_pct) = (self.top_k, self.threshold_pct);

        task::spawn_blocking(move || {
            run_prediction(
                classifier.as_ref(),
                &bytes,
                &classes,
                top_k,
                threshold_pct,
                meta,
            )
        })
        .await
        .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))?
    }
}

fn run_prediction(
    classifier: &dyn ImageClassifier,
    bytes: &[u8],
    classes: &[String],
    top_k: usize,
    threshold_pct: f64,
    meta: ModelMeta,
) -> Result<PredictionResponse, ServiceError> {
    let start = Instant::now();

    let prepared = preprocess::prepare(bytes)?;
    let probs = classifier.probabilities(prepared.tensor.shallow_clone())?;
    let summary = ScoreSummary::from_probabilities(&probs, classes, top_k, threshold_pct)?;

    let inference_ms = round_to(start.elapsed().as_secs_f64() * 1000.0, 2);

    let preview = match preprocess::preview_data_url(&prepared.tensor) {
        Ok(url) => Some(url),
        Err(err) => {
            debug!(error = %err, "preview unavailable");
            None
        }
    };

    info!(
        class = %summary.prediction.class_name,
        pct = summary.prediction.pct,
        inference_ms,
        "prediction complete"
    );

    Ok(PredictionResponse {
        success: true,
        prediction: summary.prediction,
        confidence_scores: summary.confidence_scores,
        top_k: summary.top_k,
        threshold: summary.threshold,
        timings: Timings { inference_ms },
        input: InputInfo {
            original_size: ImageSize {
                w: prepared.original_width,
                h: prepared.original_height,
            },
            preprocessed_size: ImageSize {
                w: IMG_SIZE,
                h: IMG_SIZE,
            },
        },
        model: meta,
        preview,
    })
}
