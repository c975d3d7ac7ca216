use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    config::ModelMeta,
    scoring::{ClassScore, ThresholdCheck},
};

#[derive(Debug, Clone, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub prediction: ClassScore,
    pub confidence_scores: BTreeMap<String, f64>,
    pub top_k: Vec<ClassScore>,
    pub threshold: ThresholdCheck,
    pub timings: Timings,
    pub input: InputInfo,
    pub model: ModelMeta,
    pub preview: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timings {
    pub inference_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputInfo {
    pub original_size: ImageSize,
    pub preprocessed_size: ImageSize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ImageSize {
    pub w: u32,
    pub h: u32,
}
