use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ServiceError;

pub const LOW_CONFIDENCE_NOTE: &str = "Low confidence, try a clearer or better-lit image.";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassScore {
    #[serde(rename = "class")]
    pub class_name: String,
    pub prob: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThresholdCheck {
    pub value_pct: f64,
    pub met: bool,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreSummary {
    pub prediction: ClassScore,
    pub confidence_scores: BTreeMap<String, f64>,
    pub top_k: Vec<ClassScore>,
    pub threshold: ThresholdCheck,
}

impl ScoreSummary {
    /// Turns a softmax distribution into the API's scoring block.
    pub fn from_probabilities(
        probs: &[f32],
        classes: &[String],
        top_k: usize,
        threshold_pct: f64,
    ) -> Result<Self, ServiceError> {
        if probs.len() != classes.len() {
            return Err(ServiceError::Inference(format!(
                "model produced {} scores for {} classes",
                probs.len(),
                classes.len()
            )));
        }
        if probs.is_empty() {
            return Err(ServiceError::Inference("model produced no scores".into()));
        }

        let mut ranked: Vec<(usize, f64)> = probs
            .iter()
            .enumerate()
            .map(|(idx, &p)| (idx, p as f64))
            .collect();
        // stable: equal probabilities keep index order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let (best_idx, best_prob) = ranked[0];
        let best_pct = best_prob * 100.0;

        let prediction = ClassScore {
            class_name: classes[best_idx].clone(),
            prob: round_to(best_prob, 6),
            pct: round_to(best_pct, 2),
        };

        let confidence_scores = classes
            .iter()
            .zip(probs)
            .map(|(name, &p)| (name.clone(), p as f64 * 100.0))
            .collect();

        let top_k = ranked
            .iter()
            .take(top_k.min(classes.len()))
            .map(|&(idx, p)| ClassScore {
                class_name: classes[idx].clone(),
                prob: p,
                pct: round_to(p * 100.0, 2),
            })
            .collect();

        let met = best_pct >= threshold_pct;
        let threshold = ThresholdCheck {
            value_pct: threshold_pct,
            met,
            note: (!met).then(|| LOW_CONFIDENCE_NOTE.to_string()),
        };

        Ok(Self {
            prediction,
            confidence_scores,
            top_k,
            threshold,
        })
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
