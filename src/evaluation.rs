use std::fmt;

use serde::Serialize;

use crate::error::ServiceError;

#[derive(Debug, Clone, Serialize)]
pub struct ClassMetrics {
    pub class_name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Per-class precision/recall/F1 with accuracy and macro/weighted averages.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
    pub total: usize,
}

impl ClassificationReport {
    pub fn from_predictions(
        y_true: &[i64],
        y_pred: &[i64],
        class_names: &[String],
    ) -> Result<Self, ServiceError> {
        if y_true.len() != y_pred.len() {
            return Err(ServiceError::BadRequest(format!(
                "{} labels but {} predictions",
                y_true.len(),
                y_pred.len()
            )));
        }
        let n = class_names.len();
        let in_range = |v: i64| v >= 0 && (v as usize) < n;
        if let Some(bad) = y_true.iter().chain(y_pred).find(|&&v| !in_range(v)) {
            return Err(ServiceError::BadRequest(format!(
                "class index {bad} outside 0..{n}"
            )));
        }

        let mut true_pos = vec![0usize; n];
        let mut predicted = vec![0usize; n];
        let mut support = vec![0usize; n];
        for (&t, &p) in y_true.iter().zip(y_pred) {
            support[t as usize] += 1;
            predicted[p as usize] += 1;
            if t == p {
                true_pos[t as usize] += 1;
            }
        }

        let classes: Vec<ClassMetrics> = class_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let precision = ratio(true_pos[i], predicted[i]);
                let recall = ratio(true_pos[i], support[i]);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    class_name: name.clone(),
                    precision,
                    recall,
                    f1,
                    support: support[i],
                }
            })
            .collect();

        let total = y_true.len();
        let accuracy = ratio(true_pos.iter().sum(), total);

        let macro_avg = AverageMetrics {
            precision: mean(classes.iter().map(|c| c.precision)),
            recall: mean(classes.iter().map(|c| c.recall)),
            f1: mean(classes.iter().map(|c| c.f1)),
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
            }
        };
        let weighted_avg = AverageMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
        };

        Ok(Self {
            classes,
            accuracy,
            macro_avg,
            weighted_avg,
            total,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.class_name.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.class_name, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                label, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut acc = 0.0;
    for value in values {
        count += 1;
        acc += value;
    }
    if count == 0 { 0.0 } else { acc / count as f64 }
}
