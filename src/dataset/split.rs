//! Train/val/test splitting of a `root/<class>/<image>` tree.
//!
//! Each class is shuffled independently with a seeded RNG, so the same input
//! and seed always produce the same split. Files are copied, never moved.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use indicatif::{ProgressBar, ProgressStyle};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::info;

use crate::{dataset::folder::list_classes, error::ServiceError};

pub const SPLIT_NAMES: [&str; 3] = ["train", "val", "test"];

#[derive(Debug, Clone, Serialize)]
pub struct SplitConfig {
    pub train_ratio: f64,
    pub val_ratio: f64,
    /// Informational: test receives whatever train and val leave over.
    pub test_ratio: f64,
    pub seed: u64,
    pub show_progress: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            val_ratio: 0.15,
            test_ratio: 0.15,
            seed: 42,
            show_progress: true,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<(), ServiceError> {
        for (name, value) in [
            ("train", self.train_ratio),
            ("val", self.val_ratio),
            ("test", self.test_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ServiceError::BadRequest(format!(
                    "{name} ratio must be between 0.0 and 1.0, got {value}"
                )));
            }
        }
        if self.train_ratio + self.val_ratio > 1.0 + f64::EPSILON {
            return Err(ServiceError::BadRequest(
                "train + val ratios must not exceed 1.0".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ClassSplit {
    pub class_name: String,
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl ClassSplit {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SplitSummary {
    pub output_dir: PathBuf,
    pub classes: Vec<ClassSplit>,
}

impl SplitSummary {
    pub fn total(&self) -> usize {
        self.classes.iter().map(ClassSplit::total).sum()
    }
}

/// Number of train and val items for a class of `n` files.
pub fn split_counts(n: usize, train_ratio: f64, val_ratio: f64) -> (usize, usize) {
    let n_train = (train_ratio * n as f64).floor() as usize;
    let n_val = ((val_ratio * n as f64).floor() as usize).min(n - n_train.min(n));
    (n_train.min(n), n_val)
}

pub fn split_dataset(
    input_dir: &Path,
    output_dir: &Path,
    config: &SplitConfig,
) -> Result<SplitSummary, ServiceError> {
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut classes = Vec::new();

    for class in list_classes(input_dir)? {
        let class_dir = input_dir.join(&class);
        let mut files: Vec<OsString> = Vec::new();
        for entry in fs::read_dir(&class_dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                files.push(entry.file_name());
            }
        }
        files.sort();
        files.shuffle(&mut rng);

        let (n_train, n_val) = split_counts(files.len(), config.train_ratio, config.val_ratio);
        let (train, rest) = files.split_at(n_train);
        let (val, test) = rest.split_at(n_val);

        for (split_name, names) in SPLIT_NAMES.iter().zip([train, val, test]) {
            let dest_dir = output_dir.join(split_name).join(&class);
            fs::create_dir_all(&dest_dir)?;

            let pb = progress_bar(names.len(), &format!("{split_name}/{class}"), config.show_progress);
            for name in names {
                fs::copy(class_dir.join(name), dest_dir.join(name))?;
                pb.inc(1);
            }
            pb.finish_and_clear();
        }

        info!(
            class = %class,
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "class split"
        );
        classes.push(ClassSplit {
            class_name: class,
            train: train.len(),
            val: val.len(),
            test: test.len(),
        });
    }

    if classes.is_empty() {
        return Err(ServiceError::Dataset(format!(
            "no class directories under {}",
            input_dir.display()
        )));
    }

    Ok(SplitSummary {
        output_dir: output_dir.to_path_buf(),
        classes,
    })
}

fn progress_bar(len: usize, label: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg:>20} {bar:40.cyan/blue} {pos}/{len}") {
        pb.set_style(style);
    }
    pb.set_message(label.to_string());
    pb
}
