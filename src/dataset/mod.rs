mod folder;
mod split;

pub use folder::{ImageFolder, is_image, list_classes};
pub use split::{ClassSplit, SPLIT_NAMES, SplitConfig, SplitSummary, split_counts, split_dataset};
