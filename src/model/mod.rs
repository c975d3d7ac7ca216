pub mod checkpoint;
mod loader;
mod runtime;
mod types;
pub mod vgg;

pub use checkpoint::LoadReport;
pub use loader::{ImageClassifier, Vgg16Classifier};
pub use runtime::InferenceRuntime;
pub use types::{ImageSize, InputInfo, PredictionResponse, Timings};
