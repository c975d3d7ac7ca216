pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod labels;
pub mod model;
pub mod preprocess;
pub mod scoring;
pub mod server;
pub mod telemetry;
pub mod training;

pub use config::AppConfig;
pub use error::ServiceError;
pub use model::{ImageClassifier, InferenceRuntime, PredictionResponse};
pub use server::build_router;
