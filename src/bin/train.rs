//! Fine-tunes the VGG16 classifier head on an image folder and writes the
//! checkpoint plus `classes.json` for the server.

use std::path::PathBuf;

use clap::Parser;

use fruit_quality_service::{
    config::parse_device,
    telemetry,
    training::{self, TrainConfig},
};

#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(version)]
#[command(about = "Fine-tune VGG16 on a class-per-directory image dataset")]
struct Cli {
    /// Dataset root with one sub-directory per class
    #[arg(long, env = "DATA_DIR", default_value = "clean_dataset")]
    data_dir: PathBuf,

    /// Optional held-out folder for the final report (defaults to the training set)
    #[arg(long, env = "EVAL_DIR")]
    eval_dir: Option<PathBuf>,

    /// Where the fine-tuned weights are written
    #[arg(long, env = "MODEL_PATH", default_value = "model/vgg16_fruit_model.safetensors")]
    model_path: PathBuf,

    /// Class list output (defaults to classes.json next to the model)
    #[arg(long, env = "CLASSES_JSON")]
    classes_path: Option<PathBuf>,

    /// ImageNet VGG16 weights used for the frozen feature extractor
    #[arg(long, env = "BACKBONE_WEIGHTS", default_value = "model/vgg16.safetensors")]
    backbone: PathBuf,

    #[arg(long, default_value_t = 10)]
    epochs: usize,

    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// cpu, cuda or cuda:N
    #[arg(long, env = "DEVICE", default_value = "cuda")]
    device: String,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let config = TrainConfig {
        data_dir: cli.data_dir,
        eval_dir: cli.eval_dir,
        model_path: cli.model_path,
        classes_path: cli.classes_path,
        backbone_path: Some(cli.backbone),
        epochs: cli.epochs,
        batch_size: cli.batch_size,
        learning_rate: cli.learning_rate,
        seed: cli.seed,
        device: parse_device(&cli.device),
        show_progress: !cli.quiet,
    };

    let report = training::train(&config)?;

    println!("\nClassification Report:");
    println!("{}", report.evaluation);
    println!(
        "Training time: {:.2}s, model saved to {}",
        report.elapsed_secs,
        report.model_path.display()
    );
    Ok(())
}
