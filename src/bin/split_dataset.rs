use std::path::PathBuf;

use clap::Parser;

use fruit_quality_service::{
    dataset::{SplitConfig, split_dataset},
    telemetry,
};

/// Copy a class-per-directory dataset into train/val/test splits
#[derive(Parser, Debug)]
#[command(name = "split_dataset")]
#[command(version)]
struct Cli {
    /// Source root containing one directory per class
    #[arg(default_value = "dataset")]
    input_dir: PathBuf,

    /// Destination root; receives train/, val/ and test/
    #[arg(default_value = "dataset_split")]
    output_dir: PathBuf,

    #[arg(long, default_value_t = 0.7)]
    train_ratio: f64,

    #[arg(long, default_value_t = 0.15)]
    val_ratio: f64,

    #[arg(long, default_value_t = 0.15)]
    test_ratio: f64,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Hide progress bars
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let config = SplitConfig {
        train_ratio: cli.train_ratio,
        val_ratio: cli.val_ratio,
        test_ratio: cli.test_ratio,
        seed: cli.seed,
        show_progress: !cli.quiet,
    };
    let summary = split_dataset(&cli.input_dir, &cli.output_dir, &config)?;

    for class in &summary.classes {
        println!(
            "{:<20} train {:>5}  val {:>5}  test {:>5}",
            class.class_name, class.train, class.val, class.test
        );
    }
    println!(
        "{} files copied into {}",
        summary.total(),
        summary.output_dir.display()
    );
    Ok(())
}
