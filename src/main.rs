//! SVHN digit classifier CLI
//!
//! Fetches the Street View House Numbers data and either pulls pretrained
//! MLP/CNN bundles or trains both models locally.

use std::io::Write;

use clap::{Parser, Subcommand};
use svhn::{Config, Result};

#[derive(Parser)]
#[command(name = "svhn")]
#[command(about = "Street View House Numbers digit classification", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the test set and the pretrained models with their training logs
    Remote,
    /// Download the datasets and train the MLP and CNN classifiers
    Local,
    /// Initialize a new project with default config
    Init,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} : {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.args()
            )
        })
        .init();

    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                log::error!("Error loading config: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match cli.command {
        Commands::Remote => commands::remote(&config),
        Commands::Local => commands::local(&config),
        Commands::Init => commands::init(&cli.config, &config),
    };

    if let Err(e) = result {
        log::error!("Error: {}", e);
        std::process::exit(1);
    }
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use svhn::data::DataFetcher;
    use svhn::pipeline;
    use svhn::SvhnError;

    type Backend = Autodiff<NdArray<f32>>;

    pub fn init(config_path: &str, config: &Config) -> Result<()> {
        Config::default().save(config_path)?;
        println!("Created default config at {}", config_path);

        let work_dir = &config.data.work_dir;
        std::fs::create_dir_all(work_dir).map_err(SvhnError::file_system(work_dir))?;
        println!("Created work directory {}", work_dir.display());

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'svhn remote' to fetch the pretrained models");
        println!("  3. Run 'svhn local' to train both models yourself");

        Ok(())
    }

    pub fn remote(config: &Config) -> Result<()> {
        let fetcher = DataFetcher::http(&config.fetch)?;
        pipeline::run_remote(config, &fetcher)?;
        log::info!(
            "Pretrained models ready under {}",
            config.data.work_dir.display()
        );
        Ok(())
    }

    pub fn local(config: &Config) -> Result<()> {
        let fetcher = DataFetcher::http(&config.fetch)?;
        let artifacts = pipeline::run_local::<Backend, _>(config, &fetcher, Default::default())?;

        println!("\n{:<6} {:>8} {:>12} {:>12}", "Model", "Epochs", "Val Acc", "Test Acc");
        for artifact in &artifacts {
            let test_acc = artifact
                .test_metrics
                .as_ref()
                .map(|m| format!("{:.2}%", m.accuracy() * 100.0))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<6} {:>8} {:>11.2}% {:>12}",
                artifact.architecture.to_string(),
                artifact.epochs_run(),
                artifact.best_val_accuracy * 100.0,
                test_acc
            );
        }
        Ok(())
    }
}
