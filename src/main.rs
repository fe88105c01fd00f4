//! CNN Classifier CLI
//!
//! Runs the pipeline stages individually or end to end.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use cnn_classifier::backend::backend_name;
use cnn_classifier::config::{ConfigurationManager, CONFIG_FILE_PATH, PARAMS_FILE_PATH};
use cnn_classifier::stages;
use cnn_classifier::utils::logging::{init_logging, LogConfig};
use cnn_classifier::VERSION;

/// Transfer-learning image classification pipeline
#[derive(Parser, Debug)]
#[command(name = "cnn-classifier")]
#[command(version)]
#[command(about = "Transfer-learning image classification pipeline with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Run configuration file
    #[arg(long, default_value = CONFIG_FILE_PATH)]
    config: PathBuf,

    /// Hyperparameter file
    #[arg(long, default_value = PARAMS_FILE_PATH)]
    params: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download the dataset archive and extract its images
    Ingest,

    /// Build the backbone and adapt it to the target classes
    Prepare,

    /// Fine-tune the adapted model
    Train,

    /// Score the trained model and write the score file
    Evaluate,

    /// Run every stage in order
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    if let Err(e) = run(&cli) {
        error!("{}", e);
        println!("{} {}", "Error:".red().bold(), e);
        return Err(e.into());
    }
    Ok(())
}

fn run(cli: &Cli) -> cnn_classifier::Result<()> {
    info!("Backend: {}", backend_name());
    let manager = ConfigurationManager::new(&cli.config, &cli.params)?;

    match cli.command {
        Commands::Ingest => {
            let summary = stages::run_data_ingestion(&manager)?;
            println!(
                "{} {} extracted, {} already present, {} skipped",
                "Ingestion:".green().bold(),
                summary.extracted,
                summary.already_present,
                summary.filtered
            );
        }
        Commands::Prepare => {
            stages::run_prepare_base_model(&manager)?;
            println!("{}", "Base model prepared".green().bold());
        }
        Commands::Train => {
            let history = stages::run_training(&manager)?;
            if let Some(last) = history.last() {
                println!(
                    "{} loss {:.4}, accuracy {:.4}",
                    "Training complete:".green().bold(),
                    last.loss,
                    last.accuracy
                );
            }
        }
        Commands::Evaluate => print_score(&stages::run_evaluation(&manager)?),
        Commands::Run => print_score(&stages::run_pipeline(&manager)?),
    }
    Ok(())
}

fn print_score(score: &stages::Score) {
    println!(
        "{} loss {:.4}, accuracy {:.4}",
        "Evaluation:".green().bold(),
        score.loss,
        score.accuracy
    );
}

fn print_banner() {
    println!(
        "{}",
        format!(
            r#"
 ╔══════════════════════════════════════════════════════╗
 ║   CNN Classifier v{:<35}║
 ║   Transfer-learning image classification with Burn   ║
 ╚══════════════════════════════════════════════════════╝
  "#,
            VERSION
        )
        .green()
    );
}
