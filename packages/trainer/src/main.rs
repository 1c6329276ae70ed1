#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the SIOB model trainer.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use siob_database::{db, paths};
use siob_model::{BoostingConfig, LabelCodec as _, TrainedArtifact};

#[derive(Parser)]
#[command(name = "siob_trainer", about = "SIOB occurrence model trainer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the category model on every record in the store
    Train {
        /// Where to write the artifact (defaults to `MODEL_PATH` or
        /// `data/model.msgpack`)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Number of boosting rounds
        #[arg(long)]
        rounds: Option<usize>,
        /// Shrinkage applied to every tree
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Maximum tree depth
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Load raw occurrence documents (JSON array or one per line) into the store
    Import {
        /// Path of the document file
        file: PathBuf,
    },
    /// Print the category labels of an existing artifact
    Classes {
        /// Artifact to inspect (defaults to `MODEL_PATH` or
        /// `data/model.msgpack`)
        #[arg(long)]
        model: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            out,
            rounds,
            learning_rate,
            max_depth,
        } => {
            let defaults = BoostingConfig::default();
            let config = BoostingConfig {
                n_rounds: rounds.unwrap_or(defaults.n_rounds),
                learning_rate: learning_rate.unwrap_or(defaults.learning_rate),
                max_depth: max_depth.unwrap_or(defaults.max_depth),
                ..defaults
            };
            let out = out.unwrap_or_else(paths::model_path_from_env);

            let store = db::connect_from_env().await?;
            let start = Instant::now();
            let artifact = siob_trainer::train_from_store(store.as_ref(), &config, &out).await?;

            log::info!(
                "Training complete: {} records, {} classes in {:.1}s",
                artifact.record_count,
                artifact.label_encoder.len(),
                start.elapsed().as_secs_f64()
            );
        }
        Commands::Import { file } => {
            let store = db::connect_from_env().await?;
            siob_trainer::import_file(store.as_ref(), &file).await?;
        }
        Commands::Classes { model } => {
            let path = model.unwrap_or_else(paths::model_path_from_env);
            let artifact = TrainedArtifact::load(&path)?;
            for class in artifact.label_encoder.classes() {
                println!("{class}");
            }
        }
    }

    Ok(())
}
