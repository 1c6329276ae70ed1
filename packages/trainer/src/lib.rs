#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Offline training and data loading for the SIOB prediction model.
//!
//! The trainer reads every occurrence from the store, fits the category
//! model and writes the artifact the API server loads at startup. It also
//! imports raw occurrence documents exported from the source system.

use std::path::Path;

use siob_database::{DbError, OccurrenceStore};
use siob_model::{BoostingConfig, ModelError, TrainedArtifact};
use siob_occurrence_models::RawOccurrence;

/// Errors raised by trainer commands.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    /// Store error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Training or artifact error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be parsed.
    #[error("Invalid JSON document on line {line}: {source}")]
    Json {
        /// 1-based line of the document.
        line: usize,
        /// Parser error.
        source: serde_json::Error,
    },
}

/// Trains a model on every record in `store` and writes it to `out`.
///
/// Nothing is written when the store is empty.
///
/// # Errors
///
/// Returns [`ModelError::NoData`] (wrapped) if the store holds no records,
/// or any store, training or file error.
pub async fn train_from_store(
    store: &dyn OccurrenceStore,
    config: &BoostingConfig,
    out: &Path,
) -> Result<TrainedArtifact, TrainerError> {
    log::info!("Fetching records from {} store...", store.backend());
    let records = store.fetch_training_records().await?;

    if records.is_empty() {
        log::error!("No records found in the store; no model written");
        return Err(ModelError::NoData.into());
    }

    let artifact = siob_model::train(&records, config)?;
    artifact.save(out)?;

    Ok(artifact)
}

/// Parses raw occurrence documents from a JSON array or from
/// newline-delimited JSON (one document per line, blank lines skipped).
///
/// # Errors
///
/// Returns [`TrainerError::Json`] for the first document that does not
/// parse.
pub fn parse_documents(text: &str) -> Result<Vec<RawOccurrence>, TrainerError> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).map_err(|source| TrainerError::Json {
            line: source.line(),
            source,
        });
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| TrainerError::Json {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Loads the documents in `path` into `store`, returning how many were
/// written.
///
/// # Errors
///
/// Returns [`TrainerError`] if the file cannot be read or parsed, or the
/// insert fails.
pub async fn import_file(store: &dyn OccurrenceStore, path: &Path) -> Result<u64, TrainerError> {
    let text = tokio::fs::read_to_string(path).await?;
    let records = parse_documents(&text)?;

    log::info!(
        "Importing {} records from {} into {} store...",
        records.len(),
        path.display(),
        store.backend()
    );
    let inserted = store.insert_occurrences(&records).await?;
    log::info!("Imported {inserted} records");

    Ok(inserted)
}
