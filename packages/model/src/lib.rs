#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Occurrence category classifier.
//!
//! The trained model is a [`Pipeline`]: a one-hot [`Preprocessor`] over
//! `bairro` and `municipio` with `hora` passed through, feeding a
//! multiclass [`GradientBoostedClassifier`]. The pipeline is persisted
//! together with its [`LabelEncoder`] as a single [`TrainedArtifact`],
//! since decoding a prediction needs the exact label ordering used during
//! training.
//!
//! The classifier and label mapping are reached through the [`Classifier`]
//! and [`LabelCodec`] traits so the inference code does not depend on a
//! specific implementation.

pub mod artifact;
pub mod gbdt;
pub mod inference;
pub mod label;
pub mod pipeline;
pub mod preprocess;
pub mod train;
mod tree;

pub use artifact::{ARTIFACT_VERSION, TrainedArtifact};
pub use gbdt::{BoostingConfig, GradientBoostedClassifier};
pub use inference::{FeatureScore, Prediction};
pub use label::LabelEncoder;
pub use pipeline::Pipeline;
pub use preprocess::{ModelInput, Preprocessor};
pub use train::train;

use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;

/// Errors that can occur while training, persisting or querying a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The record store returned nothing to train on.
    #[error("No occurrence records found to train on")]
    NoData,

    /// Prediction input could not be interpreted.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of what went wrong.
        message: String,
    },

    /// A label that the encoder was never fitted on.
    #[error("Unknown label: {label}")]
    UnknownLabel {
        /// The offending label.
        label: String,
    },

    /// Model components disagree on dimensions.
    #[error("Shape mismatch: {message}")]
    Shape {
        /// Description of what went wrong.
        message: String,
    },

    /// Artifact file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact serialization failed.
    #[error("Artifact encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Artifact deserialization failed.
    #[error("Artifact decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The artifact was written by an incompatible format version.
    #[error("Unsupported artifact version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },
}

/// A multiclass classifier over encoded rows.
pub trait Classifier {
    /// Fits the classifier to `x` against class indices `y` in
    /// `0..n_classes`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if `x` and `y` disagree in length or a label
    /// is out of range.
    fn fit(
        &mut self,
        x: ArrayView2<'_, f64>,
        y: &[usize],
        n_classes: usize,
    ) -> Result<(), ModelError>;

    /// Returns the most likely class index for `row`.
    fn predict(&self, row: ArrayView1<'_, f64>) -> usize {
        argmax(self.predict_proba(row).view())
    }

    /// Returns one probability per class index, summing to 1.
    fn predict_proba(&self, row: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Returns one importance per encoded column.
    fn feature_importances(&self) -> Array1<f64>;
}

/// Bidirectional mapping between class indices and category labels.
pub trait LabelCodec {
    /// Returns the index of `label`, if known.
    fn encode(&self, label: &str) -> Option<usize>;

    /// Returns the label at `index`, if in range.
    fn decode(&self, index: usize) -> Option<&str>;

    /// All known labels, in index order.
    fn classes(&self) -> &[String];
}

/// Index of the largest value. Ties resolve to the lowest index.
#[must_use]
pub fn argmax(values: ArrayView1<'_, f64>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_v), (i, &v)| {
            if v > best_v { (i, v) } else { (best, best_v) }
        })
        .0
}
