//! Preprocessor and classifier composed into one fitted unit.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use siob_occurrence_models::FeatureRow;

use crate::gbdt::GradientBoostedClassifier;
use crate::preprocess::{ModelInput, Preprocessor};
use crate::{Classifier, ModelError};

/// A fitted prediction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline<C = GradientBoostedClassifier> {
    preprocessor: Preprocessor,
    classifier: C,
}

impl<C: Classifier> Pipeline<C> {
    /// Fits the preprocessor on `rows`, then `classifier` on the encoded
    /// rows against `labels`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the classifier rejects the data.
    pub fn fit(
        rows: &[FeatureRow],
        labels: &[usize],
        n_classes: usize,
        mut classifier: C,
    ) -> Result<Self, ModelError> {
        let preprocessor = Preprocessor::fit(rows);
        let encoded = preprocessor.transform(rows);
        classifier.fit(encoded.view(), labels, n_classes)?;
        Ok(Self {
            preprocessor,
            classifier,
        })
    }

    /// Most likely class index.
    #[must_use]
    pub fn predict(&self, input: &ModelInput) -> usize {
        self.classifier
            .predict(self.preprocessor.transform_one(input).view())
    }

    /// Probability per class index.
    #[must_use]
    pub fn predict_proba(&self, input: &ModelInput) -> Array1<f64> {
        self.classifier
            .predict_proba(self.preprocessor.transform_one(input).view())
    }

    /// Classifier importances, one per encoded column.
    #[must_use]
    pub fn feature_importances(&self) -> Array1<f64> {
        self.classifier.feature_importances()
    }

    /// Names of the encoded columns, aligned with
    /// [`Self::feature_importances`].
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.preprocessor.feature_names_out()
    }

    /// The fitted preprocessor.
    #[must_use]
    pub const fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// The fitted classifier.
    #[must_use]
    pub const fn classifier(&self) -> &C {
        &self.classifier
    }
}
