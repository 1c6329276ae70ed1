//! Category label encoding.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{LabelCodec, ModelError};

/// Maps category labels to dense class indices.
///
/// Classes are sorted lexicographically, so fitting the same label set
/// always yields the same indices regardless of record order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fits an encoder over every distinct label in `labels`.
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let classes: BTreeSet<&str> = labels.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    /// Encodes every label.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::UnknownLabel`] for a label outside the fitted set.
    pub fn transform<'a>(
        &self,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<usize>, ModelError> {
        labels
            .into_iter()
            .map(|label| {
                self.encode(label).ok_or_else(|| ModelError::UnknownLabel {
                    label: label.to_string(),
                })
            })
            .collect()
    }

    /// Decodes every index.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Shape`] for an index outside the class range.
    pub fn inverse_transform(&self, indices: &[usize]) -> Result<Vec<String>, ModelError> {
        indices
            .iter()
            .map(|&i| {
                self.decode(i)
                    .map(str::to_string)
                    .ok_or_else(|| ModelError::Shape {
                        message: format!(
                            "class index {i} out of range for {} classes",
                            self.classes.len()
                        ),
                    })
            })
            .collect()
    }

    /// Number of known classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the encoder has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl LabelCodec for LabelEncoder {
    fn encode(&self, label: &str) -> Option<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .ok()
    }

    fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }
}
