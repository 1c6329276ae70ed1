//! Offline training from raw occurrence records.

use siob_occurrence_models::{HourSource, RawOccurrence, extract_features};

use crate::artifact::TrainedArtifact;
use crate::gbdt::{BoostingConfig, GradientBoostedClassifier};
use crate::label::LabelEncoder;
use crate::pipeline::Pipeline;
use crate::preprocess::ModelInput;
use crate::{LabelCodec as _, ModelError};

/// Fits the full pipeline on `records`.
///
/// # Errors
///
/// Returns [`ModelError::NoData`] if `records` is empty, or any error the
/// classifier raises while fitting.
pub fn train(
    records: &[RawOccurrence],
    config: &BoostingConfig,
) -> Result<TrainedArtifact, ModelError> {
    if records.is_empty() {
        return Err(ModelError::NoData);
    }

    log::info!("Processing {} records...", records.len());

    let mut defaulted_hours = 0usize;
    let rows: Vec<_> = records
        .iter()
        .map(|record| {
            let (row, source) = extract_features(record);
            if source == HourSource::Defaulted {
                defaulted_hours += 1;
            }
            row
        })
        .collect();

    if defaulted_hours > 0 {
        log::warn!(
            "{defaulted_hours} of {} records had no usable dispatch time; hour defaulted",
            rows.len()
        );
    }

    let label_encoder = LabelEncoder::fit(rows.iter().map(|r| r.target.as_str()));
    let labels = label_encoder.transform(rows.iter().map(|r| r.target.as_str()))?;

    log::info!(
        "Training gradient-boosted classifier ({} rounds, depth {}) over {} classes...",
        config.n_rounds,
        config.max_depth,
        label_encoder.len()
    );

    let pipeline = Pipeline::fit(
        &rows,
        &labels,
        label_encoder.len(),
        GradientBoostedClassifier::new(*config),
    )?;

    let correct = rows
        .iter()
        .zip(&labels)
        .filter(|(row, label)| pipeline.predict(&ModelInput::from(*row)) == **label)
        .count();
    #[allow(clippy::cast_precision_loss)]
    let accuracy = correct as f64 / rows.len() as f64;

    log::info!("Detected classes: {:?}", label_encoder.classes());
    log::info!("Training accuracy: {:.2}%", accuracy * 100.0);

    Ok(TrainedArtifact::new(
        pipeline,
        label_encoder,
        records.len() as u64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LabelCodec;
    use siob_occurrence_models::DispatchTime;

    fn record(bairro: &str, time: &str, category: &str) -> RawOccurrence {
        RawOccurrence {
            bairro: Some(bairro.to_string()),
            municipio: Some("Recife".to_string()),
            data_hora_acionamento: Some(DispatchTime::Text(time.to_string())),
            tipo_natureza_ocorrencia: Some(category.to_string()),
        }
    }

    fn records() -> Vec<RawOccurrence> {
        let mut records = Vec::new();
        for _ in 0..10 {
            records.push(record("Boa Vista", "2024-03-05T02:00:00Z", "A"));
            records.push(record("Centro", "2024-03-05T14:00:00Z", "B"));
            records.push(record("Derby", "2024-03-05T20:00:00Z", "C"));
        }
        records
    }

    fn config() -> BoostingConfig {
        BoostingConfig {
            n_rounds: 15,
            ..BoostingConfig::default()
        }
    }

    #[test]
    fn empty_records_fail_with_no_data() {
        assert!(matches!(train(&[], &config()), Err(ModelError::NoData)));
    }

    #[test]
    fn trains_and_predicts_known_patterns() {
        let artifact = train(&records(), &config()).unwrap();

        assert_eq!(artifact.record_count, 30);
        assert_eq!(artifact.label_encoder.classes(), ["A", "B", "C"]);

        let prediction = artifact
            .predict(&ModelInput {
                bairro: Some("Centro".to_string()),
                municipio: Some("Recife".to_string()),
                hora: 14,
            })
            .unwrap();
        assert_eq!(prediction.label, "B");
        assert_eq!(prediction.probabilities.len(), 3);
        let total: f64 = prediction.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_categories_still_predict() {
        let artifact = train(&records(), &config()).unwrap();
        let prediction = artifact
            .predict(&ModelInput {
                bairro: Some("Atlantis".to_string()),
                municipio: Some("Nowhere".to_string()),
                hora: 20,
            })
            .unwrap();
        assert!(artifact.label_encoder.encode(&prediction.label).is_some());
    }

    #[test]
    fn missing_fields_fall_into_sentinel_classes() {
        let mut records = records();
        records.push(RawOccurrence::default());
        let artifact = train(&records, &config()).unwrap();
        assert_eq!(
            artifact.label_encoder.classes(),
            ["A", "B", "C", siob_occurrence_models::OTHER_CATEGORY]
        );
        assert!(
            artifact
                .pipeline
                .feature_names()
                .contains(&"bairro_NaoInformado".to_string())
        );
    }

    #[test]
    fn importances_name_encoded_columns() {
        let artifact = train(&records(), &config()).unwrap();
        let summary = artifact.feature_importance().unwrap();
        assert!(!summary.is_empty());
        let names = artifact.pipeline.feature_names();
        assert!(summary.iter().all(|s| names.contains(&s.feature)));
    }
}
