#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Occurrence record types and feature extraction.
//!
//! An occurrence is one dispatch entry in the record store. The trainer
//! turns every raw occurrence into exactly one [`FeatureRow`]; extraction
//! is best-effort and never fails, missing or malformed fields fall back
//! to the sentinel defaults below.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike as _, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sentinel used when `bairro` or `municipio` is absent.
pub const NOT_INFORMED: &str = "NaoInformado";

/// Sentinel used when `tipoNaturezaOcorrencia` is absent.
pub const OTHER_CATEGORY: &str = "OUTROS";

/// Hour assigned when the dispatch timestamp is absent or unparseable.
pub const DEFAULT_HOUR: u8 = 12;

/// Input columns consumed by the prediction pipeline, in encoding order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FeatureColumn {
    /// Neighborhood (categorical).
    Bairro,
    /// Municipality (categorical).
    Municipio,
    /// Hour of dispatch, 0-23 (numeric passthrough).
    Hora,
}

impl FeatureColumn {
    /// Columns that are one-hot encoded, in output order.
    #[must_use]
    pub const fn categorical() -> &'static [Self] {
        &[Self::Bairro, Self::Municipio]
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Bairro, Self::Municipio, Self::Hora]
    }
}

/// Dispatch timestamp as it appears in a stored document.
///
/// Documents written by the upstream service carry an ISO-8601 string,
/// documents written natively carry a timestamp value. Anything else is
/// kept as-is and treated as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DispatchTime {
    /// ISO-8601 text, e.g. `"2024-03-05T14:30:00Z"`.
    Text(String),
    /// Store-native timestamp. In JSON this is extended JSON `{"$date": ...}`.
    Native(#[serde(with = "extended_json_date")] DateTime<Utc>),
    /// Any other JSON shape.
    Unsupported(serde_json::Value),
}

mod extended_json_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct ExtendedDate {
        #[serde(rename = "$date")]
        date: DateTime<Utc>,
    }

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        ExtendedDate { date: *value }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        ExtendedDate::deserialize(deserializer).map(|x| x.date)
    }
}

/// A raw occurrence document as read from the record store.
///
/// Every field is optional; `null` is treated the same as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOccurrence {
    /// Neighborhood.
    pub bairro: Option<String>,
    /// Municipality.
    pub municipio: Option<String>,
    /// When the occurrence was dispatched.
    pub data_hora_acionamento: Option<DispatchTime>,
    /// Occurrence category label (the training target).
    pub tipo_natureza_ocorrencia: Option<String>,
}

/// Where a derived [`Hour`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HourSource {
    /// Read from the dispatch timestamp.
    Parsed,
    /// Timestamp absent or unparseable; [`DEFAULT_HOUR`] was used.
    Defaulted,
}

/// Hour-of-day derived from a dispatch timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hour {
    /// Hour in `0..=23`.
    pub value: u8,
    /// Whether the value was parsed or is the fallback.
    pub source: HourSource,
}

impl Hour {
    const fn parsed(value: u8) -> Self {
        Self {
            value,
            source: HourSource::Parsed,
        }
    }

    /// The fallback hour.
    #[must_use]
    pub const fn defaulted() -> Self {
        Self {
            value: DEFAULT_HOUR,
            source: HourSource::Defaulted,
        }
    }

    /// Returns `true` if this hour is the fallback rather than a parsed value.
    #[must_use]
    pub const fn is_default(self) -> bool {
        matches!(self.source, HourSource::Defaulted)
    }
}

/// Derives the hour of dispatch, falling back to [`DEFAULT_HOUR`].
#[must_use]
pub fn dispatch_hour(time: Option<&DispatchTime>) -> Hour {
    match time {
        Some(DispatchTime::Text(s)) => parse_iso_hour(s).map_or_else(Hour::defaulted, Hour::parsed),
        Some(DispatchTime::Native(dt)) => Hour::parsed(hour_of(dt.hour())),
        Some(DispatchTime::Unsupported(_)) | None => Hour::defaulted(),
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn hour_of(hour: u32) -> u8 {
    // chrono guarantees 0..=23
    hour as u8
}

/// Parses the hour out of an ISO-8601 string.
///
/// Accepts the extended (`2024-03-05T14:30`) and basic (`20240305T1430`)
/// forms, a space in place of `T`, reduced precision down to the hour
/// (`2024-03-05T14`), and offsets with or without a colon. A trailing `Z`
/// is stripped first. Offsets are not applied: the hour is taken as
/// written. A bare date yields hour 0.
#[must_use]
pub fn parse_iso_hour(s: &str) -> Option<u8> {
    let s = s.trim();
    let s = s.strip_suffix(['Z', 'z']).unwrap_or(s);
    if s.is_empty() {
        return None;
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M:%S%.f%#z",
        "%Y-%m-%dT%H:%M:%S%#z",
        "%Y-%m-%dT%H:%M%:z",
        "%Y-%m-%d %H:%M:%S%.f%:z",
        "%Y-%m-%d %H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S%#z",
        "%Y%m%dT%H%M%S%.f%#z",
        "%Y%m%dT%H%M%S%#z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(hour_of(dt.hour()));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y%m%dT%H%M%S%.f",
        "%Y%m%dT%H%M%S",
        "%Y%m%dT%H%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(hour_of(naive.hour()));
        }
    }

    if let Some(hour) = parse_hour_only(s) {
        return Some(hour);
    }

    parse_date(s).map(|_| 0)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .ok()
}

/// `YYYY-MM-DDTHH`, which `chrono` cannot express without minutes.
fn parse_hour_only(s: &str) -> Option<u8> {
    let (date, hour) = s.split_once(['T', ' '])?;
    if hour.len() != 2 || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    parse_date(date)?;
    hour.parse::<u8>().ok().filter(|h| *h <= 23)
}

/// One training/prediction row. All fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Neighborhood, or [`NOT_INFORMED`].
    pub bairro: String,
    /// Municipality, or [`NOT_INFORMED`].
    pub municipio: String,
    /// Hour of dispatch.
    pub hora: u8,
    /// Occurrence category, or [`OTHER_CATEGORY`].
    pub target: String,
}

impl FeatureRow {
    /// Returns the value of a categorical column.
    ///
    /// Returns `None` for [`FeatureColumn::Hora`].
    #[must_use]
    pub fn categorical(&self, column: FeatureColumn) -> Option<&str> {
        match column {
            FeatureColumn::Bairro => Some(&self.bairro),
            FeatureColumn::Municipio => Some(&self.municipio),
            FeatureColumn::Hora => None,
        }
    }
}

/// Extracts a feature row and reports where its hour came from.
#[must_use]
pub fn extract_features(record: &RawOccurrence) -> (FeatureRow, HourSource) {
    let hour = dispatch_hour(record.data_hora_acionamento.as_ref());

    let row = FeatureRow {
        bairro: record
            .bairro
            .clone()
            .unwrap_or_else(|| NOT_INFORMED.to_string()),
        municipio: record
            .municipio
            .clone()
            .unwrap_or_else(|| NOT_INFORMED.to_string()),
        hora: hour.value,
        target: record
            .tipo_natureza_ocorrencia
            .clone()
            .unwrap_or_else(|| OTHER_CATEGORY.to_string()),
    };

    (row, hour.source)
}

impl From<&RawOccurrence> for FeatureRow {
    fn from(record: &RawOccurrence) -> Self {
        extract_features(record).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn with_time(time: Option<DispatchTime>) -> RawOccurrence {
        RawOccurrence {
            bairro: Some("Boa Vista".to_string()),
            municipio: Some("Recife".to_string()),
            data_hora_acionamento: time,
            tipo_natureza_ocorrencia: Some("INCENDIO".to_string()),
        }
    }

    #[test]
    fn missing_timestamp_defaults_to_noon() {
        let (row, source) = extract_features(&with_time(None));
        assert_eq!(row.hora, 12);
        assert_eq!(source, HourSource::Defaulted);
    }

    #[test]
    fn iso_string_with_utc_marker() {
        let record = with_time(Some(DispatchTime::Text("2024-03-05T14:30:00Z".to_string())));
        let (row, source) = extract_features(&record);
        assert_eq!(row.hora, 14);
        assert_eq!(source, HourSource::Parsed);
    }

    #[test]
    fn malformed_timestamp_falls_back() {
        for raw in ["not-a-date", "", "2024-13-45T99:00:00", "14:30"] {
            let hour = dispatch_hour(Some(&DispatchTime::Text(raw.to_string())));
            assert_eq!(hour, Hour::defaulted(), "input {raw:?}");
        }
    }

    #[test]
    fn parses_iso_variants() {
        assert_eq!(parse_iso_hour("2024-03-05T08:15:00.123"), Some(8));
        assert_eq!(parse_iso_hour("2024-03-05T23:59"), Some(23));
        assert_eq!(parse_iso_hour("2024-03-05 07:00:00"), Some(7));
        assert_eq!(parse_iso_hour("2024-03-05T21:00:00-03:00"), Some(21));
        assert_eq!(parse_iso_hour("2024-03-05"), Some(0));
    }

    #[test]
    fn parses_reduced_and_basic_iso_forms() {
        assert_eq!(parse_iso_hour("2024-03-05T14"), Some(14));
        assert_eq!(parse_iso_hour("2024-03-05 06"), Some(6));
        assert_eq!(parse_iso_hour("20240305T143000"), Some(14));
        assert_eq!(parse_iso_hour("20240305T1430Z"), Some(14));
        assert_eq!(parse_iso_hour("20240305T143000-0300"), Some(14));
        assert_eq!(parse_iso_hour("2024-03-05T21:00:00-0300"), Some(21));
        assert_eq!(parse_iso_hour("2024-03-05T21:00+01:00"), Some(21));
        assert_eq!(parse_iso_hour("20240305"), Some(0));
        assert_eq!(parse_iso_hour("2024-03-05T24"), None);
        assert_eq!(parse_iso_hour("2024-03-05T7"), None);
    }

    #[test]
    fn native_timestamp_hour() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 5, 9, 45, 0).unwrap();
        let hour = dispatch_hour(Some(&DispatchTime::Native(dt)));
        assert_eq!(hour.value, 9);
        assert!(!hour.is_default());
    }

    #[test]
    fn unsupported_timestamp_falls_back() {
        let hour = dispatch_hour(Some(&DispatchTime::Unsupported(serde_json::json!(17))));
        assert!(hour.is_default());
    }

    #[test]
    fn missing_fields_use_sentinels() {
        let row = FeatureRow::from(&RawOccurrence::default());
        assert_eq!(row.bairro, NOT_INFORMED);
        assert_eq!(row.municipio, NOT_INFORMED);
        assert_eq!(row.target, OTHER_CATEGORY);
        assert_eq!(row.hora, DEFAULT_HOUR);
    }

    #[test]
    fn deserializes_documents() {
        let docs: Vec<RawOccurrence> = serde_json::from_str(
            r#"[
                {"bairro": "Centro", "dataHoraAcionamento": "2024-03-05T14:30:00Z", "extra": 1},
                {"municipio": "Olinda", "dataHoraAcionamento": {"$date": "2024-03-05T06:00:00Z"}},
                {"bairro": null, "dataHoraAcionamento": 1709647200000}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            docs[0].data_hora_acionamento,
            Some(DispatchTime::Text("2024-03-05T14:30:00Z".to_string()))
        );
        assert_eq!(dispatch_hour(docs[1].data_hora_acionamento.as_ref()).value, 6);
        assert!(matches!(
            docs[2].data_hora_acionamento,
            Some(DispatchTime::Unsupported(_))
        ));
        assert_eq!(FeatureRow::from(&docs[2]).bairro, NOT_INFORMED);
    }

    #[test]
    fn feature_column_names() {
        assert_eq!(FeatureColumn::Bairro.as_ref(), "bairro");
        assert_eq!(FeatureColumn::Hora.to_string(), "hora");
        assert_eq!("municipio".parse::<FeatureColumn>().unwrap(), FeatureColumn::Municipio);
    }
}
