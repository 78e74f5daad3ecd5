//! Geocoding result containers

use domain::ResultData;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::GeocoderError;

/// Result of a single geocode or reverse call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    /// Normalized places, in provider order
    pub data: Vec<ResultData>,

    /// Untransformed provider payload
    pub raw: Value,
}

impl GeocodeResult {
    /// Create a result
    #[must_use]
    pub const fn new(data: Vec<ResultData>, raw: Value) -> Self {
        Self { data, raw }
    }

    /// Check if the provider returned any place
    #[must_use]
    pub fn has_results(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Outcome of one query inside a batch
#[derive(Debug, Serialize)]
pub struct BatchItem {
    /// Error for this query, if it failed
    #[serde(
        serialize_with = "serialize_error",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<GeocoderError>,

    /// Places found for this query (empty on error)
    pub data: Vec<ResultData>,
}

impl BatchItem {
    /// Successful slot
    #[must_use]
    pub const fn ok(data: Vec<ResultData>) -> Self {
        Self { error: None, data }
    }

    /// Failed slot
    #[must_use]
    pub const fn failed(error: GeocoderError) -> Self {
        Self {
            error: Some(error),
            data: Vec::new(),
        }
    }

    /// Check if this slot succeeded
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`
    pub fn into_result(self) -> Result<Vec<ResultData>, GeocoderError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl From<Result<GeocodeResult, GeocoderError>> for BatchItem {
    fn from(outcome: Result<GeocodeResult, GeocoderError>) -> Self {
        match outcome {
            Ok(result) => Self::ok(result.data),
            Err(error) => Self::failed(error),
        }
    }
}

/// Result of a batch call, one slot per input query in input order
#[derive(Debug, Serialize)]
pub struct BatchResult {
    /// Per-query outcomes
    pub data: Vec<BatchItem>,

    /// Untransformed provider payload(s)
    pub raw: Value,
}

impl BatchResult {
    /// Create a batch result
    #[must_use]
    pub const fn new(data: Vec<BatchItem>, raw: Value) -> Self {
        Self { data, raw }
    }

    /// Number of failed slots
    #[must_use]
    pub fn failures(&self) -> usize {
        self.data.iter().filter(|item| !item.is_ok()).count()
    }
}

#[allow(clippy::ref_option)] // serde passes the field by reference
fn serialize_error<S>(error: &Option<GeocoderError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match error {
        Some(error) => serializer.serialize_str(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderKind;

    #[test]
    fn test_geocode_result_has_results() {
        let empty = GeocodeResult::new(vec![], Value::Null);
        assert!(!empty.has_results());

        let full = GeocodeResult::new(vec![ResultData::new(1.0, 2.0)], Value::Null);
        assert!(full.has_results());
    }

    #[test]
    fn test_batch_item_from_outcome() {
        let ok = BatchItem::from(Ok(GeocodeResult::new(
            vec![ResultData::new(1.0, 2.0)],
            Value::Null,
        )));
        assert!(ok.is_ok());
        assert_eq!(ok.data.len(), 1);

        let failed = BatchItem::from(Err(GeocoderError::unsupported(
            ProviderKind::Google,
            "geocoding IPv4",
        )));
        assert!(!failed.is_ok());
        assert!(failed.data.is_empty());
        assert!(failed.into_result().is_err());
    }

    #[test]
    fn test_batch_result_counts_failures() {
        let batch = BatchResult::new(
            vec![
                BatchItem::ok(vec![]),
                BatchItem::failed(GeocoderError::UnknownProvider("x".to_string())),
            ],
            Value::Null,
        );
        assert_eq!(batch.failures(), 1);
    }

    #[test]
    fn test_batch_item_serializes_error_as_message() {
        let item = BatchItem::failed(GeocoderError::unsupported(
            ProviderKind::Here,
            "geocoding IPv6",
        ));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["error"], "Here does not support geocoding IPv6");
        assert_eq!(json["data"], serde_json::json!([]));

        let json = serde_json::to_value(BatchItem::ok(vec![])).unwrap();
        assert!(json.get("error").is_none());
    }
}
