//! SmartyStreets US Street Address API
//!
//! Address validation with geocoding on top; no reverse geocoding. Batches
//! are posted as JSON arrays of at most 100 lookups, candidates come back
//! tagged with the index of the input they belong to.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{chunked_raw, decode};
use crate::provider::{non_empty, require_address, require_secret, require_value, truncate};
use crate::{
    BatchItem, BatchResult, GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params,
    ProviderKind,
};

const KIND: ProviderKind = ProviderKind::Smartystreets;

/// Upper bound the API accepts for `candidates`
const MAX_CANDIDATES: u32 = 10;

/// Most lookups the API accepts in one POST
const MAX_BATCH_LOOKUPS: usize = 100;

/// SmartyStreets response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Candidate {
        #[serde(default)]
        pub input_index: usize,
        pub delivery_line_1: Option<String>,
        pub last_line: Option<String>,
        #[serde(default)]
        pub components: Components,
        pub metadata: Metadata,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Components {
        pub primary_number: Option<String>,
        pub street_predirection: Option<String>,
        pub street_name: Option<String>,
        pub street_suffix: Option<String>,
        pub street_postdirection: Option<String>,
        pub city_name: Option<String>,
        pub state_abbreviation: Option<String>,
        pub zipcode: Option<String>,
        pub plus4_code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Metadata {
        pub latitude: f64,
        pub longitude: f64,
        pub county_name: Option<String>,
        pub precision: Option<String>,
    }
}

/// Configuration for [`SmartyStreetsProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmartyStreetsConfig {
    /// Secret key pair id
    pub auth_id: String,

    /// Secret key pair token
    #[serde(skip_serializing)]
    pub auth_token: SecretString,

    /// Street address endpoint
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "https://us-street.api.smartystreets.com/street-address".to_string()
}

impl SmartyStreetsConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(auth_id: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            auth_id: auth_id.into(),
            auth_token: SecretString::from(auth_token.into()),
            url: default_url(),
        }
    }
}

/// SmartyStreets geocoder
pub struct SmartyStreetsProvider {
    http: Arc<dyn HttpAdapter>,
    auth_id: String,
    auth_token: SecretString,
    url: String,
}

impl fmt::Debug for SmartyStreetsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmartyStreetsProvider")
            .field("auth_id", &self.auth_id)
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl SmartyStreetsProvider {
    /// Create a new SmartyStreets provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the auth id or token is blank.
    pub fn new(
        config: &SmartyStreetsConfig,
        http: Arc<dyn HttpAdapter>,
    ) -> Result<Self, GeocoderError> {
        require_value(KIND, &config.auth_id, "an auth_id")?;
        require_secret(KIND, &config.auth_token, "an auth_token")?;

        Ok(Self {
            http,
            auth_id: config.auth_id.clone(),
            auth_token: config.auth_token.clone(),
            url: config.url.clone(),
        })
    }

    fn auth_params(&self) -> Params {
        Params::new()
            .with("auth-id", &self.auth_id)
            .with("auth-token", self.auth_token.expose_secret())
    }
}

fn candidates(limit: Option<u32>) -> u32 {
    limit.map_or(1, |l| l.clamp(1, MAX_CANDIDATES))
}

fn map_candidate(candidate: api::Candidate) -> ResultData {
    let components = candidate.components;
    let street = [
        components.street_predirection,
        components.street_name,
        components.street_suffix,
        components.street_postdirection,
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect::<Vec<_>>()
    .join(" ");

    let formatted = [candidate.delivery_line_1, candidate.last_line]
        .into_iter()
        .filter_map(non_empty)
        .collect::<Vec<_>>()
        .join(", ");

    ResultData {
        formatted_address: Some(formatted).filter(|f| !f.is_empty()),
        country: Some("United States".to_string()),
        country_code: Some("US".to_string()),
        state_code: non_empty(components.state_abbreviation),
        city: non_empty(components.city_name),
        zipcode: non_empty(components.zipcode),
        street_name: Some(street).filter(|s| !s.is_empty()),
        street_number: non_empty(components.primary_number),
        ..ResultData::new(candidate.metadata.latitude, candidate.metadata.longitude)
    }
    .with_extra("plus4", non_empty(components.plus4_code))
    .with_extra("county", non_empty(candidate.metadata.county_name))
    .with_extra("precision", candidate.metadata.precision)
}

#[async_trait]
impl GeocodeProvider for SmartyStreetsProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "smartystreets"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = self
            .auth_params()
            .with("street", &query.text)
            .with("candidates", candidates(query.limit));

        debug!(url = %self.url, "Sending SmartyStreets request");
        let raw = self.http.get(&self.url, &params).await?;
        let found: Vec<api::Candidate> = decode(KIND, &raw)?;

        let data = found.into_iter().map(map_candidate).collect();
        Ok(GeocodeResult::new(truncate(data, query.limit), raw))
    }

    async fn reverse(&self, _query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        Err(GeocoderError::unsupported(KIND, "reverse geocoding"))
    }

    #[instrument(skip(self, queries), fields(provider = "smartystreets", queries = queries.len()))]
    async fn batch_geocode(&self, queries: &[GeocodeQuery]) -> Result<BatchResult, GeocoderError> {
        // Position in the lookup list, or the validation error kept for the slot
        let mut slots: Vec<Result<usize, GeocoderError>> = Vec::with_capacity(queries.len());
        let mut lookups = Vec::new();
        for query in queries {
            match require_address(KIND, query) {
                Ok(()) => {
                    slots.push(Ok(lookups.len()));
                    lookups.push(json!({
                        "street": query.text,
                        "candidates": candidates(query.limit),
                    }));
                },
                Err(error) => slots.push(Err(error)),
            }
        }

        let mut grouped: Vec<Vec<ResultData>> = vec![Vec::new(); lookups.len()];
        let mut responses = Vec::new();
        for (chunk_index, chunk) in lookups.chunks(MAX_BATCH_LOOKUPS).enumerate() {
            let offset = chunk_index * MAX_BATCH_LOOKUPS;
            debug!(url = %self.url, items = chunk.len(), "Sending SmartyStreets batch request");
            let raw = self
                .http
                .post(&self.url, &self.auth_params(), &Value::Array(chunk.to_vec()))
                .await?;

            // input_index counts from the start of each request
            let found: Vec<api::Candidate> = decode(KIND, &raw)?;
            for candidate in found {
                if candidate.input_index >= chunk.len() {
                    continue;
                }
                if let Some(slot) = grouped.get_mut(offset + candidate.input_index) {
                    slot.push(map_candidate(candidate));
                }
            }
            responses.push(raw);
        }
        let raw = chunked_raw(responses);

        let data = queries
            .iter()
            .zip(slots)
            .map(|(query, slot)| match slot {
                Ok(index) => {
                    let found = grouped.get_mut(index).map(std::mem::take).unwrap_or_default();
                    BatchItem::ok(truncate(found, query.limit))
                },
                Err(error) => BatchItem::failed(error),
            })
            .collect();

        Ok(BatchResult::new(data, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    fn candidate(index: usize, number: &str) -> Value {
        json!({
            "input_index": index,
            "candidate_index": 0,
            "delivery_line_1": format!("{number} Amphitheatre Pkwy"),
            "last_line": "Mountain View CA 94043-1351",
            "components": {
                "primary_number": number,
                "street_name": "Amphitheatre",
                "street_suffix": "Pkwy",
                "city_name": "Mountain View",
                "state_abbreviation": "CA",
                "zipcode": "94043",
                "plus4_code": "1351"
            },
            "metadata": {
                "latitude": 37.423_04,
                "longitude": -122.083_58,
                "county_name": "Santa Clara",
                "precision": "Zip9"
            }
        })
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let err = SmartyStreetsProvider::new(&SmartyStreetsConfig::new("", "t"), unused_http())
            .unwrap_err();
        assert_eq!(err.to_string(), "SmartyStreets needs an auth_id");

        let err = SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", ""), unused_http())
            .unwrap_err();
        assert_eq!(err.to_string(), "SmartyStreets needs an auth_token");

        assert!(
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), unused_http()).is_ok()
        );
    }

    #[tokio::test]
    async fn test_reverse_rejected_without_request() {
        let provider =
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), unused_http())
                .unwrap();
        let err = provider
            .reverse(&ReverseQuery::new(37.4, -122.0).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "SmartyStreets does not support reverse geocoding"
        );
    }

    #[tokio::test]
    async fn test_geocode_maps_candidate() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| {
                params.get("auth-id") == Some("id")
                    && params.get("auth-token") == Some("t")
                    && params.get("street") == Some("1600 amphitheatre pkwy, mountain view ca")
                    && params.get("candidates") == Some("1")
            })
            .times(1)
            .returning(|_, _| Ok(json!([candidate(0, "1600")])));

        let provider =
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), Arc::new(http))
                .unwrap();
        let result = provider
            .geocode(&"1600 amphitheatre pkwy, mountain view ca".into())
            .await
            .unwrap();

        let data = &result.data[0];
        assert_eq!(data.street_name.as_deref(), Some("Amphitheatre Pkwy"));
        assert_eq!(data.street_number.as_deref(), Some("1600"));
        assert_eq!(
            data.formatted_address.as_deref(),
            Some("1600 Amphitheatre Pkwy, Mountain View CA 94043-1351")
        );
        assert_eq!(data.country_code.as_deref(), Some("US"));
        assert_eq!(data.extra["plus4"], "1351");
    }

    #[tokio::test]
    async fn test_batch_groups_candidates_by_input_index() {
        let mut http = https_mock();
        http.expect_get().never();
        http.expect_post()
            .withf(|_, _, body| {
                body.as_array().map(Vec::len) == Some(3)
                    && body[2]["street"] == "3 Main St"
                    && body[2]["candidates"] == 2
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(json!([
                    candidate(2, "3"),
                    candidate(0, "1"),
                    candidate(2, "33")
                ]))
            });

        let provider =
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), Arc::new(http))
                .unwrap();
        let queries = [
            GeocodeQuery::from("1 Main St"),
            GeocodeQuery::from("2 Main St"),
            GeocodeQuery::from("192.168.0.1"),
            GeocodeQuery::new("3 Main St").with_limit(2),
        ];
        let batch = provider.batch_geocode(&queries).await.unwrap();

        assert_eq!(batch.data.len(), 4);
        assert_eq!(batch.data[0].data[0].street_number.as_deref(), Some("1"));
        assert!(batch.data[1].is_ok());
        assert!(batch.data[1].data.is_empty());
        assert_eq!(
            batch.data[2].error.as_ref().map(ToString::to_string).as_deref(),
            Some("SmartyStreets does not support geocoding IPv4")
        );
        let numbers: Vec<_> = batch.data[3]
            .data
            .iter()
            .filter_map(|d| d.street_number.as_deref())
            .collect();
        assert_eq!(numbers, ["3", "33"]);
    }

    #[tokio::test]
    async fn test_large_batch_split_into_requests_of_100() {
        let mut http = https_mock();
        http.expect_get().never();
        http.expect_post()
            .withf(|_, _, body| body.as_array().is_some_and(|lookups| lookups.len() <= 100))
            .times(2)
            .returning(|_, _, body| {
                let len = body.as_array().map_or(0, Vec::len);
                // The second candidate points past the end of this request
                Ok(json!([candidate(len - 1, &len.to_string()), candidate(len, "0")]))
            });

        let provider =
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), Arc::new(http))
                .unwrap();
        let mut queries = vec![GeocodeQuery::from("10.0.0.1")];
        queries.extend((1..=150).map(|n| GeocodeQuery::from(format!("{n} Main St"))));
        let batch = provider.batch_geocode(&queries).await.unwrap();

        assert_eq!(batch.data.len(), 151);
        assert!(batch.data[0].error.is_some());
        assert_eq!(batch.data[100].data[0].street_number.as_deref(), Some("100"));
        assert!(batch.data[101].data.is_empty());
        assert_eq!(batch.data[150].data[0].street_number.as_deref(), Some("50"));
        assert_eq!(batch.raw.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider =
            SmartyStreetsProvider::new(&SmartyStreetsConfig::new("id", "t"), unused_http())
                .unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "SmartyStreets does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "SmartyStreets does not support geocoding IPv6");
    }
}
