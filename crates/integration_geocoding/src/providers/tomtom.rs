//! TomTom Search API
//!
//! Batches go through the synchronous batch endpoint, one POST per 100
//! queries.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{chunked_raw, decode};
use crate::provider::{base_url, non_empty, require_address, require_secret, truncate};
use crate::urlencoding::encode_path_segment;
use crate::{
    BatchItem, BatchResult, GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params,
    ProviderKind,
};

const KIND: ProviderKind = ProviderKind::Tomtom;

/// Most items the synchronous batch endpoint accepts in one request
const MAX_BATCH_ITEMS: usize = 100;

/// TomTom response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct SearchResponse {
        #[serde(default)]
        pub results: Vec<SearchResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct SearchResult {
        pub id: Option<String>,
        pub score: Option<f64>,
        pub position: LatLon,
        #[serde(default)]
        pub address: Address,
    }

    #[derive(Debug, Deserialize)]
    pub struct LatLon {
        pub lat: f64,
        pub lon: f64,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReverseResponse {
        #[serde(default)]
        pub addresses: Vec<ReverseResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReverseResult {
        /// `"lat,lon"`
        pub position: String,
        #[serde(default)]
        pub address: Address,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Address {
        pub street_number: Option<String>,
        pub street_name: Option<String>,
        pub municipality_subdivision: Option<String>,
        pub municipality: Option<String>,
        pub country_subdivision: Option<String>,
        pub country_subdivision_name: Option<String>,
        pub postal_code: Option<String>,
        pub country_code: Option<String>,
        pub country: Option<String>,
        pub freeform_address: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BatchResponse {
        #[serde(default)]
        pub batch_items: Vec<BatchEntry>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BatchEntry {
        pub status_code: u16,
        pub response: serde_json::Value,
    }
}

/// Configuration for [`TomTomProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomTomConfig {
    /// API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Search API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default result language (IETF tag, e.g. "en-GB")
    #[serde(default)]
    pub language: Option<String>,
}

fn default_base_url() -> String {
    "https://api.tomtom.com/search/2".to_string()
}

impl TomTomConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
            language: None,
        }
    }
}

/// TomTom geocoder
pub struct TomTomProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    base_url: String,
    language: Option<String>,
}

impl fmt::Debug for TomTomProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TomTomProvider")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl TomTomProvider {
    /// Create a new TomTom provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &TomTomConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url(&config.base_url),
            language: config.language.clone(),
        })
    }

    fn geocode_params(&self, query: &GeocodeQuery) -> Params {
        Params::new()
            .with_opt("limit", query.limit)
            .with_opt("countrySet", query.country_code.as_deref())
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            )
    }

    /// Relative request line for one entry of a batch
    fn batch_line(&self, query: &GeocodeQuery) -> String {
        let mut line = format!("/geocode/{}.json", encode_path_segment(&query.text));
        let params = self.geocode_params(query);
        for (i, (key, value)) in params.as_slice().iter().enumerate() {
            line.push(if i == 0 { '?' } else { '&' });
            line.push_str(key);
            line.push('=');
            line.push_str(&encode_path_segment(value));
        }
        line
    }
}

fn map_address(address: api::Address, latitude: f64, longitude: f64) -> ResultData {
    ResultData {
        formatted_address: non_empty(address.freeform_address),
        country: non_empty(address.country),
        country_code: non_empty(address.country_code),
        state: non_empty(address.country_subdivision_name)
            .or_else(|| non_empty(address.country_subdivision.clone())),
        state_code: non_empty(address.country_subdivision),
        city: non_empty(address.municipality),
        zipcode: non_empty(address.postal_code),
        street_name: non_empty(address.street_name),
        street_number: non_empty(address.street_number),
        neighbourhood: non_empty(address.municipality_subdivision),
        ..ResultData::new(latitude, longitude)
    }
}

fn map_search(response: api::SearchResponse) -> Vec<ResultData> {
    response
        .results
        .into_iter()
        .map(|result| {
            map_address(result.address, result.position.lat, result.position.lon)
                .with_extra("tomtomId", result.id)
                .with_extra("score", result.score)
        })
        .collect()
}

fn map_reverse(response: api::ReverseResponse) -> Result<Vec<ResultData>, GeocoderError> {
    response
        .addresses
        .into_iter()
        .map(|result| {
            let (lat, lon) = result
                .position
                .split_once(',')
                .and_then(|(lat, lon)| Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?)))
                .ok_or_else(|| {
                    GeocoderError::malformed(KIND, &format!("bad position {:?}", result.position))
                })?;
            Ok(map_address(result.address, lat, lon))
        })
        .collect()
}

/// Batch entries carry their own status; non-2xx ones hold `errorText`
fn map_batch_entry(entry: api::BatchEntry, limit: Option<u32>) -> BatchItem {
    if !(200..300).contains(&entry.status_code) {
        let message = entry
            .response
            .get("errorText")
            .and_then(Value::as_str)
            .map_or_else(|| format!("status {}", entry.status_code), str::to_string);
        return BatchItem::failed(GeocoderError::provider(KIND, message));
    }

    match decode(KIND, &entry.response) {
        Ok(response) => BatchItem::ok(truncate(map_search(response), limit)),
        Err(error) => BatchItem::failed(error),
    }
}

#[async_trait]
impl GeocodeProvider for TomTomProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "tomtom"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let url = format!(
            "{}/geocode/{}.json",
            self.base_url,
            encode_path_segment(&query.text)
        );
        let params = self
            .geocode_params(query)
            .with("key", self.api_key.expose_secret());

        debug!(url = %url, "Sending TomTom geocode request");
        let raw = self.http.get(&url, &params).await?;
        let data = map_search(decode(KIND, &raw)?);
        Ok(GeocodeResult::new(truncate(data, query.limit), raw))
    }

    #[instrument(skip(self), fields(provider = "tomtom"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let url = format!(
            "{}/reverseGeocode/{},{}.json",
            self.base_url,
            query.latitude(),
            query.longitude()
        );
        let params = Params::new()
            .with("key", self.api_key.expose_secret())
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            );

        debug!(url = %url, "Sending TomTom reverse request");
        let raw = self.http.get(&url, &params).await?;
        let data = map_reverse(decode(KIND, &raw)?)?;
        Ok(GeocodeResult::new(truncate(data, query.limit), raw))
    }

    #[instrument(skip(self, queries), fields(provider = "tomtom", queries = queries.len()))]
    async fn batch_geocode(&self, queries: &[GeocodeQuery]) -> Result<BatchResult, GeocoderError> {
        // Slots that fail validation never reach the wire.
        let mut slots: Vec<Option<BatchItem>> = Vec::with_capacity(queries.len());
        let mut batch_items = Vec::new();
        for query in queries {
            match require_address(KIND, query) {
                Ok(()) => {
                    batch_items.push(json!({ "query": self.batch_line(query) }));
                    slots.push(None);
                },
                Err(error) => slots.push(Some(BatchItem::failed(error))),
            }
        }

        if batch_items.is_empty() {
            let data = slots.into_iter().flatten().collect();
            return Ok(BatchResult::new(data, Value::Null));
        }

        let url = format!("{}/batch/sync.json", self.base_url);
        let params = Params::new().with("key", self.api_key.expose_secret());

        let mut entries = Vec::with_capacity(batch_items.len());
        let mut responses = Vec::new();
        for chunk in batch_items.chunks(MAX_BATCH_ITEMS) {
            let body = json!({ "batchItems": chunk });
            debug!(url = %url, items = chunk.len(), "Sending TomTom batch request");
            let raw = self.http.post(&url, &params, &body).await?;
            let response: api::BatchResponse = decode(KIND, &raw)?;

            // Keep later requests aligned when a response is short
            let mut chunk_entries: Vec<_> = response.batch_items.into_iter().map(Some).collect();
            chunk_entries.resize_with(chunk.len(), || None);
            entries.extend(chunk_entries);
            responses.push(raw);
        }
        let raw = chunked_raw(responses);

        let mut entries = entries.into_iter();
        let data = slots
            .into_iter()
            .zip(queries)
            .map(|(slot, query)| {
                slot.unwrap_or_else(|| match entries.next().flatten() {
                    Some(entry) => map_batch_entry(entry, query.limit),
                    None => BatchItem::failed(GeocoderError::malformed(
                        KIND,
                        &"batch response has fewer items than requests",
                    )),
                })
            })
            .collect();

        Ok(BatchResult::new(data, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    fn search_payload(street: &str) -> Value {
        json!({
            "summary": { "query": street },
            "results": [{
                "id": "US/PAD/p0/1234",
                "score": 11.2,
                "position": { "lat": 37.422_02, "lon": -122.084_08 },
                "address": {
                    "streetNumber": "1600",
                    "streetName": street,
                    "municipality": "Mountain View",
                    "countrySubdivision": "CA",
                    "countrySubdivisionName": "California",
                    "postalCode": "94043",
                    "countryCode": "US",
                    "country": "United States",
                    "freeformAddress": "1600 Amphitheatre Parkway, Mountain View, CA 94043"
                }
            }]
        })
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let err = TomTomProvider::new(&TomTomConfig::new(""), unused_http()).unwrap_err();
        assert_eq!(err.to_string(), "TomTom needs an apiKey");
        assert!(TomTomProvider::new(&TomTomConfig::new("k"), unused_http()).is_ok());
    }

    #[tokio::test]
    async fn test_geocode_maps_address() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, params| {
                url.ends_with("/search/2/geocode/1600%20Amphitheatre%20Parkway.json")
                    && params.get("key") == Some("k")
            })
            .times(1)
            .returning(|_, _| Ok(search_payload("Amphitheatre Parkway")));

        let provider = TomTomProvider::new(&TomTomConfig::new("k"), Arc::new(http)).unwrap();
        let result = provider
            .geocode(&"1600 Amphitheatre Parkway".into())
            .await
            .unwrap();

        let data = &result.data[0];
        assert_eq!(data.street_number.as_deref(), Some("1600"));
        assert_eq!(data.state.as_deref(), Some("California"));
        assert_eq!(data.state_code.as_deref(), Some("CA"));
        assert_eq!(data.city.as_deref(), Some("Mountain View"));
        assert_eq!(data.extra["tomtomId"], "US/PAD/p0/1234");
    }

    #[tokio::test]
    async fn test_reverse_parses_string_position() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, _| url.ends_with("/reverseGeocode/37.42202,-122.08408.json"))
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "addresses": [{
                        "position": "37.422020,-122.084080",
                        "address": { "municipality": "Mountain View", "countryCode": "US" }
                    }]
                }))
            });

        let provider = TomTomProvider::new(&TomTomConfig::new("k"), Arc::new(http)).unwrap();
        let result = provider
            .reverse(&ReverseQuery::new(37.422_02, -122.084_08).unwrap())
            .await
            .unwrap();

        let data = &result.data[0];
        assert!((data.latitude - 37.422_02).abs() < f64::EPSILON);
        assert!((data.longitude - -122.084_08).abs() < f64::EPSILON);
        assert_eq!(data.city.as_deref(), Some("Mountain View"));
    }

    #[tokio::test]
    async fn test_batch_is_one_post_in_input_order() {
        let mut http = https_mock();
        http.expect_get().never();
        http.expect_post()
            .withf(|url, params, body| {
                url.ends_with("/search/2/batch/sync.json")
                    && params.get("key") == Some("k")
                    && body["batchItems"][0]["query"] == "/geocode/Main%20St.json"
                    && body["batchItems"][1]["query"] == "/geocode/Nowhere.json?limit=2"
                    && body["batchItems"].as_array().map(Vec::len) == Some(2)
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(json!({
                    "batchItems": [
                        { "statusCode": 200, "response": search_payload("Main St") },
                        { "statusCode": 400, "response": { "errorText": "Invalid query" } }
                    ]
                }))
            });

        let provider = TomTomProvider::new(&TomTomConfig::new("k"), Arc::new(http)).unwrap();
        let queries = [
            GeocodeQuery::from("Main St"),
            GeocodeQuery::from("10.0.0.1"),
            GeocodeQuery::new("Nowhere").with_limit(2),
        ];
        let batch = provider.batch_geocode(&queries).await.unwrap();

        assert_eq!(batch.data.len(), 3);
        assert_eq!(
            batch.data[0].data[0].street_name.as_deref(),
            Some("Main St")
        );
        assert_eq!(
            batch.data[1].error.as_ref().map(ToString::to_string).as_deref(),
            Some("TomTom does not support geocoding IPv4")
        );
        assert_eq!(
            batch.data[2].error.as_ref().map(ToString::to_string).as_deref(),
            Some("TomTom returned an error: Invalid query")
        );
    }

    #[tokio::test]
    async fn test_large_batch_split_into_requests_of_100() {
        let mut http = https_mock();
        http.expect_get().never();
        http.expect_post()
            .withf(|_, _, body| {
                body["batchItems"]
                    .as_array()
                    .is_some_and(|items| items.len() <= 100)
            })
            .times(3)
            .returning(|_, _, body| {
                // Answer every item but the last one
                let len = body["batchItems"].as_array().map_or(0, Vec::len);
                let items: Vec<_> = (1..len)
                    .map(|_| json!({ "statusCode": 200, "response": search_payload("Main St") }))
                    .collect();
                Ok(json!({ "batchItems": items }))
            });

        let provider = TomTomProvider::new(&TomTomConfig::new("k"), Arc::new(http)).unwrap();
        let queries: Vec<_> = (0..250)
            .map(|n| GeocodeQuery::from(format!("{n} Main St")))
            .collect();
        let batch = provider.batch_geocode(&queries).await.unwrap();

        assert_eq!(batch.data.len(), 250);
        assert!(batch.data[98].is_ok());
        assert!(batch.data[99].error.is_some());
        assert!(batch.data[100].is_ok());
        assert!(batch.data[199].error.is_some());
        assert!(batch.data[248].is_ok());
        assert!(batch.data[249].error.is_some());
        assert_eq!(batch.failures(), 3);
        assert_eq!(batch.raw.as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_batch_of_invalid_queries_sends_nothing() {
        let provider = TomTomProvider::new(&TomTomConfig::new("k"), unused_http()).unwrap();
        let batch = provider
            .batch_geocode(&[GeocodeQuery::from("::1")])
            .await
            .unwrap();
        assert_eq!(batch.failures(), 1);
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider = TomTomProvider::new(&TomTomConfig::new("k"), unused_http()).unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "TomTom does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "TomTom does not support geocoding IPv6");
    }
}
