//! Geocodio (US and Canada)
//!
//! Batches go out as one POST with a JSON array of addresses.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, non_empty, require_address, require_secret, truncate};
use crate::{
    BatchItem, BatchResult, GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params,
    ProviderKind,
};

const KIND: ProviderKind = ProviderKind::Geocodio;

/// Geocodio response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Response {
        #[serde(default)]
        pub results: Vec<Place>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Place {
        #[serde(default)]
        pub address_components: Components,
        pub formatted_address: Option<String>,
        pub location: Location,
        pub accuracy: Option<f64>,
        pub accuracy_type: Option<String>,
        pub source: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Components {
        pub number: Option<String>,
        pub formatted_street: Option<String>,
        pub city: Option<String>,
        pub state: Option<String>,
        pub zip: Option<String>,
        pub country: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Location {
        pub lat: f64,
        pub lng: f64,
    }

    #[derive(Debug, Deserialize)]
    pub struct BatchResponse {
        #[serde(default)]
        pub results: Vec<BatchEntry>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BatchEntry {
        pub response: serde_json::Value,
    }
}

/// Configuration for [`GeocodioProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeocodioConfig {
    /// API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Versioned API root
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://api.geocod.io/v1.7".to_string()
}

impl GeocodioConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
        }
    }
}

/// Geocodio geocoder
pub struct GeocodioProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    base_url: String,
}

impl fmt::Debug for GeocodioProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocodioProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeocodioProvider {
    /// Create a new Geocodio provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &GeocodioConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url(&config.base_url),
        })
    }

    async fn request(
        &self,
        endpoint: &str,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let params = params.with("api_key", self.api_key.expose_secret());

        debug!(url = %url, "Sending Geocodio request");
        let raw = self.http.get(&url, &params).await?;
        let data = map_response(&raw)?;
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn check_error(raw: &Value) -> Result<(), GeocoderError> {
    match raw.get("error").and_then(Value::as_str) {
        Some(message) => Err(GeocoderError::provider(KIND, message)),
        None => Ok(()),
    }
}

fn map_response(raw: &Value) -> Result<Vec<ResultData>, GeocoderError> {
    check_error(raw)?;
    let response: api::Response = decode(KIND, raw)?;
    Ok(response.results.into_iter().map(map_place).collect())
}

fn map_place(place: api::Place) -> ResultData {
    let components = place.address_components;
    let state = non_empty(components.state);
    ResultData {
        formatted_address: non_empty(place.formatted_address),
        country_code: non_empty(components.country),
        state: state.clone(),
        state_code: state,
        city: non_empty(components.city),
        zipcode: non_empty(components.zip),
        street_name: non_empty(components.formatted_street),
        street_number: non_empty(components.number),
        ..ResultData::new(place.location.lat, place.location.lng)
    }
    .with_extra("accuracy", place.accuracy)
    .with_extra("accuracyType", place.accuracy_type)
    .with_extra("source", place.source)
}

#[async_trait]
impl GeocodeProvider for GeocodioProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "geocodio"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("q", &query.text)
            .with_opt("limit", query.limit)
            .with_opt("country", query.country_code.as_deref());

        self.request("geocode", params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "geocodio"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new()
            .with("q", format!("{},{}", query.latitude(), query.longitude()))
            .with_opt("limit", query.limit);

        self.request("reverse", params, query.limit).await
    }

    #[instrument(skip(self, queries), fields(provider = "geocodio", queries = queries.len()))]
    async fn batch_geocode(&self, queries: &[GeocodeQuery]) -> Result<BatchResult, GeocoderError> {
        let mut slots: Vec<Option<BatchItem>> = Vec::with_capacity(queries.len());
        let mut addresses = Vec::new();
        for query in queries {
            match require_address(KIND, query) {
                Ok(()) => {
                    addresses.push(Value::String(query.text.clone()));
                    slots.push(None);
                },
                Err(error) => slots.push(Some(BatchItem::failed(error))),
            }
        }

        if addresses.is_empty() {
            let data = slots.into_iter().flatten().collect();
            return Ok(BatchResult::new(data, Value::Null));
        }

        let url = format!("{}/geocode", self.base_url);
        let params = Params::new().with("api_key", self.api_key.expose_secret());

        debug!(url = %url, items = addresses.len(), "Sending Geocodio batch request");
        let raw = self.http.post(&url, &params, &json!(addresses)).await?;
        check_error(&raw)?;
        let response: api::BatchResponse = decode(KIND, &raw)?;

        let mut entries = response.results.into_iter();
        let data = slots
            .into_iter()
            .zip(queries)
            .map(|(slot, query)| {
                slot.unwrap_or_else(|| match entries.next() {
                    Some(entry) => match map_response(&entry.response) {
                        Ok(data) => BatchItem::ok(truncate(data, query.limit)),
                        Err(error) => BatchItem::failed(error),
                    },
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
