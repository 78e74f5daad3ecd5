//! HERE Geocoding & Search API v1 client

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{non_empty, require_address, require_secret, truncate};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Here;

/// HERE response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ItemsResponse {
        #[serde(default)]
        pub items: Vec<Item>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Item {
        pub id: Option<String>,
        pub result_type: Option<String>,
        pub position: Position,
        #[serde(default)]
        pub address: Address,
        pub scoring: Option<Scoring>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Position {
        pub lat: f64,
        pub lng: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Address {
        pub label: Option<String>,
        pub country_code: Option<String>,
        pub country_name: Option<String>,
        pub state_code: Option<String>,
        pub state: Option<String>,
        pub city: Option<String>,
        pub district: Option<String>,
        pub street: Option<String>,
        pub postal_code: Option<String>,
        pub house_number: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Scoring {
        pub query_score: Option<f64>,
    }
}

/// Configuration for [`HereProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HereConfig {
    /// REST API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Forward geocoding endpoint
    #[serde(default = "default_geocode_url")]
    pub geocode_url: String,

    /// Reverse geocoding endpoint
    #[serde(default = "default_reverse_url")]
    pub reverse_url: String,

    /// Default result language (BCP 47)
    #[serde(default)]
    pub language: Option<String>,
}

fn default_geocode_url() -> String {
    "https://geocode.search.hereapi.com/v1/geocode".to_string()
}

fn default_reverse_url() -> String {
    "https://revgeocode.search.hereapi.com/v1/revgeocode".to_string()
}

impl HereConfig {
    /// Create a configuration with the default endpoints
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            geocode_url: default_geocode_url(),
            reverse_url: default_reverse_url(),
            language: None,
        }
    }
}

/// HERE geocoder
pub struct HereProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    geocode_url: String,
    reverse_url: String,
    language: Option<String>,
}

impl fmt::Debug for HereProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HereProvider")
            .field("geocode_url", &self.geocode_url)
            .field("reverse_url", &self.reverse_url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl HereProvider {
    /// Create a new HERE provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &HereConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            geocode_url: config.geocode_url.clone(),
            reverse_url: config.reverse_url.clone(),
            language: config.language.clone(),
        })
    }

    async fn request(
        &self,
        url: &str,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let params = params.with("apiKey", self.api_key.expose_secret());

        debug!(url = %url, "Sending HERE request");
        let raw = self.http.get(url, &params).await?;

        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            let description = raw
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(GeocoderError::provider(
                KIND,
                format!("{error} {description}").trim_end().to_string(),
            ));
        }

        let response: api::ItemsResponse = decode(KIND, &raw)?;
        let data = response.items.into_iter().map(map_item).collect();
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_item(item: api::Item) -> ResultData {
    let address = item.address;
    ResultData {
        formatted_address: non_empty(address.label),
        country: non_empty(address.country_name),
        country_code: non_empty(address.country_code),
        state: non_empty(address.state),
        state_code: non_empty(address.state_code),
        city: non_empty(address.city),
        zipcode: non_empty(address.postal_code),
        street_name: non_empty(address.street),
        street_number: non_empty(address.house_number),
        neighbourhood: non_empty(address.district),
        ..ResultData::new(item.position.lat, item.position.lng)
    }
    .with_extra("hereId", item.id)
    .with_extra("resultType", item.result_type)
    .with_extra("confidence", item.scoring.and_then(|s| s.query_score))
}

#[async_trait]
impl GeocodeProvider for HereProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "here"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("q", &query.text)
            .with_opt("limit", query.limit)
            .with_opt(
                "lang",
                query.language.as_deref().or(self.language.as_deref()),
            )
            .with_opt(
                "in",
                query
                    .country_code
                    .as_deref()
                    .map(|c| format!("countryCode:{}", c.to_uppercase())),
            );

        self.request(&self.geocode_url, params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "here"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new()
            .with("at", format!("{},{}", query.latitude(), query.longitude()))
            .with_opt("limit", query.limit)
            .with_opt(
                "lang",
                query.language.as_deref().or(self.language.as_deref()),
            );

        self.request(&self.reverse_url, params, query.limit).await
    }
}
