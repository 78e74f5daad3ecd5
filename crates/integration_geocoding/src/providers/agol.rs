//! ArcGIS Online World Geocoding Service
//!
//! Every request carries an OAuth bearer token obtained with the
//! client-credentials grant. The token lives in a [`TokenCache`] owned by the
//! provider instance, so a warm instance issues one HTTP call per query.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, de, non_empty, require_address, require_secret, require_value};
use crate::token_cache::{Clock, TokenCache};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Agol;

/// Fields requested from `/find`
const OUT_FIELDS: &str = "AddNum,StPreDir,StName,StType,City,Postal,Region,Country";

/// ArcGIS Online response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct TokenResponse {
        pub access_token: String,
        /// Lifetime in seconds
        pub expires_in: u64,
    }

    #[derive(Debug, Deserialize)]
    pub struct FindResponse {
        #[serde(default)]
        pub locations: Vec<Location>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Location {
        pub feature: Feature,
    }

    #[derive(Debug, Deserialize)]
    pub struct Feature {
        pub geometry: Point,
        #[serde(default)]
        pub attributes: Attributes,
    }

    #[derive(Debug, Deserialize)]
    pub struct Point {
        pub x: f64,
        pub y: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Attributes {
        pub add_num: Option<String>,
        pub st_pre_dir: Option<String>,
        pub st_name: Option<String>,
        pub st_type: Option<String>,
        pub city: Option<String>,
        pub postal: Option<String>,
        pub region: Option<String>,
        pub country: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ReverseResponse {
        pub address: ReverseAddress,
        pub location: Point,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct ReverseAddress {
        pub match_addr: Option<String>,
        pub address: Option<String>,
        pub neighborhood: Option<String>,
        pub city: Option<String>,
        pub region: Option<String>,
        pub postal: Option<String>,
        pub country_code: Option<String>,
    }
}

/// Configuration for [`AgolProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgolConfig {
    /// OAuth application client id
    pub client_id: String,

    /// OAuth application client secret
    #[serde(skip_serializing)]
    pub client_secret: SecretString,

    /// Token endpoint
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Geocode service root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds subtracted from every token lifetime
    #[serde(
        default = "default_token_safety_margin_secs",
        deserialize_with = "de::u64_lenient"
    )]
    pub token_safety_margin_secs: u64,
}

fn default_auth_url() -> String {
    "https://www.arcgis.com/sharing/oauth2/token".to_string()
}

fn default_base_url() -> String {
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer".to_string()
}

const fn default_token_safety_margin_secs() -> u64 {
    30
}

impl AgolConfig {
    /// Create a configuration with default endpoints
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            auth_url: default_auth_url(),
            base_url: default_base_url(),
            token_safety_margin_secs: default_token_safety_margin_secs(),
        }
    }
}

/// ArcGIS Online geocoder
pub struct AgolProvider {
    http: Arc<dyn HttpAdapter>,
    client_id: String,
    client_secret: SecretString,
    auth_url: String,
    base_url: String,
    tokens: TokenCache,
}

impl fmt::Debug for AgolProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgolProvider")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AgolProvider {
    /// Create a new ArcGIS Online provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the client id or secret is blank.
    pub fn new(config: &AgolConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_value(KIND, &config.client_id, "a client_id")?;
        require_secret(KIND, &config.client_secret, "a client_secret")?;

        Ok(Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            auth_url: config.auth_url.clone(),
            base_url: base_url(&config.base_url),
            tokens: TokenCache::new()
                .with_safety_margin(Duration::from_secs(config.token_safety_margin_secs)),
        })
    }

    /// Replace the clock driving token expiry
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        let margin = self.tokens.safety_margin();
        self.tokens = TokenCache::with_clock(clock).with_safety_margin(margin);
        self
    }

    /// Cached token, or a fresh one from the token endpoint
    async fn token(&self) -> Result<String, GeocoderError> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }

        debug!(url = %self.auth_url, "Requesting ArcGIS access token");
        let params = Params::new()
            .with("client_id", &self.client_id)
            .with("client_secret", self.client_secret.expose_secret())
            .with("grant_type", "client_credentials")
            .with("f", "json");

        let raw = self.http.get(&self.auth_url, &params).await?;
        check_error(&raw)?;
        let response: api::TokenResponse = decode(KIND, &raw)?;

        self.tokens.put(
            response.access_token.clone(),
            Duration::from_secs(response.expires_in),
        );
        Ok(response.access_token)
    }
}

/// ArcGIS reports failures as `{"error": {"code", "message"}}` with HTTP 200
fn check_error(raw: &Value) -> Result<(), GeocoderError> {
    match raw.get("error") {
        Some(error) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| error.to_string(), str::to_string);
            Err(GeocoderError::provider(KIND, message))
        },
        None => Ok(()),
    }
}

fn map_location(location: api::Location) -> ResultData {
    let api::Feature {
        geometry,
        attributes,
    } = location.feature;

    let street = [
        attributes.st_pre_dir,
        attributes.st_name,
        attributes.st_type,
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect::<Vec<_>>()
    .join(" ");

    let country = non_empty(attributes.country);
    ResultData {
        country_code: country.clone(),
        country,
        city: non_empty(attributes.city),
        state: non_empty(attributes.region),
        zipcode: non_empty(attributes.postal),
        street_name: Some(street).filter(|s| !s.is_empty()),
        street_number: non_empty(attributes.add_num),
        ..ResultData::new(geometry.y, geometry.x)
    }
}

fn map_find(response: api::FindResponse) -> Vec<ResultData> {
    response.locations.into_iter().map(map_location).collect()
}

fn map_reverse(response: api::ReverseResponse) -> ResultData {
    let address = response.address;
    ResultData {
        formatted_address: non_empty(address.match_addr),
        street_name: non_empty(address.address),
        neighbourhood: non_empty(address.neighborhood),
        city: non_empty(address.city),
        state: non_empty(address.region),
        zipcode: non_empty(address.postal),
        country_code: non_empty(address.country_code),
        ..ResultData::new(response.location.y, response.location.x)
    }
}

#[async_trait]
impl GeocodeProvider for AgolProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "agol"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;
        let token = self.token().await?;

        let url = format!("{}/find", self.base_url);
        let params = Params::new()
            .with("token", token)
            .with("f", "json")
            .with("text", &query.text)
            .with("outFields", OUT_FIELDS)
            .with_opt("maxLocations", query.limit)
            .with_opt("sourceCountry", query.country_code.as_deref());

        debug!(url = %url, "Sending ArcGIS find request");
        let raw = self.http.get(&url, &params).await?;
        check_error(&raw)?;

        let data = map_find(decode(KIND, &raw)?);
        Ok(GeocodeResult::new(data, raw))
    }

    #[instrument(skip(self), fields(provider = "agol"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let token = self.token().await?;

        let url = format!("{}/reverseGeocode", self.base_url);
        let params = Params::new()
            .with("token", token)
            .with("f", "json")
            .with(
                "location",
                format!("{},{}", query.longitude(), query.latitude()),
            )
            .with_opt("langCode", query.language.as_deref());

        debug!(url = %url, "Sending ArcGIS reverse request");
        let raw = self.http.get(&url, &params).await?;
        check_error(&raw)?;

        let data = vec![map_reverse(decode(KIND, &raw)?)];
        Ok(GeocodeResult::new(data, raw))
    }
}
