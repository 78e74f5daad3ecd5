//! Mapbox Geocoding API (places endpoint)

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, require_address, require_secret, truncate};
use crate::urlencoding::encode_path_segment;
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Mapbox;

/// Mapbox response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FeatureCollection {
        #[serde(default)]
        pub features: Vec<Feature>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Feature {
        pub id: Option<String>,
        /// `[longitude, latitude]`
        pub center: (f64, f64),
        pub place_name: Option<String>,
        pub text: Option<String>,
        pub address: Option<String>,
        #[serde(default)]
        pub place_type: Vec<String>,
        pub relevance: Option<f64>,
        #[serde(default)]
        pub properties: Properties,
        #[serde(default)]
        pub context: Vec<Context>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Properties {
        pub short_code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Context {
        pub id: String,
        pub text: String,
        pub short_code: Option<String>,
    }
}

/// Configuration for [`MapboxProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapboxConfig {
    /// Access token
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Places endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default result language
    #[serde(default)]
    pub language: Option<String>,
}

fn default_base_url() -> String {
    "https://api.mapbox.com/geocoding/v5/mapbox.places".to_string()
}

impl MapboxConfig {
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

/// Mapbox geocoder
pub struct MapboxProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    base_url: String,
    language: Option<String>,
}

impl fmt::Debug for MapboxProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapboxProvider")
            .field("base_url", &self.base_url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl MapboxProvider {
    /// Create a new Mapbox provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the access token is blank.
    pub fn new(config: &MapboxConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url(&config.base_url),
            language: config.language.clone(),
        })
    }

    async fn request(
        &self,
        search: &str,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let url = format!("{}/{search}.json", self.base_url);
        let params = params.with("access_token", self.api_key.expose_secret());

        debug!(url = %url, "Sending Mapbox request");
        let raw = self.http.get(&url, &params).await?;

        if raw.get("features").is_none() {
            if let Some(message) = raw.get("message").and_then(Value::as_str) {
                return Err(GeocoderError::provider(KIND, message));
            }
        }

        let collection: api::FeatureCollection = decode(KIND, &raw)?;
        let data = collection.features.into_iter().map(map_feature).collect();
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

/// Context ids look like `postcode.8412` or `region.9607`
fn context_kind(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

/// Region short codes look like `US-CA`
fn state_code(short_code: &str) -> String {
    short_code
        .split_once('-')
        .map_or(short_code, |(_, code)| code)
        .to_string()
}

fn map_feature(feature: api::Feature) -> ResultData {
    let (longitude, latitude) = feature.center;
    let mut data = ResultData {
        formatted_address: feature.place_name,
        ..ResultData::new(latitude, longitude)
    };

    if feature.place_type.iter().any(|t| t == "address") {
        data.street_name = feature.text;
        data.street_number = feature.address;
    } else if feature.place_type.iter().any(|t| t == "country") {
        data.country = feature.text;
        data.country_code = feature.properties.short_code.map(|c| c.to_uppercase());
    }

    for context in feature.context {
        match context_kind(&context.id) {
            "neighborhood" => data.neighbourhood = Some(context.text),
            "postcode" => data.zipcode = Some(context.text),
            "place" => data.city = Some(context.text),
            "region" => {
                data.state_code = context.short_code.as_deref().map(state_code);
                data.state = Some(context.text);
            },
            "country" => {
                data.country_code = context.short_code.map(|c| c.to_uppercase());
                data.country = Some(context.text);
            },
            _ => {},
        }
    }

    data.with_extra("mapboxId", feature.id)
        .with_extra("relevance", feature.relevance)
}

#[async_trait]
impl GeocodeProvider for MapboxProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "mapbox"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with_opt("limit", query.limit)
            .with_opt(
                "country",
                query.country_code.as_deref().map(str::to_lowercase),
            )
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            );

        self.request(&encode_path_segment(&query.text), params, query.limit)
            .await
    }

    #[instrument(skip(self), fields(provider = "mapbox"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new().with_opt(
            "language",
            query.language.as_deref().or(self.language.as_deref()),
        );

        let search = format!("{},{}", query.longitude(), query.latitude());
        self.request(&search, params, query.limit).await
    }
}
