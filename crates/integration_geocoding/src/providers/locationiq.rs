//! LocationIQ geocoder (Nominatim-compatible)

use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ReverseQuery};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::nominatim::{ApiKey, NominatimClient};
use crate::provider::{base_url, require_secret};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, ProviderKind};

const KIND: ProviderKind = ProviderKind::Locationiq;

/// Configuration for [`LocationIqProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationIqConfig {
    /// API access token
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Regional endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default `accept-language`
    #[serde(default)]
    pub language: Option<String>,
}

fn default_base_url() -> String {
    "https://us1.locationiq.com/v1".to_string()
}

impl LocationIqConfig {
    /// Create a configuration for the US endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
            language: None,
        }
    }
}

/// LocationIQ geocoder
#[derive(Debug)]
pub struct LocationIqProvider {
    client: NominatimClient,
}

impl LocationIqProvider {
    /// Create a new LocationIQ provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &LocationIqConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        let base = base_url(&config.base_url);
        Ok(Self {
            client: NominatimClient {
                kind: KIND,
                http,
                search_url: format!("{base}/search.php"),
                reverse_url: format!("{base}/reverse.php"),
                api_key: Some(ApiKey {
                    param: "key",
                    value: config.api_key.clone(),
                }),
                email: None,
                language: config.language.clone(),
            },
        })
    }
}

#[async_trait]
impl GeocodeProvider for LocationIqProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "locationiq"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.geocode(query).await
    }

    #[instrument(skip(self), fields(provider = "locationiq"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.reverse(query).await
    }
}
