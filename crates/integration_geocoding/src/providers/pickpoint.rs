//! PickPoint geocoder (Nominatim-compatible, HTTPS only)

use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ReverseQuery};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::nominatim::{ApiKey, NominatimClient};
use crate::provider::{base_url, require_https, require_secret};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, ProviderKind};

const KIND: ProviderKind = ProviderKind::Pickpoint;

/// Configuration for [`PickPointProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PickPointConfig {
    /// API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default `accept-language`
    #[serde(default)]
    pub language: Option<String>,
}

fn default_base_url() -> String {
    "https://api.pickpoint.io/v1".to_string()
}

impl PickPointConfig {
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

/// PickPoint geocoder
#[derive(Debug)]
pub struct PickPointProvider {
    client: NominatimClient,
}

impl PickPointProvider {
    /// Create a new PickPoint provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank or the transport
    /// cannot speak HTTPS.
    pub fn new(config: &PickPointConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_https(KIND, http.as_ref())?;
        require_secret(KIND, &config.api_key, "an apiKey")?;

        let base = base_url(&config.base_url);
        Ok(Self {
            client: NominatimClient {
                kind: KIND,
                http,
                search_url: format!("{base}/forward"),
                reverse_url: format!("{base}/reverse"),
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
impl GeocodeProvider for PickPointProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "pickpoint"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.geocode(query).await
    }

    #[instrument(skip(self), fields(provider = "pickpoint"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.reverse(query).await
    }
}
