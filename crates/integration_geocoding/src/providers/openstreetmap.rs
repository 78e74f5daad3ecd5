//! OpenStreetMap Nominatim geocoder
//!
//! Public instance by default; point `host` at a self-hosted Nominatim to lift
//! the usage policy limits.

use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ReverseQuery};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::nominatim::NominatimClient;
use crate::provider::base_url;
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, ProviderKind};

/// Configuration for [`OpenStreetMapProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenStreetMapConfig {
    /// Nominatim host
    #[serde(default = "default_host")]
    pub host: String,

    /// Contact address sent with every request, as the usage policy asks
    #[serde(default)]
    pub email: Option<String>,

    /// Default `accept-language`
    #[serde(default)]
    pub language: Option<String>,
}

fn default_host() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

impl Default for OpenStreetMapConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            email: None,
            language: None,
        }
    }
}

/// OpenStreetMap Nominatim geocoder
#[derive(Debug)]
pub struct OpenStreetMapProvider {
    client: NominatimClient,
}

impl OpenStreetMapProvider {
    /// Create a new OpenStreetMap provider
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the other providers.
    pub fn new(
        config: &OpenStreetMapConfig,
        http: Arc<dyn HttpAdapter>,
    ) -> Result<Self, GeocoderError> {
        let host = base_url(&config.host);
        Ok(Self {
            client: NominatimClient {
                kind: ProviderKind::Openstreetmap,
                http,
                search_url: format!("{host}/search"),
                reverse_url: format!("{host}/reverse"),
                api_key: None,
                email: config.email.clone(),
                language: config.language.clone(),
            },
        })
    }
}

#[async_trait]
impl GeocodeProvider for OpenStreetMapProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openstreetmap
    }

    #[instrument(skip(self), fields(provider = "openstreetmap"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.geocode(query).await
    }

    #[instrument(skip(self), fields(provider = "openstreetmap"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        self.client.reverse(query).await
    }
}
