#![forbid(unsafe_code)]
//! Geocoding integration for GeoUnify
//!
//! One interface over fifteen geocoding web services. Every provider turns
//! addresses (or IP addresses) into coordinates, most also turn coordinates
//! into addresses, and all of them answer with the same [`ResultData`] shape.
//!
//! # Architecture
//!
//! Each service has an adapter implementing [`GeocodeProvider`] with its own
//! validated configuration struct. Adapters never talk to the network
//! directly; they go through an injected [`HttpAdapter`], which makes them
//! testable with a mocked transport and swappable.
//! The [`Geocoder`] facade builds the adapter selected by a
//! [`ProviderConfig`] and adds optional result formatting.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_geocoding::{Geocoder, GeocoderConfig, ProviderConfig, OpenStreetMapConfig};
//!
//! let config = GeocoderConfig::new(ProviderConfig::OpenStreetMap(OpenStreetMapConfig::default()));
//! let geocoder = Geocoder::from_config(&config)?;
//!
//! let result = geocoder.geocode("29 champs elysée paris").await?;
//! for place in &result.data {
//!     println!("{}, {}", place.latitude, place.longitude);
//! }
//! ```

mod config;
mod error;
pub mod formatter;
pub mod http;
mod kind;
mod models;
mod provider;
pub mod providers;
mod token_cache;
mod urlencoding;

pub use config::{FormatterConfig, GeocoderConfig, ProviderConfig};
pub use error::{GeocoderError, HttpError};
pub use formatter::{Formatter, GpxFormatter, StringFormatter};
pub use http::{HttpAdapter, HttpConfig, Params, ReqwestHttpAdapter};
pub use kind::ProviderKind;
pub use models::{BatchItem, BatchResult, GeocodeResult};
pub use provider::{GeocodeProvider, fan_out};
pub use providers::*;
pub use token_cache::{CachedToken, Clock, DEFAULT_SAFETY_MARGIN, SystemClock, TokenCache};

pub use domain::{GeocodeQuery, QueryKind, ResultData, ReverseQuery};

use std::sync::Arc;

use tracing::{debug, info};

/// Provider-independent geocoder
///
/// Wraps exactly one provider adapter. Queries, results and errors have the
/// same shape whichever provider is configured.
#[derive(Debug, Clone)]
pub struct Geocoder {
    provider: Arc<dyn GeocodeProvider>,
    formatter: Option<Arc<dyn Formatter>>,
    no_results_is_error: bool,
}

impl Geocoder {
    /// Build the adapter selected by `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider settings are unusable
    /// (missing credentials, no HTTPS where HTTPS is mandatory).
    pub fn new(config: &ProviderConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        let provider: Arc<dyn GeocodeProvider> = match config {
            ProviderConfig::Agol(c) => Arc::new(AgolProvider::new(c, http)?),
            ProviderConfig::Freegeoip(c) => Arc::new(FreegeoipProvider::new(c, http)?),
            ProviderConfig::Geocodio(c) => Arc::new(GeocodioProvider::new(c, http)?),
            ProviderConfig::Google(c) => Arc::new(GoogleProvider::new(c, http)?),
            ProviderConfig::Here(c) => Arc::new(HereProvider::new(c, http)?),
            ProviderConfig::LocationIq(c) => Arc::new(LocationIqProvider::new(c, http)?),
            ProviderConfig::Mapbox(c) => Arc::new(MapboxProvider::new(c, http)?),
            ProviderConfig::MapQuest(c) => Arc::new(MapQuestProvider::new(c, http)?),
            ProviderConfig::OpenCage(c) => Arc::new(OpenCageProvider::new(c, http)?),
            ProviderConfig::OpenStreetMap(c) => Arc::new(OpenStreetMapProvider::new(c, http)?),
            ProviderConfig::PickPoint(c) => Arc::new(PickPointProvider::new(c, http)?),
            ProviderConfig::SmartyStreets(c) => Arc::new(SmartyStreetsProvider::new(c, http)?),
            ProviderConfig::TomTom(c) => Arc::new(TomTomProvider::new(c, http)?),
            ProviderConfig::VirtualEarth(c) => Arc::new(VirtualEarthProvider::new(c, http)?),
            ProviderConfig::Yandex(c) => Arc::new(YandexProvider::new(c, http)?),
        };

        debug!(provider = provider.provider_name(), "Geocoder created");
        Ok(Self::with_provider(provider))
    }

    /// Build a geocoder with the default `reqwest` HTTP adapter
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be initialized.
    pub fn from_config(config: &GeocoderConfig) -> Result<Self, GeocoderError> {
        let http = Arc::new(ReqwestHttpAdapter::new(&config.http)?);
        let mut geocoder = Self::new(&config.provider, http)?;

        if let Some(selected) = &config.formatter {
            geocoder.formatter = Some(Arc::from(formatter::from_config(
                selected,
                config.provider.kind(),
            )?));
        }
        geocoder.no_results_is_error = config.no_results_is_error;

        info!(
            provider = geocoder.provider_name(),
            timeout_secs = config.http.timeout_secs,
            "Geocoder configured"
        );
        Ok(geocoder)
    }

    /// Wrap an already constructed provider
    #[must_use]
    pub fn with_provider(provider: Arc<dyn GeocodeProvider>) -> Self {
        Self {
            provider,
            formatter: None,
            no_results_is_error: false,
        }
    }

    /// Attach a result formatter
    #[must_use]
    pub fn with_formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Report empty result lists as [`GeocoderError::NoResults`]
    #[must_use]
    pub const fn no_results_is_error(mut self, enabled: bool) -> Self {
        self.no_results_is_error = enabled;
        self
    }

    /// The wrapped provider
    #[must_use]
    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Identifier of the wrapped provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Geocode an address or IP address
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or `NoResults` if enabled and nothing
    /// was found.
    pub async fn geocode(
        &self,
        query: impl Into<GeocodeQuery>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let query = query.into();
        let result = self.provider.geocode(&query).await?;
        debug!(results = result.data.len(), "Geocode completed");
        self.check_empty(result, &query.text)
    }

    /// Reverse geocode a point
    ///
    /// # Errors
    ///
    /// Returns the provider's error, or `NoResults` if enabled and nothing
    /// was found.
    pub async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let result = self.provider.reverse(query).await?;
        debug!(results = result.data.len(), "Reverse geocode completed");
        self.check_empty(
            result,
            &format!("{},{}", query.latitude(), query.longitude()),
        )
    }

    /// Geocode several queries, one slot per query in input order
    ///
    /// Failures are reported per slot; the call itself only fails when a
    /// native batch request fails as a whole.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if its batch request fails.
    pub async fn batch_geocode<I>(&self, queries: I) -> Result<BatchResult, GeocoderError>
    where
        I: IntoIterator,
        I::Item: Into<GeocodeQuery>,
    {
        let queries: Vec<GeocodeQuery> = queries.into_iter().map(Into::into).collect();
        let mut batch = self.provider.batch_geocode(&queries).await?;

        if self.no_results_is_error {
            for (item, query) in batch.data.iter_mut().zip(&queries) {
                if item.is_ok() && item.data.is_empty() {
                    *item = BatchItem::failed(self.no_results(&query.text));
                }
            }
        }

        debug!(
            queries = queries.len(),
            failures = batch.failures(),
            "Batch geocode completed"
        );
        Ok(batch)
    }

    /// Format results with the configured formatter
    ///
    /// Returns `None` when no formatter is attached.
    #[must_use]
    pub fn format(&self, results: &[ResultData]) -> Option<String> {
        self.formatter
            .as_ref()
            .map(|formatter| formatter.format(results))
    }

    fn check_empty(
        &self,
        result: GeocodeResult,
        query: &str,
    ) -> Result<GeocodeResult, GeocoderError> {
        if self.no_results_is_error && !result.has_results() {
            return Err(self.no_results(query));
        }
        Ok(result)
    }

    fn no_results(&self, query: &str) -> GeocoderError {
        GeocoderError::NoResults {
            provider: self.kind().display_name(),
            query: query.to_string(),
        }
    }
}
