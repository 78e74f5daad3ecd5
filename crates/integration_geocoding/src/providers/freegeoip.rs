//! freegeoip IP geolocation
//!
//! Only IP addresses can be located; there is no reverse geocoding.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, non_empty, require_ip};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Freegeoip;

/// freegeoip response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Location {
        pub ip: Option<String>,
        pub country_code: Option<String>,
        pub country_name: Option<String>,
        pub region_code: Option<String>,
        pub region_name: Option<String>,
        pub city: Option<String>,
        pub zip_code: Option<String>,
        pub time_zone: Option<String>,
        pub latitude: f64,
        pub longitude: f64,
        pub metro_code: Option<serde_json::Value>,
    }
}

/// Configuration for [`FreegeoipProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreegeoipConfig {
    /// Service host (self-hosted freegeoip instances work too)
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "https://freegeoip.app".to_string()
}

impl Default for FreegeoipConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

/// freegeoip geocoder
pub struct FreegeoipProvider {
    http: Arc<dyn HttpAdapter>,
    host: String,
}

impl fmt::Debug for FreegeoipProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FreegeoipProvider")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl FreegeoipProvider {
    /// Create a new freegeoip provider
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the other providers.
    pub fn new(config: &FreegeoipConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        Ok(Self {
            http,
            host: base_url(&config.host),
        })
    }
}

fn map_location(location: api::Location) -> ResultData {
    ResultData {
        country: non_empty(location.country_name),
        country_code: non_empty(location.country_code),
        state: non_empty(location.region_name),
        state_code: non_empty(location.region_code),
        city: non_empty(location.city),
        zipcode: non_empty(location.zip_code),
        ..ResultData::new(location.latitude, location.longitude)
    }
    .with_extra("ip", location.ip)
    .with_extra("timeZone", non_empty(location.time_zone))
    .with_extra("metroCode", location.metro_code)
}

#[async_trait]
impl GeocodeProvider for FreegeoipProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "freegeoip"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_ip(KIND, query)?;

        let url = format!("{}/json/{}", self.host, query.text.trim());
        debug!(url = %url, "Sending freegeoip request");
        let raw = self.http.get(&url, &Params::new()).await?;

        let data = vec![map_location(decode(KIND, &raw)?)];
        Ok(GeocodeResult::new(data, raw))
    }

    async fn reverse(&self, _query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        Err(GeocoderError::unsupported(KIND, "reverse geocoding"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    #[tokio::test]
    async fn test_address_rejected() {
        let provider = FreegeoipProvider::new(&FreegeoipConfig::default(), unused_http()).unwrap();
        let err = provider.geocode(&"1231 Main St".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "Freegeoip does not support geocoding address");
    }

    #[tokio::test]
    async fn test_reverse_rejected_without_request() {
        let provider = FreegeoipProvider::new(&FreegeoipConfig::default(), unused_http()).unwrap();
        let err = provider
            .reverse(&ReverseQuery::new(1.0, 2.0).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Freegeoip does not support reverse geocoding");
    }

    #[tokio::test]
    async fn test_geocode_ip() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, params| url.ends_with("/json/8.8.8.8") && params.is_empty())
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "ip": "8.8.8.8",
                    "country_code": "US",
                    "country_name": "United States",
                    "region_code": "CA",
                    "region_name": "California",
                    "city": "Mountain View",
                    "zip_code": "94035",
                    "time_zone": "America/Los_Angeles",
                    "latitude": 37.386,
                    "longitude": -122.0838,
                    "metro_code": 807
                }))
            });

        let provider = FreegeoipProvider::new(&FreegeoipConfig::default(), Arc::new(http)).unwrap();
        let result = provider.geocode(&"8.8.8.8".into()).await.unwrap();

        let data = &result.data[0];
        assert_eq!(data.city.as_deref(), Some("Mountain View"));
        assert_eq!(data.state_code.as_deref(), Some("CA"));
        assert_eq!(data.extra["timeZone"], "America/Los_Angeles");
        assert_eq!(data.extra["metroCode"], 807);
    }

    #[tokio::test]
    async fn test_ipv6_accepted() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, _| url.ends_with("/json/2001:4860:4860::8888"))
            .times(1)
            .returning(|_, _| Ok(json!({ "latitude": 37.751, "longitude": -97.822 })));

        let provider = FreegeoipProvider::new(&FreegeoipConfig::default(), Arc::new(http)).unwrap();
        let result = provider
            .geocode(&"2001:4860:4860::8888".into())
            .await
            .unwrap();
        assert_eq!(result.data.len(), 1);
    }
}
