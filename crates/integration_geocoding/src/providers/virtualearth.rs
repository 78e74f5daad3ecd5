//! Bing Maps (VirtualEarth) Locations API

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, non_empty, require_address, require_secret, truncate};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Virtualearth;

/// Bing Maps REST response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Response {
        pub status_code: u16,
        pub status_description: Option<String>,
        #[serde(default)]
        pub error_details: Vec<String>,
        #[serde(default)]
        pub resource_sets: Vec<ResourceSet>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ResourceSet {
        #[serde(default)]
        pub resources: Vec<Location>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Location {
        pub point: Point,
        #[serde(default)]
        pub address: Address,
        pub confidence: Option<String>,
        pub entity_type: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Point {
        /// `[latitude, longitude]`
        pub coordinates: (f64, f64),
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Address {
        pub address_line: Option<String>,
        pub admin_district: Option<String>,
        pub country_region: Option<String>,
        pub country_region_iso2: Option<String>,
        pub formatted_address: Option<String>,
        pub locality: Option<String>,
        pub neighborhood: Option<String>,
        pub postal_code: Option<String>,
    }
}

/// Configuration for [`VirtualEarthProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VirtualEarthConfig {
    /// Bing Maps key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// Locations API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default culture (e.g. "en-US")
    #[serde(default)]
    pub culture: Option<String>,
}

fn default_base_url() -> String {
    "https://dev.virtualearth.net/REST/v1/Locations".to_string()
}

impl VirtualEarthConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
            culture: None,
        }
    }
}

/// Bing Maps geocoder
pub struct VirtualEarthProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    base_url: String,
    culture: Option<String>,
}

impl fmt::Debug for VirtualEarthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualEarthProvider")
            .field("base_url", &self.base_url)
            .field("culture", &self.culture)
            .finish_non_exhaustive()
    }
}

impl VirtualEarthProvider {
    /// Create a new Bing Maps provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(
        config: &VirtualEarthConfig,
        http: Arc<dyn HttpAdapter>,
    ) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: base_url(&config.base_url),
            culture: config.culture.clone(),
        })
    }

    async fn request(
        &self,
        url: &str,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let params = params
            .with("key", self.api_key.expose_secret())
            .with("incl", "ciso2");

        debug!(url = %url, "Sending Bing Maps request");
        let raw = self.http.get(url, &params).await?;
        let response: api::Response = decode(KIND, &raw)?;

        if response.status_code != 200 {
            let message = if response.error_details.is_empty() {
                response
                    .status_description
                    .unwrap_or_else(|| format!("status {}", response.status_code))
            } else {
                response.error_details.join(" ")
            };
            return Err(GeocoderError::provider(KIND, message));
        }

        let data = response
            .resource_sets
            .into_iter()
            .flat_map(|set| set.resources)
            .map(map_location)
            .collect();
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_location(location: api::Location) -> ResultData {
    let (latitude, longitude) = location.point.coordinates;
    let address = location.address;
    ResultData {
        formatted_address: non_empty(address.formatted_address),
        country: non_empty(address.country_region),
        country_code: non_empty(address.country_region_iso2),
        state: non_empty(address.admin_district),
        city: non_empty(address.locality),
        zipcode: non_empty(address.postal_code),
        street_name: non_empty(address.address_line),
        neighbourhood: non_empty(address.neighborhood),
        ..ResultData::new(latitude, longitude)
    }
    .with_extra("confidence", location.confidence)
    .with_extra("entityType", location.entity_type)
}

#[async_trait]
impl GeocodeProvider for VirtualEarthProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "virtualearth"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("q", &query.text)
            .with_opt("maxResults", query.limit)
            .with_opt(
                "culture",
                query.language.as_deref().or(self.culture.as_deref()),
            );

        self.request(&self.base_url, params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "virtualearth"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let url = format!(
            "{}/{},{}",
            self.base_url,
            query.latitude(),
            query.longitude()
        );
        let params = Params::new().with_opt(
            "culture",
            query.language.as_deref().or(self.culture.as_deref()),
        );

        self.request(&url, params, query.limit).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    #[test]
    fn test_empty_api_key_rejected() {
        let err =
            VirtualEarthProvider::new(&VirtualEarthConfig::new(""), unused_http()).unwrap_err();
        assert_eq!(err.to_string(), "VirtualEarth needs an apiKey");
        assert!(VirtualEarthProvider::new(&VirtualEarthConfig::new("k"), unused_http()).is_ok());
    }

    #[tokio::test]
    async fn test_geocode_maps_resources() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, params| {
                url.ends_with("/REST/v1/Locations")
                    && params.get("q") == Some("1 Microsoft Way, Redmond")
                    && params.get("incl") == Some("ciso2")
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "statusCode": 200,
                    "statusDescription": "OK",
                    "resourceSets": [{
                        "estimatedTotal": 1,
                        "resources": [{
                            "point": { "type": "Point", "coordinates": [47.640_568, -122.129_372] },
                            "address": {
                                "addressLine": "1 Microsoft Way",
                                "adminDistrict": "WA",
                                "countryRegion": "United States",
                                "countryRegionIso2": "US",
                                "formattedAddress": "1 Microsoft Way, Redmond, WA 98052",
                                "locality": "Redmond",
                                "postalCode": "98052"
                            },
                            "confidence": "High",
                            "entityType": "Address"
                        }]
                    }]
                }))
            });

        let provider =
            VirtualEarthProvider::new(&VirtualEarthConfig::new("k"), Arc::new(http)).unwrap();
        let result = provider
            .geocode(&"1 Microsoft Way, Redmond".into())
            .await
            .unwrap();

        let data = &result.data[0];
        assert!((data.latitude - 47.640_568).abs() < f64::EPSILON);
        assert_eq!(data.street_name.as_deref(), Some("1 Microsoft Way"));
        assert_eq!(data.country_code.as_deref(), Some("US"));
        assert_eq!(data.extra["confidence"], "High");
    }

    #[tokio::test]
    async fn test_error_status_is_provider_error() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, _| url.ends_with("/Locations/47.6,-122.1"))
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "statusCode": 401,
                    "statusDescription": "Unauthorized",
                    "errorDetails": ["Access was denied."],
                    "resourceSets": []
                }))
            });

        let provider =
            VirtualEarthProvider::new(&VirtualEarthConfig::new("k"), Arc::new(http)).unwrap();
        let err = provider
            .reverse(&ReverseQuery::new(47.6, -122.1).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "VirtualEarth returned an error: Access was denied."
        );
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider =
            VirtualEarthProvider::new(&VirtualEarthConfig::new("k"), unused_http()).unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "VirtualEarth does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "VirtualEarth does not support geocoding IPv6");
    }
}
