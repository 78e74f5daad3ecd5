//! MapQuest Geocoding API v1

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

const KIND: ProviderKind = ProviderKind::Mapquest;

/// MapQuest response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Response {
        pub info: Info,
        #[serde(default)]
        pub results: Vec<QueryResult>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Info {
        pub statuscode: i64,
        #[serde(default)]
        pub messages: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct QueryResult {
        #[serde(default)]
        pub locations: Vec<Location>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Location {
        pub lat_lng: LatLng,
        pub street: Option<String>,
        pub admin_area6: Option<String>,
        pub admin_area5: Option<String>,
        pub admin_area3: Option<String>,
        pub admin_area1: Option<String>,
        pub postal_code: Option<String>,
        pub geocode_quality: Option<String>,
        pub geocode_quality_code: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct LatLng {
        pub lat: f64,
        pub lng: f64,
    }
}

/// Configuration for [`MapQuestProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapQuestConfig {
    /// Consumer key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// API root (switch to `open.mapquestapi.com` for the open-data variant)
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_base_url() -> String {
    "https://www.mapquestapi.com/geocoding/v1".to_string()
}

impl MapQuestConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
        }
    }
}

/// MapQuest geocoder
pub struct MapQuestProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    base_url: String,
}

impl fmt::Debug for MapQuestProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapQuestProvider")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl MapQuestProvider {
    /// Create a new MapQuest provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &MapQuestConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
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
        let params = params.with("key", self.api_key.expose_secret());

        debug!(url = %url, "Sending MapQuest request");
        let raw = self.http.get(&url, &params).await?;
        let response: api::Response = decode(KIND, &raw)?;

        if response.info.statuscode != 0 {
            let message = if response.info.messages.is_empty() {
                format!("status {}", response.info.statuscode)
            } else {
                response.info.messages.join(", ")
            };
            return Err(GeocoderError::provider(KIND, message));
        }

        let data = response
            .results
            .into_iter()
            .flat_map(|result| result.locations)
            .map(map_location)
            .collect();
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_location(location: api::Location) -> ResultData {
    ResultData {
        country_code: non_empty(location.admin_area1),
        state: non_empty(location.admin_area3),
        city: non_empty(location.admin_area5),
        neighbourhood: non_empty(location.admin_area6),
        zipcode: non_empty(location.postal_code),
        street_name: non_empty(location.street),
        ..ResultData::new(location.lat_lng.lat, location.lat_lng.lng)
    }
    .with_extra("geocodeQuality", location.geocode_quality)
    .with_extra("geocodeQualityCode", location.geocode_quality_code)
}

#[async_trait]
impl GeocodeProvider for MapQuestProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "mapquest"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("location", &query.text)
            .with_opt("maxResults", query.limit);

        self.request("address", params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "mapquest"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new().with(
            "location",
            format!("{},{}", query.latitude(), query.longitude()),
        );

        self.request("reverse", params, query.limit).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    #[test]
    fn test_empty_api_key_rejected() {
        let err = MapQuestProvider::new(&MapQuestConfig::new(""), unused_http()).unwrap_err();
        assert_eq!(err.to_string(), "MapQuest needs an apiKey");
        assert!(MapQuestProvider::new(&MapQuestConfig::new("k"), unused_http()).is_ok());
    }

    #[tokio::test]
    async fn test_geocode_flattens_locations() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|url, params| {
                url.ends_with("/geocoding/v1/address")
                    && params.get("location") == Some("Denver, CO")
                    && params.get("key") == Some("k")
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "info": { "statuscode": 0, "messages": [] },
                    "results": [{
                        "providedLocation": { "location": "Denver, CO" },
                        "locations": [{
                            "street": "",
                            "adminArea5": "Denver",
                            "adminArea3": "CO",
                            "adminArea1": "US",
                            "postalCode": "",
                            "geocodeQuality": "CITY",
                            "geocodeQualityCode": "A5XAX",
                            "latLng": { "lat": 39.738_453, "lng": -104.984_853 }
                        }]
                    }]
                }))
            });

        let provider = MapQuestProvider::new(&MapQuestConfig::new("k"), Arc::new(http)).unwrap();
        let result = provider.geocode(&"Denver, CO".into()).await.unwrap();

        let data = &result.data[0];
        assert_eq!(data.city.as_deref(), Some("Denver"));
        assert_eq!(data.state.as_deref(), Some("CO"));
        assert_eq!(data.country_code.as_deref(), Some("US"));
        assert!(data.street_name.is_none());
        assert!(data.zipcode.is_none());
        assert_eq!(data.extra["geocodeQuality"], "CITY");
    }

    #[tokio::test]
    async fn test_nonzero_status_is_provider_error() {
        let mut http = https_mock();
        http.expect_get().times(1).returning(|_, _| {
            Ok(json!({
                "info": { "statuscode": 403, "messages": ["This key is not authorized for this service."] },
                "results": []
            }))
        });

        let provider = MapQuestProvider::new(&MapQuestConfig::new("k"), Arc::new(http)).unwrap();
        let err = provider
            .reverse(&ReverseQuery::new(39.7, -104.9).unwrap())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "MapQuest returned an error: This key is not authorized for this service."
        );
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider = MapQuestProvider::new(&MapQuestConfig::new("k"), unused_http()).unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "MapQuest does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "MapQuest does not support geocoding IPv6");
    }
}
