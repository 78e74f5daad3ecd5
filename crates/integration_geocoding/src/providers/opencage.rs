//! OpenCage Geocoder

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{de, non_empty, require_address, require_secret, truncate};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Opencage;

/// OpenCage response structures
mod api {
    use serde::Deserialize;

    use crate::provider::de;

    #[derive(Debug, Deserialize)]
    pub struct Response {
        pub status: Status,
        #[serde(default)]
        pub results: Vec<Place>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Status {
        pub code: u16,
        pub message: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Place {
        pub geometry: Geometry,
        pub formatted: Option<String>,
        pub confidence: Option<u8>,
        #[serde(default)]
        pub components: Components,
    }

    #[derive(Debug, Deserialize)]
    pub struct Geometry {
        pub lat: f64,
        pub lng: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Components {
        #[serde(default, deserialize_with = "de::string_lenient")]
        pub house_number: Option<String>,
        pub road: Option<String>,
        pub neighbourhood: Option<String>,
        pub suburb: Option<String>,
        pub city: Option<String>,
        pub town: Option<String>,
        pub village: Option<String>,
        pub state: Option<String>,
        pub state_code: Option<String>,
        #[serde(default, deserialize_with = "de::string_lenient")]
        pub postcode: Option<String>,
        pub country: Option<String>,
        #[serde(rename = "ISO_3166-1_alpha-2")]
        pub iso_country_code: Option<String>,
        pub country_code: Option<String>,
    }
}

/// Configuration for [`OpenCageProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenCageConfig {
    /// API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// API endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Default minimum confidence (1-10) when the query sets none
    #[serde(default, deserialize_with = "de::option_u8_lenient")]
    pub min_confidence: Option<u8>,

    /// Default result language
    #[serde(default)]
    pub language: Option<String>,
}

fn default_url() -> String {
    "https://api.opencagedata.com/geocode/v1/json".to_string()
}

impl OpenCageConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            url: default_url(),
            min_confidence: None,
            language: None,
        }
    }
}

/// OpenCage geocoder
pub struct OpenCageProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    url: String,
    min_confidence: Option<u8>,
    language: Option<String>,
}

impl fmt::Debug for OpenCageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenCageProvider")
            .field("url", &self.url)
            .field("min_confidence", &self.min_confidence)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl OpenCageProvider {
    /// Create a new OpenCage provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &OpenCageConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            url: config.url.clone(),
            min_confidence: config.min_confidence,
            language: config.language.clone(),
        })
    }

    async fn request(
        &self,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let params = params.with("key", self.api_key.expose_secret());

        debug!(url = %self.url, "Sending OpenCage request");
        let raw = self.http.get(&self.url, &params).await?;
        let response: api::Response = decode(KIND, &raw)?;

        if response.status.code != 200 {
            return Err(GeocoderError::provider(KIND, response.status.message));
        }

        let data = response.results.into_iter().map(map_place).collect();
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_place(place: api::Place) -> ResultData {
    let components = place.components;
    let city = [components.city, components.town, components.village]
        .into_iter()
        .find_map(non_empty);

    ResultData {
        formatted_address: non_empty(place.formatted),
        country: non_empty(components.country),
        country_code: non_empty(components.iso_country_code)
            .or_else(|| non_empty(components.country_code))
            .map(|c| c.to_uppercase()),
        state: non_empty(components.state),
        state_code: non_empty(components.state_code),
        city,
        zipcode: non_empty(components.postcode),
        street_name: non_empty(components.road),
        street_number: non_empty(components.house_number),
        neighbourhood: non_empty(components.neighbourhood)
            .or_else(|| non_empty(components.suburb)),
        ..ResultData::new(place.geometry.lat, place.geometry.lng)
    }
    .with_extra("confidence", place.confidence)
}

#[async_trait]
impl GeocodeProvider for OpenCageProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "opencage"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("q", &query.text)
            .with_opt("limit", query.limit)
            .with_opt(
                "countrycode",
                query.country_code.as_deref().map(str::to_lowercase),
            )
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            )
            .with_opt("min_confidence", query.min_confidence.or(self.min_confidence));

        self.request(params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "opencage"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new()
            .with("q", format!("{},{}", query.latitude(), query.longitude()))
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            );

        self.request(params, query.limit).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    #[test]
    fn test_empty_api_key_rejected() {
        let err = OpenCageProvider::new(&OpenCageConfig::new(""), unused_http()).unwrap_err();
        assert_eq!(err.to_string(), "OpenCage needs an apiKey");
        assert!(OpenCageProvider::new(&OpenCageConfig::new("k"), unused_http()).is_ok());
    }

    #[tokio::test]
    async fn test_geocode_sends_min_confidence() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| {
                params.get("q") == Some("Brandenburger Tor")
                    && params.get("min_confidence") == Some("7")
                    && params.get("key") == Some("k")
            })
            .times(1)
            .returning(|_, _| {
                Ok(json!({
                    "status": { "code": 200, "message": "OK" },
                    "results": [{
                        "confidence": 9,
                        "formatted": "Brandenburger Tor, Pariser Platz, 10117 Berlin, Germany",
                        "geometry": { "lat": 52.516_266_4, "lng": 13.377_704_1 },
                        "components": {
                            "ISO_3166-1_alpha-2": "DE",
                            "road": "Pariser Platz",
                            "suburb": "Mitte",
                            "city": "Berlin",
                            "state": "Berlin",
                            "state_code": "BE",
                            "postcode": 10117,
                            "country": "Germany",
                            "country_code": "de"
                        }
                    }]
                }))
            });

        let config = OpenCageConfig {
            min_confidence: Some(3),
            ..OpenCageConfig::new("k")
        };
        let provider = OpenCageProvider::new(&config, Arc::new(http)).unwrap();
        let query = GeocodeQuery::new("Brandenburger Tor").with_min_confidence(7);
        let result = provider.geocode(&query).await.unwrap();

        let data = &result.data[0];
        assert_eq!(data.zipcode.as_deref(), Some("10117"));
        assert_eq!(data.country_code.as_deref(), Some("DE"));
        assert_eq!(data.neighbourhood.as_deref(), Some("Mitte"));
        assert_eq!(data.extra["confidence"], 9);
    }

    #[tokio::test]
    async fn test_config_min_confidence_is_default() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| params.get("min_confidence") == Some("3"))
            .times(1)
            .returning(|_, _| {
                Ok(json!({ "status": { "code": 200, "message": "OK" }, "results": [] }))
            });

        let config = OpenCageConfig {
            min_confidence: Some(3),
            ..OpenCageConfig::new("k")
        };
        let provider = OpenCageProvider::new(&config, Arc::new(http)).unwrap();
        let result = provider.geocode(&"Berlin".into()).await.unwrap();
        assert!(!result.has_results());
    }

    #[tokio::test]
    async fn test_non_200_status_is_provider_error() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| params.get("q") == Some("52.5,13.4"))
            .times(1)
            .returning(|_, _| {
                Ok(json!({ "status": { "code": 402, "message": "quota exceeded" }, "results": [] }))
            });

        let provider = OpenCageProvider::new(&OpenCageConfig::new("k"), Arc::new(http)).unwrap();
        let err = provider
            .reverse(&ReverseQuery::new(52.5, 13.4).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OpenCage returned an error: quota exceeded");
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider = OpenCageProvider::new(&OpenCageConfig::new("k"), unused_http()).unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "OpenCage does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "OpenCage does not support geocoding IPv6");
    }
}
