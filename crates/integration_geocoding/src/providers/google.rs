//! Google Maps Geocoding API client
//!
//! Client for the Geocoding API
//! (<https://developers.google.com/maps/documentation/geocoding>).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{base_url, require_address, require_secret, truncate};
use crate::{
    GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind,
};

const KIND: ProviderKind = ProviderKind::Google;

/// Google Geocoding API response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct GeocodeResponse {
        pub status: String,
        pub error_message: Option<String>,
        #[serde(default)]
        pub results: Vec<Place>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Place {
        pub formatted_address: Option<String>,
        pub geometry: Geometry,
        #[serde(default)]
        pub address_components: Vec<AddressComponent>,
        pub place_id: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Geometry {
        pub location: LatLng,
        pub location_type: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct LatLng {
        pub lat: f64,
        pub lng: f64,
    }

    #[derive(Debug, Deserialize)]
    pub struct AddressComponent {
        pub long_name: String,
        pub short_name: String,
        #[serde(default)]
        pub types: Vec<String>,
    }
}

/// Configuration for [`GoogleProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoogleConfig {
    /// Maps Platform API key
    #[serde(skip_serializing)]
    pub api_key: SecretString,

    /// API root
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default result language
    #[serde(default)]
    pub language: Option<String>,

    /// Default region bias (ccTLD, e.g. "de")
    #[serde(default)]
    pub region: Option<String>,
}

fn default_base_url() -> String {
    "https://maps.googleapis.com/maps/api/geocode".to_string()
}

impl GoogleConfig {
    /// Create a configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            base_url: default_base_url(),
            language: None,
            region: None,
        }
    }
}

/// Google Maps geocoder
pub struct GoogleProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: SecretString,
    url: String,
    language: Option<String>,
    region: Option<String>,
}

impl fmt::Debug for GoogleProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleProvider")
            .field("url", &self.url)
            .field("language", &self.language)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl GoogleProvider {
    /// Create a new Google provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the API key is blank.
    pub fn new(config: &GoogleConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        require_secret(KIND, &config.api_key, "an apiKey")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            url: format!("{}/json", base_url(&config.base_url)),
            language: config.language.clone(),
            region: config.region.clone(),
        })
    }

    async fn request(
        &self,
        params: Params,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let params = params.with("key", self.api_key.expose_secret());

        debug!(url = %self.url, "Sending Google geocoding request");
        let raw = self.http.get(&self.url, &params).await?;
        let response: api::GeocodeResponse = decode(KIND, &raw)?;

        let data = match response.status.as_str() {
            "OK" => response.results.into_iter().map(map_place).collect(),
            "ZERO_RESULTS" => Vec::new(),
            status => {
                return Err(GeocoderError::provider(
                    KIND,
                    response
                        .error_message
                        .map_or_else(|| status.to_string(), |m| format!("{status}: {m}")),
                ));
            },
        };

        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_place(place: api::Place) -> ResultData {
    let mut data = ResultData {
        formatted_address: place.formatted_address,
        ..ResultData::new(place.geometry.location.lat, place.geometry.location.lng)
    };

    for component in place.address_components {
        let has = |t: &str| component.types.iter().any(|ty| ty == t);
        if has("country") {
            data.country = Some(component.long_name.clone());
            data.country_code = Some(component.short_name.clone());
        } else if has("administrative_area_level_1") {
            data.state = Some(component.long_name.clone());
            data.state_code = Some(component.short_name.clone());
        } else if has("locality") || (has("postal_town") && data.city.is_none()) {
            data.city = Some(component.long_name.clone());
        } else if has("postal_code") {
            data.zipcode = Some(component.long_name.clone());
        } else if has("route") {
            data.street_name = Some(component.long_name.clone());
        } else if has("street_number") {
            data.street_number = Some(component.long_name.clone());
        } else if has("neighborhood") {
            data.neighbourhood = Some(component.long_name.clone());
        }
    }

    data.with_extra("googlePlaceId", place.place_id)
        .with_extra("locationType", place.geometry.location_type)
}

#[async_trait]
impl GeocodeProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "google"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;

        let params = Params::new()
            .with("address", &query.text)
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            )
            .with_opt(
                "region",
                query
                    .country_code
                    .as_deref()
                    .or(self.region.as_deref())
                    .map(str::to_lowercase),
            );

        self.request(params, query.limit).await
    }

    #[instrument(skip(self), fields(provider = "google"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = Params::new()
            .with(
                "latlng",
                format!("{},{}", query.latitude(), query.longitude()),
            )
            .with_opt(
                "language",
                query.language.as_deref().or(self.language.as_deref()),
            );

        self.request(params, query.limit).await
    }
}
