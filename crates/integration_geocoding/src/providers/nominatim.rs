//! Nominatim-shaped API shared by OpenStreetMap, LocationIQ and PickPoint

use std::fmt;
use std::sync::Arc;

use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use super::decode;
use crate::provider::{non_empty, require_address, truncate};
use crate::{GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

/// Nominatim response structures
pub(super) mod api {
    use serde::Deserialize;

    use crate::provider::de;

    #[derive(Debug, Deserialize)]
    pub struct Place {
        #[serde(deserialize_with = "de::f64_lenient")]
        pub lat: f64,
        #[serde(deserialize_with = "de::f64_lenient")]
        pub lon: f64,
        pub display_name: Option<String>,
        pub place_id: Option<serde_json::Value>,
        pub osm_type: Option<String>,
        pub osm_id: Option<serde_json::Value>,
        #[serde(rename = "type")]
        pub place_type: Option<String>,
        pub importance: Option<f64>,
        #[serde(default)]
        pub address: Address,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Address {
        pub house_number: Option<String>,
        pub road: Option<String>,
        pub neighbourhood: Option<String>,
        pub suburb: Option<String>,
        pub city: Option<String>,
        pub town: Option<String>,
        pub village: Option<String>,
        pub hamlet: Option<String>,
        pub state: Option<String>,
        pub postcode: Option<String>,
        pub country: Option<String>,
        pub country_code: Option<String>,
    }
}

/// Where the credential goes, if the service needs one
pub(super) struct ApiKey {
    pub param: &'static str,
    pub value: SecretString,
}

/// Request builder and response mapper for one Nominatim-shaped service
pub(super) struct NominatimClient {
    pub kind: ProviderKind,
    pub http: Arc<dyn HttpAdapter>,
    pub search_url: String,
    pub reverse_url: String,
    pub api_key: Option<ApiKey>,
    pub email: Option<String>,
    pub language: Option<String>,
}

impl fmt::Debug for NominatimClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NominatimClient")
            .field("kind", &self.kind)
            .field("search_url", &self.search_url)
            .field("reverse_url", &self.reverse_url)
            .field("email", &self.email)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl NominatimClient {
    fn base_params(&self, language: Option<&str>) -> Params {
        let mut params = Params::new()
            .with("format", "json")
            .with("addressdetails", 1)
            .with_opt("email", self.email.as_deref())
            .with_opt("accept-language", language.or(self.language.as_deref()));
        if let Some(key) = &self.api_key {
            params.push(key.param, key.value.expose_secret());
        }
        params
    }

    /// Nominatim answers some failures with `{"error": "..."}`
    fn check_error(&self, raw: &Value) -> Result<(), GeocoderError> {
        match raw.get("error") {
            Some(Value::String(message)) => Err(GeocoderError::provider(self.kind, message.clone())),
            Some(error) => Err(GeocoderError::provider(
                self.kind,
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .map_or_else(|| error.to_string(), str::to_string),
            )),
            None => Ok(()),
        }
    }

    pub async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(self.kind, query)?;

        let params = self
            .base_params(query.language.as_deref())
            .with("q", &query.text)
            .with_opt("limit", query.limit)
            .with_opt(
                "countrycodes",
                query.country_code.as_deref().map(str::to_lowercase),
            );

        debug!(url = %self.search_url, "Sending search request");
        let raw = self.http.get(&self.search_url, &params).await?;
        self.check_error(&raw)?;

        let places: Vec<api::Place> = decode(self.kind, &raw)?;
        let data = truncate(places.into_iter().map(map_place).collect(), query.limit);
        Ok(GeocodeResult::new(data, raw))
    }

    pub async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let params = self
            .base_params(query.language.as_deref())
            .with("lat", query.latitude())
            .with("lon", query.longitude());

        debug!(url = %self.reverse_url, "Sending reverse request");
        let raw = self.http.get(&self.reverse_url, &params).await?;
        self.check_error(&raw)?;

        let place: api::Place = decode(self.kind, &raw)?;
        Ok(GeocodeResult::new(vec![map_place(place)], raw))
    }
}

pub(super) fn map_place(place: api::Place) -> ResultData {
    let address = place.address;
    let city = [
        address.city,
        address.town,
        address.village,
        address.hamlet,
    ]
    .into_iter()
    .find_map(non_empty);

    ResultData {
        formatted_address: non_empty(place.display_name),
        country: non_empty(address.country),
        country_code: non_empty(address.country_code).map(|c| c.to_uppercase()),
        state: non_empty(address.state),
        city,
        zipcode: non_empty(address.postcode),
        street_name: non_empty(address.road),
        street_number: non_empty(address.house_number),
        neighbourhood: non_empty(address.neighbourhood).or_else(|| non_empty(address.suburb)),
        ..ResultData::new(place.lat, place.lon)
    }
    .with_extra("placeId", place.place_id.unwrap_or(Value::Null))
    .with_extra("osmType", place.osm_type)
    .with_extra("osmId", place.osm_id.unwrap_or(Value::Null))
    .with_extra("type", place.place_type)
    .with_extra("importance", place.importance)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_map_place_prefers_city_then_town() {
        let place: api::Place = serde_json::from_value(json!({
            "lat": "48.8588897",
            "lon": "2.3200410",
            "display_name": "Paris, Île-de-France, France",
            "place_id": 88_066_702,
            "osm_type": "relation",
            "importance": 0.96,
            "address": {
                "town": "Paris",
                "state": "Île-de-France",
                "country": "France",
                "country_code": "fr"
            }
        }))
        .unwrap();

        let data = map_place(place);
        assert!((data.latitude - 48.858_889_7).abs() < 1e-9);
        assert_eq!(data.city.as_deref(), Some("Paris"));
        assert_eq!(data.country_code.as_deref(), Some("FR"));
        assert_eq!(data.extra["placeId"], json!(88_066_702));
        assert_eq!(data.extra["osmType"], json!("relation"));
        assert!(!data.extra.contains_key("osmId"));
    }

    #[test]
    fn test_map_place_suburb_fallback() {
        let place: api::Place = serde_json::from_value(json!({
            "lat": 1.0,
            "lon": 2.0,
            "address": { "suburb": "Mitte", "city": "Berlin" }
        }))
        .unwrap();

        let data = map_place(place);
        assert_eq!(data.neighbourhood.as_deref(), Some("Mitte"));
        assert_eq!(data.city.as_deref(), Some("Berlin"));
    }
}
