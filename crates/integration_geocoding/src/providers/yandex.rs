//! Yandex Geocoder HTTP API 1.x

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::decode;
use crate::provider::{non_empty, require_address, truncate};
use crate::{GeocodeProvider, GeocodeResult, GeocoderError, HttpAdapter, Params, ProviderKind};

const KIND: ProviderKind = ProviderKind::Yandex;

/// Yandex response structures
mod api {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Envelope {
        pub response: Response,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Response {
        pub geo_object_collection: Collection,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Collection {
        #[serde(default)]
        pub feature_member: Vec<Member>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Member {
        pub geo_object: GeoObject,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GeoObject {
        pub point: Point,
        #[serde(rename = "metaDataProperty")]
        pub meta_data_property: MetaDataProperty,
    }

    #[derive(Debug, Deserialize)]
    pub struct Point {
        /// `"<longitude> <latitude>"`
        pub pos: String,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct MetaDataProperty {
        pub geocoder_meta_data: GeocoderMetaData,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct GeocoderMetaData {
        #[serde(rename = "kind")]
        pub kind: Option<String>,
        #[serde(rename = "precision")]
        pub precision: Option<String>,
        #[serde(rename = "text")]
        pub text: Option<String>,
        #[serde(default)]
        pub address: Address,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct Address {
        #[serde(rename = "country_code")]
        pub country_code: Option<String>,
        #[serde(rename = "formatted")]
        pub formatted: Option<String>,
        #[serde(rename = "postal_code")]
        pub postal_code: Option<String>,
        #[serde(default)]
        pub components: Vec<Component>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Component {
        pub kind: String,
        pub name: String,
    }
}

/// Configuration for [`YandexProvider`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YandexConfig {
    /// API key (optional on legacy keyless plans)
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// API endpoint
    #[serde(default = "default_url")]
    pub url: String,

    /// Default result language (e.g. "en_US")
    #[serde(default)]
    pub language: Option<String>,
}

fn default_url() -> String {
    "https://geocode-maps.yandex.ru/1.x/".to_string()
}

impl Default for YandexConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: default_url(),
            language: None,
        }
    }
}

/// Yandex geocoder
pub struct YandexProvider {
    http: Arc<dyn HttpAdapter>,
    api_key: Option<SecretString>,
    url: String,
    language: Option<String>,
}

impl fmt::Debug for YandexProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YandexProvider")
            .field("url", &self.url)
            .field("has_api_key", &self.api_key.is_some())
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl YandexProvider {
    /// Create a new Yandex provider
    ///
    /// A blank API key is treated as no key.
    ///
    /// # Errors
    ///
    /// Never fails today; the signature matches the other providers.
    pub fn new(config: &YandexConfig, http: Arc<dyn HttpAdapter>) -> Result<Self, GeocoderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.expose_secret().trim().is_empty());

        Ok(Self {
            http,
            api_key,
            url: config.url.clone(),
            language: config.language.clone(),
        })
    }

    async fn request(
        &self,
        geocode: String,
        language: Option<&str>,
        limit: Option<u32>,
    ) -> Result<GeocodeResult, GeocoderError> {
        let mut params = Params::new()
            .with("geocode", geocode)
            .with("format", "json")
            .with_opt("results", limit)
            .with_opt("lang", language.or(self.language.as_deref()));
        if let Some(key) = &self.api_key {
            params.push("apikey", key.expose_secret());
        }

        debug!(url = %self.url, "Sending Yandex request");
        let raw = self.http.get(&self.url, &params).await?;

        if raw.get("response").is_none() {
            if let Some(message) = raw.get("message").and_then(Value::as_str) {
                return Err(GeocoderError::provider(KIND, message));
            }
        }

        let envelope: api::Envelope = decode(KIND, &raw)?;
        let data = envelope
            .response
            .geo_object_collection
            .feature_member
            .into_iter()
            .map(|member| map_geo_object(member.geo_object))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(GeocodeResult::new(truncate(data, limit), raw))
    }
}

fn map_geo_object(object: api::GeoObject) -> Result<ResultData, GeocoderError> {
    let (longitude, latitude) = object
        .point
        .pos
        .split_once(' ')
        .and_then(|(lon, lat)| Some((lon.parse().ok()?, lat.parse().ok()?)))
        .ok_or_else(|| GeocoderError::malformed(KIND, &format!("bad pos {:?}", object.point.pos)))?;

    let meta = object.meta_data_property.geocoder_meta_data;
    let mut data = ResultData {
        formatted_address: non_empty(meta.address.formatted).or(meta.text),
        country_code: non_empty(meta.address.country_code),
        zipcode: non_empty(meta.address.postal_code),
        ..ResultData::new(latitude, longitude)
    };

    for component in meta.address.components {
        match component.kind.as_str() {
            "country" => data.country = Some(component.name),
            // Provinces nest (federal district, then region); the last one is the most specific
            "province" => data.state = Some(component.name),
            "locality" if data.city.is_none() => data.city = Some(component.name),
            "district" if data.neighbourhood.is_none() => data.neighbourhood = Some(component.name),
            "street" => data.street_name = Some(component.name),
            "house" => data.street_number = Some(component.name),
            _ => {},
        }
    }

    Ok(data
        .with_extra("kind", meta.kind)
        .with_extra("precision", meta.precision))
}

#[async_trait]
impl GeocodeProvider for YandexProvider {
    fn kind(&self) -> ProviderKind {
        KIND
    }

    #[instrument(skip(self), fields(provider = "yandex"))]
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError> {
        require_address(KIND, query)?;
        self.request(query.text.clone(), query.language.as_deref(), query.limit)
            .await
    }

    #[instrument(skip(self), fields(provider = "yandex"))]
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError> {
        let geocode = format!("{},{}", query.longitude(), query.latitude());
        self.request(geocode, query.language.as_deref(), query.limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::providers::testing::{https_mock, unused_http};

    fn tverskaya() -> Value {
        json!({
            "response": {
                "GeoObjectCollection": {
                    "featureMember": [{
                        "GeoObject": {
                            "metaDataProperty": {
                                "GeocoderMetaData": {
                                    "precision": "exact",
                                    "text": "Россия, Москва, Тверская улица, 7",
                                    "kind": "house",
                                    "Address": {
                                        "country_code": "RU",
                                        "formatted": "Россия, Москва, Тверская улица, 7",
                                        "postal_code": "125009",
                                        "Components": [
                                            { "kind": "country", "name": "Россия" },
                                            { "kind": "province", "name": "Центральный федеральный округ" },
                                            { "kind": "province", "name": "Москва" },
                                            { "kind": "locality", "name": "Москва" },
                                            { "kind": "street", "name": "Тверская улица" },
                                            { "kind": "house", "name": "7" }
                                        ]
                                    }
                                }
                            },
                            "Point": { "pos": "37.611347 55.757998" }
                        }
                    }]
                }
            }
        })
    }

    #[test]
    fn test_key_is_optional() {
        assert!(YandexProvider::new(&YandexConfig::default(), unused_http()).is_ok());
    }

    #[tokio::test]
    async fn test_geocode_maps_components() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| {
                params.get("geocode") == Some("Тверская 7")
                    && params.get("format") == Some("json")
                    && params.get("apikey").is_none()
            })
            .times(1)
            .returning(|_, _| Ok(tverskaya()));

        let provider = YandexProvider::new(&YandexConfig::default(), Arc::new(http)).unwrap();
        let result = provider.geocode(&"Тверская 7".into()).await.unwrap();

        let data = &result.data[0];
        assert!((data.latitude - 55.757_998).abs() < f64::EPSILON);
        assert!((data.longitude - 37.611_347).abs() < f64::EPSILON);
        assert_eq!(data.country_code.as_deref(), Some("RU"));
        assert_eq!(data.state.as_deref(), Some("Москва"));
        assert_eq!(data.city.as_deref(), Some("Москва"));
        assert_eq!(data.street_name.as_deref(), Some("Тверская улица"));
        assert_eq!(data.street_number.as_deref(), Some("7"));
        assert_eq!(data.zipcode.as_deref(), Some("125009"));
        assert_eq!(data.extra["precision"], "exact");
    }

    #[tokio::test]
    async fn test_reverse_sends_lon_lat_with_key() {
        let mut http = https_mock();
        http.expect_get()
            .withf(|_, params| {
                params.get("geocode") == Some("37.611347,55.757998")
                    && params.get("apikey") == Some("k")
            })
            .times(1)
            .returning(|_, _| Ok(tverskaya()));

        let config = YandexConfig {
            api_key: Some(SecretString::from("k")),
            ..YandexConfig::default()
        };
        let provider = YandexProvider::new(&config, Arc::new(http)).unwrap();
        let result = provider
            .reverse(&ReverseQuery::new(55.757_998, 37.611_347).unwrap())
            .await
            .unwrap();
        assert_eq!(result.data.len(), 1);
    }

    #[tokio::test]
    async fn test_error_message_is_provider_error() {
        let mut http = https_mock();
        http.expect_get().times(1).returning(|_, _| {
            Ok(json!({ "statusCode": 403, "error": "Forbidden", "message": "Invalid key" }))
        });

        let provider = YandexProvider::new(&YandexConfig::default(), Arc::new(http)).unwrap();
        let err = provider.geocode(&"Moscow".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "Yandex returned an error: Invalid key");
    }

    #[tokio::test]
    async fn test_ip_queries_rejected() {
        let provider = YandexProvider::new(&YandexConfig::default(), unused_http()).unwrap();

        let err = provider.geocode(&"127.0.0.1".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "Yandex does not support geocoding IPv4");

        let err = provider
            .geocode(&"2001:0db8:0000:85a3:0000:0000:ac1f:8001".into())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Yandex does not support geocoding IPv6");
    }
}
