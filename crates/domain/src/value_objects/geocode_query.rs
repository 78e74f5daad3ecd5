//! Forward and reverse geocoding queries

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::Coordinates;

/// What the text of a [`GeocodeQuery`] looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Free-form address or place name
    Address,
    /// Dotted IPv4 address
    Ipv4,
    /// IPv6 address
    Ipv6,
}

/// A forward geocoding query
///
/// The text is either an address or an IP address. The optional hints are
/// passed to providers that understand them and ignored by the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeQuery {
    /// Address, place name or IP address
    pub text: String,

    /// Maximum number of results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// ISO 3166-1 country code used to bias or filter results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    /// Preferred result language (e.g., "en", "de")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Minimum confidence accepted by providers that score results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<u8>,
}

impl GeocodeQuery {
    /// Create a query from free-form text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Limit the number of results
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict or bias results to a country
    #[must_use]
    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }

    /// Ask for results in a given language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Drop results scored below `min_confidence`
    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: u8) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    /// Classify the query text
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        let text = self.text.trim();
        if text.parse::<Ipv4Addr>().is_ok() {
            QueryKind::Ipv4
        } else if text.parse::<Ipv6Addr>().is_ok() {
            QueryKind::Ipv6
        } else {
            QueryKind::Address
        }
    }

    /// The query text parsed as an IP address, if it is one
    #[must_use]
    pub fn ip(&self) -> Option<IpAddr> {
        self.text.trim().parse().ok()
    }
}

impl From<&str> for GeocodeQuery {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for GeocodeQuery {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

/// A reverse geocoding query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseQuery {
    /// Point to resolve
    pub coordinates: Coordinates,

    /// Preferred result language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Maximum number of results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl ReverseQuery {
    /// Create a reverse query for a point
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCoordinates` if either value is not finite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        Ok(Self::from(Coordinates::new(latitude, longitude)?))
    }

    /// Ask for results in a given language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Limit the number of results
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Latitude of the queried point
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.coordinates.latitude()
    }

    /// Longitude of the queried point
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.coordinates.longitude()
    }
}

impl From<Coordinates> for ReverseQuery {
    fn from(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            language: None,
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_kind() {
        assert_eq!(GeocodeQuery::from("1231 Main St").kind(), QueryKind::Address);
        assert_eq!(GeocodeQuery::from("").kind(), QueryKind::Address);
        assert_eq!(GeocodeQuery::from("256.1.1.1").kind(), QueryKind::Address);
    }

    #[test]
    fn test_ipv4_kind() {
        assert_eq!(GeocodeQuery::from("127.0.0.1").kind(), QueryKind::Ipv4);
        assert_eq!(GeocodeQuery::from(" 8.8.8.8 ").kind(), QueryKind::Ipv4);
    }

    #[test]
    fn test_ipv6_kind() {
        let query = GeocodeQuery::from("2001:0db8:0000:85a3:0000:0000:ac1f:8001");
        assert_eq!(query.kind(), QueryKind::Ipv6);
        assert_eq!(GeocodeQuery::from("::1").kind(), QueryKind::Ipv6);
    }

    #[test]
    fn test_ip_parsing() {
        assert!(GeocodeQuery::from("10.0.0.1").ip().is_some());
        assert!(GeocodeQuery::from("Berlin").ip().is_none());
    }

    #[test]
    fn test_builder_hints() {
        let query = GeocodeQuery::new("Paris")
            .with_limit(3)
            .with_country_code("fr")
            .with_language("fr")
            .with_min_confidence(7);
        assert_eq!(query.limit, Some(3));
        assert_eq!(query.country_code.as_deref(), Some("fr"));
        assert_eq!(query.language.as_deref(), Some("fr"));
        assert_eq!(query.min_confidence, Some(7));
    }

    #[test]
    fn test_query_deserializes_with_defaults() {
        let query: GeocodeQuery = serde_json::from_str(r#"{"text": "Berlin"}"#).unwrap();
        assert_eq!(query, GeocodeQuery::from("Berlin"));
    }

    #[test]
    fn test_reverse_query() {
        let query = ReverseQuery::new(40.714232, -73.9612889).unwrap();
        assert!((query.latitude() - 40.714232).abs() < f64::EPSILON);
        assert!((query.longitude() + 73.9612889).abs() < f64::EPSILON);
        assert!(query.language.is_none());
    }

    #[test]
    fn test_reverse_query_rejects_nan() {
        assert!(matches!(
            ReverseQuery::new(f64::NAN, 1.0),
            Err(DomainError::InvalidCoordinates { .. })
        ));
    }
}
