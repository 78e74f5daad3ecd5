//! Supported provider identifiers

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::GeocoderError;

/// Every provider this crate can talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// ArcGIS Online World Geocoding Service
    Agol,
    /// freegeoip.app IP geolocation
    Freegeoip,
    /// Geocodio (US and Canada)
    Geocodio,
    /// Google Maps Geocoding API
    Google,
    /// HERE Geocoding & Search
    Here,
    /// LocationIQ (Nominatim-compatible)
    Locationiq,
    /// Mapbox Geocoding
    Mapbox,
    /// MapQuest Geocoding API
    Mapquest,
    /// OpenCage Geocoder
    Opencage,
    /// OpenStreetMap Nominatim
    Openstreetmap,
    /// PickPoint (Nominatim-compatible, HTTPS only)
    Pickpoint,
    /// SmartyStreets US Street API
    Smartystreets,
    /// TomTom Search API
    Tomtom,
    /// Bing Maps Locations API
    Virtualearth,
    /// Yandex Geocoder
    Yandex,
}

impl ProviderKind {
    /// All providers, in identifier order
    pub const ALL: [Self; 15] = [
        Self::Agol,
        Self::Freegeoip,
        Self::Geocodio,
        Self::Google,
        Self::Here,
        Self::Locationiq,
        Self::Mapbox,
        Self::Mapquest,
        Self::Opencage,
        Self::Openstreetmap,
        Self::Pickpoint,
        Self::Smartystreets,
        Self::Tomtom,
        Self::Virtualearth,
        Self::Yandex,
    ];

    /// Identifier used in configuration (e.g., "openstreetmap")
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agol => "agol",
            Self::Freegeoip => "freegeoip",
            Self::Geocodio => "geocodio",
            Self::Google => "google",
            Self::Here => "here",
            Self::Locationiq => "locationiq",
            Self::Mapbox => "mapbox",
            Self::Mapquest => "mapquest",
            Self::Opencage => "opencage",
            Self::Openstreetmap => "openstreetmap",
            Self::Pickpoint => "pickpoint",
            Self::Smartystreets => "smartystreets",
            Self::Tomtom => "tomtom",
            Self::Virtualearth => "virtualearth",
            Self::Yandex => "yandex",
        }
    }

    /// Human-readable name used in error messages
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Agol => "Agol",
            Self::Freegeoip => "Freegeoip",
            Self::Geocodio => "Geocodio",
            Self::Google => "Google",
            Self::Here => "Here",
            Self::Locationiq => "LocationIQ",
            Self::Mapbox => "Mapbox",
            Self::Mapquest => "MapQuest",
            Self::Opencage => "OpenCage",
            Self::Openstreetmap => "OpenStreetMap",
            Self::Pickpoint => "PickPoint",
            Self::Smartystreets => "SmartyStreets",
            Self::Tomtom => "TomTom",
            Self::Virtualearth => "VirtualEarth",
            Self::Yandex => "Yandex",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GeocoderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| GeocoderError::UnknownProvider(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_round_trips_every_kind() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!(
            "OpenStreetMap".parse::<ProviderKind>().unwrap(),
            ProviderKind::Openstreetmap
        );
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = "teleport".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, GeocoderError::UnknownProvider(ref name) if name == "teleport"));
        assert!(err.to_string().contains("teleport"));
    }

    #[test]
    fn test_serde_uses_identifier() {
        let json = serde_json::to_string(&ProviderKind::Virtualearth).unwrap();
        assert_eq!(json, "\"virtualearth\"");
    }
}
