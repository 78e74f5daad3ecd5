//! Geocoder configuration
//!
//! One tagged [`ProviderConfig`] selects the provider and carries its
//! settings. [`GeocoderConfig`] adds the ambient knobs around it.

use serde::{Deserialize, Serialize};

use crate::providers::{
    AgolConfig, FreegeoipConfig, GeocodioConfig, GoogleConfig, HereConfig, LocationIqConfig,
    MapQuestConfig, MapboxConfig, OpenCageConfig, OpenStreetMapConfig, PickPointConfig,
    SmartyStreetsConfig, TomTomConfig, VirtualEarthConfig, YandexConfig,
};
use crate::{HttpConfig, ProviderKind};

/// Provider selection plus provider-specific settings
///
/// The `provider` tag takes the identifiers listed by [`ProviderKind::as_str`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// ArcGIS Online
    Agol(AgolConfig),
    /// freegeoip
    Freegeoip(FreegeoipConfig),
    /// Geocodio
    Geocodio(GeocodioConfig),
    /// Google Maps
    Google(GoogleConfig),
    /// HERE
    Here(HereConfig),
    /// LocationIQ
    LocationIq(LocationIqConfig),
    /// Mapbox
    Mapbox(MapboxConfig),
    /// MapQuest
    MapQuest(MapQuestConfig),
    /// OpenCage
    OpenCage(OpenCageConfig),
    /// OpenStreetMap Nominatim
    OpenStreetMap(OpenStreetMapConfig),
    /// PickPoint
    PickPoint(PickPointConfig),
    /// SmartyStreets
    SmartyStreets(SmartyStreetsConfig),
    /// TomTom
    TomTom(TomTomConfig),
    /// Bing Maps
    VirtualEarth(VirtualEarthConfig),
    /// Yandex
    Yandex(YandexConfig),
}

impl ProviderConfig {
    /// Provider selected by this configuration
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Agol(_) => ProviderKind::Agol,
            Self::Freegeoip(_) => ProviderKind::Freegeoip,
            Self::Geocodio(_) => ProviderKind::Geocodio,
            Self::Google(_) => ProviderKind::Google,
            Self::Here(_) => ProviderKind::Here,
            Self::LocationIq(_) => ProviderKind::Locationiq,
            Self::Mapbox(_) => ProviderKind::Mapbox,
            Self::MapQuest(_) => ProviderKind::Mapquest,
            Self::OpenCage(_) => ProviderKind::Opencage,
            Self::OpenStreetMap(_) => ProviderKind::Openstreetmap,
            Self::PickPoint(_) => ProviderKind::Pickpoint,
            Self::SmartyStreets(_) => ProviderKind::Smartystreets,
            Self::TomTom(_) => ProviderKind::Tomtom,
            Self::VirtualEarth(_) => ProviderKind::Virtualearth,
            Self::Yandex(_) => ProviderKind::Yandex,
        }
    }
}

/// Output formatter selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum FormatterConfig {
    /// Pattern-based text output, see [`StringFormatter`](crate::StringFormatter)
    String {
        /// Pattern applied to every result; the default pattern when absent
        #[serde(default)]
        pattern: Option<String>,
    },
    /// GPX 1.1 waypoints
    Gpx,
}

/// Complete configuration of a [`Geocoder`](crate::Geocoder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    /// Provider and its settings
    pub provider: ProviderConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Optional output formatter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatter: Option<FormatterConfig>,

    /// Report an empty result list as [`GeocoderError::NoResults`](crate::GeocoderError::NoResults)
    #[serde(default)]
    pub no_results_is_error: bool,
}

impl GeocoderConfig {
    /// Create a configuration with default HTTP settings
    #[must_use]
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            http: HttpConfig::default(),
            formatter: None,
            no_results_is_error: false,
        }
    }

    /// Validate the configuration
    ///
    /// Provider credentials are checked when the provider is built.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.http.validate()?;

        if let Some(FormatterConfig::String {
            pattern: Some(pattern),
        }) = &self.formatter
        {
            if pattern.trim().is_empty() {
                return Err("formatter pattern must not be empty".to_string());
            }
        }

        Ok(())
    }
}
