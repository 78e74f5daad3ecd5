//! One adapter per remote geocoding service

mod agol;
mod freegeoip;
mod geocodio;
mod google;
mod here;
mod locationiq;
mod mapbox;
mod mapquest;
mod nominatim;
mod opencage;
mod openstreetmap;
mod pickpoint;
mod smartystreets;
mod tomtom;
mod virtualearth;
mod yandex;

pub use agol::{AgolConfig, AgolProvider};
pub use freegeoip::{FreegeoipConfig, FreegeoipProvider};
pub use geocodio::{GeocodioConfig, GeocodioProvider};
pub use google::{GoogleConfig, GoogleProvider};
pub use here::{HereConfig, HereProvider};
pub use locationiq::{LocationIqConfig, LocationIqProvider};
pub use mapbox::{MapboxConfig, MapboxProvider};
pub use mapquest::{MapQuestConfig, MapQuestProvider};
pub use opencage::{OpenCageConfig, OpenCageProvider};
pub use openstreetmap::{OpenStreetMapConfig, OpenStreetMapProvider};
pub use pickpoint::{PickPointConfig, PickPointProvider};
pub use smartystreets::{SmartyStreetsConfig, SmartyStreetsProvider};
pub use tomtom::{TomTomConfig, TomTomProvider};
pub use virtualearth::{VirtualEarthConfig, VirtualEarthProvider};
pub use yandex::{YandexConfig, YandexProvider};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{GeocoderError, ProviderKind};

/// Deserialize a raw payload into a provider's response shape
pub(crate) fn decode<T: DeserializeOwned>(
    kind: ProviderKind,
    raw: &Value,
) -> Result<T, GeocoderError> {
    T::deserialize(raw).map_err(|e| GeocoderError::malformed(kind, &e))
}

/// Raw payload of a batch sent as one or more requests
///
/// A single response is kept as is; several are collected into an array in
/// request order.
pub(crate) fn chunked_raw(mut responses: Vec<Value>) -> Value {
    match responses.len() {
        0 => Value::Null,
        1 => responses.swap_remove(0),
        _ => Value::Array(responses),
    }
}
