//! Normalized geocoding result

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One place returned by a provider, in the shape shared by all providers
///
/// Only the coordinates are guaranteed. Everything a provider returns that
/// has no dedicated field lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    /// Latitude in decimal degrees
    pub latitude: f64,

    /// Longitude in decimal degrees
    pub longitude: f64,

    /// Full address as printed by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,

    /// Country name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Country code (ISO 3166 alpha-2 or alpha-3, as the provider reports it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,

    /// State, region or first-level administrative area
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Abbreviated state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_code: Option<String>,

    /// City or locality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Postal code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zipcode: Option<String>,

    /// Street name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_name: Option<String>,

    /// House number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_number: Option<String>,

    /// Neighbourhood or district
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighbourhood: Option<String>,

    /// Provider-specific fields
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl ResultData {
    /// Create a result holding only coordinates
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }

    /// Attach a provider-specific field, skipping JSON nulls
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.extra.insert(key.into(), value);
        }
        self
    }
}
