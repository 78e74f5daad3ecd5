//! Coordinate pair value object

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::DomainError;

/// A latitude/longitude pair in decimal degrees
///
/// Only finiteness is enforced. Providers disagree on how they treat
/// out-of-range values, so range checks are left to them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

impl Coordinates {
    /// Create a coordinate pair
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidCoordinates` if either value is NaN or infinite.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, DomainError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(DomainError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Get the latitude
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Get the longitude
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}
