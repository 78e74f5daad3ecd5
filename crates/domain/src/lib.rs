//! Domain layer for GeoUnify
//!
//! Contains the provider-independent vocabulary: queries, coordinates and the
//! normalized result record. This layer performs no I/O.

pub mod errors;
pub mod value_objects;

pub use errors::DomainError;
pub use value_objects::*;
