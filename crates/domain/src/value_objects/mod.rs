//! Value Objects - Immutable, identity-less domain primitives

mod coordinates;
mod geocode_query;
mod result_data;

pub use coordinates::Coordinates;
pub use geocode_query::{GeocodeQuery, QueryKind, ReverseQuery};
pub use result_data::ResultData;
