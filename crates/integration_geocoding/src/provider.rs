//! Geocoding provider trait and the checks shared by implementations

use std::fmt;

use async_trait::async_trait;
use domain::{GeocodeQuery, QueryKind, ReverseQuery};
use futures::future::join_all;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::{BatchItem, BatchResult, GeocodeResult, GeocoderError, HttpAdapter, ProviderKind};

/// Trait for geocoding providers
///
/// Implemented by one adapter per remote service.
#[async_trait]
pub trait GeocodeProvider: Send + Sync + fmt::Debug {
    /// Which provider this is
    fn kind(&self) -> ProviderKind;

    /// Get the provider identifier (e.g., "google", "openstreetmap")
    fn provider_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Resolve an address (or IP address) to places
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the provider cannot serve this kind of
    /// query, or the transport/provider error otherwise.
    async fn geocode(&self, query: &GeocodeQuery) -> Result<GeocodeResult, GeocoderError>;

    /// Resolve a point to places
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the provider has no reverse geocoding, or
    /// the transport/provider error otherwise.
    async fn reverse(&self, query: &ReverseQuery) -> Result<GeocodeResult, GeocoderError>;

    /// Geocode several queries, one result slot per query in input order
    ///
    /// The default issues one `geocode` call per query concurrently; a
    /// failing query only fails its own slot. Providers with a native batch
    /// endpoint override this.
    async fn batch_geocode(&self, queries: &[GeocodeQuery]) -> Result<BatchResult, GeocoderError> {
        Ok(fan_out(self, queries).await)
    }
}

/// Run `geocode` for every query concurrently, preserving input order
pub async fn fan_out<P>(provider: &P, queries: &[GeocodeQuery]) -> BatchResult
where
    P: GeocodeProvider + ?Sized,
{
    let outcomes = join_all(queries.iter().map(|query| provider.geocode(query))).await;

    let mut raw = Vec::with_capacity(outcomes.len());
    let mut data = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        raw.push(
            outcome
                .as_ref()
                .map_or(Value::Null, |result| result.raw.clone()),
        );
        data.push(BatchItem::from(outcome));
    }

    BatchResult::new(data, Value::Array(raw))
}

/// Reject IPv4/IPv6 input for address-only providers
pub(crate) fn require_address(
    kind: ProviderKind,
    query: &GeocodeQuery,
) -> Result<(), GeocoderError> {
    match query.kind() {
        QueryKind::Address => Ok(()),
        QueryKind::Ipv4 => Err(GeocoderError::unsupported(kind, "geocoding IPv4")),
        QueryKind::Ipv6 => Err(GeocoderError::unsupported(kind, "geocoding IPv6")),
    }
}

/// Reject address input for IP-only providers
pub(crate) fn require_ip(kind: ProviderKind, query: &GeocodeQuery) -> Result<(), GeocoderError> {
    match query.kind() {
        QueryKind::Ipv4 | QueryKind::Ipv6 => Ok(()),
        QueryKind::Address => Err(GeocoderError::unsupported(kind, "geocoding address")),
    }
}

/// Reject blank credentials at construction time
pub(crate) fn require_secret(
    kind: ProviderKind,
    value: &SecretString,
    requirement: &str,
) -> Result<(), GeocoderError> {
    if value.expose_secret().trim().is_empty() {
        return Err(GeocoderError::needs(kind, requirement));
    }
    Ok(())
}

/// Reject blank non-secret settings at construction time
pub(crate) fn require_value(
    kind: ProviderKind,
    value: &str,
    requirement: &str,
) -> Result<(), GeocoderError> {
    if value.trim().is_empty() {
        return Err(GeocoderError::needs(kind, requirement));
    }
    Ok(())
}

/// Reject transports that cannot speak HTTPS
pub(crate) fn require_https(
    kind: ProviderKind,
    http: &dyn HttpAdapter,
) -> Result<(), GeocoderError> {
    if !http.supports_https() {
        let provider = kind.display_name();
        return Err(GeocoderError::Configuration {
            provider,
            message: format!("{provider} requires an HTTPS-capable httpAdapter"),
        });
    }
    Ok(())
}

/// Strip trailing slashes from a configured base URL
pub(crate) fn base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Cut a result list down to the query limit, if any
pub(crate) fn truncate<T>(mut items: Vec<T>, limit: Option<u32>) -> Vec<T> {
    if let Some(limit) = limit.and_then(|l| usize::try_from(l).ok()) {
        items.truncate(limit);
    }
    items
}

/// Turn an empty string into `None`
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Serde helpers for provider payloads that encode numbers inconsistently
pub(crate) mod de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        String(String),
    }

    /// Accept `52.5` as well as `"52.5"`
    pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntegerOrString {
        Integer(u64),
        String(String),
    }

    fn parse_integer<E: serde::de::Error>(value: IntegerOrString) -> Result<u64, E> {
        match value {
            IntegerOrString::Integer(n) => Ok(n),
            IntegerOrString::String(s) => s.trim().parse().map_err(E::custom),
        }
    }

    /// Accept `60` as well as `"60"`
    ///
    /// Configuration layered from environment variables reaches tagged
    /// enums as strings.
    pub fn u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        parse_integer(IntegerOrString::deserialize(deserializer)?)
    }

    /// Accept `7`, `"7"` or null as an optional `u8`
    pub fn option_u8_lenient<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<IntegerOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(IntegerOrString::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value) => {
                let n = parse_integer::<D::Error>(value)?;
                u8::try_from(n).map(Some).map_err(serde::de::Error::custom)
            },
        }
    }

    /// Accept `12`, `"12"` or null as an optional string
    pub fn string_lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(
            match Option::<serde_json::Value>::deserialize(deserializer)? {
                Some(serde_json::Value::String(s)) => Some(s),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            },
        )
    }
}
