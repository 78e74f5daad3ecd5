//! Result formatters
//!
//! Turn normalized results into display text. Formatting never fails; absent
//! fields render as empty strings.

use std::fmt::{self, Write};

use domain::ResultData;
use quick_xml::escape::escape;

use crate::{FormatterConfig, GeocoderError, ProviderKind};

/// Renders a list of results as one string
pub trait Formatter: Send + Sync + fmt::Debug {
    /// Format the results
    fn format(&self, results: &[ResultData]) -> String;
}

/// Build the formatter selected by a configuration
///
/// # Errors
///
/// Returns a configuration error if a string pattern is blank.
pub fn from_config(
    config: &FormatterConfig,
    kind: ProviderKind,
) -> Result<Box<dyn Formatter>, GeocoderError> {
    let formatter: Box<dyn Formatter> = match config {
        FormatterConfig::String { pattern } => Box::new(StringFormatter::new(
            kind,
            pattern.as_deref().unwrap_or(StringFormatter::DEFAULT_PATTERN),
        )?),
        FormatterConfig::Gpx => Box::new(GpxFormatter),
    };
    Ok(formatter)
}

/// Pattern-based text formatter
///
/// | Code | Field |
/// |------|-------|
/// | `%n` | street number |
/// | `%S` | street name |
/// | `%z` | zipcode |
/// | `%P` | country |
/// | `%p` | country code |
/// | `%c` | city |
/// | `%T` | state |
/// | `%t` | state code |
/// | `%a` | formatted address |
/// | `%%` | a literal `%` |
///
/// Unknown codes are copied through unchanged. Each result produces one
/// line.
#[derive(Debug, Clone)]
pub struct StringFormatter {
    pattern: String,
}

impl StringFormatter {
    /// Pattern used when none is configured
    pub const DEFAULT_PATTERN: &'static str = "%n %S, %z %c, %P";

    /// Create a formatter
    ///
    /// `kind` only labels the error.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the pattern is blank.
    pub fn new(kind: ProviderKind, pattern: impl Into<String>) -> Result<Self, GeocoderError> {
        let pattern = pattern.into();
        if pattern.trim().is_empty() {
            return Err(GeocoderError::needs(kind, "a non-empty formatter pattern"));
        }
        Ok(Self { pattern })
    }

    fn render(&self, result: &ResultData) -> String {
        let mut out = String::with_capacity(self.pattern.len() * 2);
        let mut chars = self.pattern.chars();

        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            let field = match chars.next() {
                Some('n') => &result.street_number,
                Some('S') => &result.street_name,
                Some('z') => &result.zipcode,
                Some('P') => &result.country,
                Some('p') => &result.country_code,
                Some('c') => &result.city,
                Some('T') => &result.state,
                Some('t') => &result.state_code,
                Some('a') => &result.formatted_address,
                Some('%') => {
                    out.push('%');
                    continue;
                },
                Some(other) => {
                    out.push('%');
                    out.push(other);
                    continue;
                },
                None => {
                    out.push('%');
                    break;
                },
            };
            out.push_str(field.as_deref().unwrap_or_default());
        }

        out
    }
}

impl Formatter for StringFormatter {
    fn format(&self, results: &[ResultData]) -> String {
        results
            .iter()
            .map(|result| self.render(result))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// GPX 1.1 formatter
///
/// One waypoint per result, named after the formatted address.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpxFormatter;

impl Formatter for GpxFormatter {
    fn format(&self, results: &[ResultData]) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(concat!(
            "<gpx version=\"1.1\" creator=\"GeoUnify\" ",
            "xmlns=\"http://www.topografix.com/GPX/1/1\">\n",
        ));

        for result in results {
            let name = escape(result.formatted_address.as_deref().unwrap_or_default());
            // Writing to a String cannot fail
            let _ = writeln!(
                out,
                "<wpt lat=\"{}\" lon=\"{}\"><name>{name}</name></wpt>",
                result.latitude, result.longitude
            );
        }

        out.push_str("</gpx>\n");
        out
    }
}
