//! GeoUnify CLI
//!
//! Command-line interface for geocoding through any configured provider.

#![allow(clippy::print_stdout)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use domain::{GeocodeQuery, ResultData, ReverseQuery};
use integration_geocoding::{
    Formatter, Geocoder, GeocoderConfig, GpxFormatter, ProviderKind, StringFormatter,
};
use serde::Serialize;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration file looked up in the working directory when `--config` is absent
const DEFAULT_CONFIG_NAME: &str = "geounify";

/// Prefix of configuration environment variables
const ENV_PREFIX: &str = "GEOUNIFY";

/// GeoUnify CLI
#[derive(Debug, Parser)]
#[command(name = "geounify-cli")]
#[command(author, version, about = "Geocode through one interface over many providers", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ./geounify.{toml,json,yaml} if present)
    #[arg(short, long, env = "GEOUNIFY_CONFIG")]
    config: Option<PathBuf>,

    /// Provider identifier, overrides the configured one
    #[arg(short, long)]
    provider: Option<String>,

    /// Output format; the configured formatter or JSON when absent
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Pattern for `--format string`
    #[arg(long)]
    pattern: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Geocode an address or IP address
    ///
    /// Example: geounify-cli geocode 29 champs elysée paris
    Geocode {
        /// Address words, joined with spaces
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Country code to bias results
        #[arg(long)]
        country: Option<String>,

        /// Preferred result language
        #[arg(long)]
        language: Option<String>,
    },

    /// Reverse geocode a point
    ///
    /// Example: geounify-cli reverse 45.767 4.833
    #[command(allow_negative_numbers = true)]
    Reverse {
        /// Latitude in decimal degrees
        latitude: f64,

        /// Longitude in decimal degrees
        longitude: f64,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u32>,

        /// Preferred result language
        #[arg(long)]
        language: Option<String>,
    },

    /// Geocode several queries at once, one argument per query
    ///
    /// Example: geounify-cli batch "13 rue sainte catherine" "8.8.8.8"
    Batch {
        /// Queries
        #[arg(required = true, num_args = 1..)]
        queries: Vec<String>,
    },

    /// List supported provider identifiers
    Providers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Pretty-printed JSON including the raw provider payload
    Json,
    /// One line per result, rendered through a pattern
    #[value(name = "string")]
    Text,
    /// GPX 1.1 document
    Gpx,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Load the geocoder configuration
///
/// Sources, lowest precedence first: the configuration file, `GEOUNIFY_*`
/// environment variables (`__` separates nested keys), then `provider`.
fn load_config(path: Option<&Path>, provider: Option<&str>) -> anyhow::Result<GeocoderConfig> {
    load_config_with_env(path, provider, None)
}

/// [`load_config`] reading variables from `env` instead of the process
/// environment when given
fn load_config_with_env(
    path: Option<&Path>,
    provider: Option<&str>,
    env: Option<config::Map<String, String>>,
) -> anyhow::Result<GeocoderConfig> {
    let file = match path {
        Some(path) => config::File::from(path).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
    };

    let mut builder = config::Config::builder().add_source(file).add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .source(env),
    );

    if let Some(provider) = provider {
        let kind: ProviderKind = provider.parse()?;
        builder = builder.set_override("provider.provider", kind.as_str())?;
    }

    let config: GeocoderConfig = builder
        .build()?
        .try_deserialize()
        .context("invalid geocoder configuration (is a provider selected?)")?;
    config.validate().map_err(anyhow::Error::msg)?;

    debug!(provider = %config.provider.kind(), "Configuration loaded");
    Ok(config)
}

/// Formatter requested on the command line, if any
fn cli_formatter(
    format: Option<OutputFormat>,
    pattern: Option<&str>,
    kind: ProviderKind,
) -> anyhow::Result<Option<Box<dyn Formatter>>> {
    let formatter: Box<dyn Formatter> = match format {
        None | Some(OutputFormat::Json) => return Ok(None),
        Some(OutputFormat::Text) => Box::new(StringFormatter::new(
            kind,
            pattern.unwrap_or(StringFormatter::DEFAULT_PATTERN),
        )?),
        Some(OutputFormat::Gpx) => Box::new(GpxFormatter),
    };
    Ok(Some(formatter))
}

/// Render results: the command-line formatter wins, then the configured one,
/// then JSON of `full`
fn render(
    geocoder: &Geocoder,
    formatter: Option<&dyn Formatter>,
    json: bool,
    data: &[ResultData],
    full: &impl Serialize,
) -> anyhow::Result<String> {
    if let Some(formatter) = formatter {
        return Ok(formatter.format(data));
    }
    if !json {
        if let Some(text) = geocoder.format(data) {
            return Ok(text);
        }
    }
    Ok(serde_json::to_string_pretty(full)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(log_filter_from_verbosity(cli.verbose))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if matches!(cli.command, Commands::Providers) {
        for kind in ProviderKind::ALL {
            println!("{:<14} {}", kind.as_str(), kind.display_name());
        }
        return Ok(());
    }

    let config = load_config(cli.config.as_deref(), cli.provider.as_deref())?;
    let geocoder = Geocoder::from_config(&config)?;
    let formatter = cli_formatter(cli.format, cli.pattern.as_deref(), geocoder.kind())?;
    let json = cli.format == Some(OutputFormat::Json);

    match cli.command {
        Commands::Geocode {
            query,
            limit,
            country,
            language,
        } => {
            let query = GeocodeQuery {
                text: query.join(" "),
                limit,
                country_code: country,
                language,
                min_confidence: None,
            };
            let result = geocoder.geocode(query).await?;
            println!(
                "{}",
                render(&geocoder, formatter.as_deref(), json, &result.data, &result)?
            );
        },

        Commands::Reverse {
            latitude,
            longitude,
            limit,
            language,
        } => {
            let mut query = ReverseQuery::new(latitude, longitude)?;
            query.limit = limit;
            query.language = language;

            let result = geocoder.reverse(&query).await?;
            println!(
                "{}",
                render(&geocoder, formatter.as_deref(), json, &result.data, &result)?
            );
        },

        Commands::Batch { queries } => {
            let batch = geocoder.batch_geocode(queries.iter().map(String::as_str)).await?;

            for (query, item) in queries.iter().zip(&batch.data) {
                if let Some(error) = &item.error {
                    warn!(query = %query, error = %error, "Query failed");
                }
            }

            let data: Vec<ResultData> = batch
                .data
                .iter()
                .flat_map(|item| item.data.iter().cloned())
                .collect();
            println!(
                "{}",
                render(&geocoder, formatter.as_deref(), json, &data, &batch)?
            );
        },

        Commands::Providers => {},
    }

    Ok(())
}
