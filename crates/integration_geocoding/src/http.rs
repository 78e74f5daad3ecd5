//! HTTP transport used by every provider
//!
//! Providers only see the [`HttpAdapter`] trait. [`ReqwestHttpAdapter`] is the
//! production implementation; tests substitute a mock or point it at a
//! wiremock server.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::HttpError;

/// Ordered query string parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    /// Create an empty parameter list
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a parameter
    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter if a value is present
    #[must_use]
    pub fn with_opt<V: ToString>(mut self, key: &str, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Append a parameter in place
    pub fn push(&mut self, key: &str, value: impl ToString) {
        self.0.push((key.to_string(), value.to_string()));
    }

    /// First value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parameters as key/value pairs
    #[must_use]
    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

/// Transport collaborator consumed by providers
///
/// Implementations own timeouts and TLS; errors are returned to the caller
/// untouched.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpAdapter: Send + Sync {
    /// Issue a GET request and decode the JSON body
    async fn get(&self, url: &str, params: &Params) -> Result<Value, HttpError>;

    /// Issue a POST request with a JSON body and decode the JSON response
    async fn post(&self, url: &str, params: &Params, body: &Value) -> Result<Value, HttpError>;

    /// Whether this adapter can talk to `https://` endpoints
    fn supports_https(&self) -> bool;
}

/// Configuration for [`ReqwestHttpAdapter`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Allow `https://` URLs (disable only for plain-HTTP test setups)
    #[serde(default = "default_https")]
    pub https: bool,
}

const fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("GeoUnify/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_https() -> bool {
    true
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            https: default_https(),
        }
    }
}

impl HttpConfig {
    /// Create a configuration for testing (short timeout)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout_secs: 5,
            ..Default::default()
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be greater than 0".to_string());
        }

        if self.user_agent.trim().is_empty() {
            return Err("user_agent must not be empty".to_string());
        }

        Ok(())
    }
}

/// [`HttpAdapter`] backed by `reqwest`
pub struct ReqwestHttpAdapter {
    client: Client,
    config: HttpConfig,
}

impl fmt::Debug for ReqwestHttpAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestHttpAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReqwestHttpAdapter {
    /// Create a new adapter
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self, HttpError> {
        config.validate().map_err(HttpError::InvalidRequest)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| HttpError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Create an adapter with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn with_defaults() -> Result<Self, HttpError> {
        Self::new(&HttpConfig::default())
    }

    fn check_url(&self, url: &str) -> Result<(), HttpError> {
        let parsed =
            Url::parse(url).map_err(|e| HttpError::InvalidRequest(format!("{url}: {e}")))?;
        if parsed.scheme() == "https" && !self.config.https {
            return Err(HttpError::InvalidRequest(format!(
                "HTTPS is disabled for this adapter: {url}"
            )));
        }
        Ok(())
    }

    fn map_send_error(&self, e: &reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else if e.is_connect() {
            HttpError::ConnectionFailed(e.to_string())
        } else {
            HttpError::RequestFailed(e.to_string())
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Value, HttpError> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        debug!(status = %status, "Received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HttpError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| HttpError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl HttpAdapter for ReqwestHttpAdapter {
    #[instrument(skip(self, params), fields(params = params.len()))]
    async fn get(&self, url: &str, params: &Params) -> Result<Value, HttpError> {
        self.check_url(url)?;
        debug!("Sending GET request");
        self.execute(self.client.get(url).query(params.as_slice()))
            .await
    }

    #[instrument(skip(self, params, body), fields(params = params.len()))]
    async fn post(&self, url: &str, params: &Params, body: &Value) -> Result<Value, HttpError> {
        self.check_url(url)?;
        debug!("Sending POST request");
        self.execute(self.client.post(url).query(params.as_slice()).json(body))
            .await
    }

    fn supports_https(&self) -> bool {
        self.config.https
    }
}
