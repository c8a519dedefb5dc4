//! HTTP client capability.
//!
//! Api steps go through the [`HttpClient`] trait so the dispatcher can be
//! driven by a fake in tests. [`ReqwestClient`] is the production
//! implementation.
//!
//! A response only counts as a success when its status is 2xx; any other
//! status is reported as [`HttpError::Status`] together with the body the
//! server sent back.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

pub use reqwest::Method;

/// Errors from the HTTP capability.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
  /// The URL could not be parsed or uses an unsupported scheme.
  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  /// The server answered with a non-2xx status.
  #[error("request failed with status {status}: {body}")]
  Status { status: u16, body: String },

  /// The request could not be sent or the response could not be read.
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

/// Performs an HTTP verb against a URL.
#[async_trait]
pub trait HttpClient: Send + Sync {
  async fn request(&self, method: Method, url: &str) -> Result<HttpResponse, HttpError>;
}

/// Configuration for [`ReqwestClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
  /// Overall request timeout. `None` leaves requests unbounded here.
  pub timeout: Option<Duration>,
  pub user_agent: String,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout: Some(Duration::from_secs(30)),
      user_agent: concat!("opsflow/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// [`HttpClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
  client: Client,
}

impl ReqwestClient {
  pub fn new(config: HttpConfig) -> Result<Self, HttpError> {
    let mut builder = Client::builder().user_agent(config.user_agent);
    if let Some(timeout) = config.timeout {
      builder = builder.timeout(timeout);
    }
    Ok(Self {
      client: builder.build()?,
    })
  }
}

#[async_trait]
impl HttpClient for ReqwestClient {
  async fn request(&self, method: Method, url: &str) -> Result<HttpResponse, HttpError> {
    let url = parse_url(url)?;

    let response = self.client.request(method, url).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      return Err(HttpError::Status {
        status: status.as_u16(),
        body,
      });
    }

    Ok(HttpResponse {
      status: status.as_u16(),
      body,
    })
  }
}

/// Parse a step URL, accepting only http and https.
pub fn parse_url(url: &str) -> Result<Url, HttpError> {
  let parsed = Url::parse(url.trim()).map_err(|e| HttpError::InvalidUrl {
    url: url.to_string(),
    message: e.to_string(),
  })?;

  match parsed.scheme() {
    "http" | "https" => Ok(parsed),
    scheme => Err(HttpError::InvalidUrl {
      url: url.to_string(),
      message: format!("unsupported scheme '{}'", scheme),
    }),
  }
}
