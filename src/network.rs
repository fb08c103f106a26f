//! Network fetch API used on cache misses and for pass-through requests.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::config::NetworkConfig;
use crate::http::{Request, Response};

#[derive(Error, Debug)]
pub enum NetworkError {
  #[error("Failed to build HTTP client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("Invalid request header {name}: {reason}")]
  InvalidHeader { name: String, reason: String },

  #[error("Request to {url} failed: {source}")]
  Request {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("Network unavailable: {0}")]
  Unavailable(String),
}

/// Performs real HTTP requests.
#[async_trait]
pub trait Network: Send + Sync {
  /// Perform the request and capture the response. Non-2xx statuses are
  /// responses, not errors.
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// `reqwest`-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new(config: &NetworkConfig) -> Result<Self, NetworkError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(agent) = &config.user_agent {
      builder = builder.user_agent(agent.clone());
    }

    let client = builder.build().map_err(NetworkError::Client)?;

    Ok(Self::from_client(client))
  }

  /// Wrap an already configured client.
  pub fn from_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let url = request.url.to_string();
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
        NetworkError::InvalidHeader {
          name: name.clone(),
          reason: e.to_string(),
        }
      })?;
      builder = builder.header(header_name, value.as_str());
    }

    let response = builder.send().await.map_err(|source| {
      if source.is_connect() {
        NetworkError::Unavailable(format!("{}: {}", url, source))
      } else {
        NetworkError::Request {
          url: url.clone(),
          source,
        }
      }
    })?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|source| NetworkError::Request { url, source })?;

    Ok(
      headers
        .into_iter()
        .fold(Response::new(status, body.to_vec()), |response, (name, value)| {
          response.with_header(name, value)
        }),
    )
  }
}
