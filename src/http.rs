//! Minimal request/response model and the network seam.
//!
//! Both the upload manager and the service worker talk to the server through
//! the [`Network`] trait so tests can substitute a fake transport.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::upload::FilePayload;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
}

/// Multipart body with plain text fields and one file part.
#[derive(Debug, Clone)]
pub struct MultipartForm {
  pub fields: Vec<(String, String)>,
  pub file_field: String,
  pub file: FilePayload,
}

#[derive(Debug, Clone, Default)]
pub enum Body {
  #[default]
  Empty,
  Multipart(MultipartForm),
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  /// Value of the `Accept` header, if any
  pub accept: Option<String>,
  pub body: Body,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::Get,
      url,
      accept: None,
      body: Body::Empty,
    }
  }

  pub fn post(url: Url, body: Body) -> Self {
    Self {
      method: Method::Post,
      url,
      accept: None,
      body,
    }
  }

  pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
    self.accept = Some(accept.into());
    self
  }

  /// Path component of the request URL.
  pub fn path(&self) -> &str {
    self.url.path()
  }

  /// Whether the client will take an HTML document in response.
  pub fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .is_some_and(|a| a.contains("text/html"))
  }

  /// Key under which this request's response is cached: the URL without
  /// its fragment.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url.into()
  }
}

/// A response snapshot, either from the network or from a cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
    }
  }

  /// Synthesized plain-text response.
  pub fn text(status: u16, body: &str) -> Self {
    Self::new(
      status,
      Some(CONTENT_TYPE_TEXT.to_string()),
      body.as_bytes().to_vec(),
    )
  }

  /// Synthesized JSON response.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(
      status,
      Some(CONTENT_TYPE_JSON.to_string()),
      value.to_string().into_bytes(),
    )
  }

  /// True for 2xx statuses.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Decode the body as JSON.
  pub fn json_body<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_slice(&self.body)?)
  }

  pub fn text_body(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Transport used to reach the server.
///
/// An `Err` means the server was unreachable; any HTTP status, including
/// errors, comes back as `Ok`.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Covers the whole exchange, including a 50 MiB upload body
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Builds the HTTP client used for every server request.
fn build_http_client() -> reqwest::Result<reqwest::Client> {
  reqwest::Client::builder()
    .connect_timeout(CONNECT_TIMEOUT)
    .timeout(REQUEST_TIMEOUT)
    .pool_idle_timeout(Duration::from_secs(60))
    .tcp_keepalive(Duration::from_secs(30))
    .build()
}

/// `reqwest`-backed network transport.
#[derive(Clone)]
pub struct ReqwestNetwork {
  client: reqwest::Client,
}

impl ReqwestNetwork {
  /// Transport with connect and request timeouts, so a stalled server
  /// surfaces as unreachable.
  pub fn new() -> Result<Self> {
    Ok(Self::with_client(build_http_client()?))
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }
}

#[async_trait]
impl Network for ReqwestNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    debug!(method = ?request.method, url = %request.url, "fetch");

    let mut builder = match request.method {
      Method::Get => self.client.get(request.url.clone()),
      Method::Post => self.client.post(request.url.clone()),
    };

    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }

    if let Body::Multipart(form) = &request.body {
      let mut multipart = reqwest::multipart::Form::new();
      for (name, value) in &form.fields {
        multipart = multipart.text(name.clone(), value.clone());
      }
      let part = reqwest::multipart::Part::bytes(form.file.data.clone())
        .file_name(form.file.name.clone())
        .mime_str(&form.file.mime_type)?;
      multipart = multipart.part(form.file_field.clone(), part);
      builder = builder.multipart(multipart);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| Error::Network(e.to_string()))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| Error::Network(e.to_string()))?
      .to_vec();

    Ok(Response::new(status, content_type, body))
  }
}
