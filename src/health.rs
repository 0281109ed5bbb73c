//! Server health probe.

use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};
use url::Url;

use crate::error::Result;
use crate::http::{Network, Request};

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Deserialize)]
struct HealthReply {
  #[serde(default)]
  message: String,
}

/// Outcome of a health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
  /// 2xx with a decodable body
  Healthy(String),
  /// Non-2xx with a decodable body
  Unhealthy(String),
  /// Transport failure or undecodable body
  Unreachable,
}

impl HealthStatus {
  pub fn is_healthy(&self) -> bool {
    matches!(self, Self::Healthy(_))
  }
}

impl fmt::Display for HealthStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Healthy(message) => write!(f, "✅ {}", message),
      Self::Unhealthy(message) => write!(f, "❌ Error: {}", message),
      Self::Unreachable => f.write_str("❌ Connection failed"),
    }
  }
}

#[derive(Clone)]
pub struct HealthChecker {
  url: Url,
  network: Arc<dyn Network>,
}

impl HealthChecker {
  pub fn new(base_url: &Url, network: Arc<dyn Network>) -> Result<Self> {
    Ok(Self {
      url: base_url.join(HEALTH_PATH)?,
      network,
    })
  }

  pub async fn check(&self) -> HealthStatus {
    let response = match self.network.fetch(&Request::get(self.url.clone())).await {
      Ok(response) => response,
      Err(e) => {
        error!(error = %e, "health check failed");
        return HealthStatus::Unreachable;
      }
    };

    let reply: HealthReply = match response.json_body() {
      Ok(reply) => reply,
      Err(e) => {
        error!(status = response.status, error = %e, "health check returned invalid body");
        return HealthStatus::Unreachable;
      }
    };

    debug!(status = response.status, message = %reply.message, "health check");
    if response.is_ok() {
      HealthStatus::Healthy(reply.message)
    } else {
      HealthStatus::Unhealthy(reply.message)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::Response;
  use crate::testing::{base_url, FakeNetwork};

  fn checker() -> (Arc<FakeNetwork>, HealthChecker) {
    let network = Arc::new(FakeNetwork::new());
    let checker = HealthChecker::new(&base_url(), network.clone()).unwrap();
    (network, checker)
  }

  #[tokio::test]
  async fn test_healthy() {
    let (network, checker) = checker();
    network.route(
      "http://cmms.test/health",
      Response::json(200, &serde_json::json!({ "status": "ok", "message": "Application is healthy" })),
    );

    let status = checker.check().await;
    assert!(status.is_healthy());
    assert_eq!(status.to_string(), "✅ Application is healthy");
  }

  #[tokio::test]
  async fn test_unhealthy() {
    let (network, checker) = checker();
    network.route(
      "http://cmms.test/health",
      Response::json(500, &serde_json::json!({ "message": "Database unavailable" })),
    );

    let status = checker.check().await;
    assert_eq!(status, HealthStatus::Unhealthy("Database unavailable".to_string()));
    assert_eq!(status.to_string(), "❌ Error: Database unavailable");
  }

  #[tokio::test]
  async fn test_unreachable() {
    let (network, checker) = checker();
    network.set_offline(true);
    assert_eq!(checker.check().await.to_string(), "❌ Connection failed");
  }

  #[tokio::test]
  async fn test_non_json_body_counts_as_unreachable() {
    let (network, checker) = checker();
    network.route("http://cmms.test/health", Response::text(502, "Bad Gateway"));
    assert_eq!(checker.check().await, HealthStatus::Unreachable);
  }
}
