//! Request routing over the cache partitions.
//!
//! Every request is classified by path into one of four routes, each with a
//! fixed strategy:
//! - `/api/…`            network-first, general partition
//! - `/static/uploads/…` cache-first, media partition
//! - `/static/…` and `/` cache-first, static partition
//! - anything else       network-first, general partition
//!
//! Storage failures never fail a request; they are logged and treated as a
//! cache miss.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::CacheNames;
use crate::http::{Method, Network, Request, Response};
use crate::storage::{CacheStorage, CachedResponse};

/// Which strategy a request is served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Api,
  Media,
  Static,
  Other,
}

impl Route {
  pub fn classify(path: &str) -> Self {
    if path.starts_with("/api/") {
      Self::Api
    } else if path.starts_with("/static/uploads/") {
      Self::Media
    } else if path.starts_with("/static/") || path == "/" {
      Self::Static
    } else {
      Self::Other
    }
  }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh response from the network
  Network,
  /// Cached snapshot served before trying the network
  Cache,
  /// Network unreachable, serving a cached snapshot
  Offline,
  /// Network unreachable and nothing cached; synthesized response
  Fallback,
}

/// A routed response with metadata about its source.
#[derive(Debug, Clone)]
pub struct Routed {
  pub response: Response,
  pub source: ResponseSource,
  /// When the snapshot was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Routed {
  fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  fn from_cache(cached: CachedResponse, offline: bool) -> Self {
    Self {
      response: cached.response,
      source: if offline {
        ResponseSource::Offline
      } else {
        ResponseSource::Cache
      },
      cached_at: Some(cached.cached_at),
    }
  }

  fn fallback(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Fallback,
      cached_at: None,
    }
  }
}

/// Applies the per-route cache strategy to requests.
pub struct CacheRouter<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  names: CacheNames,
}

impl<S: CacheStorage> CacheRouter<S> {
  pub fn new(storage: Arc<S>, network: Arc<dyn Network>, names: CacheNames) -> Self {
    Self {
      storage,
      network,
      names,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  /// Serve a request according to its route.
  pub async fn handle(&self, request: &Request) -> Routed {
    let route = Route::classify(request.path());
    debug!(?route, url = %request.url, "routing request");

    match route {
      Route::Api => {
        self
          .network_first(request, || {
            Response::json(
              503,
              &serde_json::json!({
                "error": "Offline",
                "message": "You are offline and this data is not cached."
              }),
            )
          })
          .await
      }
      Route::Media => {
        self
          .cache_first(request, &self.names.media, |_| {
            Response::text(404, "Media not available offline")
          })
          .await
      }
      Route::Static => {
        self
          .cache_first(request, &self.names.static_assets, |request| {
            if request.accepts_html() {
              if let Some(page) = self.cached_root_page(request) {
                return page;
              }
            }
            Response::text(404, "Resource not available offline")
          })
          .await
      }
      Route::Other => {
        self
          .network_first(request, || {
            Response::text(503, "Page not available offline")
          })
          .await
      }
    }
  }

  /// Network-first: fresh response when reachable (cached on success);
  /// otherwise any cached copy, otherwise the synthesized fallback.
  async fn network_first<F>(&self, request: &Request, offline: F) -> Routed
  where
    F: FnOnce() -> Response,
  {
    match self.network.fetch(request).await {
      Ok(response) => {
        self.store(&self.names.general, request, &response);
        Routed::from_network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed, trying cache");
        match self.lookup_any(request) {
          Some(cached) => Routed::from_cache(cached, true),
          None => Routed::fallback(offline()),
        }
      }
    }
  }

  /// Cache-first: cached copy if present; otherwise the network (cached on
  /// success); otherwise the synthesized fallback.
  async fn cache_first<F>(&self, request: &Request, partition: &str, offline: F) -> Routed
  where
    F: FnOnce(&Request) -> Response,
  {
    if let Some(cached) = self.lookup(partition, &request.cache_key()) {
      return Routed::from_cache(cached, false);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        self.store(partition, request, &response);
        Routed::from_network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed, no cached copy");
        Routed::fallback(offline(request))
      }
    }
  }

  fn cached_root_page(&self, request: &Request) -> Option<Response> {
    let root = request.url.join("/").ok()?;
    self
      .lookup(&self.names.static_assets, root.as_str())
      .map(|cached| cached.response)
  }

  /// Cache a successful GET response. Other methods and statuses are
  /// passed through untouched.
  fn store(&self, partition: &str, request: &Request, response: &Response) {
    if request.method != Method::Get || !response.is_ok() {
      return;
    }
    if let Err(e) = self.storage.put(partition, &request.cache_key(), response) {
      warn!(partition, url = %request.url, error = %e, "failed to cache response");
    }
  }

  fn lookup(&self, partition: &str, key: &str) -> Option<CachedResponse> {
    self
      .storage
      .lookup(partition, key)
      .unwrap_or_else(|e| {
        warn!(partition, key, error = %e, "cache lookup failed");
        None
      })
  }

  fn lookup_any(&self, request: &Request) -> Option<CachedResponse> {
    self
      .storage
      .lookup_any(&request.cache_key())
      .unwrap_or_else(|e| {
        warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      })
  }
}
