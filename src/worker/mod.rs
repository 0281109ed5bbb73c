//! The service worker: cache routing, lifecycle and page messaging.
//!
//! The worker never uploads anything itself. Background sync is relayed to
//! connected pages, which flush their own offline queues.

mod messages;
mod push;
mod router;

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::CacheNames;
use crate::error::{Error, Result};
use crate::http::{Network, Request, Response};
use crate::storage::CacheStorage;

pub use messages::{Clients, WorkerMessage};
pub use push::{
  click_target, parse_push, LogSink, Notification, NotificationAction, NotificationSink,
  PushPayload, WORK_ORDERS_PATH,
};
pub use router::{CacheRouter, ResponseSource, Route, Routed};

/// Sync tag that triggers an offline-data broadcast.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

pub struct ServiceWorker<S: CacheStorage> {
  base_url: Url,
  storage: Arc<S>,
  network: Arc<dyn Network>,
  router: CacheRouter<S>,
  precache: Vec<String>,
  clients: Clients,
  sink: Arc<dyn NotificationSink>,
  state: Mutex<LifecycleState>,
  skip_waiting: AtomicBool,
  claimed: AtomicBool,
}

impl<S: CacheStorage> ServiceWorker<S> {
  pub fn new(
    base_url: Url,
    storage: Arc<S>,
    network: Arc<dyn Network>,
    names: CacheNames,
    precache: Vec<String>,
  ) -> Self {
    Self {
      router: CacheRouter::new(storage.clone(), network.clone(), names),
      base_url,
      storage,
      network,
      precache,
      clients: Clients::new(),
      sink: Arc::new(LogSink),
      state: Mutex::new(LifecycleState::Parsed),
      skip_waiting: AtomicBool::new(false),
      claimed: AtomicBool::new(false),
    }
  }

  pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
    self.sink = sink;
    self
  }

  pub fn names(&self) -> &CacheNames {
    self.router.names()
  }

  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, state: LifecycleState) {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
  }

  /// Whether the worker asked to activate without waiting.
  pub fn is_skip_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  /// Whether the worker took control of open pages on activation.
  pub fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::SeqCst)
  }

  /// Resolve a possibly relative URL against the server base.
  pub fn resolve(&self, url: &str) -> Result<Url> {
    Ok(self.base_url.join(url)?)
  }

  /// Pre-populate the static partition.
  ///
  /// All-or-nothing: if any precache URL cannot be fetched with a 2xx status
  /// nothing is stored. Either way the worker ends up installed. Returns the
  /// number of entries cached.
  pub async fn install(&self) -> usize {
    info!("Service Worker installing...");
    self.set_state(LifecycleState::Installing);

    let cached = match self.precache_all().await {
      Ok(count) => {
        info!(count, "cached static files");
        count
      }
      Err(e) => {
        error!(error = %e, "Service Worker installation failed");
        0
      }
    };

    self.skip_waiting();
    self.set_state(LifecycleState::Installed);
    info!("Service Worker installed");
    cached
  }

  async fn precache_all(&self) -> Result<usize> {
    let names = self.names();
    self.storage.open_partition(&names.static_assets)?;

    let urls = self
      .precache
      .iter()
      .map(|u| self.resolve(u))
      .collect::<Result<Vec<_>>>()?;

    let fetches = urls.into_iter().map(|url| self.fetch_ok(url));

    let entries = join_all(fetches)
      .await
      .into_iter()
      .collect::<Result<Vec<(String, Response)>>>()?;

    self.storage.put_all(&names.static_assets, &entries)?;
    Ok(entries.len())
  }

  /// Fetch a URL, treating any non-2xx status as a failure.
  async fn fetch_ok(&self, url: Url) -> Result<(String, Response)> {
    let request = Request::get(url);
    let response = self.network.fetch(&request).await?;
    if !response.is_ok() {
      return Err(Error::Network(format!(
        "{} returned status {}",
        request.url, response.status
      )));
    }
    Ok((request.cache_key(), response))
  }

  /// Delete every partition that is not in the current allow-list, then
  /// claim open pages. Returns the names of deleted partitions.
  pub fn activate(&self) -> Result<Vec<String>> {
    info!("Service Worker activating...");
    self.set_state(LifecycleState::Activating);

    let retained = self.names().retained();
    let mut deleted = Vec::new();
    for name in self.storage.partitions()? {
      if !retained.contains(&name.as_str()) {
        info!(cache = %name, "Deleting old cache");
        self.storage.delete_partition(&name)?;
        deleted.push(name);
      }
    }

    self.claimed.store(true, Ordering::SeqCst);
    self.set_state(LifecycleState::Activated);
    info!("Service Worker activated");
    Ok(deleted)
  }

  /// Serve a request through the cache router.
  pub async fn fetch(&self, request: &Request) -> Routed {
    self.router.handle(request).await
  }

  /// Handle a message posted by a page.
  pub async fn handle_message(&self, message: WorkerMessage) {
    match message {
      WorkerMessage::SkipWaiting => self.skip_waiting(),
      WorkerMessage::CacheMedia { url } => {
        if let Err(e) = self.cache_media(&url).await {
          error!(url = %url, error = %e, "Failed to cache media");
        }
      }
      WorkerMessage::SyncOfflineData => {
        debug!("ignoring SYNC_OFFLINE_DATA sent to worker");
      }
    }
  }

  /// Fetch a media URL into the media partition. Returns whether it was
  /// stored; non-2xx responses are not.
  pub async fn cache_media(&self, url: &str) -> Result<bool> {
    let request = Request::get(self.resolve(url)?);
    let response = self.network.fetch(&request).await?;
    if !response.is_ok() {
      warn!(url = %request.url, status = response.status, "media not cached");
      return Ok(false);
    }
    self
      .storage
      .put(&self.names().media, &request.cache_key(), &response)?;
    info!(url = %request.url, "Media cached");
    Ok(true)
  }

  /// Handle a background-sync event. Returns how many pages were told to
  /// flush their queues.
  pub fn sync(&self, tag: &str) -> usize {
    if tag != BACKGROUND_SYNC_TAG {
      debug!(tag, "ignoring sync tag");
      return 0;
    }
    info!("Background sync triggered");
    let notified = self.clients.post_all(&WorkerMessage::SyncOfflineData);
    info!(clients = notified, "Background sync completed");
    notified
  }

  /// Handle a push event, showing a notification when it carries data.
  pub fn push(&self, data: Option<&[u8]>) -> Result<Option<Notification>> {
    let notification = parse_push(data)?;
    if let Some(n) = &notification {
      self.sink.show(n);
    }
    Ok(notification)
  }

  /// Handle a click on a notification action.
  pub fn notification_click(&self, action: Option<&str>) -> Option<&'static str> {
    let target = click_target(action);
    if let Some(path) = target {
      self.sink.open_window(path);
    }
    target
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::CacheConfig;
  use crate::storage::{MemoryStorage, SqliteStorage};
  use crate::testing::{base_url, FakeNetwork, RecordingSink};

  fn worker<S: CacheStorage>(
    storage: Arc<S>,
  ) -> (Arc<FakeNetwork>, Arc<RecordingSink>, ServiceWorker<S>) {
    let network = Arc::new(FakeNetwork::new());
    let sink = Arc::new(RecordingSink::default());
    let config = CacheConfig {
      precache: vec![
        "/".to_string(),
        "/static/css/style.css".to_string(),
        "https://cdn.example/bootstrap.css".to_string(),
      ],
      ..CacheConfig::default()
    };
    let worker = ServiceWorker::new(
      base_url(),
      storage,
      network.clone(),
      config.names(),
      config.precache,
    )
    .with_sink(sink.clone());
    (network, sink, worker)
  }

  fn route_precache(network: &FakeNetwork) {
    network.route("http://cmms.test/", Response::text(200, "<html>home</html>"));
    network.route("http://cmms.test/static/css/style.css", Response::text(200, "css"));
    network.route("https://cdn.example/bootstrap.css", Response::text(200, "bs"));
  }

  #[tokio::test]
  async fn test_install_precaches_static_files() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage.clone());
    route_precache(&network);

    assert_eq!(worker.state(), LifecycleState::Parsed);
    assert_eq!(worker.install().await, 3);

    assert_eq!(worker.state(), LifecycleState::Installed);
    assert!(worker.is_skip_waiting());
    assert!(storage
      .lookup("cmms-static-v1", "https://cdn.example/bootstrap.css")
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage.clone());
    route_precache(&network);
    network.route("http://cmms.test/static/css/style.css", Response::text(404, ""));

    assert_eq!(worker.install().await, 0);
    assert_eq!(worker.state(), LifecycleState::Installed);
    assert!(storage.lookup_any("http://cmms.test/").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_static_served_from_precache_offline() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage);
    route_precache(&network);
    worker.install().await;
    let calls_after_install = network.calls();

    network.set_offline(true);
    let css = worker
      .fetch(&Request::get(worker.resolve("/static/css/style.css").unwrap()))
      .await;
    assert_eq!(css.response.text_body(), "css");
    assert_eq!(network.calls(), calls_after_install);
  }

  #[test]
  fn test_activate_deletes_only_unlisted_partitions() {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    for name in ["cmms-v0", "cmms-static-v0", "cmms-static-v1", "cmms-v1", "cmms-media-v1", "other"] {
      storage.open_partition(name).unwrap();
    }
    let (_network, _sink, worker) = worker(storage.clone());

    let deleted = worker.activate().unwrap();

    assert_eq!(deleted, vec!["cmms-v0", "cmms-static-v0", "cmms-v1", "other"]);
    assert_eq!(
      storage.partitions().unwrap(),
      vec!["cmms-static-v1", "cmms-media-v1"]
    );
    assert_eq!(worker.state(), LifecycleState::Activated);
    assert!(worker.is_claimed());
  }

  #[tokio::test]
  async fn test_cache_media_message() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage.clone());
    network.route(
      "http://cmms.test/static/uploads/wo-9.jpg",
      Response::text(200, "jpeg"),
    );

    worker
      .handle_message(WorkerMessage::CacheMedia {
        url: "/static/uploads/wo-9.jpg".to_string(),
      })
      .await;

    assert!(storage
      .lookup("cmms-media-v1", "http://cmms.test/static/uploads/wo-9.jpg")
      .unwrap()
      .is_some());
  }

  #[tokio::test]
  async fn test_cached_media_matches_without_fragment() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage.clone());
    network.route(
      "http://cmms.test/static/uploads/wo-9.jpg",
      Response::text(200, "jpeg"),
    );
    assert!(worker.cache_media("/static/uploads/wo-9.jpg#zoom").await.unwrap());

    network.set_offline(true);
    let routed = worker
      .fetch(&Request::get(worker.resolve("/static/uploads/wo-9.jpg#thumb").unwrap()))
      .await;
    assert_eq!(routed.source, ResponseSource::Cache);
    assert_eq!(routed.response.text_body(), "jpeg");
  }

  #[tokio::test]
  async fn test_cache_media_failure_is_swallowed() {
    let storage = Arc::new(MemoryStorage::new());
    let (network, _sink, worker) = worker(storage.clone());
    network.set_offline(true);

    worker
      .handle_message(WorkerMessage::CacheMedia {
        url: "/static/uploads/wo-9.jpg".to_string(),
      })
      .await;

    assert!(storage.partitions().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_skip_waiting_message() {
    let (_network, _sink, worker) = worker(Arc::new(MemoryStorage::new()));
    assert!(!worker.is_skip_waiting());
    worker.handle_message(WorkerMessage::SkipWaiting).await;
    assert!(worker.is_skip_waiting());
  }

  #[tokio::test]
  async fn test_sync_broadcasts_to_clients() {
    let (network, _sink, worker) = worker(Arc::new(MemoryStorage::new()));
    let mut page = worker.clients().connect();

    assert_eq!(worker.sync("some-other-tag"), 0);
    assert_eq!(worker.sync(BACKGROUND_SYNC_TAG), 1);
    assert_eq!(page.recv().await, Some(WorkerMessage::SyncOfflineData));
    // Relaying only: the worker itself makes no requests
    assert_eq!(network.calls(), 0);
  }

  #[test]
  fn test_push_and_click_reach_sink() {
    let (_network, sink, worker) = worker(Arc::new(MemoryStorage::new()));

    let shown = worker
      .push(Some(&br#"{"title":"WO-3 overdue"}"#[..]))
      .unwrap()
      .unwrap();
    assert_eq!(shown.title, "WO-3 overdue");
    assert!(worker.push(None).unwrap().is_none());

    assert_eq!(worker.notification_click(Some("explore")), Some("/work-orders"));
    assert_eq!(worker.notification_click(Some("close")), None);

    assert_eq!(sink.shown(), vec!["WO-3 overdue".to_string()]);
    assert_eq!(sink.opened(), vec!["/work-orders".to_string()]);
  }
}
