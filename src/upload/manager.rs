//! Page-side upload manager.

use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

use super::notify::{LogNotifier, NotificationLevel, Notifier};
use super::queue::{FlushReport, OfflineQueue, QueueItem};
use super::validate::Validator;
use super::{Category, FilePayload, UploadTarget};
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::http::{Body, MultipartForm, Network, Request};
use crate::storage::KeyValueStore;
use crate::worker::WorkerMessage;

/// Result of an upload attempt as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadOutcome {
  pub success: bool,
  /// True when the file went to the offline queue instead of the server
  #[serde(default)]
  pub offline: bool,
  #[serde(default)]
  pub message: String,
}

impl UploadOutcome {
  fn saved_offline() -> Self {
    Self {
      success: true,
      offline: true,
      message: "File saved for offline upload".to_string(),
    }
  }

  fn failed_and_queued(message: String) -> Self {
    Self {
      success: false,
      offline: true,
      message,
    }
  }
}

/// Receives finished voice recordings. Registered explicitly on the manager
/// instead of being looked up as a global callback.
pub trait RecordingHandler: Send + Sync {
  fn on_recording_complete(&self, file: FilePayload);
}

impl<F> RecordingHandler for F
where
  F: Fn(FilePayload) + Send + Sync,
{
  fn on_recording_complete(&self, file: FilePayload) {
    self(file)
  }
}

/// Validates and uploads media, falling back to the offline queue whenever
/// the server cannot be reached or refuses the file.
pub struct UploadManager {
  base_url: Url,
  network: Arc<dyn Network>,
  queue: OfflineQueue,
  validator: Validator,
  notifier: Arc<dyn Notifier>,
  online: AtomicBool,
  recording_handler: Mutex<Option<Box<dyn RecordingHandler>>>,
}

impl UploadManager {
  /// Create a manager; the persisted queue is loaded from `store`.
  pub fn new(
    base_url: Url,
    config: UploadConfig,
    network: Arc<dyn Network>,
    store: Arc<dyn KeyValueStore>,
  ) -> Self {
    Self {
      base_url,
      network,
      queue: OfflineQueue::load(store),
      validator: Validator::new(config),
      notifier: Arc::new(LogNotifier),
      online: AtomicBool::new(true),
      recording_handler: Mutex::new(None),
    }
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  /// Set the initial connectivity state without triggering a flush.
  pub fn with_online(self, online: bool) -> Self {
    self.online.store(online, Ordering::SeqCst);
    self
  }

  pub fn queue(&self) -> &OfflineQueue {
    &self.queue
  }

  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Pending-upload indicator text, if anything is queued.
  pub fn pending_indicator(&self) -> Option<String> {
    self.queue.indicator()
  }

  /// Validate and upload a file.
  ///
  /// Validation errors are returned as `Err`. Every other failure queues
  /// the file and comes back as an `Ok` outcome with `offline == true`.
  pub async fn upload(
    &self,
    file: FilePayload,
    category: Category,
    target: UploadTarget,
  ) -> Result<UploadOutcome> {
    let file = self.validator.validate(file, category)?;

    if !self.is_online() {
      self.queue.enqueue(file, category, target);
      return Ok(UploadOutcome::saved_offline());
    }

    match self.send(&file, category, target).await {
      Ok(outcome) => {
        self.notifier.notify(
          &format!("{} uploaded successfully!", category),
          NotificationLevel::Success,
        );
        Ok(outcome)
      }
      Err(e) => {
        warn!(name = %file.name, error = %e, "upload failed, queueing");
        let message = match e {
          Error::Rejected(message) => message,
          other => other.to_string(),
        };
        self.queue.enqueue(file, category, target);
        self.notifier.notify(
          "Upload failed. File saved for offline upload.",
          NotificationLevel::Warning,
        );
        Ok(UploadOutcome::failed_and_queued(message))
      }
    }
  }

  /// POST the file and decode the server's `{success, message}` reply.
  async fn send(
    &self,
    file: &FilePayload,
    category: Category,
    target: UploadTarget,
  ) -> Result<UploadOutcome> {
    let url = self.base_url.join(&target.endpoint_path())?;
    let form = MultipartForm {
      fields: vec![("media_type".to_string(), category.to_string())],
      file_field: "images".to_string(),
      file: file.clone(),
    };

    debug!(%url, name = %file.name, "uploading");
    let response = self
      .network
      .fetch(&Request::post(url, Body::Multipart(form)))
      .await?;

    let outcome: UploadOutcome = response.json_body()?;
    if outcome.success {
      Ok(outcome)
    } else {
      Err(Error::Rejected(outcome.message))
    }
  }

  /// One retry of a queued item. Failures leave re-queueing to the caller.
  async fn retry(&self, item: QueueItem) -> Result<()> {
    let file = self.validator.validate(item.file, item.category)?;
    if !self.is_online() {
      return Err(Error::Network("offline".to_string()));
    }
    self.send(&file, item.category, item.target).await?;
    Ok(())
  }

  /// Retry every queued upload once.
  pub async fn flush(&self) -> FlushReport {
    let report = self.queue.flush(|item| self.retry(item)).await;
    if let Some(indicator) = self.queue.indicator() {
      info!("{}", indicator);
    }
    report
  }

  /// Record a connectivity change. Only an offline → online transition
  /// flushes the queue, so each transition yields at most one flush.
  pub async fn set_online(&self, online: bool) -> Option<FlushReport> {
    let was_online = self.online.swap(online, Ordering::SeqCst);

    match (was_online, online) {
      (false, true) => {
        self.notifier.notify(
          "Connection restored. Syncing offline data...",
          NotificationLevel::Success,
        );
        Some(self.flush().await)
      }
      (true, false) => {
        self.notifier.notify(
          "You are offline. Changes will be saved locally.",
          NotificationLevel::Warning,
        );
        None
      }
      _ => None,
    }
  }

  /// React to a message broadcast by the service worker.
  pub async fn handle_worker_message(&self, message: &WorkerMessage) -> Option<FlushReport> {
    match message {
      WorkerMessage::SyncOfflineData => Some(self.flush().await),
      _ => None,
    }
  }

  /// Register the handler that receives finished voice recordings,
  /// replacing any previous one.
  pub fn on_recording_complete(&self, handler: impl RecordingHandler + 'static) {
    *self
      .recording_handler
      .lock()
      .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
  }

  /// Hand a finished recording to the registered handler. Returns whether
  /// a handler was registered.
  pub fn recording_complete(&self, file: FilePayload) -> bool {
    let handler = self
      .recording_handler
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    match handler.as_ref() {
      Some(handler) => {
        handler.on_recording_complete(file);
        true
      }
      None => {
        debug!(name = %file.name, "no recording handler registered");
        false
      }
    }
  }
}
