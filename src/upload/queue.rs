//! Durable queue of uploads waiting for a successful network attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use super::{Category, FilePayload, UploadTarget};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Storage key holding the serialized queue array.
pub const QUEUE_STORAGE_KEY: &str = "mediaUploadQueue";

/// A pending upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
  /// Millisecond timestamp of creation. Two items enqueued in the same
  /// millisecond share an id.
  pub id: String,
  pub file: FilePayload,
  #[serde(rename = "type")]
  pub category: Category,
  #[serde(flatten)]
  pub target: UploadTarget,
  pub timestamp: DateTime<Utc>,
}

impl QueueItem {
  pub fn new(file: FilePayload, category: Category, target: UploadTarget) -> Self {
    let timestamp = Utc::now();
    Self {
      id: timestamp.timestamp_millis().to_string(),
      file,
      category,
      target,
      timestamp,
    }
  }
}

/// Result of one pass over the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
  pub uploaded: usize,
  pub requeued: usize,
}

/// FIFO-ish list of pending uploads mirrored to a key-value store.
///
/// Every mutation rewrites the whole array under [`QUEUE_STORAGE_KEY`].
/// There is no deduplication, no retry cap and no backoff.
pub struct OfflineQueue {
  store: Arc<dyn KeyValueStore>,
  items: Mutex<Vec<QueueItem>>,
}

impl OfflineQueue {
  /// Load the queue from storage. Unreadable or unparseable state is
  /// discarded and the queue starts empty.
  pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
    let items = match store.get(QUEUE_STORAGE_KEY) {
      Ok(Some(saved)) => match serde_json::from_str::<Vec<QueueItem>>(&saved) {
        Ok(items) => items,
        Err(e) => {
          warn!(error = %e, "failed to load offline queue, starting empty");
          Vec::new()
        }
      },
      Ok(None) => Vec::new(),
      Err(e) => {
        warn!(error = %e, "failed to read offline queue, starting empty");
        Vec::new()
      }
    };

    if !items.is_empty() {
      info!(pending = items.len(), "loaded offline queue");
    }

    Self {
      store,
      items: Mutex::new(items),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Vec<QueueItem>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Persist the given snapshot. Failures are logged; the in-memory queue
  /// stays authoritative until the next successful write.
  fn save(&self, items: &[QueueItem]) {
    if let Err(e) = self.try_save(items) {
      warn!(error = %e, "failed to persist offline queue");
    }
  }

  fn try_save(&self, items: &[QueueItem]) -> Result<()> {
    let json = serde_json::to_string(items)?;
    self.store.set(QUEUE_STORAGE_KEY, &json)
  }

  /// Add a new item to the end of the queue and persist it.
  pub fn enqueue(&self, file: FilePayload, category: Category, target: UploadTarget) -> QueueItem {
    let item = QueueItem::new(file, category, target);
    self.push(item.clone());
    debug!(id = %item.id, name = %item.file.name, "queued upload");
    item
  }

  /// Append an existing item, e.g. one whose retry just failed.
  pub fn push(&self, item: QueueItem) {
    let mut items = self.lock();
    items.push(item);
    self.save(&items);
  }

  /// Remove and return every queued item, persisting the empty queue.
  pub fn take_all(&self) -> Vec<QueueItem> {
    let mut items = self.lock();
    let taken = std::mem::take(&mut *items);
    self.save(&items);
    taken
  }

  /// Snapshot of the queued items in order.
  pub fn items(&self) -> Vec<QueueItem> {
    self.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Pending-upload indicator text, `None` when nothing is pending.
  pub fn indicator(&self) -> Option<String> {
    match self.len() {
      0 => None,
      n => Some(format!("{} file(s) pending upload", n)),
    }
  }

  /// Attempt every item queued at the time of the call, in order.
  ///
  /// Items whose upload fails are appended to the end of the queue, behind
  /// anything enqueued while the flush was running. Concurrent flushes are
  /// not coordinated.
  pub async fn flush<F, Fut>(&self, upload: F) -> FlushReport
  where
    F: Fn(QueueItem) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    let pending = self.take_all();
    if pending.is_empty() {
      return FlushReport::default();
    }

    info!(pending = pending.len(), "processing offline queue");
    let mut report = FlushReport::default();

    for item in pending {
      match upload(item.clone()).await {
        Ok(()) => report.uploaded += 1,
        Err(e) => {
          warn!(id = %item.id, error = %e, "failed to process offline item");
          self.push(item);
          report.requeued += 1;
        }
      }
    }

    info!(
      uploaded = report.uploaded,
      requeued = report.requeued,
      "offline queue processed"
    );
    report
  }
}
