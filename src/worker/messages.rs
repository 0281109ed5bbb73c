//! Worker ⇄ page message protocol and the registry of connected pages.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Messages exchanged between pages and the worker.
///
/// Serialized with a `type` tag, e.g. `{"type":"CACHE_MEDIA","url":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  /// Page → worker: activate without waiting for old pages to close
  SkipWaiting,
  /// Page → worker: fetch a media URL into the media partition
  CacheMedia { url: String },
  /// Worker → pages: flush your offline queues
  SyncOfflineData,
}

/// Pages currently connected to the worker.
#[derive(Debug, Default)]
pub struct Clients {
  senders: Mutex<Vec<mpsc::UnboundedSender<WorkerMessage>>>,
}

impl Clients {
  pub fn new() -> Self {
    Self::default()
  }

  /// Connect a page; it receives every broadcast from now on.
  pub fn connect(&self) -> mpsc::UnboundedReceiver<WorkerMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .senders
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(tx);
    rx
  }

  /// Post a message to every connected page, forgetting pages that went
  /// away. Returns how many pages received it.
  pub fn post_all(&self, message: &WorkerMessage) -> usize {
    let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
    senders.retain(|tx| tx.send(message.clone()).is_ok());
    debug!(?message, clients = senders.len(), "broadcast to clients");
    senders.len()
  }

  pub fn len(&self) -> usize {
    let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
    senders.retain(|tx| !tx.is_closed());
    senders.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_wire_format() {
    assert_eq!(
      serde_json::to_string(&WorkerMessage::SkipWaiting).unwrap(),
      r#"{"type":"SKIP_WAITING"}"#
    );
    assert_eq!(
      serde_json::to_string(&WorkerMessage::SyncOfflineData).unwrap(),
      r#"{"type":"SYNC_OFFLINE_DATA"}"#
    );

    let parsed: WorkerMessage =
      serde_json::from_str(r#"{"type":"CACHE_MEDIA","url":"/static/uploads/a.jpg"}"#).unwrap();
    assert_eq!(
      parsed,
      WorkerMessage::CacheMedia {
        url: "/static/uploads/a.jpg".to_string()
      }
    );
  }

  #[tokio::test]
  async fn test_post_all_reaches_every_open_client() {
    let clients = Clients::new();
    let mut first = clients.connect();
    let mut second = clients.connect();
    let closed = clients.connect();
    drop(closed);

    assert_eq!(clients.post_all(&WorkerMessage::SyncOfflineData), 2);
    assert_eq!(first.recv().await, Some(WorkerMessage::SyncOfflineData));
    assert_eq!(second.recv().await, Some(WorkerMessage::SyncOfflineData));
    assert_eq!(clients.len(), 2);
  }
}
