use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::health::HealthChecker;
use crate::worker::WorkerMessage;

/// Connectivity events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// Server became reachable
  Online,
  /// Server stopped answering
  Offline,
  /// Message broadcast by the worker
  Worker(WorkerMessage),
}

/// Event for a probe result, or `None` when the state did not change.
fn transition(previous: Option<bool>, reachable: bool) -> Option<Event> {
  if previous == Some(reachable) {
    return None;
  }
  Some(if reachable { Event::Online } else { Event::Offline })
}

/// Event handler that probes the server and relays worker messages
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler probing at the given interval. The first
  /// probe always reports its result. A probe that takes longer than the
  /// interval counts as offline. Probing stops once the handler is dropped.
  pub fn new(checker: HealthChecker, probe_interval: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let probe_tx = tx.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(probe_interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      let mut previous = None;

      loop {
        tokio::select! {
          _ = ticker.tick() => {}
          _ = probe_tx.closed() => break,
        }

        // A stalled server counts as unreachable
        let reachable = tokio::select! {
          result = tokio::time::timeout(probe_interval, checker.check()) => {
            result.map(|status| status.is_healthy()).unwrap_or(false)
          }
          _ = probe_tx.closed() => break,
        };
        debug!(reachable, "connectivity probe");

        if let Some(event) = transition(previous, reachable) {
          if probe_tx.send(event).is_err() {
            break;
          }
        }
        previous = Some(reachable);
      }
    });

    Self { tx, rx }
  }

  /// Relay messages from a worker client channel as events
  pub fn forward(&self, mut messages: mpsc::UnboundedReceiver<WorkerMessage>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      while let Some(message) = messages.recv().await {
        if tx.send(Event::Worker(message)).is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::Result;
  use crate::http::{Network, Request, Response};
  use crate::testing::{base_url, FakeNetwork};
  use async_trait::async_trait;
  use crate::worker::Clients;
  use std::sync::Arc;
  use tokio::time::timeout;

  const WAIT: Duration = Duration::from_secs(2);

  #[test]
  fn test_transition() {
    assert_eq!(transition(None, true), Some(Event::Online));
    assert_eq!(transition(None, false), Some(Event::Offline));
    assert_eq!(transition(Some(true), true), None);
    assert_eq!(transition(Some(false), false), None);
    assert_eq!(transition(Some(true), false), Some(Event::Offline));
    assert_eq!(transition(Some(false), true), Some(Event::Online));
  }

  #[tokio::test]
  async fn test_probe_reports_transitions_only() {
    let network = Arc::new(FakeNetwork::new());
    network.route(
      "http://cmms.test/health",
      Response::json(200, &serde_json::json!({ "message": "ok" })),
    );
    let checker = HealthChecker::new(&base_url(), network.clone()).unwrap();
    let mut events = EventHandler::new(checker, Duration::from_millis(10));

    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Online));

    network.set_offline(true);
    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Offline));

    network.set_offline(false);
    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Online));
  }

  #[tokio::test]
  async fn test_forward_worker_messages() {
    let network = Arc::new(FakeNetwork::new());
    network.set_offline(true);
    let checker = HealthChecker::new(&base_url(), network).unwrap();
    let mut events = EventHandler::new(checker, Duration::from_secs(3600));

    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Offline));

    let clients = Clients::new();
    events.forward(clients.connect());
    clients.post_all(&WorkerMessage::SyncOfflineData);

    assert_eq!(
      timeout(WAIT, events.next()).await.unwrap(),
      Some(Event::Worker(WorkerMessage::SyncOfflineData))
    );
  }

  /// Accepts the connection and never answers.
  struct StalledNetwork;

  #[async_trait]
  impl Network for StalledNetwork {
    async fn fetch(&self, _request: &Request) -> Result<Response> {
      std::future::pending::<Result<Response>>().await
    }
  }

  #[tokio::test]
  async fn test_stalled_server_reports_offline() {
    let checker = HealthChecker::new(&base_url(), Arc::new(StalledNetwork)).unwrap();
    let mut events = EventHandler::new(checker, Duration::from_millis(10));

    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Offline));
  }

  #[tokio::test]
  async fn test_probing_stops_after_drop() {
    let network = Arc::new(FakeNetwork::new());
    network.route(
      "http://cmms.test/health",
      Response::json(200, &serde_json::json!({ "message": "ok" })),
    );
    let checker = HealthChecker::new(&base_url(), network.clone()).unwrap();
    let mut events = EventHandler::new(checker, Duration::from_millis(10));
    assert_eq!(timeout(WAIT, events.next()).await.unwrap(), Some(Event::Online));

    drop(events);
    tokio::time::sleep(Duration::from_millis(50)).await;
    let calls = network.calls();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(network.calls(), calls);
  }
}
