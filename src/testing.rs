//! Fakes shared by the unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::error::{Error, Result};
use crate::http::{Method, Network, Request, Response};
use crate::upload::{NotificationLevel, Notifier};
use crate::worker::{Notification, NotificationSink};

pub fn base_url() -> Url {
  Url::parse("http://cmms.test/").unwrap()
}

/// Network with canned responses per URL. Fragments are not sent, as over
/// real HTTP. Unknown URLs answer 404; when offline every request fails at
/// the transport level.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: AtomicUsize,
  requests: Mutex<Vec<(Method, String)>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of fetches attempted, including failed ones.
  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn requests(&self) -> Vec<(Method, String)> {
    self.requests.lock().unwrap().clone()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .requests
      .lock()
      .unwrap()
      .push((request.method, request.url.to_string()));

    if self.offline.load(Ordering::SeqCst) {
      return Err(Error::Network("connection refused".to_string()));
    }

    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&request.cache_key())
        .cloned()
        .unwrap_or_else(|| Response::text(404, "not found")),
    )
  }
}

#[derive(Default)]
pub struct RecordingNotifier {
  messages: Mutex<Vec<(String, NotificationLevel)>>,
}

impl RecordingNotifier {
  pub fn messages(&self) -> Vec<(String, NotificationLevel)> {
    self.messages.lock().unwrap().clone()
  }
}

impl Notifier for RecordingNotifier {
  fn notify(&self, message: &str, level: NotificationLevel) {
    self
      .messages
      .lock()
      .unwrap()
      .push((message.to_string(), level));
  }
}

#[derive(Default)]
pub struct RecordingSink {
  shown: Mutex<Vec<String>>,
  opened: Mutex<Vec<String>>,
}

impl RecordingSink {
  pub fn shown(&self) -> Vec<String> {
    self.shown.lock().unwrap().clone()
  }

  pub fn opened(&self) -> Vec<String> {
    self.opened.lock().unwrap().clone()
  }
}

impl NotificationSink for RecordingSink {
  fn show(&self, notification: &Notification) {
    self.shown.lock().unwrap().push(notification.title.clone());
  }

  fn open_window(&self, path: &str) {
    self.opened.lock().unwrap().push(path.to_string());
  }
}
