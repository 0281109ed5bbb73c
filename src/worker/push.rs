//! Push notifications shown by the worker.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Where clicking the "explore" action takes the user.
pub const WORK_ORDERS_PATH: &str = "/work-orders";

/// Body of a push message.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
  pub title: String,
  #[serde(default)]
  pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  pub date_of_arrival: i64,
  pub primary_key: u32,
}

/// A notification ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: Option<String>,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  /// Build the work-order notification for a push payload.
  pub fn from_push(payload: PushPayload) -> Self {
    Self {
      title: payload.title,
      body: payload.body,
      icon: "/static/img/icon-192x192.png".to_string(),
      badge: "/static/img/badge-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      data: NotificationData {
        date_of_arrival: Utc::now().timestamp_millis(),
        primary_key: 1,
      },
      actions: vec![
        NotificationAction {
          action: "explore".to_string(),
          title: "View Work Order".to_string(),
          icon: "/static/img/checkmark.png".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Close".to_string(),
          icon: "/static/img/xmark.png".to_string(),
        },
      ],
    }
  }
}

/// Parse raw push data. `None` when the push carried no data.
pub fn parse_push(data: Option<&[u8]>) -> Result<Option<Notification>> {
  match data {
    Some(bytes) => {
      let payload: PushPayload = serde_json::from_slice(bytes)?;
      Ok(Some(Notification::from_push(payload)))
    }
    None => Ok(None),
  }
}

/// Path to open for a clicked notification action, if any.
pub fn click_target(action: Option<&str>) -> Option<&'static str> {
  match action {
    Some("explore") => Some(WORK_ORDERS_PATH),
    _ => None,
  }
}

/// Displays notifications and opens windows on the worker's behalf.
pub trait NotificationSink: Send + Sync {
  fn show(&self, notification: &Notification);

  fn open_window(&self, path: &str);
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
  fn show(&self, notification: &Notification) {
    info!(
      title = %notification.title,
      body = notification.body.as_deref().unwrap_or(""),
      "notification"
    );
  }

  fn open_window(&self, path: &str) {
    info!(path, "open window");
  }
}
