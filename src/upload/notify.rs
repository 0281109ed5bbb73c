//! Transient user notifications.

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Info,
  Success,
  Warning,
  Error,
}

/// Receives the short status messages the upload manager emits.
pub trait Notifier: Send + Sync {
  fn notify(&self, message: &str, level: NotificationLevel);
}

/// Notifier that writes every message to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn notify(&self, message: &str, level: NotificationLevel) {
    match level {
      NotificationLevel::Info | NotificationLevel::Success => info!("{}", message),
      NotificationLevel::Warning => warn!("{}", message),
      NotificationLevel::Error => error!("{}", message),
    }
  }
}
