//! Media uploads with validation, image recompression and an offline queue.

mod manager;
mod notify;
mod queue;
mod validate;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

pub use manager::{RecordingHandler, UploadManager, UploadOutcome};
pub use notify::{LogNotifier, NotificationLevel, Notifier};
pub use queue::{FlushReport, OfflineQueue, QueueItem, QUEUE_STORAGE_KEY};
pub use validate::{compress_image, Validator};

/// Upload category, chosen by the page and sent as the `media_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Image,
  Video,
  Audio,
}

impl Category {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Image => "image",
      Self::Video => "video",
      Self::Audio => "audio",
    }
  }

  /// MIME types accepted for this category.
  pub fn allowed_types(&self) -> &'static [&'static str] {
    match self {
      Self::Image => &["image/jpeg", "image/png", "image/webp", "image/gif"],
      Self::Video => &["video/mp4", "video/webm", "video/ogg"],
      Self::Audio => &["audio/mp3", "audio/wav", "audio/ogg", "audio/m4a", "audio/webm"],
    }
  }
}

impl fmt::Display for Category {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Category {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "image" => Ok(Self::Image),
      "video" => Ok(Self::Video),
      "audio" => Ok(Self::Audio),
      other => Err(Error::UnsupportedCategory(other.to_string())),
    }
  }
}

/// Work order (and optionally comment) an upload is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
  pub work_order_id: u64,
  pub comment_id: Option<u64>,
}

impl UploadTarget {
  pub fn work_order(work_order_id: u64) -> Self {
    Self {
      work_order_id,
      comment_id: None,
    }
  }

  pub fn comment(work_order_id: u64, comment_id: u64) -> Self {
    Self {
      work_order_id,
      comment_id: Some(comment_id),
    }
  }

  /// Server path the upload is posted to.
  pub fn endpoint_path(&self) -> String {
    match self.comment_id {
      Some(comment_id) => format!(
        "/api/work-orders/{}/comments/{}/upload-media",
        self.work_order_id, comment_id
      ),
      None => format!("/api/work-orders/{}/upload-media", self.work_order_id),
    }
  }
}

/// File contents plus the metadata the server needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
  pub name: String,
  pub mime_type: String,
  #[serde(with = "base64_bytes")]
  pub data: Vec<u8>,
}

impl FilePayload {
  pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
    Self {
      name: name.into(),
      mime_type: mime_type.into(),
      data,
    }
  }

  /// Read a file from disk, taking the MIME type from `mime_type` or,
  /// failing that, from the file extension. Containers shared by audio and
  /// video (`.webm`, `.ogg`) resolve according to `category`.
  pub async fn from_path(
    path: &Path,
    mime_type: Option<&str>,
    category: Category,
  ) -> Result<Self> {
    let data = tokio::fs::read(path).await?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());
    let mime_type = match mime_type {
      Some(m) => m.to_string(),
      None => guess_mime_type(path, category).to_string(),
    };
    Ok(Self::new(name, mime_type, data))
  }

  pub fn size(&self) -> u64 {
    self.data.len() as u64
  }
}

fn guess_mime_type(path: &Path, category: Category) -> &'static str {
  let ext = path
    .extension()
    .map(|e| e.to_string_lossy().to_lowercase())
    .unwrap_or_default();

  match ext.as_str() {
    "jpg" | "jpeg" => "image/jpeg",
    "png" => "image/png",
    "webp" => "image/webp",
    "gif" => "image/gif",
    "mp4" => "video/mp4",
    "webm" if category == Category::Audio => "audio/webm",
    "webm" => "video/webm",
    "ogg" if category == Category::Video => "video/ogg",
    "ogv" => "video/ogg",
    "mp3" => "audio/mp3",
    "wav" => "audio/wav",
    "ogg" | "oga" => "audio/ogg",
    "m4a" => "audio/m4a",
    _ => "application/octet-stream",
  }
}

mod base64_bytes {
  use super::BASE64;
  use base64::Engine;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(data))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64.decode(encoded).map_err(serde::de::Error::custom)
  }
}
