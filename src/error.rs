//! Error types for the cmms-offline library.

use thiserror::Error;

/// Errors that can occur in the upload, storage and routing layers.
#[derive(Error, Debug)]
pub enum Error {
  /// File exceeds the configured upload ceiling.
  #[error("File size exceeds {limit_mb}MB limit")]
  FileTooLarge {
    /// Size of the rejected file in bytes.
    size: u64,
    /// Ceiling in whole megabytes, as shown to the user.
    limit_mb: u64,
  },

  /// Upload category is not one of image, video or audio.
  #[error("Unsupported file type")]
  UnsupportedCategory(String),

  /// MIME type is not allowed for the chosen category.
  #[error("Unsupported file type: {0}")]
  UnsupportedType(String),

  /// Image could not be decoded or re-encoded.
  #[error("Image error: {0}")]
  Image(#[from] image::ImageError),

  /// Transport-level failure: the server could not be reached.
  #[error("Network error: {0}")]
  Network(String),

  /// Server answered but refused the upload.
  #[error("Upload rejected: {0}")]
  Rejected(String),

  /// SQLite storage failure.
  #[error("Storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  /// Stored data could not be read back.
  #[error("Corrupt storage data: {0}")]
  Corrupt(String),

  /// JSON (de)serialization failure.
  #[error("Serialization error: {0}")]
  Json(#[from] serde_json::Error),

  /// HTTP client error.
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  /// I/O error.
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  /// A mutex guarding shared state was poisoned.
  #[error("Lock poisoned: {0}")]
  Poisoned(String),

  /// Request URL could not be parsed.
  #[error("Invalid URL: {0}")]
  Url(#[from] url::ParseError),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
  fn from(e: std::sync::PoisonError<T>) -> Self {
    Self::Poisoned(e.to_string())
  }
}

/// A specialized `Result` type for cmms-offline operations.
pub type Result<T> = std::result::Result<T, Error>;
