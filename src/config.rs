use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::storage::SqliteStorage;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub server: ServerConfig,
  pub upload: UploadConfig,
  pub cache: CacheConfig,
  pub health: HealthConfig,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  /// Base URL of the CMMS server; request paths are resolved against it
  pub url: Url,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      url: Url::parse("http://localhost:5000/").expect("static url"),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
  /// Hard ceiling for any upload, in bytes
  pub max_file_size: u64,
  /// Images larger than this are recompressed before upload
  pub compress_threshold: u64,
  /// Longest side of a recompressed image, in pixels
  pub max_dimension: u32,
  /// JPEG quality (1-100) for recompressed images
  pub jpeg_quality: u8,
}

impl Default for UploadConfig {
  fn default() -> Self {
    Self {
      max_file_size: 50 * 1024 * 1024,
      compress_threshold: 5 * 1024 * 1024,
      max_dimension: 1920,
      jpeg_quality: 80,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Prefix shared by every partition name
  pub prefix: String,
  /// Generation suffix; bumping it retires older partitions on activation
  pub version: String,
  /// URLs stored in the static partition at install time
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      prefix: "cmms".to_string(),
      version: "v1".to_string(),
      precache: [
        "/",
        "/static/css/style.css",
        "/static/js/script.js",
        "/static/js/media-upload.js",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/css/bootstrap.min.css",
        "https://cdn.jsdelivr.net/npm/bootstrap@5.3.0/dist/js/bootstrap.bundle.min.js",
        "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.0.0/css/all.min.css",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
    }
  }
}

/// Names of the three cache partitions for one worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  /// API and page responses
  pub general: String,
  pub static_assets: String,
  pub media: String,
}

impl CacheNames {
  /// Partitions that survive activation. Everything else is deleted,
  /// including the general partition of the current generation.
  pub fn retained(&self) -> [&str; 2] {
    [&self.static_assets, &self.media]
  }
}

impl Default for CacheNames {
  fn default() -> Self {
    CacheConfig::default().names()
  }
}

impl CacheConfig {
  pub fn names(&self) -> CacheNames {
    CacheNames {
      general: format!("{}-{}", self.prefix, self.version),
      static_assets: format!("{}-static-{}", self.prefix, self.version),
      media: format!("{}-media-{}", self.prefix, self.version),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
  /// Delay before the first check after startup
  pub initial_delay_ms: u64,
  /// Interval between connectivity probes in `watch` mode
  pub probe_interval_secs: u64,
}

impl Default for HealthConfig {
  fn default() -> Self {
    Self {
      initial_delay_ms: 1000,
      probe_interval_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite database file (default: $XDG_DATA_HOME/cmms-offline/offline.db)
  pub path: Option<PathBuf>,
}

impl StorageConfig {
  pub fn resolved_path(&self) -> Result<PathBuf> {
    self
      .path
      .clone()
      .or_else(SqliteStorage::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cmms.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cmms-offline/config.yaml
  ///
  /// Without any file the defaults are used. `CMMS_SERVER_URL` overrides
  /// the server URL in every case.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    if let Ok(url) = std::env::var("CMMS_SERVER_URL") {
      config.server.url =
        Url::parse(&url).map_err(|e| eyre!("Invalid CMMS_SERVER_URL '{}': {}", url, e))?;
    }

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cmms.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cmms-offline").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}
