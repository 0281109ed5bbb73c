//! cmms-offline - offline support for the CMMS web client.
//!
//! This library provides the client-side pieces that keep the maintenance
//! app usable without a network connection:
//!
//! - [`UploadManager`] validates media, recompresses large images and uploads
//!   them, parking anything it cannot deliver in a durable [`OfflineQueue`]
//! - [`ServiceWorker`] routes requests through named cache partitions with
//!   network-first or cache-first strategies and relays background sync
//! - [`HealthChecker`] probes the server's `/health` endpoint
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmms_offline::{Category, Config, FilePayload, ReqwestNetwork, SqliteStorage,
//!   UploadManager, UploadTarget};
//!
//! # async fn example() -> cmms_offline::Result<()> {
//! let config = Config::default();
//! let storage = Arc::new(SqliteStorage::open_in_memory()?);
//! let network = Arc::new(ReqwestNetwork::new()?);
//!
//! let manager = UploadManager::new(config.server.url, config.upload, network, storage);
//! let file = FilePayload::new("pump.jpg", "image/jpeg", vec![0xff, 0xd8]);
//! let outcome = manager.upload(file, Category::Image, UploadTarget::work_order(17)).await?;
//! println!("uploaded: {}, queued: {}", outcome.success, outcome.offline);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod health;
pub mod http;
pub mod logging;
pub mod storage;
pub mod upload;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{CacheNames, Config};
pub use error::{Error, Result};
pub use event::{Event, EventHandler};
pub use health::{HealthChecker, HealthStatus};
pub use http::{Network, Request, Response, ReqwestNetwork};
pub use storage::{CacheStorage, KeyValueStore, MemoryStorage, SqliteStorage};
pub use upload::{
  Category, FilePayload, FlushReport, OfflineQueue, UploadManager, UploadOutcome, UploadTarget,
};
pub use worker::{Clients, LifecycleState, ServiceWorker, WorkerMessage};
