use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use cmms_offline::event::{Event, EventHandler};
use cmms_offline::worker::BACKGROUND_SYNC_TAG;
use cmms_offline::{
  logging, Category, Config, FilePayload, HealthChecker, Network, Request, ReqwestNetwork,
  ServiceWorker, SqliteStorage, UploadManager, UploadTarget,
};

#[derive(Parser, Debug)]
#[command(name = "cmms-offline")]
#[command(about = "Offline uploads, response caching and health checks for the CMMS client")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./cmms.yaml or $XDG_CONFIG_HOME/cmms-offline/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Check the server's health endpoint
  Health,
  /// Upload a media file, queueing it if the server cannot take it
  Upload {
    file: PathBuf,
    /// image, video or audio
    #[arg(long, default_value = "image")]
    category: Category,
    #[arg(long)]
    work_order: u64,
    /// Attach to a comment on the work order
    #[arg(long)]
    comment: Option<u64>,
    /// Override the MIME type guessed from the file extension
    #[arg(long)]
    mime: Option<String>,
  },
  /// List queued uploads
  Queue,
  /// Retry every queued upload
  Flush,
  /// Fetch a path through the cache router
  Fetch {
    path: String,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
  },
  /// Pre-populate the static cache
  Install,
  /// Delete caches that are no longer in use
  Activate,
  /// Store a media URL in the media cache
  CacheMedia { url: String },
  /// Fire a background-sync event
  Sync {
    #[arg(long, default_value = BACKGROUND_SYNC_TAG)]
    tag: String,
  },
  /// Watch connectivity and flush the queue whenever the server comes back
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  let _guard = logging::init(logging::default_log_dir().as_deref());

  let storage = Arc::new(SqliteStorage::open(&config.storage.resolved_path()?)?);
  let network: Arc<dyn Network> = Arc::new(ReqwestNetwork::new()?);

  let manager = || {
    UploadManager::new(
      config.server.url.clone(),
      config.upload.clone(),
      network.clone(),
      storage.clone(),
    )
  };
  let worker = || {
    ServiceWorker::new(
      config.server.url.clone(),
      storage.clone(),
      network.clone(),
      config.cache.names(),
      config.cache.precache.clone(),
    )
  };

  match args.command {
    Command::Health => {
      tokio::time::sleep(Duration::from_millis(config.health.initial_delay_ms)).await;
      let checker = HealthChecker::new(&config.server.url, network.clone())?;
      println!("{}", checker.check().await);
    }
    Command::Upload {
      file,
      category,
      work_order,
      comment,
      mime,
    } => {
      let payload = FilePayload::from_path(&file, mime.as_deref(), category).await?;
      let target = match comment {
        Some(comment_id) => UploadTarget::comment(work_order, comment_id),
        None => UploadTarget::work_order(work_order),
      };

      let manager = manager();
      let outcome = manager.upload(payload, category, target).await?;
      if outcome.offline {
        println!("{}", outcome.message);
      } else {
        println!("{} uploaded successfully!", category);
      }
      if let Some(indicator) = manager.pending_indicator() {
        println!("{}", indicator);
      }
    }
    Command::Queue => {
      let manager = manager();
      let items = manager.queue().items();
      if items.is_empty() {
        println!("No pending uploads");
      }
      for item in items {
        println!(
          "{}  {}  {}  {} ({} bytes)  queued {}",
          item.id,
          item.category,
          item.target.endpoint_path(),
          item.file.name,
          item.file.size(),
          item.timestamp.format("%Y-%m-%d %H:%M:%S"),
        );
      }
    }
    Command::Flush => {
      let report = manager().flush().await;
      println!(
        "{} uploaded, {} still pending",
        report.uploaded, report.requeued
      );
    }
    Command::Fetch { path, accept } => {
      let worker = worker();
      let mut request = Request::get(worker.resolve(&path)?);
      if let Some(accept) = accept {
        request = request.with_accept(accept);
      }

      let routed = worker.fetch(&request).await;
      eprintln!(
        "{} ({:?}{})",
        routed.response.status,
        routed.source,
        routed
          .cached_at
          .map(|t| format!(", cached {}", t.format("%Y-%m-%d %H:%M:%S")))
          .unwrap_or_default()
      );
      println!("{}", routed.response.text_body());
    }
    Command::Install => {
      let worker = worker();
      let cached = worker.install().await;
      if cached == 0 && !config.cache.precache.is_empty() {
        return Err(eyre!("Precaching failed; nothing was cached"));
      }
      println!("Cached {} static files", cached);
    }
    Command::Activate => {
      let deleted = worker().activate()?;
      for name in &deleted {
        println!("Deleted {}", name);
      }
      println!("{} cache(s) deleted", deleted.len());
    }
    Command::CacheMedia { url } => {
      if worker().cache_media(&url).await? {
        println!("Media cached");
      } else {
        return Err(eyre!("Server did not return the media at {}", url));
      }
    }
    Command::Sync { tag } => {
      let worker = worker();
      let manager = manager();
      let mut messages = worker.clients().connect();
      worker.sync(&tag);

      while let Ok(message) = messages.try_recv() {
        if let Some(report) = manager.handle_worker_message(&message).await {
          println!(
            "{} uploaded, {} still pending",
            report.uploaded, report.requeued
          );
        }
      }
    }
    Command::Watch => {
      let worker = worker();
      let manager = manager().with_online(false);
      let checker = HealthChecker::new(&config.server.url, network.clone())?;

      tokio::time::sleep(Duration::from_millis(config.health.initial_delay_ms)).await;
      let mut events = EventHandler::new(
        checker,
        Duration::from_secs(config.health.probe_interval_secs),
      );
      events.forward(worker.clients().connect());

      info!(url = %config.server.url, "watching connectivity");
      loop {
        tokio::select! {
          event = events.next() => match event {
            Some(Event::Online) => {
              manager.set_online(true).await;
            }
            Some(Event::Offline) => {
              manager.set_online(false).await;
            }
            Some(Event::Worker(message)) => {
              manager.handle_worker_message(&message).await;
            }
            None => break,
          },
          _ = tokio::signal::ctrl_c() => break,
        }
      }
    }
  }

  Ok(())
}
