//! Shared application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bsdash_core::view::DEFAULT_POLL_INTERVAL;
use bsdash_core::{DashboardEngine, EngineConfig};
use tokio_util::sync::CancellationToken;

/// Route prefix under which output images are served.
pub const IMAGE_ROUTE: &str = "/qc";

#[derive(Clone)]
pub struct AppState {
    pub engine: DashboardEngine,
    pub qc_dir: Arc<PathBuf>,
    /// Cancelled when the server shuts down; ends open live streams.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: DashboardEngine, shutdown: CancellationToken) -> Self {
        let qc_dir = Arc::new(engine.config().qc_dir.clone());
        Self {
            engine,
            qc_dir,
            shutdown,
        }
    }
}

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub qc_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub poll_interval: Duration,
    pub start_paused: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            qc_dir: PathBuf::from("QC"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            poll_interval: DEFAULT_POLL_INTERVAL,
            start_paused: false,
        }
    }
}

impl ServerConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.qc_dir)
            .with_poll_interval(self.poll_interval)
            .with_image_base(IMAGE_ROUTE)
            .with_start_paused(self.start_paused)
    }
}
