//! strideOS Backend Server
//!
//! Stores the latest content of each section and relays live collaboration
//! frames between peers editing the same document.
//!
//! # Configuration
//!
//! Environment variables:
//! - `STRIDEOS_PORT`: Port to listen on (default: 8080)
//! - `STRIDEOS_DATA_DIR`: Directory for the section database (default: ~/.local/share/strideos-server)
//! - `STRIDEOS_CONFIG`: Path to config file (default: ~/.config/strideos-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     client: "laptop"
//! ```
//!
//! With no config file the section routes accept unauthenticated requests.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strideos_server::server::{router, ApiKeyStore, AppState, SectionStore};

/// Server configuration
#[derive(Debug, Clone)]
struct Config {
    /// Port to listen on
    port: u16,
    /// Directory holding the section database
    data_dir: PathBuf,
    /// Path to config file
    config_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let port = std::env::var("STRIDEOS_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let data_dir = std::env::var("STRIDEOS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("strideos-server")
            });

        let config_path = std::env::var("STRIDEOS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("strideos-server")
                    .join("config.yaml")
            });

        Self {
            port,
            data_dir,
            config_path,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.data_dir.join("sections.db")
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strideos_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    let api_keys = match ApiKeyStore::load(&config.config_path) {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let store = match SectionStore::open(&config.db_path()).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open section database: {}", e);
            std::process::exit(1);
        }
    };

    let app = router(AppState::new(store, api_keys));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
