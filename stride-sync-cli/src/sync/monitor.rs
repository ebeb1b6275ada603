//! Connectivity monitor.
//!
//! Probes the live collaboration endpoint and the backend health endpoint on
//! a fixed period and publishes the resulting mode. Only transitions are
//! published, so the coordinator's effects run once per change.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;

use stride_sync_core::{ActiveSync, StatusSender};

use super::http_backend::check_server;
use crate::config::Config;

/// Timeout for opening the collaboration WebSocket.
const COLLAB_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Picks the authoritative transport from probe results.
///
/// A reachable collaboration session wins; otherwise the backend; otherwise
/// we are offline.
pub fn derive_active_sync(collab_reachable: bool, backend_reachable: bool) -> ActiveSync {
    if collab_reachable {
        ActiveSync::LiveCollab
    } else if backend_reachable {
        ActiveSync::BackendOnly
    } else {
        ActiveSync::LocalOnly
    }
}

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    backend_url: Option<String>,
    collab_url: Option<String>,
    document_id: Option<String>,
    interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(
        backend_url: Option<String>,
        collab_url: Option<String>,
        document_id: Option<String>,
        interval: Duration,
    ) -> Self {
        Self {
            backend_url,
            collab_url,
            document_id,
            interval,
        }
    }

    pub fn from_config(config: &Config, document_id: Option<&str>) -> Self {
        Self::new(
            config.server.backend_url.clone(),
            config.server.collab_url(),
            document_id.map(str::to_string),
            config.sync.probe_interval(),
        )
    }

    /// Returns the collaboration WebSocket URL for the document, if one can
    /// be built.
    pub fn collab_endpoint(&self) -> Option<String> {
        let base = self.collab_url.as_ref()?;
        let document_id = self.document_id.as_ref()?;
        Some(format!(
            "{}/collab/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(document_id)
        ))
    }

    /// Probes both endpoints once.
    pub async fn probe(&self) -> ActiveSync {
        let (collab, backend) = tokio::join!(self.probe_collab(), self.probe_backend());
        derive_active_sync(collab, backend)
    }

    async fn probe_collab(&self) -> bool {
        let Some(endpoint) = self.collab_endpoint() else {
            return false;
        };

        match timeout(COLLAB_PROBE_TIMEOUT, connect_async(&endpoint)).await {
            Ok(Ok((mut ws, _))) => {
                let _ = ws.close(None).await;
                true
            }
            Ok(Err(e)) => {
                tracing::debug!(%endpoint, error = %e, "collaboration probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(%endpoint, "collaboration probe timed out");
                false
            }
        }
    }

    async fn probe_backend(&self) -> bool {
        match &self.backend_url {
            Some(url) => check_server(url).await,
            None => false,
        }
    }

    /// Probes forever, publishing each transition to `sender`.
    pub fn spawn(self, sender: StatusSender) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let mode = self.probe().await;
                let previous = sender.current();
                if sender.set(mode) {
                    tracing::info!(from = %previous, to = %mode, "connection status changed");
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;
    use stride_sync_core::status_channel;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_derive_active_sync() {
        assert_eq!(derive_active_sync(true, true), ActiveSync::LiveCollab);
        assert_eq!(derive_active_sync(true, false), ActiveSync::LiveCollab);
        assert_eq!(derive_active_sync(false, true), ActiveSync::BackendOnly);
        assert_eq!(derive_active_sync(false, false), ActiveSync::LocalOnly);
    }

    #[test]
    fn test_collab_endpoint() {
        let monitor = ConnectivityMonitor::new(
            None,
            Some("ws://localhost:8080/".to_string()),
            Some("doc 1".to_string()),
            Duration::from_secs(10),
        );
        assert_eq!(
            monitor.collab_endpoint().as_deref(),
            Some("ws://localhost:8080/collab/doc%201")
        );

        let no_document = ConnectivityMonitor::new(
            None,
            Some("ws://localhost:8080".to_string()),
            None,
            Duration::from_secs(10),
        );
        assert!(no_document.collab_endpoint().is_none());
    }

    #[tokio::test]
    async fn test_probe_without_endpoints_is_offline() {
        let monitor = ConnectivityMonitor::new(None, None, None, Duration::from_secs(10));
        assert_eq!(monitor.probe().await, ActiveSync::LocalOnly);
    }

    #[tokio::test]
    async fn test_probe_backend_only() {
        let url = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let monitor = ConnectivityMonitor::new(
            Some(url),
            None,
            Some("doc-1".to_string()),
            Duration::from_secs(10),
        );
        assert_eq!(monitor.probe().await, ActiveSync::BackendOnly);
    }

    #[tokio::test]
    async fn test_probe_prefers_live_collab() {
        use axum::extract::ws::WebSocketUpgrade;

        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/collab/{document_id}",
                get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(|_socket| async {}) }),
            );
        let url = serve(app).await;
        let collab = url.replacen("http://", "ws://", 1);
        let monitor = ConnectivityMonitor::new(
            Some(url),
            Some(collab),
            Some("doc-1".to_string()),
            Duration::from_secs(10),
        );
        assert_eq!(monitor.probe().await, ActiveSync::LiveCollab);
    }

    #[tokio::test]
    async fn test_spawn_publishes_probe_result() {
        let url = serve(Router::new().route("/health", get(|| async { "ok" }))).await;
        let monitor = ConnectivityMonitor::new(
            Some(url),
            None,
            Some("doc-1".to_string()),
            Duration::from_millis(50),
        );

        let (sender, mut receiver) = status_channel(ActiveSync::LocalOnly);
        let task = monitor.spawn(sender);

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().active_sync, ActiveSync::BackendOnly);
        task.abort();
    }
}
