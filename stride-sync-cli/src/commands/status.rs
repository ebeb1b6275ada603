use clap::Args;

use stride_sync_core::ActiveSync;

use crate::config::Config;
use crate::sync::ConnectivityMonitor;

/// Show which transport would be active right now
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Document to probe the collaboration session for
    #[arg(long)]
    pub document: Option<String>,
}

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Connection Status");
        println!("=================");
        println!();

        match &config.server.backend_url {
            Some(url) => println!("Backend:       {}", url),
            None => println!("Backend:       (not configured)"),
        }

        let monitor = ConnectivityMonitor::from_config(config, self.document.as_deref());
        match monitor.collab_endpoint() {
            Some(endpoint) => println!("Collaboration: {}", endpoint),
            None => println!("Collaboration: (needs --document and a collab URL)"),
        }
        println!();

        let mode = monitor.probe().await;
        println!("Active sync:   {}", mode);
        match mode {
            ActiveSync::LiveCollab => {
                println!("  Live collaboration is authoritative.");
                if config.sync.enable_backend_backup {
                    println!("  Backend backups also run every {}s.", config.sync.backup_interval_secs);
                }
            }
            ActiveSync::BackendOnly => {
                println!(
                    "  Content is written to the backend every {}s.",
                    config.sync.backup_interval_secs
                );
            }
            ActiveSync::LocalOnly => {
                println!("  Offline. Content is buffered locally until a server is reachable.");
            }
        }

        Ok(())
    }
}
