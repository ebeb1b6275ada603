use clap::{Args, Subcommand, ValueEnum};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a default configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# stride configuration

# Directory for the offline buffer (default: platform data dir + /stride)
# data_dir: ~/.local/share/stride

server:
  # Backend base URL
  # backend_url: http://localhost:8080
  # Live collaboration URL (default: derived from backend_url)
  # collab_url: ws://localhost:8080
  # api_key: secret

sync:
  backup_interval_secs: 30
  buffer_interval_secs: 5
  probe_interval_secs: 10
  enable_backend_backup: true
  enable_local_buffer: true
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => print_text(config),
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if config_path.exists() {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'stride config show' to view current configuration.");
                    return Ok(());
                }

                if let Some(parent) = config_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                let mut file = fs::File::create(&config_path)?;
                file.write_all(DEFAULT_CONFIG.as_bytes())?;

                println!("Created config file: {}", config_path.display());
                Ok(())
            }
        }
    }
}

fn print_text(config: &Config) {
    println!("Configuration");
    println!("=============\n");

    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!(
            "Config file: {} (not found)",
            Config::default_config_path().display()
        ),
    }
    println!();

    println!("data_dir: {}", config.data_dir.value.display());
    println!("  source: {}", config.data_dir.source);
    println!();

    println!("server:");
    println!(
        "  backend_url: {}",
        config.server.backend_url.as_deref().unwrap_or("(not set)")
    );
    println!(
        "  collab_url:  {}",
        config.server.collab_url().as_deref().unwrap_or("(not set)")
    );
    println!(
        "  api_key:     {}",
        if config.server.api_key.is_some() { "(set)" } else { "(not set)" }
    );
    println!();

    let sync = &config.sync;
    println!("sync:");
    println!("  backup_interval_secs:  {}", sync.backup_interval_secs);
    println!("  buffer_interval_secs:  {}", sync.buffer_interval_secs);
    println!("  probe_interval_secs:   {}", sync.probe_interval_secs);
    println!("  enable_backend_backup: {}", sync.enable_backend_backup);
    println!("  enable_local_buffer:   {}", sync.enable_local_buffer);
}
