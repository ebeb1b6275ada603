use chrono::{Duration, Utc};
use clap::{Args, Subcommand};

use stride_sync_core::{FileBuffer, LocalBuffer, SyncTarget};

use crate::config::Config;

/// Inspect content buffered while offline
#[derive(Debug, Args)]
pub struct BufferCommand {
    #[command(subcommand)]
    pub command: BufferSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum BufferSubcommand {
    /// List buffered sections
    List,

    /// Print the buffered content of a section
    Show {
        #[arg(long)]
        document: String,
        #[arg(long)]
        section: String,
    },

    /// Discard the buffered content of a section
    Clear {
        #[arg(long)]
        document: String,
        #[arg(long)]
        section: String,
    },
}

fn parse_target(document: &str, section: &str) -> Result<SyncTarget, Box<dyn std::error::Error>> {
    SyncTarget::new(document, section).ok_or_else(|| "Document and section ids must not be empty".into())
}

fn format_age(age: Duration) -> String {
    let secs = age.num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m", secs / 60),
        3600..=86399 => format!("{}h", secs / 3600),
        _ => format!("{}d", secs / 86400),
    }
}

impl BufferCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let buffer = FileBuffer::new(config.buffer_dir());

        match &self.command {
            BufferSubcommand::List => {
                let mut entries = buffer.entries()?;
                if entries.is_empty() {
                    println!("No buffered content.");
                    return Ok(());
                }

                entries.sort_by_key(|e| e.staged_at);
                let now = Utc::now();
                println!("{} buffered section(s):", entries.len());
                println!();
                for entry in entries {
                    println!(
                        "  {}/{}  staged {} ({} ago)",
                        entry.document_id,
                        entry.section_id,
                        entry.staged_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        format_age(now.signed_duration_since(entry.staged_at))
                    );
                }
                Ok(())
            }

            BufferSubcommand::Show { document, section } => {
                let target = parse_target(document, section)?;
                match buffer.read(&target)? {
                    Some(entry) => {
                        println!("{}", serde_json::to_string_pretty(&entry.content)?);
                    }
                    None => println!("Nothing buffered for {}", target),
                }
                Ok(())
            }

            BufferSubcommand::Clear { document, section } => {
                let target = parse_target(document, section)?;
                buffer.clear(&target)?;
                println!("Cleared buffered content for {}", target);
                Ok(())
            }
        }
    }
}
