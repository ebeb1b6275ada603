//! One-shot delivery of everything in the offline buffer.
//!
//! The running coordinator flushes on reconnect; this covers a process that
//! exited while offline.

use clap::Args;

use stride_sync_core::{BackendError, BufferError, ContentBackend, FileBuffer, LocalBuffer};

use crate::config::Config;
use crate::sync::HttpBackend;

/// Send all buffered content to the backend
#[derive(Debug, Args)]
pub struct FlushCommand {}

/// Result of delivering one buffered entry.
#[derive(Debug)]
pub struct FlushOutcome {
    pub label: String,
    pub result: Result<(), BackendError>,
}

/// Writes every buffered entry to the backend, clearing each one it delivers.
///
/// Entries with invalid ids or empty content are skipped and stay buffered,
/// as do entries the backend rejects.
pub async fn flush_all(
    buffer: &dyn LocalBuffer,
    backend: &dyn ContentBackend,
) -> Result<Vec<FlushOutcome>, BufferError> {
    let mut outcomes = Vec::new();

    for entry in buffer.entries()? {
        let Some(target) = entry.target() else {
            tracing::warn!(
                document_id = %entry.document_id,
                section_id = %entry.section_id,
                "skipping buffered entry with empty id"
            );
            continue;
        };
        if entry.content.is_empty() {
            tracing::warn!(
                sync_target = %target,
                "skipping buffered entry with empty content"
            );
            continue;
        }

        let result = backend
            .update_content(target.section_id(), &entry.content)
            .await;
        if result.is_ok() {
            buffer.clear_if_unchanged(&entry)?;
        }
        outcomes.push(FlushOutcome {
            label: target.to_string(),
            result,
        });
    }

    Ok(outcomes)
}

impl FlushCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let backend = HttpBackend::from_config(&config.server)?;
        let buffer = FileBuffer::new(config.buffer_dir());

        println!("Flushing buffer to {}...", backend.base_url());
        println!();

        let outcomes = flush_all(&buffer, &backend).await?;
        if outcomes.is_empty() {
            println!("Nothing to flush.");
            return Ok(());
        }

        let mut failed = 0;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => println!("  ✓ {}", outcome.label),
                Err(e) => {
                    failed += 1;
                    println!("  ✗ {} - {}", outcome.label, e);
                }
            }
        }

        println!();
        if failed == 0 {
            println!("Flush complete.");
            Ok(())
        } else {
            Err(format!("{} section(s) could not be flushed; they remain buffered", failed).into())
        }
    }
}
