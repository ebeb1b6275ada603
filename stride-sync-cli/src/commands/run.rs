//! Hosts one coordinator for a single section until Ctrl-C.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stride_sync_core::{
    status_channel, ActiveSync, BackendError, BufferError, ContentBackend, ContentSnapshot,
    FileBuffer, HybridSync, HybridSyncConfig, HybridSyncOptions, LocalBuffer, SyncTarget,
};

use crate::config::Config;
use crate::sync::{ConnectivityMonitor, HttpBackend, SectionFile};

/// How often the section file is re-read.
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Keep a section backed up while you edit it
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Document the section belongs to
    #[arg(long)]
    pub document: String,

    /// Section to sync
    #[arg(long)]
    pub section: String,

    /// JSON file holding the section content
    #[arg(long)]
    pub file: PathBuf,
}

/// What happened to the content captured at exit.
#[derive(Debug)]
pub enum FinalSave {
    /// Written to the backend
    Sent,
    /// Staged in the local buffer for the next flush
    Buffered,
    /// Neither transport applies in this mode
    Skipped,
    /// The backend write failed and buffering is disabled
    Lost(BackendError),
}

/// Persists the content one last time, the way the coordinator would have on
/// its next tick.
///
/// Online modes write to the backend (live collaboration only when backups are
/// enabled). A failed write, or `local-only`, falls back to the buffer.
pub async fn final_save(
    target: &SyncTarget,
    content: &ContentSnapshot,
    mode: ActiveSync,
    backend: &dyn ContentBackend,
    buffer: &dyn LocalBuffer,
    options: &HybridSyncOptions,
) -> Result<FinalSave, BufferError> {
    let write = match mode {
        ActiveSync::BackendOnly => true,
        ActiveSync::LiveCollab => options.enable_backend_backup,
        ActiveSync::LocalOnly => false,
    };

    let failure = if write {
        match backend.update_content(target.section_id(), content).await {
            Ok(()) => return Ok(FinalSave::Sent),
            Err(e) => {
                tracing::warn!(sync_target = %target, error = %e, "final backend write failed");
                Some(e)
            }
        }
    } else {
        None
    };

    if mode.is_offline() || failure.is_some() {
        if options.enable_local_buffer {
            buffer.save(target, content)?;
            return Ok(FinalSave::Buffered);
        }
        if let Some(e) = failure {
            return Ok(FinalSave::Lost(e));
        }
    }
    Ok(FinalSave::Skipped)
}

impl RunCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let target = SyncTarget::new(self.document.as_str(), self.section.as_str())
            .ok_or("Document and section ids must not be empty")?;

        let section_file = SectionFile::open(&self.file)?;
        let backend = Arc::new(HttpBackend::from_config(&config.server)?);
        let buffer = Arc::new(FileBuffer::new(config.buffer_dir()));

        let monitor = ConnectivityMonitor::from_config(config, Some(target.document_id()));
        let initial = monitor.probe().await;
        let (status_tx, status_rx) = status_channel(initial);

        println!("Syncing {} ({})", target, initial);
        println!("  file:   {}", section_file.path().display());
        println!("  buffer: {}", buffer.buffer_dir().display());
        println!();

        let monitor_task = monitor.spawn(status_tx.clone());
        let watch_task = section_file.spawn_watch(FILE_POLL_INTERVAL);

        let sync = HybridSync::spawn(
            HybridSyncConfig::new(
                section_file.reader(),
                status_rx,
                buffer.clone(),
                backend.clone(),
            )
            .with_target(Some(target.document_id()), Some(target.section_id()))
            .with_options(config.sync.to_options())
            .on_synced(|at| println!("Saved at {}", at.format("%H:%M:%S"))),
        );

        tokio::signal::ctrl_c().await?;
        println!();

        monitor_task.abort();
        watch_task.abort();
        sync.shutdown().await;

        // Anything typed since the last tick would be lost otherwise.
        section_file.reload()?;
        let outcome = final_save(
            &target,
            &section_file.snapshot(),
            status_tx.current(),
            backend.as_ref(),
            buffer.as_ref(),
            &config.sync.to_options(),
        )
        .await?;
        match outcome {
            FinalSave::Sent => println!("Saved to backend."),
            FinalSave::Buffered => println!("Content buffered for the next flush."),
            FinalSave::Skipped => {}
            FinalSave::Lost(e) => println!("Final save failed: {}", e),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use stride_sync_core::MemoryBuffer;

    #[derive(Default)]
    struct StubBackend {
        fail: AtomicBool,
        written: Mutex<Vec<ContentSnapshot>>,
    }

    impl ContentBackend for StubBackend {
        fn update_content<'a>(
            &'a self,
            _section_id: &'a str,
            content: &'a ContentSnapshot,
        ) -> BoxFuture<'a, Result<(), BackendError>> {
            async move {
                if self.fail.load(Ordering::SeqCst) {
                    return Err(BackendError::Unreachable("refused".to_string()));
                }
                self.written.lock().unwrap().push(content.clone());
                Ok(())
            }
            .boxed()
        }
    }

    fn target() -> SyncTarget {
        SyncTarget::new("doc-1", "sec-1").unwrap()
    }

    #[tokio::test]
    async fn test_final_save_writes_when_backend_only() {
        let backend = StubBackend::default();
        let buffer = MemoryBuffer::new();
        let content = ContentSnapshot::new(json!("last edit"));

        let outcome = final_save(
            &target(),
            &content,
            ActiveSync::BackendOnly,
            &backend,
            &buffer,
            &HybridSyncOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, FinalSave::Sent));
        assert_eq!(*backend.written.lock().unwrap(), vec![content]);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_final_save_respects_backup_flag_in_live_collab() {
        let backend = StubBackend::default();
        let buffer = MemoryBuffer::new();
        let options = HybridSyncOptions {
            enable_backend_backup: false,
            ..Default::default()
        };

        let outcome = final_save(
            &target(),
            &ContentSnapshot::new(json!(1)),
            ActiveSync::LiveCollab,
            &backend,
            &buffer,
            &options,
        )
        .await
        .unwrap();

        assert!(matches!(outcome, FinalSave::Skipped));
        assert!(backend.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_final_save_buffers_when_offline() {
        let backend = StubBackend::default();
        let buffer = MemoryBuffer::new();

        let outcome = final_save(
            &target(),
            &ContentSnapshot::new(json!("offline")),
            ActiveSync::LocalOnly,
            &backend,
            &buffer,
            &HybridSyncOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, FinalSave::Buffered));
        assert!(backend.written.lock().unwrap().is_empty());
        assert_eq!(
            buffer.read(&target()).unwrap().unwrap().content,
            ContentSnapshot::new(json!("offline"))
        );
    }

    #[tokio::test]
    async fn test_final_save_falls_back_to_buffer_on_failure() {
        let backend = StubBackend::default();
        backend.fail.store(true, Ordering::SeqCst);
        let buffer = MemoryBuffer::new();

        let outcome = final_save(
            &target(),
            &ContentSnapshot::new(json!("unsent")),
            ActiveSync::BackendOnly,
            &backend,
            &buffer,
            &HybridSyncOptions::default(),
        )
        .await
        .unwrap();

        assert!(matches!(outcome, FinalSave::Buffered));
        assert!(buffer.read(&target()).unwrap().is_some());

        let no_buffer = HybridSyncOptions {
            enable_local_buffer: false,
            ..Default::default()
        };
        let outcome = final_save(
            &target(),
            &ContentSnapshot::new(json!("unsent")),
            ActiveSync::BackendOnly,
            &backend,
            &MemoryBuffer::new(),
            &no_buffer,
        )
        .await
        .unwrap();
        assert!(matches!(outcome, FinalSave::Lost(_)));
    }
}
