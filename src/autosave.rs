//! Periodic document autosave
//!
//! Runs on its own timer, independent of the heartbeat cadence: every save
//! period, if the host document has unsaved changes, save it.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::config::DocumentConfig;
use crate::error::{HeartwatchError, Result};
use crate::readiness::ReadinessSignal;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether the document has unsaved changes
    async fn is_dirty(&self) -> Result<bool>;

    async fn save(&self) -> Result<()>;
}

/// Document store driven by shell commands
#[derive(Debug, Clone)]
pub struct ShellDocumentStore {
    dirty_command: String,
    save_command: String,
}

impl ShellDocumentStore {
    pub fn new(dirty_command: impl Into<String>, save_command: impl Into<String>) -> Self {
        Self {
            dirty_command: dirty_command.into(),
            save_command: save_command.into(),
        }
    }

    /// Build from config; `None` when either command is missing
    pub fn from_config(config: &DocumentConfig) -> Option<Self> {
        match (&config.dirty_command, &config.save_command) {
            (Some(dirty), Some(save)) => Some(Self::new(dirty.clone(), save.clone())),
            _ => None,
        }
    }

    async fn execute(command: &str) -> Result<std::process::Output> {
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HeartwatchError::Persistence(format!("Failed to run '{}': {}", command, e)))
    }
}

#[async_trait]
impl DocumentStore for ShellDocumentStore {
    async fn is_dirty(&self) -> Result<bool> {
        let output = Self::execute(&self.dirty_command).await?;
        Ok(output.status.success())
    }

    async fn save(&self) -> Result<()> {
        let output = Self::execute(&self.save_command).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(HeartwatchError::Persistence(format!(
                "Save command exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            )))
        }
    }
}

/// Save the document if it is dirty. Returns whether a save happened.
pub async fn save_if_dirty(store: &dyn DocumentStore) -> Result<bool> {
    if !store.is_dirty().await? {
        return Ok(false);
    }
    store.save().await?;
    Ok(true)
}

/// Handle to a running autosave task
pub struct Autosaver {
    handle: JoinHandle<()>,
}

impl Autosaver {
    /// Wait for readiness, then save a dirty document every `period`.
    pub fn spawn(store: Arc<dyn DocumentStore>, period: Duration, readiness: Arc<dyn ReadinessSignal>) -> Self {
        let handle = tokio::spawn(async move {
            readiness.wait_ready().await;
            tracing::info!(period_ms = period.as_millis() as u64, "Autosave started");

            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match save_if_dirty(store.as_ref()).await {
                    Ok(true) => tracing::debug!("Document saved"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(error = %e, "Autosave failed"),
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
