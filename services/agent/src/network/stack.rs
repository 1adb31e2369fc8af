//! Host network stack operations.
//!
//! Writing a netdev file does nothing until systemd-networkd is restarted,
//! and removing one does not delete the live link. Both steps live behind
//! [`NetworkStack`] so they can be stubbed independently of file I/O.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::command::{CommandError, CommandRunner};
use crate::error::Result;

/// Applies netdev definitions and removes live links.
#[async_trait]
pub trait NetworkStack: Send + Sync {
    /// Make on-disk device definitions take effect.
    async fn apply(&self) -> Result<()>;

    /// Delete a live link.
    async fn delete_link(&self, name: &str) -> Result<()>;
}

/// systemd-networkd on the host.
#[derive(Clone)]
pub struct Networkd {
    runner: Arc<dyn CommandRunner>,
}

impl Networkd {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NetworkStack for Networkd {
    async fn apply(&self) -> Result<()> {
        info!("Restarting systemd-networkd");
        self.runner
            .run("systemctl", &["restart", "systemd-networkd"])
            .await?;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> Result<()> {
        debug!(iface = %name, "Deleting link");
        self.runner.run("ip", &["link", "delete", name]).await?;
        Ok(())
    }
}

/// Network stack stub that counts applies and records deleted links.
#[derive(Debug, Default)]
pub struct MockNetworkStack {
    applies: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_apply: bool,
}

impl MockNetworkStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack whose `apply` always fails.
    pub fn failing() -> Self {
        Self {
            fail_apply: true,
            ..Self::default()
        }
    }

    /// Number of successful applies.
    pub fn applies(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    /// Links deleted so far.
    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NetworkStack for MockNetworkStack {
    async fn apply(&self) -> Result<()> {
        if self.fail_apply {
            return Err(CommandError::Failed {
                program: "systemctl".to_string(),
                code: Some(1),
                stderr: "Job for systemd-networkd.service failed".to_string(),
            }
            .into());
        }
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        Ok(())
    }
}
