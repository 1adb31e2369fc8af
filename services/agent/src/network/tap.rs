//! TAP device definitions.
//!
//! Guest TAP devices are declared as systemd-networkd netdev files:
//! - One file per device, `<netdev-dir>/<name>.netdev`
//! - An existing definition is never overwritten
//! - Fixed template, parameterized only by the interface name
//! - The network stack is re-applied after every change

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tapbridge_networking::validate_iface_name;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::stack::NetworkStack;
use crate::command::CommandError;
use crate::error::{Error, Result};

/// Directory systemd-networkd reads device definitions from.
pub const DEFAULT_NETDEV_DIR: &str = "/etc/systemd/network";

/// Render the netdev definition for a TAP device.
pub fn netdev_contents(name: &str) -> String {
    format!("[NetDev]\nName={name}\nKind=tap\n\n[Tap]\n")
}

/// Host-side TAP device lifecycle.
#[async_trait]
pub trait TapDevices: Send + Sync {
    /// Define the device and apply it.
    async fn create(&self, name: &str) -> Result<()>;

    /// Remove the definition and the live link, then apply.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// TAP devices managed through netdev files.
#[derive(Clone)]
pub struct NetdevTaps {
    dir: PathBuf,
    stack: Arc<dyn NetworkStack>,
}

impl NetdevTaps {
    pub fn new(dir: impl Into<PathBuf>, stack: Arc<dyn NetworkStack>) -> Self {
        Self {
            dir: dir.into(),
            stack,
        }
    }

    /// Directory holding the definitions.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the definition for `name`.
    pub fn netdev_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.netdev"))
    }

    async fn write_definition(&self, path: &Path, contents: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl TapDevices for NetdevTaps {
    async fn create(&self, name: &str) -> Result<()> {
        validate_iface_name(name)?;
        let path = self.netdev_path(name);
        let contents = netdev_contents(name);

        info!(iface = %name, path = %path.display(), "Creating TAP device");

        match self.write_definition(&path, &contents).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // Owned by a live or earlier attachment; leave it alone
                warn!(iface = %name, path = %path.display(), "Netdev file already exists");
                return Err(Error::validation(format!(
                    "interface '{name}' is already defined at {}",
                    path.display()
                )));
            }
            Err(source) => {
                error!(
                    iface = %name,
                    path = %path.display(),
                    error = %source,
                    "Failed to write netdev file"
                );
                // Don't leave a partial definition behind
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        error!(path = %path.display(), error = %e, "Failed to remove partial netdev file");
                    }
                }
                return Err(Error::Netdev { path, source });
            }
        }

        self.stack.apply().await?;
        debug!(iface = %name, "TAP device defined");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        validate_iface_name(name)?;
        let path = self.netdev_path(name);

        info!(iface = %name, path = %path.display(), "Removing TAP device");

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Netdev file already gone");
            }
            Err(source) => {
                error!(path = %path.display(), error = %source, "Failed to remove netdev file");
                return Err(Error::Netdev { path, source });
            }
        }

        self.stack.delete_link(name).await?;
        self.stack.apply().await?;
        debug!(iface = %name, "TAP device removed");
        Ok(())
    }
}

/// A recorded [`MockTapDevices`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapCall {
    Create(String),
    Remove(String),
}

/// TAP manager stub with a call log and switchable failures.
#[derive(Debug, Default)]
pub struct MockTapDevices {
    calls: Mutex<Vec<TapCall>>,
    fail_create: bool,
    fail_remove: bool,
}

impl MockTapDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager whose `create` always fails.
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// A manager whose `remove` always fails.
    pub fn failing_remove() -> Self {
        Self {
            fail_remove: true,
            ..Self::default()
        }
    }

    /// Calls so far, in order.
    pub fn calls(&self) -> Vec<TapCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: TapCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn failure() -> Error {
        CommandError::Failed {
            program: "systemctl".to_string(),
            code: Some(1),
            stderr: "mock TAP failure".to_string(),
        }
        .into()
    }
}

#[async_trait]
impl TapDevices for MockTapDevices {
    async fn create(&self, name: &str) -> Result<()> {
        self.record(TapCall::Create(name.to_string()));
        if self.fail_create {
            return Err(Self::failure());
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.record(TapCall::Remove(name.to_string()));
        if self.fail_remove {
            return Err(Self::failure());
        }
        Ok(())
    }
}
