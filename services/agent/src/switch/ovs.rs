//! `ovs-vsctl` backed switch.

use std::sync::Arc;

use async_trait::async_trait;
use tapbridge_networking::normalize_vlan_tag;
use tracing::{debug, info};

use super::tabular::{parse_name_list, TabularResult};
use super::Switch;
use crate::command::CommandRunner;
use crate::error::{Error, Result};
use crate::guest::Nic;

/// Switch management tool.
pub const OVS_VSCTL: &str = "ovs-vsctl";

/// Interface columns requested from the switch database.
pub const QUERY_COLUMNS: [&str; 3] = ["name", "mac_in_use", "type"];

/// Open vSwitch client.
#[derive(Clone)]
pub struct OvsSwitch {
    runner: Arc<dyn CommandRunner>,
}

impl OvsSwitch {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run `ovs-vsctl --format json <args>` and return raw stdout.
    async fn vsctl(&self, args: &[&str]) -> Result<String> {
        let mut full = vec!["--format", "json"];
        full.extend_from_slice(args);
        Ok(self.runner.run(OVS_VSCTL, &full).await?)
    }

    /// Query the Interface table for `names`.
    async fn query_table(&self, names: &[&str]) -> Result<TabularResult> {
        let columns = format!("--columns={}", QUERY_COLUMNS.join(","));
        let mut args = vec!["list", columns.as_str(), "Interface"];
        args.extend_from_slice(names);

        let raw = self.vsctl(&args).await?;
        TabularResult::parse(&raw)
    }
}

#[async_trait]
impl Switch for OvsSwitch {
    async fn list_attached(&self, bridge: &str) -> Result<Vec<String>> {
        let raw = self.vsctl(&["list-ifaces", bridge]).await?;
        parse_name_list(&raw)
    }

    async fn query_interfaces(&self, bridge: &str, names: &[&str]) -> Result<Vec<Nic>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let table = self.query_table(names).await?;
        Ok(table
            .interfaces()?
            .into_iter()
            .map(|iface| {
                debug!(iface = %iface.name, kind = %iface.kind, bridge, "Decoded switch interface");
                iface.into_nic(bridge)
            })
            .collect())
    }

    async fn attach(&self, bridge: &str, iface: &str, vlan_tag: i64) -> Result<Nic> {
        let tag = normalize_vlan_tag(vlan_tag)?;
        let tag_arg = format!("tag={tag}");

        info!(iface, bridge, tag, "Attaching interface to bridge");
        self.vsctl(&["add-port", bridge, iface, &tag_arg]).await?;

        let table = self.query_table(&[iface]).await?;
        let attached = table
            .interfaces()?
            .into_iter()
            .find(|row| row.name == iface)
            .ok_or_else(|| {
                Error::parse(
                    format!("interface '{iface}' missing from query after attach"),
                    table.raw.as_str(),
                )
            })?;

        // Empty until the kernel device exists
        if attached.mac.is_empty() {
            return Err(Error::parse(
                format!("interface '{iface}' has no MAC address in use"),
                table.raw.as_str(),
            ));
        }

        Ok(attached.into_nic(bridge))
    }

    async fn detach(&self, bridge: &str, iface: &str) -> Result<()> {
        info!(iface, bridge, "Detaching interface from bridge");
        self.vsctl(&["del-port", bridge, iface]).await?;
        Ok(())
    }
}
