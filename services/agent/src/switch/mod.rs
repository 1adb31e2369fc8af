//! Software switch client.
//!
//! The agent attaches guest TAP devices to Open vSwitch bridges through the
//! `ovs-vsctl` tool. [`Switch`] is the seam the workflow and health checks use;
//! [`OvsSwitch`] is the host implementation.

mod ovs;
pub mod tabular;

use async_trait::async_trait;

use crate::error::Result;
use crate::guest::Nic;

pub use ovs::{OvsSwitch, OVS_VSCTL, QUERY_COLUMNS};
pub use tabular::{parse_name_list, SwitchInterface, TabularResult};

/// Bridge attachment operations.
#[async_trait]
pub trait Switch: Send + Sync {
    /// Names of the interfaces attached to `bridge`.
    async fn list_attached(&self, bridge: &str) -> Result<Vec<String>>;

    /// Current records for the named interfaces on `bridge`.
    async fn query_interfaces(&self, bridge: &str, names: &[&str]) -> Result<Vec<Nic>>;

    /// Attach an existing host interface to `bridge` and return its record.
    async fn attach(&self, bridge: &str, iface: &str, vlan_tag: i64) -> Result<Nic>;

    /// Remove an interface from `bridge`.
    async fn detach(&self, bridge: &str, iface: &str) -> Result<()>;
}
