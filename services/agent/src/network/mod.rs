//! Host-side guest network devices.
//!
//! Each guest nic is backed by a TAP device declared to systemd-networkd:
//! - netdev file per device under the netdev directory
//! - networkd restart to materialize or drop the link
//! - explicit `ip link delete` on removal

mod stack;
mod tap;

pub use stack::{MockNetworkStack, NetworkStack, Networkd};
pub use tap::{
    netdev_contents, MockTapDevices, NetdevTaps, TapCall, TapDevices, DEFAULT_NETDEV_DIR,
};
