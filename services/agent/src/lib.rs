//! tapbridge agent library.
//!
//! The agent runs on each hypervisor host and provisions the host side of
//! guest network interfaces: a TAP device declared to systemd-networkd and
//! attached to an Open vSwitch bridge with a VLAN tag.
//!
//! ```text
//! RPC (api) ─► GuestInterfaces (workflow)
//!                ├── TapDevices  (network: netdev files + networkd)
//!                └── Switch      (switch: ovs-vsctl)
//!                        └── CommandRunner (command)
//! ```
//!
//! The crate ships the `tapbridge-agent` binary; the library surface exists
//! for integration testing.

pub mod api;
pub mod command;
pub mod config;
pub mod error;
pub mod guest;
pub mod network;
pub mod state;
pub mod switch;
pub mod workflow;

pub use error::{Error, Result};
