//! Guest request/response payloads.
//!
//! Only the fields the agent reads or writes are typed; everything else the
//! caller sends is kept in `extra` and echoed back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One guest network attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nic {
    /// Host interface name.
    #[serde(default)]
    pub name: String,

    /// Host device backing the nic (same as `name` once attached).
    #[serde(default)]
    pub device: String,

    /// Bridge the interface is attached to.
    #[serde(default)]
    pub network: String,

    /// MAC address in use on the host side.
    #[serde(default)]
    pub mac: String,

    /// Requested VLAN tag (0 means unspecified).
    #[serde(default)]
    pub vlan: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Nic {
    /// Clear host identity, keeping placement and caller fields.
    pub fn clear_identity(&mut self) {
        self.name.clear();
        self.device.clear();
        self.mac.clear();
    }

    /// Take host identity and placement from a switch query result.
    pub fn apply_attachment(&mut self, attached: Nic) {
        self.name = attached.name;
        self.device = attached.device;
        self.network = attached.network;
        self.mac = attached.mac;
    }
}

/// Guest identity and nics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Guest {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub nics: Vec<Nic>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parameters of both guest interface operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestRequest {
    #[serde(default)]
    pub guest: Option<Guest>,
}

/// Result of both guest interface operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestResponse {
    pub guest: Option<Guest>,
}
