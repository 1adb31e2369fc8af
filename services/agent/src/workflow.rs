//! Guest interface workflow.
//!
//! Adding a nic walks `Requested -> DeviceCreated -> Attached`; a failed
//! attach compensates by removing the TAP device (`RolledBack -> Failed`).
//! Removing walks `Requested -> Detached -> DeviceRemoved` and never removes
//! a device whose detach failed.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tapbridge_networking::{
    derive_iface_name, normalize_vlan_tag, validate_iface_name, NameAllocator,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::guest::{Guest, GuestRequest, GuestResponse, Nic};
use crate::network::TapDevices;
use crate::switch::Switch;

/// The two operations exposed over RPC.
#[async_trait]
pub trait GuestInterfaceService: Send + Sync {
    /// Create, attach and describe every nic of the guest.
    async fn add_guest_interfaces(&self, request: GuestRequest) -> Result<GuestResponse>;

    /// Detach and destroy every nic of the guest.
    async fn remove_guest_interfaces(&self, request: GuestRequest) -> Result<GuestResponse>;
}

/// Where a nic is in its lifecycle, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Requested,
    DeviceCreated,
    Attached,
    RolledBack,
    Failed,
    Detached,
    DeviceRemoved,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "requested",
            Self::DeviceCreated => "device_created",
            Self::Attached => "attached",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
            Self::Detached => "detached",
            Self::DeviceRemoved => "device_removed",
        };
        f.write_str(s)
    }
}

/// Source of host interface names.
pub enum Naming {
    /// Every added nic gets a fresh `prefix.N` name.
    Allocated(Mutex<NameAllocator>),
    /// The nic's own name, else one derived from the guest id and nic index.
    Derived,
}

impl Naming {
    pub fn allocated(allocator: NameAllocator) -> Self {
        Self::Allocated(Mutex::new(allocator))
    }
}

/// Orchestrates TAP devices and bridge attachments for guests.
pub struct GuestInterfaces {
    switch: Arc<dyn Switch>,
    taps: Arc<dyn TapDevices>,
    naming: Naming,
    default_bridge: String,
}

impl GuestInterfaces {
    pub fn new(
        switch: Arc<dyn Switch>,
        taps: Arc<dyn TapDevices>,
        naming: Naming,
        default_bridge: impl Into<String>,
    ) -> Self {
        Self {
            switch,
            taps,
            naming,
            default_bridge: default_bridge.into(),
        }
    }

    /// Bridge used when a nic does not name one.
    pub fn default_bridge(&self) -> &str {
        &self.default_bridge
    }

    /// Add every nic of the request's guest.
    ///
    /// Every nic is validated before the host is touched. If a nic fails
    /// afterwards, nics added earlier in the same request are detached and
    /// removed before the error is returned.
    pub async fn add(&self, request: GuestRequest) -> Result<GuestResponse> {
        let mut guest = validate(request)?;
        let planned = self.plan_add(&guest)?;

        for (index, planned) in planned.into_iter().enumerate() {
            let result = self
                .add_nic(&guest.id, index, planned, &mut guest.nics[index])
                .await;
            if let Err(err) = result {
                self.undo_added(&guest.id, &guest.nics[..index]).await;
                return Err(err);
            }
        }

        Ok(GuestResponse { guest: Some(guest) })
    }

    /// Remove every nic of the request's guest.
    ///
    /// Every nic name is resolved before the host is touched.
    pub async fn remove(&self, request: GuestRequest) -> Result<GuestResponse> {
        let mut guest = validate(request)?;
        let names = guest
            .nics
            .iter()
            .enumerate()
            .map(|(index, nic)| self.name_for_remove(&guest.id, index, nic))
            .collect::<Result<Vec<_>>>()?;
        reject_duplicates(&names)?;

        for (index, name) in names.iter().enumerate() {
            self.remove_nic(&guest.id, index, name, &mut guest.nics[index])
                .await?;
        }

        Ok(GuestResponse { guest: Some(guest) })
    }

    /// Validate every nic of an add and resolve the names known up front.
    ///
    /// `None` marks a name still to be allocated.
    fn plan_add(&self, guest: &Guest) -> Result<Vec<Option<String>>> {
        let mut planned = Vec::with_capacity(guest.nics.len());
        for (index, nic) in guest.nics.iter().enumerate() {
            normalize_vlan_tag(nic.vlan)?;
            planned.push(match self.naming {
                Naming::Allocated(_) => None,
                Naming::Derived if !nic.name.is_empty() => {
                    Some(validate_iface_name(&nic.name)?.to_string())
                }
                Naming::Derived => Some(derive_iface_name(&guest.id, index)?),
            });
        }

        let known: Vec<String> = planned.iter().flatten().cloned().collect();
        reject_duplicates(&known)?;
        Ok(planned)
    }

    async fn allocate(&self) -> Result<String> {
        match &self.naming {
            Naming::Allocated(allocator) => Ok(allocator.lock().await.next()?),
            Naming::Derived => Err(Error::validation("interface names are not allocated")),
        }
    }

    async fn add_nic(
        &self,
        guest_id: &str,
        index: usize,
        planned: Option<String>,
        nic: &mut Nic,
    ) -> Result<()> {
        let name = match planned {
            Some(name) => name,
            None => self.allocate().await?,
        };
        let bridge = self.bridge_for(nic);

        info!(
            guest_id,
            nic = index,
            iface = %name,
            bridge = %bridge,
            stage = %Stage::Requested,
            "Adding guest interface"
        );

        self.taps.create(&name).await?;
        debug!(iface = %name, stage = %Stage::DeviceCreated, "TAP device created");

        let attached = match self.switch.attach(&bridge, &name, nic.vlan).await {
            Ok(attached) => attached,
            Err(err) => {
                self.compensate_attach(&name, &err).await;
                return Err(err);
            }
        };

        nic.apply_attachment(attached);
        info!(
            guest_id,
            iface = %nic.name,
            bridge = %nic.network,
            mac = %nic.mac,
            stage = %Stage::Attached,
            "Guest interface attached"
        );
        Ok(())
    }

    /// Best-effort TAP removal after a failed attach.
    async fn compensate_attach(&self, name: &str, cause: &Error) {
        match self.taps.remove(name).await {
            Ok(()) => warn!(
                iface = %name,
                error = %cause,
                stage = %Stage::RolledBack,
                "Attach failed; TAP device removed"
            ),
            Err(rollback) => error!(
                iface = %name,
                error = %cause,
                rollback_error = %rollback,
                stage = %Stage::Failed,
                "Attach failed and TAP device removal failed; definition may linger"
            ),
        }
    }

    /// Best-effort undo of nics already added by a failed request.
    async fn undo_added(&self, guest_id: &str, added: &[Nic]) {
        for nic in added.iter().rev() {
            if let Err(e) = self.switch.detach(&nic.network, &nic.name).await {
                error!(
                    guest_id,
                    iface = %nic.name,
                    error = %e,
                    "Failed to detach interface while undoing request"
                );
                continue;
            }
            if let Err(e) = self.taps.remove(&nic.name).await {
                error!(
                    guest_id,
                    iface = %nic.name,
                    error = %e,
                    "Failed to remove TAP device while undoing request"
                );
                continue;
            }
            info!(guest_id, iface = %nic.name, stage = %Stage::RolledBack, "Undid guest interface");
        }
    }

    async fn remove_nic(
        &self,
        guest_id: &str,
        index: usize,
        name: &str,
        nic: &mut Nic,
    ) -> Result<()> {
        let bridge = self.bridge_for(nic);

        info!(
            guest_id,
            nic = index,
            iface = %name,
            bridge = %bridge,
            stage = %Stage::Requested,
            "Removing guest interface"
        );

        self.switch.detach(&bridge, name).await?;
        debug!(iface = %name, stage = %Stage::Detached, "Interface detached");

        if let Err(err) = self.taps.remove(name).await {
            error!(
                iface = %name,
                error = %err,
                stage = %Stage::Detached,
                "Interface detached but TAP device removal failed"
            );
            return Err(err);
        }

        nic.clear_identity();
        info!(guest_id, iface = %name, stage = %Stage::DeviceRemoved, "Guest interface removed");
        Ok(())
    }

    fn name_for_remove(&self, guest_id: &str, index: usize, nic: &Nic) -> Result<String> {
        if !nic.name.is_empty() {
            return Ok(validate_iface_name(&nic.name)?.to_string());
        }
        match self.naming {
            Naming::Derived => Ok(derive_iface_name(guest_id, index)?),
            Naming::Allocated(_) => Err(Error::validation(format!(
                "nic {index} has no interface name"
            ))),
        }
    }

    fn bridge_for(&self, nic: &Nic) -> String {
        if nic.network.is_empty() {
            self.default_bridge.clone()
        } else {
            nic.network.clone()
        }
    }
}

#[async_trait]
impl GuestInterfaceService for GuestInterfaces {
    async fn add_guest_interfaces(&self, request: GuestRequest) -> Result<GuestResponse> {
        self.add(request).await
    }

    async fn remove_guest_interfaces(&self, request: GuestRequest) -> Result<GuestResponse> {
        self.remove(request).await
    }
}

/// Reject a request naming the same interface twice.
fn reject_duplicates(names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    match names.iter().find(|name| !seen.insert(name.as_str())) {
        Some(name) => Err(Error::validation(format!(
            "interface '{name}' appears more than once"
        ))),
        None => Ok(()),
    }
}

/// Require a guest with an id and at least one nic.
fn validate(request: GuestRequest) -> Result<Guest> {
    let guest = request
        .guest
        .filter(|guest| !guest.nics.is_empty())
        .ok_or_else(|| Error::validation("missing guest with nics"))?;

    if guest.id.trim().is_empty() {
        return Err(Error::validation("missing guest id"));
    }

    Ok(guest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockRunner;
    use crate::network::{MockTapDevices, NetdevTaps, Networkd, TapCall};
    use crate::switch::{OvsSwitch, OVS_VSCTL};
    use tapbridge_networking::MemoryLinks;

    fn interface_table(rows: &[(&str, &str)]) -> String {
        let data: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, mac)| serde_json::json!([name, mac, ""]))
            .collect();
        serde_json::json!({ "headings": ["name", "mac_in_use", "type"], "data": data })
            .to_string()
    }

    struct Fixture {
        runner: Arc<MockRunner>,
        taps: Arc<MockTapDevices>,
        workflow: GuestInterfaces,
    }

    fn fixture_with(taps: MockTapDevices, naming: Naming) -> Fixture {
        let runner = Arc::new(MockRunner::new());
        let taps = Arc::new(taps);
        let switch = Arc::new(OvsSwitch::new(runner.clone()));
        let workflow = GuestInterfaces::new(switch, taps.clone(), naming, "mistify0");
        Fixture {
            runner,
            taps,
            workflow,
        }
    }

    fn allocated() -> Naming {
        let allocator = NameAllocator::seed("tap", Arc::new(MemoryLinks::new())).unwrap();
        Naming::allocated(allocator)
    }

    fn request(nics: Vec<Nic>) -> GuestRequest {
        GuestRequest {
            guest: Some(Guest {
                id: "3f2a9c1b-7d4e-4f10-9a55-0c8e2b6d1f00".to_string(),
                nics,
                ..Default::default()
            }),
        }
    }

    fn nic_on(network: &str) -> Nic {
        Nic {
            network: network.to_string(),
            ..Default::default()
        }
    }

    fn named_nic(name: &str, network: &str) -> Nic {
        Nic {
            name: name.to_string(),
            device: name.to_string(),
            network: network.to_string(),
            mac: "52:54:00:aa:bb:01".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_add_uses_default_bridge() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        fx.runner
            .reply(OVS_VSCTL, "list", &interface_table(&[("tap.0", "52:54:00:aa:bb:01")]));

        let response = fx.workflow.add(request(vec![Nic::default()])).await.unwrap();
        let nic = &response.guest.unwrap().nics[0];

        assert_eq!(nic.name, "tap.0");
        assert_eq!(nic.device, "tap.0");
        assert_eq!(nic.network, "mistify0");
        assert_eq!(nic.mac, "52:54:00:aa:bb:01");
        assert_eq!(fx.taps.calls(), vec![TapCall::Create("tap.0".to_string())]);
    }

    #[tokio::test]
    async fn test_add_uses_requested_bridge_and_tag() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        fx.runner
            .reply(OVS_VSCTL, "list", &interface_table(&[("tap.0", "52:54:00:aa:bb:01")]));

        let mut nic = nic_on("br-guests");
        nic.vlan = 30;
        let response = fx.workflow.add(request(vec![nic])).await.unwrap();

        assert_eq!(response.guest.unwrap().nics[0].network, "br-guests");
        let add = fx.runner.calls_with(OVS_VSCTL, "add-port");
        assert_eq!(add[0][3..], ["add-port", "br-guests", "tap.0", "tag=30"]);
    }

    #[tokio::test]
    async fn test_add_rolls_back_tap_when_attach_fails() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        fx.runner.fail(OVS_VSCTL, "add-port", "no bridge named mistify0");

        let err = fx.workflow.add(request(vec![Nic::default()])).await.unwrap_err();

        assert!(err.to_string().contains("no bridge named mistify0"));
        assert_eq!(
            fx.taps.calls(),
            vec![
                TapCall::Create("tap.0".to_string()),
                TapCall::Remove("tap.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_returns_attach_error_when_rollback_fails() {
        let fx = fixture_with(MockTapDevices::failing_remove(), allocated());
        fx.runner.fail(OVS_VSCTL, "add-port", "no bridge named mistify0");

        let err = fx.workflow.add(request(vec![Nic::default()])).await.unwrap_err();

        assert!(err.to_string().contains("no bridge named mistify0"));
        assert_eq!(fx.taps.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_add_aborts_when_tap_create_fails() {
        let fx = fixture_with(MockTapDevices::failing_create(), allocated());

        let err = fx.workflow.add(request(vec![Nic::default()])).await.unwrap_err();

        assert!(matches!(err, Error::Command(_)));
        assert_eq!(fx.taps.calls(), vec![TapCall::Create("tap.0".to_string())]);
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_undoes_earlier_nics_of_request() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        fx.runner
            .reply(OVS_VSCTL, "list", &interface_table(&[("tap.0", "52:54:00:aa:bb:01")]))
            .fail(OVS_VSCTL, "br-missing", "no bridge named br-missing");

        let nics = vec![nic_on("br0"), nic_on("br-missing")];
        fx.workflow.add(request(nics)).await.unwrap_err();

        let del = fx.runner.calls_with(OVS_VSCTL, "del-port");
        assert_eq!(del.len(), 1);
        assert_eq!(del[0][3..], ["del-port", "br0", "tap.0"]);
        assert_eq!(
            fx.taps.calls(),
            vec![
                TapCall::Create("tap.0".to_string()),
                TapCall::Create("tap.1".to_string()),
                TapCall::Remove("tap.1".to_string()),
                TapCall::Remove("tap.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_rejects_bad_vlan_before_creating_tap() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        let mut nic = Nic::default();
        nic.vlan = 9000;

        let err = fx.workflow.add(request(vec![nic])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(fx.taps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_guest_is_validation_error() {
        let fx = fixture_with(MockTapDevices::new(), allocated());

        let err = fx
            .workflow
            .add(GuestRequest { guest: None })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing guest with nics");

        let err = fx.workflow.remove(request(vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "missing guest with nics");
        assert!(fx.taps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_guest_id_is_validation_error() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        let mut req = request(vec![Nic::default()]);
        if let Some(guest) = req.guest.as_mut() {
            guest.id = "  ".to_string();
        }

        let err = fx.workflow.add(req).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_remove_clears_identity_keeps_network() {
        let fx = fixture_with(MockTapDevices::new(), allocated());

        let mut nic = named_nic("tap.4", "br0");
        nic.extra
            .insert("model".to_string(), serde_json::json!("virtio"));
        let response = fx.workflow.remove(request(vec![nic])).await.unwrap();
        let nic = &response.guest.unwrap().nics[0];

        assert!(nic.name.is_empty());
        assert!(nic.device.is_empty());
        assert!(nic.mac.is_empty());
        assert_eq!(nic.network, "br0");
        assert_eq!(nic.extra["model"], serde_json::json!("virtio"));

        assert_eq!(fx.runner.calls_with(OVS_VSCTL, "del-port").len(), 1);
        assert_eq!(fx.taps.calls(), vec![TapCall::Remove("tap.4".to_string())]);
    }

    #[tokio::test]
    async fn test_remove_keeps_tap_when_detach_fails() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        fx.runner.fail(OVS_VSCTL, "del-port", "no port named tap.4");

        let err = fx
            .workflow
            .remove(request(vec![named_nic("tap.4", "br0")]))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no port named tap.4"));
        assert!(fx.taps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_surfaces_tap_removal_failure() {
        let fx = fixture_with(MockTapDevices::failing_remove(), allocated());

        let err = fx
            .workflow
            .remove(request(vec![named_nic("tap.4", "br0")]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Command(_)));
        assert_eq!(fx.runner.calls_with(OVS_VSCTL, "del-port").len(), 1);
    }

    #[tokio::test]
    async fn test_remove_requires_name_when_allocated() {
        let fx = fixture_with(MockTapDevices::new(), allocated());

        let err = fx
            .workflow
            .remove(request(vec![nic_on("br0")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_derived_names_round_trip() {
        let fx = fixture_with(MockTapDevices::new(), Naming::Derived);
        fx.runner.reply(
            OVS_VSCTL,
            "list",
            &interface_table(&[("3f2a9c1b7d4e4.0", "52:54:00:aa:bb:01")]),
        );

        let response = fx.workflow.add(request(vec![Nic::default()])).await.unwrap();
        assert_eq!(response.guest.unwrap().nics[0].name, "3f2a9c1b7d4e4.0");

        // A cleared nic still resolves to the same device on removal
        fx.workflow
            .remove(request(vec![Nic::default()]))
            .await
            .unwrap();
        assert_eq!(
            fx.taps.calls(),
            vec![
                TapCall::Create("3f2a9c1b7d4e4.0".to_string()),
                TapCall::Remove("3f2a9c1b7d4e4.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_derived_mode_prefers_caller_name() {
        let fx = fixture_with(MockTapDevices::new(), Naming::Derived);
        fx.runner
            .reply(OVS_VSCTL, "list", &interface_table(&[("guest7", "52:54:00:aa:bb:07")]));

        let mut nic = Nic::default();
        nic.name = "guest7".to_string();
        fx.workflow.add(request(vec![nic])).await.unwrap();
        assert_eq!(fx.taps.calls(), vec![TapCall::Create("guest7".to_string())]);

        let mut nic = Nic::default();
        nic.name = "../../etc".to_string();
        let err = fx.workflow.add(request(vec![nic])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_without_mac_rolls_back_tap() {
        let fx = fixture_with(MockTapDevices::new(), allocated());
        let no_mac = r#"{"headings":["name","mac_in_use","type"],"data":[["tap.0",["set",[]],""]]}"#;
        fx.runner.reply(OVS_VSCTL, "list", no_mac);

        let err = fx.workflow.add(request(vec![Nic::default()])).await.unwrap_err();

        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(
            fx.taps.calls(),
            vec![
                TapCall::Create("tap.0".to_string()),
                TapCall::Remove("tap.0".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_add_validates_every_nic_before_touching_host() {
        let fx = fixture_with(MockTapDevices::new(), Naming::Derived);

        let mut bad_vlan = Nic::default();
        bad_vlan.vlan = 9000;
        let err = fx
            .workflow
            .add(request(vec![Nic::default(), bad_vlan]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let bad_name = named_nic("../etc", "br0");
        let err = fx
            .workflow
            .add(request(vec![Nic::default(), bad_name]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(fx.runner.calls_with(OVS_VSCTL, "add-port").is_empty());
        assert!(fx.taps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remove_validates_every_nic_before_touching_host() {
        let fx = fixture_with(MockTapDevices::new(), allocated());

        let nics = vec![named_nic("vm1.0", "br0"), named_nic("../etc", "br0")];
        let err = fx.workflow.remove(request(nics)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let nics = vec![named_nic("vm1.0", "br0"), nic_on("br0")];
        let err = fx.workflow.remove(request(nics)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(fx.runner.calls_with(OVS_VSCTL, "del-port").is_empty());
        assert!(fx.taps.calls().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_names_are_rejected() {
        let fx = fixture_with(MockTapDevices::new(), Naming::Derived);

        let nics = vec![named_nic("vm1.0", "br0"), named_nic("vm1.0", "br1")];
        let err = fx.workflow.add(request(nics.clone())).await.unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let err = fx.workflow.remove(request(nics)).await.unwrap_err();
        assert!(err.to_string().contains("more than once"));
        assert!(fx.taps.calls().is_empty());
        assert!(fx.runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_add_leaves_live_interface_alone() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let switch = Arc::new(OvsSwitch::new(runner.clone()));
        let taps = Arc::new(NetdevTaps::new(
            dir.path(),
            Arc::new(Networkd::new(runner.clone())),
        ));
        let workflow = GuestInterfaces::new(switch, taps, Naming::Derived, "mistify0");
        runner.reply(OVS_VSCTL, "list", &interface_table(&[("vm1.0", "52:54:00:aa:bb:01")]));

        let guest = || GuestRequest {
            guest: Some(Guest {
                id: "vm1".to_string(),
                nics: vec![Nic::default()],
                ..Default::default()
            }),
        };
        workflow.add(guest()).await.unwrap();

        runner.fail(
            OVS_VSCTL,
            "add-port",
            "cannot create a port named vm1.0 because a port named vm1.0 already exists",
        );
        let err = workflow.add(guest()).await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(dir.path().join("vm1.0.netdev").exists());
        assert!(runner.calls_with("ip", "delete").is_empty());
        assert_eq!(runner.calls_with(OVS_VSCTL, "add-port").len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_names() {
        let fx = Arc::new(fixture_with(MockTapDevices::new(), allocated()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fx = fx.clone();
                tokio::spawn(async move {
                    // No query reply is registered, so attach fails after the
                    // name has been allocated and the TAP created.
                    let _ = fx.workflow.add(request(vec![Nic::default()])).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut created: Vec<String> = fx
            .taps
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                TapCall::Create(name) => Some(name),
                TapCall::Remove(_) => None,
            })
            .collect();
        created.sort();
        created.dedup();
        assert_eq!(created.len(), 8);
    }
}
