use log::{debug, info};
use uuid::Uuid;

use crate::device::driver::RadioDriver;
use crate::device::gate::{AdapterGate, Prompt};
use crate::device::registry::DeviceRegistry;
use crate::device::types::Device;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStart {
    Started,
    AlreadyRunning,
    /// Permissions are missing; carries the prompt to show unless one is already open.
    AwaitingPermissions(Option<Prompt>),
    /// The radio is off; carries the prompt to show unless one is already open.
    AwaitingEnable(Option<Prompt>),
}

/// One discovery operation and the devices it has seen.
#[derive(Debug)]
pub struct ScanSession {
    registry: DeviceRegistry,
    services: Vec<Uuid>,
    running: bool,
}

impl ScanSession {
    /// `services` restricts discovery to advertisers of those services; empty means all.
    pub fn new(services: Vec<Uuid>) -> Self {
        ScanSession {
            registry: DeviceRegistry::new(),
            services,
            running: false,
        }
    }

    /// Starts discovery if the gate allows it. Otherwise nothing is sent to the radio and
    /// the caller gets the prompt that has to be answered first; answering it positively
    /// is expected to lead to another `start`.
    pub fn start(&mut self, gate: &mut AdapterGate, driver: &dyn RadioDriver) -> ScanStart {
        if self.running {
            return ScanStart::AlreadyRunning;
        }

        if !gate.permissions_granted() {
            return ScanStart::AwaitingPermissions(gate.ensure_permissions());
        }

        if !driver.radio_powered() {
            info!("Radio is off, deferring scan");
            return ScanStart::AwaitingEnable(gate.request_enable());
        }

        self.registry.clear();
        info!("Scanning for devices...");
        driver.scan_start(self.services.clone());
        self.running = true;
        ScanStart::Started
    }

    /// Stopping is best-effort: the radio may still deliver a few results afterwards.
    pub fn stop(&mut self, driver: &dyn RadioDriver) {
        if self.running {
            info!("Stopping scan");
            driver.scan_stop();
            self.running = false;
        }
    }

    /// Records a scan result. Returns the device if it should be listed, i.e. its display
    /// name has not been seen before in this session.
    pub fn on_discovered(&mut self, name: Option<String>, address: String) -> Option<Device> {
        if !self.running {
            debug!("Dropping scan result for {} received while not scanning", address);
            return None;
        }

        let device = Device::from_advertisement(name, address);
        let recorded = self.registry.record(device);
        if let Some(device) = &recorded {
            info!("Discovered {} ({})", device.name, device.address);
        }
        recorded
    }

    /// The radio ended the scan on its own.
    pub fn on_failed(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::{target_service_uuid, UNNAMED_DEVICE};
    use crate::device::fake::{DriverRequest, FakeDriver};
    use crate::device::types::Permission;

    fn granted_gate() -> AdapterGate {
        let mut gate = AdapterGate::new();
        let Some(Prompt::Permissions { id, permissions }) = gate.ensure_permissions() else {
            panic!("expected a permission prompt");
        };
        let grants: Vec<(Permission, bool)> = permissions.into_iter().map(|p| (p, true)).collect();
        gate.on_permission_result(id, &grants);
        gate
    }

    #[test]
    fn without_permissions_no_scan_is_issued() {
        let driver = FakeDriver::new(true);
        let mut gate = AdapterGate::new();
        let mut scan = ScanSession::new(vec![]);

        let result = scan.start(&mut gate, &driver);

        assert!(matches!(result, ScanStart::AwaitingPermissions(Some(Prompt::Permissions { .. }))));
        assert!(driver.requests().is_empty());
        assert!(!scan.is_running());
    }

    #[test]
    fn radio_off_requests_enable_and_defers() {
        let driver = FakeDriver::new(false);
        let mut gate = granted_gate();
        let mut scan = ScanSession::new(vec![]);

        let result = scan.start(&mut gate, &driver);
        let ScanStart::AwaitingEnable(Some(Prompt::Enable { id })) = result else {
            panic!("expected an enable prompt, got {:?}", result);
        };
        assert!(driver.requests().is_empty());

        // a second attempt does not open a second prompt
        assert_eq!(scan.start(&mut gate, &driver), ScanStart::AwaitingEnable(None));

        driver.set_powered(true);
        assert_eq!(gate.on_enable_result(id, true), Some(Ok(())));
        assert_eq!(scan.start(&mut gate, &driver), ScanStart::Started);
        assert_eq!(driver.requests(), vec![DriverRequest::ScanStart { services: vec![] }]);
    }

    #[test]
    fn start_passes_the_service_filter_and_is_not_repeated() {
        let driver = FakeDriver::new(true);
        let mut gate = granted_gate();
        let mut scan = ScanSession::new(vec![target_service_uuid()]);

        assert_eq!(scan.start(&mut gate, &driver), ScanStart::Started);
        assert_eq!(scan.start(&mut gate, &driver), ScanStart::AlreadyRunning);
        assert_eq!(driver.requests(), vec![DriverRequest::ScanStart { services: vec![target_service_uuid()] }]);
    }

    #[test]
    fn duplicate_names_are_dropped() {
        let driver = FakeDriver::new(true);
        let mut gate = granted_gate();
        let mut scan = ScanSession::new(vec![]);
        scan.start(&mut gate, &driver);

        let first = scan.on_discovered(None, "AA".to_string());
        assert_eq!(first.map(|d| d.name), Some(UNNAMED_DEVICE.to_string()));
        assert_eq!(scan.on_discovered(None, "BB".to_string()), None);
        assert!(scan.on_discovered(Some("Probe".to_string()), "CC".to_string()).is_some());

        assert_eq!(scan.registry().len(), 2);
        assert_eq!(scan.registry().address_of(UNNAMED_DEVICE), Some("AA"));
    }

    #[test]
    fn a_new_scan_clears_the_registry() {
        let driver = FakeDriver::new(true);
        let mut gate = granted_gate();
        let mut scan = ScanSession::new(vec![]);

        scan.start(&mut gate, &driver);
        scan.on_discovered(Some("Probe".to_string()), "AA".to_string());
        scan.stop(&driver);
        assert_eq!(scan.on_discovered(Some("Late".to_string()), "BB".to_string()), None);

        scan.start(&mut gate, &driver);
        assert!(scan.registry().is_empty());
        assert_eq!(driver.requests(), vec![
            DriverRequest::ScanStart { services: vec![] },
            DriverRequest::ScanStop,
            DriverRequest::ScanStart { services: vec![] },
        ]);
    }
}
