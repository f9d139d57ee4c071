//! Test support. `FakeDriver` stands in for the radio in unit and integration tests and is not
//! meant to back a real host.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use crate::device::driver::RadioDriver;
use crate::device::types::ConnectionHandle;

/// A request as received by `FakeDriver`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverRequest {
    ScanStart { services: Vec<Uuid> },
    ScanStop,
    Connect { address: String, handle: ConnectionHandle },
    DiscoverServices { handle: ConnectionHandle },
    ReadCharacteristic { handle: ConnectionHandle, service: Uuid, characteristic: Uuid },
    Disconnect { handle: ConnectionHandle },
}

/// Simulated radio that records requests and never produces events by itself.
/// Tests feed the matching `RadioEvent`s back into the code under test.
#[derive(Debug)]
pub struct FakeDriver {
    powered: AtomicBool,
    requests: Mutex<Vec<DriverRequest>>,
}

impl FakeDriver {
    pub fn new(powered: bool) -> Self {
        FakeDriver {
            powered: AtomicBool::new(powered),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_powered(&self, powered: bool) {
        self.powered.store(powered, Ordering::SeqCst);
    }

    /// Returns and forgets all requests received so far.
    pub fn take_requests(&self) -> Vec<DriverRequest> {
        std::mem::take(&mut *self.lock())
    }

    pub fn requests(&self) -> Vec<DriverRequest> {
        self.lock().clone()
    }

    fn push(&self, request: DriverRequest) {
        self.lock().push(request);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DriverRequest>> {
        // a panicking test thread must not hide the requests from the others
        self.requests.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RadioDriver for FakeDriver {
    fn radio_powered(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }

    fn scan_start(&self, services: Vec<Uuid>) {
        self.push(DriverRequest::ScanStart { services });
    }

    fn scan_stop(&self) {
        self.push(DriverRequest::ScanStop);
    }

    fn connect(&self, address: &str, handle: ConnectionHandle) {
        self.push(DriverRequest::Connect { address: address.to_string(), handle });
    }

    fn discover_services(&self, handle: ConnectionHandle) {
        self.push(DriverRequest::DiscoverServices { handle });
    }

    fn read_characteristic(&self, handle: ConnectionHandle, service: Uuid, characteristic: Uuid) {
        self.push(DriverRequest::ReadCharacteristic { handle, service, characteristic });
    }

    fn disconnect(&self, handle: ConnectionHandle) {
        self.push(DriverRequest::Disconnect { handle });
    }
}
