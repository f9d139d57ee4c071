use std::fmt;
use uuid::Uuid;

use crate::device::constants::UNNAMED_DEVICE;
use crate::error::ProbeError;

/// A peripheral seen while scanning. Identified by its address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub address: String,
}

impl Device {
    pub fn from_advertisement(name: Option<String>, address: String) -> Self {
        let name = match name {
            Some(name) if !name.is_empty() => name,
            _ => String::from(UNNAMED_DEVICE),
        };

        Device { name, address }
    }
}

/// Identifies one connection session. Handed to the driver with every request so that
/// events belonging to a retired session can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Correlates a permission or enable prompt with its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Scan,
    Connect,
}

pub const REQUIRED_PERMISSIONS: [Permission; 2] = [Permission::Scan, Permission::Connect];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    DiscoveringServices,
    ReadingCharacteristic,
    Completed,
    Disconnected,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Disconnected | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::DiscoveringServices => "discovering services",
            SessionState::ReadingCharacteristic => "reading characteristic",
            SessionState::Completed => "completed",
            SessionState::Disconnected => "disconnected",
            SessionState::Failed => "failed",
        };

        write!(f, "{}", result)
    }
}

/// Status code attached to asynchronous GATT completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub uuid: Uuid,
    pub characteristics: Vec<Uuid>,
}

/// Everything the radio stack reports back, delivered on the driver's own task.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    DeviceDiscovered {
        name: Option<String>,
        address: String,
    },
    ScanFailed {
        permission_denied: bool,
    },
    RadioStateChanged {
        powered: bool,
    },
    LinkChanged {
        handle: ConnectionHandle,
        state: LinkState,
        status: GattStatus,
    },
    ServicesDiscovered {
        handle: ConnectionHandle,
        status: GattStatus,
        services: Vec<DiscoveredService>,
    },
    CharacteristicRead {
        handle: ConnectionHandle,
        status: GattStatus,
        value: Vec<u8>,
    },
}

/// Terminal result of a connection session.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub handle: ConnectionHandle,
    pub address: String,
    pub state: SessionState,
    pub value: Option<String>,
    pub error: Option<ProbeError>,
}

/// Emitted by the connection machine; an `Outcome` appears exactly once per session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChange {
        handle: ConnectionHandle,
        state: SessionState,
    },
    Outcome(Outcome),
}

/// Input from the presentation and consent collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
    StartScan,
    StopScan,
    SelectName(String),
    SelectAddress(String),
    Disconnect,
    PermissionResult {
        id: RequestId,
        grants: Vec<(Permission, bool)>,
    },
    EnableResult {
        id: RequestId,
        accepted: bool,
    },
}

/// Output towards the presentation and consent collaborators.
///
/// These are sent over a channel from the controller task; the receiver decides on which
/// thread they are handled.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    PermissionRequested {
        id: RequestId,
        permissions: Vec<Permission>,
    },
    EnableRequested {
        id: RequestId,
    },
    ScanStarted,
    DeviceDiscovered(Device),
    StateChange {
        handle: ConnectionHandle,
        state: SessionState,
    },
    ConnectionOutcome(Outcome),
    PermissionDenied,
    RadioUnavailable,
    UnknownDevice(String),
    ScanFailed,
}
