use std::fmt::Debug;
use uuid::Uuid;

use crate::device::types::ConnectionHandle;

/// The platform radio stack as seen by the connection core.
///
/// Every request returns immediately. Results are delivered later as `RadioEvent`s on the
/// channel the driver was created with, from whatever task the driver runs them on.
pub trait RadioDriver: Send + Sync + Debug {
    /// Last known power state of the radio.
    fn radio_powered(&self) -> bool;

    /// Start discovery. An empty `services` list reports every advertiser.
    fn scan_start(&self, services: Vec<Uuid>);

    fn scan_stop(&self);

    fn connect(&self, address: &str, handle: ConnectionHandle);

    fn discover_services(&self, handle: ConnectionHandle);

    fn read_characteristic(&self, handle: ConnectionHandle, service: Uuid, characteristic: Uuid);

    fn disconnect(&self, handle: ConnectionHandle);
}
