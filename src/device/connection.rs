use log::{debug, info, warn};

use crate::config::types::DisconnectPolicy;
use crate::device::constants::{target_characteristic_uuid, target_service_uuid};
use crate::device::driver::RadioDriver;
use crate::device::types::{
    ConnectionHandle, DiscoveredService, GattStatus, LinkState, Outcome, RadioEvent, SessionEvent, SessionState,
};
use crate::error::ProbeError;

#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub handle: ConnectionHandle,
    pub address: String,
    pub state: SessionState,
    pub last_error: Option<ProbeError>,
}

fn has_target_characteristic(services: &[DiscoveredService]) -> bool {
    let service_uuid = target_service_uuid();
    let characteristic_uuid = target_characteristic_uuid();

    services
        .iter()
        .filter(|service| service.uuid == service_uuid)
        .any(|service| service.characteristics.contains(&characteristic_uuid))
}

/// Drives a single session through connect, service discovery and one characteristic read.
///
/// At most one session exists at a time. Every call returns the `SessionEvent`s it caused;
/// a session produces exactly one `SessionEvent::Outcome`, after which any further radio
/// events for its handle are ignored.
#[derive(Debug)]
pub struct ConnectionMachine {
    policy: DisconnectPolicy,
    session: Option<ConnectionSession>,
    next_handle: u64,
}

impl ConnectionMachine {
    pub fn new(policy: DisconnectPolicy) -> Self {
        ConnectionMachine {
            policy,
            session: None,
            next_handle: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.as_ref().map_or(SessionState::Idle, |session| session.state)
    }

    pub fn session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref()
    }

    /// Starts a session for `address`, first retiring the current one if it is still running.
    pub fn connect(&mut self, address: &str, driver: &dyn RadioDriver) -> (ConnectionHandle, Vec<SessionEvent>) {
        let mut events = self.disconnect(driver);

        self.next_handle += 1;
        let handle = ConnectionHandle(self.next_handle);
        self.session = Some(ConnectionSession {
            handle,
            address: address.to_string(),
            state: SessionState::Idle,
            last_error: None,
        });

        info!("Connecting to peripheral {} ({})...", address, handle);
        self.transition(SessionState::Connecting, &mut events);
        driver.connect(address, handle);

        if self.policy == DisconnectPolicy::Immediate {
            events.extend(self.disconnect(driver));
        }

        (handle, events)
    }

    /// Ends the current session. Always accepted; a no-op if nothing is running.
    pub fn disconnect(&mut self, driver: &dyn RadioDriver) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if let Some(session) = self.running_session() {
            let handle = session.handle;
            info!("Disconnecting from peripheral ({})", handle);
            driver.disconnect(handle);
            self.finish(SessionState::Disconnected, None, None, &mut events);
        }

        events
    }

    pub fn handle_event(&mut self, event: &RadioEvent, driver: &dyn RadioDriver) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        let (handle, state) = match self.running_session() {
            Some(session) => (session.handle, session.state),
            None => return events,
        };

        match event {
            RadioEvent::LinkChanged { handle: event_handle, .. }
            | RadioEvent::ServicesDiscovered { handle: event_handle, .. }
            | RadioEvent::CharacteristicRead { handle: event_handle, .. } if *event_handle != handle => {
                debug!("Ignoring event for retired connection {}", event_handle);
            },
            RadioEvent::LinkChanged { state: LinkState::Connected, .. } => {
                if state != SessionState::Connecting {
                    debug!("Ignoring connected signal while {}", state);
                    return events;
                }

                info!("Connected; Discovering services...");
                self.transition(SessionState::Connected, &mut events);
                driver.discover_services(handle);
                self.transition(SessionState::DiscoveringServices, &mut events);
            },
            RadioEvent::LinkChanged { state: LinkState::Disconnected, status, .. } => {
                let error = if state == SessionState::Connecting {
                    warn!("Connecting to peripheral failed ({:?})", status);
                    Some(ProbeError::ConnectFailed)
                } else {
                    warn!("Connection lost while {}", state);
                    None
                };

                self.finish(SessionState::Disconnected, None, error, &mut events);
            },
            RadioEvent::ServicesDiscovered { status, services, .. } => {
                if state != SessionState::DiscoveringServices {
                    debug!("Ignoring service discovery result while {}", state);
                    return events;
                }

                if *status != GattStatus::Success {
                    warn!("Service discovery failed");
                    self.fail(ProbeError::ServiceDiscoveryFailed, driver, &mut events);
                    return events;
                }

                if !has_target_characteristic(services) {
                    warn!("Target characteristic not found among {} services", services.len());
                    self.fail(ProbeError::CharacteristicUnavailable, driver, &mut events);
                    return events;
                }

                info!("Reading characteristic {:?} {:?}", target_service_uuid(), target_characteristic_uuid());
                self.transition(SessionState::ReadingCharacteristic, &mut events);
                driver.read_characteristic(handle, target_service_uuid(), target_characteristic_uuid());
            },
            RadioEvent::CharacteristicRead { status, value, .. } => {
                if state != SessionState::ReadingCharacteristic {
                    debug!("Ignoring characteristic read result while {}", state);
                    return events;
                }

                if *status != GattStatus::Success {
                    warn!("Characteristic read unsuccessful");
                    self.fail(ProbeError::CharacteristicReadFailed, driver, &mut events);
                    return events;
                }

                let value = String::from_utf8_lossy(value.as_slice()).into_owned();
                info!("Read characteristic value: {}", value);
                self.release_link(handle, driver);
                self.finish(SessionState::Completed, Some(value), None, &mut events);
            },
            RadioEvent::DeviceDiscovered { .. }
            | RadioEvent::ScanFailed { .. }
            | RadioEvent::RadioStateChanged { .. } => {},
        }

        events
    }

    fn running_session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref().filter(|session| !session.state.is_terminal())
    }

    fn fail(&mut self, error: ProbeError, driver: &dyn RadioDriver, events: &mut Vec<SessionEvent>) {
        if let Some(handle) = self.running_session().map(|session| session.handle) {
            self.release_link(handle, driver);
        }
        self.finish(SessionState::Failed, None, Some(error), events);
    }

    // The link is still up after a read or failure; only `AfterRead` gets this far with one.
    fn release_link(&self, handle: ConnectionHandle, driver: &dyn RadioDriver) {
        if self.policy == DisconnectPolicy::AfterRead {
            driver.disconnect(handle);
        }
    }

    fn transition(&mut self, state: SessionState, events: &mut Vec<SessionEvent>) {
        if let Some(session) = self.session.as_mut() {
            session.state = state;
            events.push(SessionEvent::StateChange { handle: session.handle, state });
        }
    }

    fn finish(&mut self, state: SessionState, value: Option<String>, error: Option<ProbeError>, events: &mut Vec<SessionEvent>) {
        self.transition(state, events);

        if let Some(session) = self.session.as_mut() {
            session.last_error = error;
            events.push(SessionEvent::Outcome(Outcome {
                handle: session.handle,
                address: session.address.clone(),
                state,
                value,
                error,
            }));
        }
    }
}
