use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::connection::ConnectionMachine;
use crate::device::constants::CONTROLLER_CHANNEL_CAPACITY;
use crate::device::driver::RadioDriver;
use crate::device::gate::AdapterGate;
use crate::device::scan::{ScanSession, ScanStart};
use crate::device::types::{ControllerCommand, Notification, RadioEvent, SessionEvent};
use crate::error::ProbeError;

impl From<SessionEvent> for Notification {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::StateChange { handle, state } => Notification::StateChange { handle, state },
            SessionEvent::Outcome(outcome) => Notification::ConnectionOutcome(outcome),
        }
    }
}

fn to_notifications(events: Vec<SessionEvent>) -> Vec<Notification> {
    events.into_iter().map(Notification::from).collect()
}

/// Routes commands and radio events between the gate, the scan and the connection machine.
pub struct ConnectController {
    driver: Arc<dyn RadioDriver>,
    gate: AdapterGate,
    scan: ScanSession,
    machine: ConnectionMachine,
}

impl ConnectController {
    pub fn new(driver: Arc<dyn RadioDriver>, config: &Config) -> Self {
        ConnectController {
            driver,
            gate: AdapterGate::new(),
            scan: ScanSession::new(config.scan_services()),
            machine: ConnectionMachine::new(config.disconnect_policy),
        }
    }

    pub fn scan(&self) -> &ScanSession {
        &self.scan
    }

    pub fn machine(&self) -> &ConnectionMachine {
        &self.machine
    }

    pub fn handle_command(&mut self, command: ControllerCommand) -> Vec<Notification> {
        debug!("Command {:?}", command);

        match command {
            ControllerCommand::StartScan => self.start_scan(),
            ControllerCommand::StopScan => {
                self.scan.stop(self.driver.as_ref());
                vec![]
            },
            ControllerCommand::SelectName(name) => {
                match self.scan.registry().address_of(&name).map(str::to_string) {
                    Some(address) => self.select(&address),
                    None => {
                        warn!("No device named {:?} has been discovered", name);
                        vec![Notification::UnknownDevice(name)]
                    },
                }
            },
            ControllerCommand::SelectAddress(address) => self.select(&address),
            ControllerCommand::Disconnect => to_notifications(self.machine.disconnect(self.driver.as_ref())),
            ControllerCommand::PermissionResult { id, grants } => {
                match self.gate.on_permission_result(id, &grants) {
                    Some(Ok(())) => self.start_scan(),
                    Some(Err(_)) => vec![Notification::PermissionDenied],
                    None => vec![],
                }
            },
            ControllerCommand::EnableResult { id, accepted } => {
                match self.gate.on_enable_result(id, accepted) {
                    Some(Ok(())) => self.start_scan(),
                    Some(Err(_)) => vec![Notification::RadioUnavailable],
                    None => vec![],
                }
            },
        }
    }

    pub fn handle_radio_event(&mut self, event: RadioEvent) -> Vec<Notification> {
        match event {
            RadioEvent::DeviceDiscovered { name, address } => {
                self.scan.on_discovered(name, address)
                    .map(Notification::DeviceDiscovered)
                    .into_iter()
                    .collect()
            },
            RadioEvent::ScanFailed { permission_denied } => {
                self.scan.on_failed();
                if permission_denied {
                    self.gate.revoke_permissions();
                    vec![Notification::PermissionDenied]
                } else {
                    vec![Notification::ScanFailed]
                }
            },
            RadioEvent::RadioStateChanged { powered } => {
                info!("Radio powered: {}", powered);
                if !powered && self.scan.is_running() {
                    self.scan.on_failed();
                    vec![Notification::RadioUnavailable]
                } else {
                    vec![]
                }
            },
            event => to_notifications(self.machine.handle_event(&event, self.driver.as_ref())),
        }
    }

    /// Stops the scan and ends the session, e.g. when the host goes away.
    pub fn shutdown(&mut self) -> Vec<Notification> {
        self.scan.stop(self.driver.as_ref());
        to_notifications(self.machine.disconnect(self.driver.as_ref()))
    }

    fn start_scan(&mut self) -> Vec<Notification> {
        match self.scan.start(&mut self.gate, self.driver.as_ref()) {
            ScanStart::Started => vec![Notification::ScanStarted],
            ScanStart::AlreadyRunning => vec![],
            ScanStart::AwaitingPermissions(prompt) | ScanStart::AwaitingEnable(prompt) => {
                prompt.map(Notification::from).into_iter().collect()
            },
        }
    }

    fn select(&mut self, address: &str) -> Vec<Notification> {
        if !self.gate.permissions_granted() {
            warn!("Refusing to connect to {}: {}", address, ProbeError::PermissionDenied);
            return vec![Notification::PermissionDenied];
        }

        let (handle, events) = self.machine.connect(address, self.driver.as_ref());
        debug!("Session {} started for {}", handle, address);
        to_notifications(events)
    }
}

async fn deliver(sender: &mut Sender<Notification>, notifications: Vec<Notification>) {
    for notification in notifications {
        if let Err(err) = sender.send(notification).await {
            warn!("Failed to deliver notification: {}", err);
        }
    }
}

/// Runs a `ConnectController` on its own task, starting with a scan.
///
/// Notifications are delivered on `notifications` in the order they were produced; the
/// receiving side is responsible for moving them onto its own thread if needed. When `cancel`
/// fires, the scan is stopped and the running session is disconnected before the task ends.
pub fn connect_controller_task(
    cancel: CancellationToken,
    driver: Arc<dyn RadioDriver>,
    mut radio_events: Receiver<RadioEvent>,
    config: Config,
    mut notifications: Sender<Notification>,
) -> (Sender<ControllerCommand>, JoinHandle<()>) {
    let (command_sender, mut command_receiver) = channel::<ControllerCommand>(CONTROLLER_CHANNEL_CAPACITY);

    let handle = spawn(async move {
        let mut controller = ConnectController::new(driver, &config);

        let started = controller.handle_command(ControllerCommand::StartScan);
        deliver(&mut notifications, started).await;

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(command) = command_receiver.next() => {
                    let produced = controller.handle_command(command);
                    deliver(&mut notifications, produced).await;
                },
                Some(event) = radio_events.next() => {
                    let produced = controller.handle_radio_event(event);
                    deliver(&mut notifications, produced).await;
                },
            }
        }

        info!("Controller stopping");
        let produced = controller.shutdown();
        deliver(&mut notifications, produced).await;
    });

    (command_sender, handle)
}
