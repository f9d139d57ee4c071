use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::channel;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::btle::BtleplugDriver;
use crate::device::constants::CONTROLLER_CHANNEL_CAPACITY;
use crate::device::controller::connect_controller_task;
use crate::device::types::{ControllerCommand, Device, Notification, RequestId, REQUIRED_PERMISSIONS};
use crate::error::AppRunError;
use crate::host::args::Args;

const HELP: &str = "Type the number of a device to connect, \
'd' to disconnect, 's' to stop scanning, 'r' to scan again, 'q' to quit";

/// What the terminal does in response to a notification or an input line.
#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    pub commands: Vec<ControllerCommand>,
    pub output: Vec<String>,
    pub exit: bool,
}

impl Reaction {
    fn say(line: String) -> Self {
        Reaction { output: vec![line], ..Reaction::default() }
    }
}

/// Terminal side of the presentation and consent collaborators.
#[derive(Debug, Default)]
pub struct Terminal {
    auto_select: Option<String>,
    exit_after_outcome: bool,
    listed: Vec<Device>,
    pending_enable: Option<RequestId>,
}

impl Terminal {
    pub fn new(args: &Args) -> Self {
        Terminal {
            auto_select: args.device.clone(),
            exit_after_outcome: args.once,
            ..Terminal::default()
        }
    }

    pub fn on_notification(&mut self, notification: Notification) -> Reaction {
        match notification {
            Notification::PermissionRequested { id, permissions } => {
                // Desktop platforms ask for consent themselves on first use of the radio; a
                // refusal shows up as a failed scan.
                info!("Granting {:?} ({})", permissions, id);
                Reaction {
                    commands: vec![ControllerCommand::PermissionResult {
                        id,
                        grants: permissions.into_iter().map(|permission| (permission, true)).collect(),
                    }],
                    ..Reaction::default()
                }
            },
            Notification::EnableRequested { id } => {
                self.pending_enable = Some(id);
                Reaction::say(String::from(
                    "Bluetooth is required for this feature. Turn it on and press enter, or type 'n' to give up."
                ))
            },
            Notification::ScanStarted => {
                self.listed.clear();
                Reaction::say(format!("Scanning for devices... {}", HELP))
            },
            Notification::DeviceDiscovered(device) => {
                let line = format!("[{}] {} ({})", self.listed.len(), device.name, device.address);
                let mut reaction = Reaction::say(line);

                if self.auto_select.as_deref() == Some(device.name.as_str()) {
                    self.auto_select = None;
                    reaction.commands.push(ControllerCommand::SelectName(device.name.clone()));
                }

                self.listed.push(device);
                reaction
            },
            Notification::StateChange { handle, state } => {
                info!("Connection {} is {}", handle, state);
                Reaction::default()
            },
            Notification::ConnectionOutcome(outcome) => {
                let line = match (&outcome.value, &outcome.error) {
                    (Some(value), _) => format!("Characteristic read successfully: {}", value),
                    (None, Some(error)) => format!("{} ({}): {}", outcome.address, outcome.state, error),
                    (None, None) => format!("{} ({})", outcome.address, outcome.state),
                };

                Reaction {
                    output: vec![line],
                    exit: self.exit_after_outcome,
                    ..Reaction::default()
                }
            },
            Notification::PermissionDenied => Reaction {
                output: vec![String::from("Permissions Denied")],
                exit: true,
                ..Reaction::default()
            },
            Notification::RadioUnavailable => Reaction {
                output: vec![String::from("Bluetooth is required for this feature.")],
                exit: true,
                ..Reaction::default()
            },
            Notification::UnknownDevice(name) => Reaction::say(format!("No device named {:?}", name)),
            Notification::ScanFailed => Reaction::say(String::from("Scanning failed; type 'r' to try again")),
        }
    }

    pub fn on_line(&mut self, line: &str) -> Reaction {
        let line = line.trim();

        if let Some(id) = self.pending_enable.take() {
            let accepted = !line.eq_ignore_ascii_case("n");
            return Reaction {
                commands: vec![ControllerCommand::EnableResult { id, accepted }],
                ..Reaction::default()
            };
        }

        let command = match line {
            "q" => return Reaction { exit: true, ..Reaction::default() },
            "d" => ControllerCommand::Disconnect,
            "s" => ControllerCommand::StopScan,
            "r" => ControllerCommand::StartScan,
            _ => match line.parse::<usize>().ok().and_then(|index| self.listed.get(index)) {
                Some(device) => ControllerCommand::SelectName(device.name.clone()),
                None => return Reaction::say(String::from(HELP)),
            },
        };

        Reaction { commands: vec![command], ..Reaction::default() }
    }
}

/// Runs the controller against the real radio and talks to the user on stdin/stdout until
/// they quit, ctrl-c is pressed, or a terminal failure occurs.
pub async fn run_terminal(args: &Args, config: Config) -> Result<(), AppRunError> {
    let cancel = CancellationToken::new();
    info!("Disconnect policy: {}; required permissions: {:?}", config.disconnect_policy, REQUIRED_PERMISSIONS);

    let (driver, radio_events) = BtleplugDriver::new(cancel.child_token()).await?;
    let (notification_sender, mut notification_receiver) = channel::<Notification>(CONTROLLER_CHANNEL_CAPACITY);
    let (mut command_sender, controller_handle) = connect_controller_task(
        cancel.child_token(),
        Arc::new(driver),
        radio_events,
        config,
        notification_sender,
    );

    let mut terminal = Terminal::new(args);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    'mainloop: loop {
        let reaction = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break 'mainloop;
            },
            Some(notification) = notification_receiver.next() => terminal.on_notification(notification),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => terminal.on_line(&line),
                Ok(None) => {
                    stdin_open = false;
                    Reaction::default()
                },
                Err(err) => {
                    warn!("Failed to read from stdin: {}", err);
                    stdin_open = false;
                    Reaction::default()
                },
            },
        };

        for line in &reaction.output {
            println!("{}", line);
        }

        for command in reaction.commands {
            if let Err(err) = command_sender.send(command).await {
                warn!("Failed to send command to controller: {}", err);
                break 'mainloop;
            }
        }

        if reaction.exit {
            break 'mainloop;
        }
    }

    cancel.cancel();
    if let Err(err) = controller_handle.await {
        warn!("Controller task did not finish cleanly: {}", err);
    }

    Ok(())
}
