use std::io;
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (runtime): {source}")]
    Runtime { #[from] source: io::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DriverError { #[from] source: DriverError },
}

/// Failures inside the real radio driver. These never cross the driver boundary as-is;
/// they are logged and turned into failure events.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("No peripheral with address {address} has been seen")]
    UnknownPeripheral { address: String },

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("Connection {handle} is not open")]
    NotConnected { handle: u64 },
}

/// Terminal failures reported to the presentation layer. None of these are retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Bluetooth permissions were denied")]
    PermissionDenied,

    #[error("The bluetooth radio is disabled")]
    RadioDisabled,

    #[error("Failed to connect to the device")]
    ConnectFailed,

    #[error("Service discovery failed")]
    ServiceDiscoveryFailed,

    #[error("The required bluetooth characteristic is not available")]
    CharacteristicUnavailable,

    #[error("Reading the characteristic failed")]
    CharacteristicReadFailed,
}
