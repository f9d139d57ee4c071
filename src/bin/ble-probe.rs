use clap::Parser;
use log::{error, info};
use ble_probe::{init_logging, run};
use ble_probe::error::{AppRunError, ConfigError};
use ble_probe::host::args::Args;

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    init_logging(args.verbose);
    info!(concat!("BLE Probe ", env!("CARGO_PKG_VERSION")));

    match run(args) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("This application has already been started");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        }
        Ok(_) => Ok(())
    }
}
