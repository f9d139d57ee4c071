use std::env;
use log::{error, info, warn};
use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::error::AppRunError;
use crate::host::args::Args;
use crate::host::terminal::run_terminal;

pub mod device;
pub mod error;
pub mod config;
pub mod host;

pub fn init_logging(verbose: bool) {
    let level = if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

async fn load_config(config_io: &ConfigIO) -> Config {
    match config_io.read().await {
        Ok(config) => {
            // writes the defaults on first start, and any setting the file did not mention yet
            if let Err(err) = config_io.save(&config).await {
                warn!("Failed to write config file: {}", err);
            }
            config
        },
        Err(err) => {
            if err.is_file_not_found_error() {
                // this is probably the first start of the app
                info!("Config file not found, using defaults");
            } else {
                error!("Failed to load config, using defaults: {}", &err);
            }
            Config::default()
        },
    }
}

pub fn run(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::new_sync(args.config.clone())?;

    // one instance per config file, so at most one connection session talks to the radio
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let config = load_config(&config_io).await;
        run_terminal(&args, config).await
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use super::*;
    use crate::config::types::DisconnectPolicy;

    fn temp_config_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir()
            .join(format!("ble-probe-lib-test-{}-{}", std::process::id(), name))
            .join("ble-probe.json");
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn first_start_writes_the_defaults() {
        let path = temp_config_path("first-start");
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        assert_eq!(load_config(&config_io).await, Config::default());

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(on_disk.contains("\"disconnectPolicy\": \"afterRead\""));
        assert!(on_disk.contains("\"filterByService\": false"));
    }

    #[tokio::test]
    async fn broken_config_is_left_alone() {
        let path = temp_config_path("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ \"disconnectPolicy\": ").unwrap();
        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();

        assert_eq!(load_config(&config_io).await.disconnect_policy, DisconnectPolicy::AfterRead);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ \"disconnectPolicy\": ");
    }
}
