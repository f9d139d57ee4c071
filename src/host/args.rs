use std::path::PathBuf;
use clap::Parser;

/// Scan for nearby BLE peripherals, pick one and read its value characteristic.
#[derive(Parser, Debug, Clone, Default)]
#[command(version, about)]
pub struct Args {
    /// Path to the config file (default: next to the executable, or the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Connect to the first discovered device with this name
    #[arg(long)]
    pub device: Option<String>,

    /// Exit after the first connection outcome
    #[arg(long)]
    pub once: bool,

    /// Log debug messages
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_flags() {
        let args = Args::try_parse_from([
            "ble-probe", "--config", "/tmp/probe.json", "--device", "Sensor", "--once", "-v",
        ]).unwrap();

        assert_eq!(args.config, Some(PathBuf::from("/tmp/probe.json")));
        assert_eq!(args.device.as_deref(), Some("Sensor"));
        assert!(args.once);
        assert!(args.verbose);
    }

    #[test]
    fn everything_is_optional() {
        let args = Args::try_parse_from(["ble-probe"]).unwrap();

        assert_eq!(args.config, None);
        assert_eq!(args.device, None);
        assert!(!args.once);
    }
}
