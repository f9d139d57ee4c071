use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::target_service_uuid;

/// When to drop the link of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectPolicy {
    /// Disconnect right after issuing the connect request. The session only probes
    /// whether the device is reachable and ends as `Disconnected`.
    Immediate,
    /// Keep the link until the characteristic has been read (or reading failed).
    AfterRead,
}

impl std::fmt::Display for DisconnectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            DisconnectPolicy::Immediate => "immediate",
            DisconnectPolicy::AfterRead => "after read",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub disconnect_policy: DisconnectPolicy,
    // only list advertisers of the target service
    pub filter_by_service: bool,
}

impl Config {
    pub fn scan_services(&self) -> Vec<Uuid> {
        if self.filter_by_service {
            vec![target_service_uuid()]
        } else {
            vec![]
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            disconnect_policy: DisconnectPolicy::AfterRead,
            filter_by_service: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_and_fills_in_defaults() {
        let config: Config = serde_json::from_str(r#"{"disconnectPolicy": "immediate"}"#).unwrap();
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Immediate);
        assert!(!config.filter_by_service);

        let config: Config = serde_json::from_str(r#"{"filterByService": true}"#).unwrap();
        assert_eq!(config.disconnect_policy, DisconnectPolicy::AfterRead);
        assert_eq!(config.scan_services(), vec![target_service_uuid()]);
    }

    #[test]
    fn serializes_with_camel_case_names() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert_eq!(json, r#"{"disconnectPolicy":"afterRead","filterByService":false}"#);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let result: Result<Config, _> = serde_json::from_str(r#"{"disconnectPolicy": "never"}"#);
        assert!(result.is_err());
    }
}
