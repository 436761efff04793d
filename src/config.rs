//! CLI / configuration surface (§4.L, §6) — referenced only as a
//! collaborator. The CLI binary, its argument parsing, and the on-disk
//! config file format are all explicit Non-goals of this crate (§1); this
//! struct exists only so `EventLogReader`/`EventReporter` can be
//! constructed from the handful of fields §6 actually names.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub log_path: PathBuf,
    #[serde(default = "default_checksum_enabled")]
    pub checksum_enabled: bool,
    pub master_host: Option<String>,
    pub master_port: Option<u16>,
}

fn default_checksum_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_enabled_defaults_to_true_when_absent() {
        let json = r#"{"log_path": "/tmp/lineage.log"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.checksum_enabled);
        assert_eq!(config.master_host, None);
    }

    #[test]
    fn explicit_fields_deserialize() {
        let json = r#"{
            "log_path": "/var/lineage/events.log",
            "checksum_enabled": false,
            "master_host": "driver.local",
            "master_port": 7077
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(!config.checksum_enabled);
        assert_eq!(config.master_host.as_deref(), Some("driver.local"));
        assert_eq!(config.master_port, Some(7077));
    }
}
