// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Homevolt Monitor.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::{Context, Result, bail};
use homevolt_client::ClientSettings;
use homevolt_core::CoordinatorConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "homevolt.toml";

pub const MIN_SCAN_INTERVAL_SECS: u64 = 10;
pub const MAX_SCAN_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub polling: PollingSettings,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub use_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Consecutive failures tolerated before data is marked unavailable
    #[serde(default = "default_grace_threshold")]
    pub grace_threshold: u32,
}

fn default_port() -> u16 {
    80
}

fn default_scan_interval_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    20
}

fn default_grace_threshold() -> u32 {
    homevolt_core::DEFAULT_GRACE_THRESHOLD
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            password: None,
            use_ssl: false,
        }
    }
}

impl fmt::Debug for DeviceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("use_ssl", &self.use_ssl)
            .finish()
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            grace_threshold: default_grace_threshold(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (or `homevolt.toml` when present), apply environment overrides and
    /// validate. An explicit path that cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config TOML")
    }

    /// Apply `HOMEVOLT_*` overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HOMEVOLT_HOST") {
            self.device.host = host;
        }
        if let Some(port) = lookup("HOMEVOLT_PORT") {
            self.device.port = port
                .trim()
                .parse()
                .with_context(|| format!("HOMEVOLT_PORT is not a valid port: {port}"))?;
        }
        if let Some(password) = lookup("HOMEVOLT_PASSWORD") {
            self.device.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(interval) = lookup("HOMEVOLT_SCAN_INTERVAL") {
            self.polling.scan_interval_secs = interval.trim().parse().with_context(|| {
                format!("HOMEVOLT_SCAN_INTERVAL is not a number of seconds: {interval}")
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            bail!("device.host must be set (or HOMEVOLT_HOST)");
        }
        if self.device.port == 0 {
            bail!("device.port must be non-zero");
        }
        let scan = self.polling.scan_interval_secs;
        if !(MIN_SCAN_INTERVAL_SECS..=MAX_SCAN_INTERVAL_SECS).contains(&scan) {
            bail!(
                "polling.scan_interval_secs must be between {MIN_SCAN_INTERVAL_SECS} and {MAX_SCAN_INTERVAL_SECS}, got {scan}"
            );
        }
        if self.polling.connect_timeout_secs == 0 || self.polling.read_timeout_secs == 0 {
            bail!("polling timeouts must be non-zero");
        }
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            host: self.device.host.trim().to_owned(),
            port: self.device.port,
            password: self.device.password.clone(),
            use_ssl: self.device.use_ssl,
            connect_timeout: Duration::from_secs(self.polling.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.polling.read_timeout_secs),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::new(
            Duration::from_secs(self.polling.scan_interval_secs),
            Duration::from_secs(self.polling.read_timeout_secs),
        )
        .with_grace_threshold(self.polling.grace_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let file = write_config(
            r#"
[device]
host = "192.168.1.50"
"#,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.port, 80);
        assert!(!config.device.use_ssl);
        assert_eq!(config.polling, PollingSettings::default());
        assert_eq!(config.polling.scan_interval_secs, 30);
        assert_eq!(config.polling.grace_threshold, 3);
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
[device]
host = "homevolt.local"
port = 8080
password = "secret"
use_ssl = true

[polling]
scan_interval_secs = 60
connect_timeout_secs = 3
read_timeout_secs = 15
grace_threshold = 5
"#,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();

        let client = config.client_settings();
        assert_eq!(client.base_url(), "https://homevolt.local:8080");
        assert_eq!(client.password.as_deref(), Some("secret"));
        assert_eq!(client.connect_timeout, Duration::from_secs(3));

        let coordinator = config.coordinator_config();
        assert_eq!(coordinator.scan_interval, Duration::from_secs(60));
        assert_eq!(coordinator.fetch_timeout, Duration::from_secs(15));
        assert_eq!(coordinator.grace_threshold, 5);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("HOMEVOLT_HOST", "10.0.0.7"),
            ("HOMEVOLT_PORT", "8081"),
            ("HOMEVOLT_PASSWORD", "pw"),
            ("HOMEVOLT_SCAN_INTERVAL", "15"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| (*v).to_owned()))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.device.host, "10.0.0.7");
        assert_eq!(config.device.port, 8081);
        assert_eq!(config.device.password.as_deref(), Some("pw"));
        assert_eq!(config.polling.scan_interval_secs, 15);
    }

    #[test]
    fn test_bad_override_is_error() {
        let mut config = AppConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "HOMEVOLT_PORT").then(|| "eighty".to_owned())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let valid = AppConfig {
            device: DeviceSettings {
                host: "10.0.0.7".to_owned(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        assert!(AppConfig::default().validate().is_err());

        for scan in [9, 301] {
            let mut config = valid.clone();
            config.polling.scan_interval_secs = scan;
            assert!(config.validate().is_err(), "scan interval {scan} accepted");
        }
        for scan in [10, 300] {
            let mut config = valid.clone();
            config.polling.scan_interval_secs = scan;
            assert!(config.validate().is_ok(), "scan interval {scan} rejected");
        }

        let mut config = valid.clone();
        config.device.port = 0;
        assert!(config.validate().is_err());

        let mut config = valid;
        config.polling.read_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_debug_hides_password() {
        let device = DeviceSettings {
            password: Some("hunter2".to_owned()),
            ..Default::default()
        };
        assert!(!format!("{device:?}").contains("hunter2"));
    }
}
