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

use anyhow::{Context, Result};
use homevolt_types::DiagnosticsReport;
use serde_json::{Value, json};

use crate::config::AppConfig;

pub const REDACTED: &str = "**REDACTED**";

/// Keys whose values never leave the machine
const REDACT_KEYS: [&str; 8] = [
    "password",
    "serial_number",
    "ssid",
    "psk",
    "ip",
    "mqtt_topic",
    "mqtt_topic_sub",
    "mqtt_client_id",
];

/// Replace the value of every deny-listed key, at any depth
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if REDACT_KEYS.contains(&key.as_str()) {
                    *inner = Value::String(REDACTED.to_owned());
                } else {
                    redact(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Diagnostics export: configuration plus the full coordinator state, redacted
pub fn export(config: &AppConfig, report: &DiagnosticsReport) -> Result<Value> {
    let mut export = json!({
        "config": serde_json::to_value(config).context("Failed to serialize config")?,
        "coordinator": serde_json::to_value(report).context("Failed to serialize snapshot")?,
    });
    // Module ids are BMS serial numbers, so the map keys would leak them
    if let Some(modules) = export.pointer_mut("/coordinator/snapshot/modules") {
        anonymize_keys(modules, "module");
    }
    redact(&mut export);
    Ok(export)
}

fn anonymize_keys(value: &mut Value, prefix: &str) {
    if let Value::Object(map) = value {
        let entries = std::mem::take(map);
        for (index, (_, inner)) in entries.into_iter().enumerate() {
            map.insert(format!("{prefix}_{index}"), inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use homevolt_types::{BmsInfo, ModuleId, ModuleTelemetry, Snapshot, StatusResponse, Tracked};

    #[test]
    fn test_redacts_nested_keys() {
        let mut value = json!({
            "password": "secret",
            "wifi_status": {"ssid": "home", "ip": "192.168.1.50", "rssi": -60},
            "modules": [{"serial_number": "SN-1", "soc": 80}],
            "mqtt": {"mqtt_topic": "a/b", "connected": true}
        });
        redact(&mut value);

        assert_eq!(value["password"], REDACTED);
        assert_eq!(value["wifi_status"]["ssid"], REDACTED);
        assert_eq!(value["wifi_status"]["ip"], REDACTED);
        assert_eq!(value["wifi_status"]["rssi"], -60);
        assert_eq!(value["modules"][0]["serial_number"], REDACTED);
        assert_eq!(value["modules"][0]["soc"], 80);
        assert_eq!(value["mqtt"]["mqtt_topic"], REDACTED);
        assert_eq!(value["mqtt"]["connected"], true);
    }

    #[test]
    fn test_export_hides_password_and_serials() {
        let mut config = AppConfig::default();
        config.device.host = "10.0.0.7".to_owned();
        config.device.password = Some("hunter2".to_owned());

        let mut snapshot = Snapshot::default();
        snapshot.status = Some(StatusResponse::default());
        snapshot.modules.insert(
            ModuleId::new("SN-SECRET"),
            Tracked::fresh(
                ModuleTelemetry {
                    index: 0,
                    info: BmsInfo {
                        serial_number: "SN-SECRET".to_owned(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                Utc::now(),
            ),
        );
        let report = DiagnosticsReport {
            generated_at: Utc::now(),
            snapshot,
            endpoints: Vec::new(),
        };

        let export = export(&config, &report).unwrap();
        assert_eq!(export["config"]["device"]["password"], REDACTED);
        assert_eq!(export["config"]["device"]["host"], "10.0.0.7");
        assert_eq!(
            export["coordinator"]["snapshot"]["status"]["wifi_status"]["ip"],
            REDACTED
        );
        let module = &export["coordinator"]["snapshot"]["modules"]["module_0"];
        assert_eq!(module["value"]["info"]["serial_number"], REDACTED);
        assert!(!export.to_string().contains("SN-SECRET"));
    }
}
