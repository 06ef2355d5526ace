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

//! Raw response bodies of the device's local HTTP API.
//!
//! Every struct is `#[serde(default)]`: the firmware adds fields between releases and omits
//! sections on some models, so unknown fields are ignored and missing ones fall back to zero.

use serde::{Deserialize, Serialize};

/// Placeholder EUID reported for CT sensor slots without a paired clamp
pub const UNPAIRED_EUID: &str = "0000000000000000";

// ============= /ems.json =============

/// Top-level response from `/ems.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsResponse {
    #[serde(rename = "$type")]
    pub response_type: String,
    pub ts: i64,
    pub ems: Vec<EmsDevice>,
    pub aggregated: EmsDevice,
    pub sensors: Vec<CtSensor>,
}

impl EmsResponse {
    /// ECU id of the first EMS device, used as the fallback prefix for module ids
    pub fn ecu_id(&self) -> Option<i64> {
        self.ems.first().map(|device| device.ecu_id)
    }
}

/// A single EMS device (inverter + batteries), also used for the aggregated view
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsDevice {
    pub ecu_id: i64,
    pub ecu_host: String,
    pub ecu_version: String,
    pub error: i64,
    pub error_str: String,
    pub op_state: i64,
    pub op_state_str: String,
    pub ems_info: EmsInfo,
    pub bms_info: Vec<BmsInfo>,
    pub inv_info: InvInfo,
    pub ems_config: EmsConfig,
    pub ems_control: EmsControl,
    pub ems_data: EmsData,
    pub bms_data: Vec<BmsData>,
    pub ems_prediction: EmsPrediction,
    pub ems_voltage: PhaseVoltages,
    pub ems_current: PhaseCurrents,
    pub ems_aggregate: EmsAggregate,
    pub error_cnt: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsInfo {
    pub protocol_version: i64,
    pub fw_version: String,
    /// Wh
    pub rated_capacity: i64,
    /// W
    pub rated_power: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BmsInfo {
    pub fw_version: String,
    pub serial_number: String,
    /// Wh
    pub rated_cap: i64,
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvInfo {
    pub fw_version: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsConfig {
    pub grid_code_preset: i64,
    pub grid_code_preset_str: String,
    pub control_timeout: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsControl {
    pub mode_sel: i64,
    pub mode_sel_str: String,
    pub pwr_ref: i64,
}

/// Real-time EMS data. Units are the device's own (centi-Hz, decicelsius, W, Wh).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsData {
    pub timestamp_ms: i64,
    pub state: i64,
    pub state_str: String,
    pub info: i64,
    pub info_str: Vec<String>,
    pub warning: i64,
    pub warning_str: Vec<String>,
    pub alarm: i64,
    pub alarm_str: Vec<String>,
    pub phase_angle: i64,
    pub frequency: i64,
    pub phase_seq: i64,
    /// Positive = discharge, negative = charge
    pub power: i64,
    pub apparent_power: i64,
    pub reactive_power: i64,
    pub energy_produced: i64,
    pub energy_consumed: i64,
    pub sys_temp: i64,
    pub avail_cap: i64,
    pub freq_res_state: i64,
    pub soc_avg: i64,
}

/// Per-battery-module data, paired with [`BmsInfo`] by index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BmsData {
    pub energy_avail: i64,
    pub cycle_count: i64,
    pub soc: i64,
    pub state: i64,
    pub state_str: String,
    pub alarm: i64,
    pub alarm_str: Vec<String>,
    pub tmin: i64,
    pub tmax: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsPrediction {
    pub avail_ch_pwr: i64,
    pub avail_di_pwr: i64,
    pub avail_ch_energy: i64,
    pub avail_di_energy: i64,
    pub avail_inv_ch_pwr: i64,
    pub avail_inv_di_pwr: i64,
    pub avail_group_fuse_ch_pwr: i64,
    pub avail_group_fuse_di_pwr: i64,
}

/// Phase voltages in decivolts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseVoltages {
    pub l1: i64,
    pub l2: i64,
    pub l3: i64,
    pub l1_l2: i64,
    pub l2_l3: i64,
    pub l3_l1: i64,
}

/// Phase currents in deciamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseCurrents {
    pub l1: i64,
    pub l2: i64,
    pub l3: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmsAggregate {
    pub imported_kwh: f64,
    pub exported_kwh: f64,
}

/// One CT sensing slot (grid, solar, load) as reported in `/ems.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtSensor {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub node_id: u32,
    pub euid: String,
    pub interface: i64,
    pub available: bool,
    pub rssi: f64,
    pub average_rssi: f64,
    /// Packet delivery rate, percent
    pub pdr: f64,
    pub phase: Vec<PhaseMeasurement>,
    pub frequency: f64,
    pub total_power: i64,
    pub energy_imported: f64,
    pub energy_exported: f64,
    pub timestamp: i64,
    pub timestamp_str: String,
}

impl CtSensor {
    /// Whether this slot has a real clamp paired to it
    pub fn is_paired(&self) -> bool {
        !self.euid.is_empty() && self.euid != UNPAIRED_EUID
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseMeasurement {
    pub voltage: f64,
    pub amp: f64,
    pub power: f64,
    pub pf: f64,
}

// ============= /status.json =============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusResponse {
    pub up_time: i64,
    pub firmware: FirmwareInfo,
    pub wifi_status: WifiStatus,
    pub mqtt_status: MqttStatus,
    pub lte_status: LteStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareInfo {
    pub esp: String,
    pub efr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiStatus {
    pub wifi_mode: String,
    pub ip: String,
    pub ssid: String,
    pub rssi: i64,
    pub connected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttStatus {
    pub connected: bool,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LteStatus {
    pub operator_name: String,
    pub band: String,
    pub rssi_db: i64,
    pub pdp_active: bool,
}

// ============= /error_report.json =============

/// Single entry from `/error_report.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorReportEntry {
    pub sub_system_id: i64,
    pub sub_system_name: String,
    pub error_id: i64,
    pub error_name: String,
    /// "ok", "warning", "error" or "unknown"
    pub activated: String,
    pub message: String,
    pub details: Vec<String>,
}

// ============= /nodes.json and /node_metrics.json =============

/// A mesh node hosting one or more CT clamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeInfo {
    pub node_id: u32,
    pub eui: String,
    pub version: String,
    pub manifest_version: String,
    pub ota_distribute_status: String,
    pub available: bool,
}

impl NodeInfo {
    /// The node runs older firmware than the manifest it was offered
    pub fn firmware_update_available(&self) -> bool {
        !self.manifest_version.is_empty() && self.version != self.manifest_version
    }
}

/// Health metrics reported by one CT node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetrics {
    pub node_id: u32,
    /// Volts across the node's 2xAA pack
    pub battery_voltage: f64,
    /// Degrees Celsius
    pub temperature: f64,
    /// Seconds
    pub node_uptime: i64,
    pub usb_power: bool,
}

impl NodeMetrics {
    const BATTERY_EMPTY_V: f64 = 1.8;
    const BATTERY_FULL_V: f64 = 3.0;

    /// Battery level in percent, linear between 1.8 V (empty) and 3.0 V (full)
    pub fn battery_level(&self) -> f64 {
        let span = Self::BATTERY_FULL_V - Self::BATTERY_EMPTY_V;
        let level = (self.battery_voltage - Self::BATTERY_EMPTY_V) / span * 100.0;
        (level.clamp(0.0, 100.0) * 10.0).round() / 10.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ems_response_tolerates_unknown_and_missing_fields() {
        let body = json!({
            "$type": "ems_data",
            "ts": 1700000000,
            "firmware_channel": "beta",
            "ems": [{"ecu_id": 9731, "ecu_host": "hv-1", "new_section": {"x": 1}}],
            "aggregated": {
                "ems_data": {"power": -1200, "soc_avg": 57, "alarm_str": ["BMS_OVER_VOLTAGE"]},
                "bms_info": [{"serial_number": "SN-A"}, {"serial_number": ""}],
                "bms_data": [{"soc": 56}, {"soc": 58, "tmax": 231}]
            },
            "sensors": [{"type": "grid", "euid": "a1b2", "node_id": 2, "phase": [{"power": 10.5}]}]
        });

        let parsed: EmsResponse = serde_json::from_value(body).unwrap();

        assert_eq!(parsed.response_type, "ems_data");
        assert_eq!(parsed.ecu_id(), Some(9731));
        assert_eq!(parsed.aggregated.ems_data.power, -1200);
        assert_eq!(parsed.aggregated.ems_data.alarm_str, vec!["BMS_OVER_VOLTAGE"]);
        assert_eq!(parsed.aggregated.bms_data[1].tmax, 231);
        assert_eq!(parsed.aggregated.ems_voltage, PhaseVoltages::default());
        assert_eq!(parsed.sensors[0].sensor_type, "grid");
        assert!((parsed.sensors[0].phase[0].power - 10.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unpaired_sensor_slots() {
        let paired = CtSensor {
            euid: "a1b2c3".to_owned(),
            ..Default::default()
        };
        let placeholder = CtSensor {
            euid: UNPAIRED_EUID.to_owned(),
            ..Default::default()
        };

        assert!(paired.is_paired());
        assert!(!placeholder.is_paired());
        assert!(!CtSensor::default().is_paired());
    }

    #[test]
    fn test_node_battery_level_is_clamped() {
        let level = |v: f64| {
            NodeMetrics {
                battery_voltage: v,
                ..Default::default()
            }
            .battery_level()
        };

        assert!((level(2.73) - 77.5).abs() < 1e-9);
        assert!((level(3.4) - 100.0).abs() < f64::EPSILON);
        assert!(level(1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_node_firmware_update_available() {
        let node = NodeInfo {
            version: "1.2.0".to_owned(),
            manifest_version: "1.3.0".to_owned(),
            ..Default::default()
        };
        assert!(node.firmware_update_available());

        let current = NodeInfo {
            version: "1.3.0".to_owned(),
            manifest_version: "1.3.0".to_owned(),
            ..Default::default()
        };
        assert!(!current.firmware_update_available());
    }
}
