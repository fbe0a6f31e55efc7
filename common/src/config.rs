use serde::Serialize;

use crate::{
    record::{FieldReader, Record},
    types::Thresholds,
};

pub const MIN_SLEEP_INTERVAL_SECS: u64 = 60;
pub const MAX_SLEEP_INTERVAL_SECS: u64 = 86_400;

/// Operator-controlled parameters, persisted as one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub notify_token: String,
    pub notify_channel: String,
    pub min_temperature: i32,
    pub max_temperature: i32,
    pub telemetry_channel_id: String,
    pub telemetry_key: String,
    pub sleep_interval_secs: u64,
    pub timezone: String,
    pub wifi_ssid: String,
    pub wifi_pass: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            notify_token: String::new(),
            notify_channel: String::new(),
            min_temperature: 10,
            max_temperature: 30,
            telemetry_channel_id: String::new(),
            telemetry_key: String::new(),
            sleep_interval_secs: 900,
            timezone: "Europe/Moscow".to_string(),
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
        }
    }
}

impl Record for NodeConfig {
    const NAME: &'static str = "config.json";

    fn from_fields(fields: &mut FieldReader) -> Self {
        let defaults = Self::default();
        Self {
            notify_token: fields.take("notifyToken", defaults.notify_token),
            notify_channel: fields.take("notifyChannel", defaults.notify_channel),
            min_temperature: fields.take("minTemperature", defaults.min_temperature),
            max_temperature: fields.take("maxTemperature", defaults.max_temperature),
            telemetry_channel_id: fields.take("telemetryChannelId", defaults.telemetry_channel_id),
            telemetry_key: fields.take("telemetryKey", defaults.telemetry_key),
            sleep_interval_secs: fields.take("sleepIntervalSecs", defaults.sleep_interval_secs),
            timezone: fields.take("timezone", defaults.timezone),
            wifi_ssid: fields.take("wifiSsid", defaults.wifi_ssid),
            wifi_pass: fields.take("wifiPass", defaults.wifi_pass),
        }
    }
}

impl NodeConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            min_temperature: self.min_temperature,
            max_temperature: self.max_temperature,
        }
    }

    /// Inverted thresholds are left alone; only the sleep interval is bounded.
    pub fn sanitize(&mut self) {
        self.sleep_interval_secs = self
            .sleep_interval_secs
            .clamp(MIN_SLEEP_INTERVAL_SECS, MAX_SLEEP_INTERVAL_SECS);
    }

    pub fn has_telemetry(&self) -> bool {
        !self.telemetry_key.is_empty()
    }
}
