use serde::Serialize;

use crate::{
    record::{FieldReader, Record},
    types::{Reading, Thresholds},
};

pub const DEFAULT_PREV_TEMPERATURE: i32 = 22;
pub const DEFAULT_PREV_HUMIDITY: i32 = 50;

/// Alarm suppression that has to survive deep sleep.
///
/// A mute covers one excursion: it is cleared when the temperature comes back
/// out of the band and then re-enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HysteresisState {
    pub mute_cold: bool,
    pub mute_hot: bool,
    pub prev_temperature: i32,
    pub prev_humidity: i32,
}

impl Default for HysteresisState {
    fn default() -> Self {
        Self {
            mute_cold: false,
            mute_hot: false,
            prev_temperature: DEFAULT_PREV_TEMPERATURE,
            prev_humidity: DEFAULT_PREV_HUMIDITY,
        }
    }
}

impl Record for HysteresisState {
    const NAME: &'static str = "state.json";

    fn from_fields(fields: &mut FieldReader) -> Self {
        let defaults = Self::default();
        Self {
            mute_cold: fields.take("muteCold", defaults.mute_cold),
            mute_hot: fields.take("muteHot", defaults.mute_hot),
            prev_temperature: fields.take("prevTemperature", defaults.prev_temperature),
            prev_humidity: fields.take("prevHumidity", defaults.prev_humidity),
        }
    }
}

impl HysteresisState {
    /// The reading just dropped into the cold band from normal or hot.
    pub fn should_auto_unmute_cold(&self, reading: Reading, thresholds: Thresholds) -> bool {
        i32::from(reading.temperature) < thresholds.min_temperature
            && self.prev_temperature >= thresholds.min_temperature
    }

    /// The reading just rose into the hot band from normal or cold.
    pub fn should_auto_unmute_hot(&self, reading: Reading, thresholds: Thresholds) -> bool {
        i32::from(reading.temperature) > thresholds.max_temperature
            && self.prev_temperature <= thresholds.max_temperature
    }

    /// Both checks read `self` as it stood at the start of the cycle.
    pub fn apply_reading(self, reading: Reading, thresholds: Thresholds) -> Self {
        let unmute_cold = self.should_auto_unmute_cold(reading, thresholds);
        let unmute_hot = self.should_auto_unmute_hot(reading, thresholds);

        Self {
            mute_cold: self.mute_cold && !unmute_cold,
            mute_hot: self.mute_hot && !unmute_hot,
            prev_temperature: i32::from(reading.temperature),
            prev_humidity: i32::from(reading.humidity),
        }
    }

    pub fn set_mute_cold(self, value: bool) -> Self {
        Self {
            mute_cold: value,
            ..self
        }
    }

    pub fn set_mute_hot(self, value: bool) -> Self {
        Self {
            mute_hot: value,
            ..self
        }
    }
}
