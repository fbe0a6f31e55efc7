use crate::types::{Classification, Reading, Thresholds};

/// Ordered rules: fault, then cold, then hot. Mute state never enters here.
pub fn classify(reading: Reading, thresholds: Thresholds) -> Classification {
    if reading.is_fault() {
        return Classification::Fault;
    }

    let temperature = i32::from(reading.temperature);
    if temperature < thresholds.min_temperature {
        Classification::TooCold
    } else if temperature > thresholds.max_temperature {
        Classification::TooHot
    } else {
        Classification::Normal
    }
}
