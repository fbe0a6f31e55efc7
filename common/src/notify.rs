use crate::{
    alarm::classify,
    hysteresis::HysteresisState,
    types::{Classification, Reading, Thresholds},
};

pub const ONLINE_TEXT: &str = "Greenhouse sensor is online.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Sensor returned the sentinel, usually a flat battery.
    SensorFault,
    TooCold(Reading),
    TooHot(Reading),
    Status(Reading),
}

impl Message {
    pub fn text(&self) -> String {
        match self {
            Self::SensorFault => {
                "Sensor fault: no reading could be taken. Check the battery and wiring.".to_string()
            }
            Self::TooCold(reading) => format!("Too cold! {}", reading_line(*reading)),
            Self::TooHot(reading) => format!("Too hot! {}", reading_line(*reading)),
            Self::Status(reading) => reading_line(*reading),
        }
    }

    /// Alarm-class messages get the alert blink pattern.
    pub fn is_alert(&self) -> bool {
        !matches!(self, Self::Status(_))
    }
}

pub fn reading_line(reading: Reading) -> String {
    format!(
        "Temperature: {}°C, humidity: {}%",
        reading.temperature, reading.humidity
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub classification: Classification,
    pub message: Option<Message>,
    pub state: HysteresisState,
}

/// Decides what, if anything, to tell the operator about `reading`.
///
/// Faults bypass mutes and leave the state untouched. For everything else the
/// auto-unmute runs against `state` as it stood before this reading, so one
/// call can both clear a mute and alert on the same reading. `force_send`
/// turns a silent outcome into a plain status message.
pub fn decide(
    reading: Reading,
    thresholds: Thresholds,
    state: HysteresisState,
    force_send: bool,
) -> Decision {
    let classification = classify(reading, thresholds);

    if classification == Classification::Fault {
        return Decision {
            classification,
            message: Some(Message::SensorFault),
            state,
        };
    }

    let state = state.apply_reading(reading, thresholds);

    let message = match classification {
        Classification::TooCold if !state.mute_cold => Some(Message::TooCold(reading)),
        Classification::TooHot if !state.mute_hot => Some(Message::TooHot(reading)),
        _ if force_send => Some(Message::Status(reading)),
        _ => None,
    };

    Decision {
        classification,
        message,
        state,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const THRESHOLDS: Thresholds = Thresholds {
        min_temperature: 20,
        max_temperature: 30,
    };

    fn state(prev_temperature: i32) -> HysteresisState {
        HysteresisState {
            prev_temperature,
            ..HysteresisState::default()
        }
    }

    #[test]
    fn fault_ignores_mutes_and_keeps_state() {
        let muted = state(25).set_mute_cold(true).set_mute_hot(true);

        for force_send in [false, true] {
            let decision = decide(Reading::FAULT, THRESHOLDS, muted, force_send);

            assert_eq!(decision.classification, Classification::Fault);
            assert_eq!(decision.message, Some(Message::SensorFault));
            assert_eq!(decision.state, muted);
        }
    }

    #[test]
    fn hysteresis_round_trip() {
        let reading = |t| Reading::new(t, 50);

        let first = decide(reading(18), THRESHOLDS, state(25), false);
        assert_eq!(first.message, Some(Message::TooCold(reading(18))));
        assert_eq!(first.state.prev_temperature, 18);

        let muted = first.state.set_mute_cold(true);
        let second = decide(reading(15), THRESHOLDS, muted, false);
        assert_eq!(second.message, None);
        assert!(second.state.mute_cold);

        let third = decide(reading(22), THRESHOLDS, second.state, false);
        assert_eq!(third.message, None);
        assert!(third.state.mute_cold);
        assert_eq!(third.state.prev_temperature, 22);

        let fourth = decide(reading(18), THRESHOLDS, third.state, false);
        assert!(!fourth.state.mute_cold);
        assert_eq!(fourth.message, Some(Message::TooCold(reading(18))));
    }

    #[test]
    fn hot_mute_suppresses_until_re_entry() {
        let muted = state(33).set_mute_hot(true);

        let still_hot = decide(Reading::new(35, 40), THRESHOLDS, muted, false);
        assert_eq!(still_hot.message, None);

        let cooled = decide(Reading::new(28, 40), THRESHOLDS, still_hot.state, false);
        assert_eq!(cooled.message, None);
        assert!(cooled.state.mute_hot);

        let hot_again = decide(Reading::new(31, 40), THRESHOLDS, cooled.state, false);
        assert_eq!(hot_again.message, Some(Message::TooHot(Reading::new(31, 40))));
        assert!(!hot_again.state.mute_hot);
    }

    #[test]
    fn forced_status_replaces_muted_hot_alarm() {
        let muted = state(35).set_mute_hot(true);
        let reading = Reading::new(36, 40);

        let decision = decide(reading, THRESHOLDS, muted, true);

        assert_eq!(decision.message, Some(Message::Status(reading)));
        assert!(decision.state.mute_hot);
    }

    #[test]
    fn forced_status_on_normal_reading() {
        let reading = Reading::new(24, 55);

        assert_eq!(decide(reading, THRESHOLDS, state(24), false).message, None);
        assert_eq!(
            decide(reading, THRESHOLDS, state(24), true).message,
            Some(Message::Status(reading))
        );
    }

    #[test]
    fn unmuted_alarm_wins_over_force_send() {
        let reading = Reading::new(10, 55);

        let decision = decide(reading, THRESHOLDS, state(24), true);

        assert_eq!(decision.message, Some(Message::TooCold(reading)));
    }

    #[test]
    fn decide_is_idempotent() {
        let start = state(25).set_mute_hot(true);
        for temperature in [5, 20, 25, 31, 200] {
            let reading = Reading::new(temperature, 50);
            for force_send in [false, true] {
                let a = decide(reading, THRESHOLDS, start, force_send);
                let b = decide(reading, THRESHOLDS, start, force_send);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn message_text_embeds_reading() {
        assert_eq!(
            Message::TooCold(Reading::new(12, 80)).text(),
            "Too cold! Temperature: 12°C, humidity: 80%"
        );
        assert_eq!(
            Message::Status(Reading::new(22, 45)).text(),
            "Temperature: 22°C, humidity: 45%"
        );
        assert!(Message::SensorFault.is_alert());
        assert!(!Message::Status(Reading::new(22, 45)).is_alert());
    }
}
