/// Value both fields carry when the sensor could not produce a sample.
pub const FAULT_SENTINEL: u8 = 255;

/// One sensor sample, taken once per wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    pub temperature: u8,
    pub humidity: u8,
}

impl Reading {
    pub const FAULT: Self = Self {
        temperature: FAULT_SENTINEL,
        humidity: FAULT_SENTINEL,
    };

    pub fn new(temperature: u8, humidity: u8) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// Only the pair (255, 255) encodes a fault; a lone 255 is an extreme but valid value.
    pub fn is_fault(self) -> bool {
        self.temperature == FAULT_SENTINEL && self.humidity == FAULT_SENTINEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub min_temperature: i32,
    pub max_temperature: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    TooCold,
    TooHot,
    Normal,
    Fault,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TooCold => "TOO_COLD",
            Self::TooHot => "TOO_HOT",
            Self::Normal => "NORMAL",
            Self::Fault => "FAULT",
        }
    }
}

/// Hardware cause of the current boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    ColdBoot,
    Timer,
}

/// One command received on the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
}
