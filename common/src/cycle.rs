//! One wake cycle of the sensor node and the collaborators it drives.
//!
//! Deep sleep wipes memory, so a cycle starts from [`Node::boot`] (records
//! loaded from the store) and ends by arming the next wake. Arming happens on
//! every path: a failed send, publish or save only costs this interval's data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;

use crate::{
    commands::{
        help_text, intro_text, unknown_command_text, OperatorCommand, MUTE_COLD_TEXT,
        MUTE_HOT_TEXT,
    },
    config::NodeConfig,
    hysteresis::HysteresisState,
    journal,
    notify::{decide, Message, ONLINE_TEXT},
    store::{bootstrap_record, load_record, save_record, DurableStore, Loaded},
    types::{Classification, InboundMessage, Reading, WakeReason},
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network is not connected")]
    Offline,
    #[error("request failed: {0}")]
    Request(String),
    #[error("remote rejected request: {0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

pub trait Sensor {
    /// Returns [`Reading::FAULT`] when no sample could be taken.
    fn read(&mut self) -> Reading;
}

pub trait Network {
    fn connect(&mut self) -> Result<(), TransportError>;
}

pub trait Notifier {
    fn send(&mut self, text: &str) -> Result<(), TransportError>;

    /// Drains everything received since the last poll.
    fn poll_inbound(&mut self) -> Result<Vec<InboundMessage>, TransportError>;
}

pub trait Telemetry {
    /// Returns the HTTP-style status of the upload.
    fn publish(
        &mut self,
        channel_id: &str,
        key: &str,
        field1: i32,
        field2: i32,
    ) -> Result<u16, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub on_ms: u32,
    pub off_ms: u32,
    pub count: u8,
}

impl BlinkPattern {
    pub const HEARTBEAT: Self = Self {
        on_ms: 50,
        off_ms: 0,
        count: 1,
    };
    pub const ALERT: Self = Self {
        on_ms: 200,
        off_ms: 200,
        count: 3,
    };
}

pub trait Indicator {
    fn set(&mut self, on: bool);

    fn delay_ms(&mut self, ms: u32);

    fn blink(&mut self, pattern: BlinkPattern) {
        for _ in 0..pattern.count {
            self.set(true);
            self.delay_ms(pattern.on_ms);
            self.set(false);
            if pattern.off_ms > 0 {
                self.delay_ms(pattern.off_ms);
            }
        }
    }
}

pub trait Power {
    fn wake_reason(&self) -> WakeReason;

    /// Sets the single timer source that ends the coming sleep.
    fn arm_wake(&mut self, after: Duration);
}

pub trait Clock {
    /// `None` until wall-clock time is known.
    fn now(&self) -> Option<DateTime<Utc>>;
}

/// Stands in for a sensor whose driver could not be brought up.
#[derive(Debug, Default)]
pub struct UnavailableSensor;

impl Sensor for UnavailableSensor {
    fn read(&mut self) -> Reading {
        Reading::FAULT
    }
}

/// Stands in for a radio that failed to initialise; every cycle runs offline.
#[derive(Debug, Default)]
pub struct UnavailableNetwork;

impl Network for UnavailableNetwork {
    fn connect(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Offline)
    }
}

/// Collaborators for one wake cycle.
pub struct NodeIo<'a> {
    pub store: &'a mut dyn DurableStore,
    pub sensor: &'a mut dyn Sensor,
    pub network: &'a mut dyn Network,
    pub notifier: &'a mut dyn Notifier,
    pub telemetry: &'a mut dyn Telemetry,
    pub indicator: &'a mut dyn Indicator,
    pub power: &'a mut dyn Power,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub wake_reason: WakeReason,
    pub online: bool,
    pub reading: Reading,
    pub classification: Classification,
    pub message: Option<Message>,
    pub message_sent: bool,
    pub telemetry_status: Option<u16>,
    pub commands_handled: usize,
    pub state_persisted: bool,
    pub sleep: Duration,
}

/// The in-memory copy of everything that crosses a sleep.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub config: NodeConfig,
    pub state: HysteresisState,
}

impl Node {
    /// Loads config and state, falling back to defaults on any storage error.
    /// A missing config record is written back once; an existing one never is.
    pub fn boot(store: &mut dyn DurableStore) -> Self {
        let mut config = match load_record::<NodeConfig>(store) {
            Ok(loaded) => {
                log_defaults("config", &loaded);
                match bootstrap_record(store, &loaded) {
                    Ok(true) => info!("wrote default config record"),
                    Ok(false) => {}
                    Err(err) => warn!("failed to write default config record: {err}"),
                }
                loaded.into_value()
            }
            Err(err) => {
                warn!("failed to load config, using defaults: {err}");
                NodeConfig::default()
            }
        };
        config.sanitize();

        let state = match load_record::<HysteresisState>(store) {
            Ok(loaded) => {
                log_defaults("state", &loaded);
                loaded.into_value()
            }
            Err(err) => {
                warn!("failed to load hysteresis state, using defaults: {err}");
                HysteresisState::default()
            }
        };

        Self { config, state }
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.config.sleep_interval_secs)
    }

    pub fn wake_cycle(&mut self, io: &mut NodeIo<'_>) -> CycleReport {
        io.indicator.blink(BlinkPattern::HEARTBEAT);
        let wake_reason = io.power.wake_reason();

        let online = match io.network.connect() {
            Ok(()) => true,
            Err(err) => {
                warn!("network unavailable, running cycle offline: {err}");
                false
            }
        };

        if online && wake_reason == WakeReason::ColdBoot {
            send(io, ONLINE_TEXT);
        }

        let reading = io.sensor.read();
        let decision = decide(reading, self.config.thresholds(), self.state, false);
        self.state = decision.state;
        info!(
            "reading {}°C {}% classified {}",
            reading.temperature,
            reading.humidity,
            decision.classification.as_str()
        );

        let mut message_sent = false;
        if let Some(message) = decision.message {
            if message.is_alert() {
                io.indicator.blink(BlinkPattern::ALERT);
            }
            if online {
                message_sent = send(io, &message.text());
            }
        }

        let telemetry_status = if online {
            self.publish(io, reading)
        } else {
            None
        };

        self.journal(io, reading);
        let state_persisted = self.persist(io);

        let commands_handled = if online { self.drain_commands(io) } else { 0 };

        let sleep = self.sleep_interval();
        io.power.arm_wake(sleep);
        info!("next wake armed in {}s", sleep.as_secs());

        CycleReport {
            wake_reason,
            online,
            reading,
            classification: decision.classification,
            message: decision.message,
            message_sent,
            telemetry_status,
            commands_handled,
            state_persisted,
            sleep,
        }
    }

    /// Applies one operator command. State changes are saved before returning.
    pub fn handle_command(&mut self, io: &mut NodeIo<'_>, inbound: &InboundMessage) -> bool {
        if self.config.notify_channel.is_empty() || inbound.sender_id != self.config.notify_channel
        {
            warn!("ignoring command from unknown sender {}", inbound.sender_id);
            return false;
        }

        let Some(command) = OperatorCommand::parse(&inbound.text) else {
            send(io, &unknown_command_text(&inbound.text));
            return true;
        };
        info!("operator command: {}", command.as_str());

        match command {
            OperatorCommand::Start => {
                send(io, &intro_text(self.config.thresholds()));
            }
            OperatorCommand::MuteCold => {
                self.state = self.state.set_mute_cold(true);
                self.persist(io);
                send(io, MUTE_COLD_TEXT);
            }
            OperatorCommand::MuteHot => {
                self.state = self.state.set_mute_hot(true);
                self.persist(io);
                send(io, MUTE_HOT_TEXT);
            }
            OperatorCommand::Status => {
                let reading = io.sensor.read();
                let decision = decide(reading, self.config.thresholds(), self.state, true);
                self.state = decision.state;
                self.persist(io);
                if let Some(message) = decision.message {
                    send(io, &message.text());
                }
            }
            OperatorCommand::Help => {
                send(io, &help_text());
            }
        }

        true
    }

    fn drain_commands(&mut self, io: &mut NodeIo<'_>) -> usize {
        let inbound = match io.notifier.poll_inbound() {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!("failed to poll operator commands: {err}");
                return 0;
            }
        };

        inbound
            .iter()
            .filter(|message| self.handle_command(io, message))
            .count()
    }

    fn publish(&self, io: &mut NodeIo<'_>, reading: Reading) -> Option<u16> {
        if reading.is_fault() || !self.config.has_telemetry() {
            return None;
        }

        match io.telemetry.publish(
            &self.config.telemetry_channel_id,
            &self.config.telemetry_key,
            i32::from(reading.temperature),
            i32::from(reading.humidity),
        ) {
            Ok(200) => Some(200),
            Ok(status) => {
                warn!("telemetry publish returned HTTP {status}, dropping sample");
                Some(status)
            }
            Err(err) => {
                warn!("telemetry publish failed: {err}");
                None
            }
        }
    }

    fn journal(&self, io: &mut NodeIo<'_>, reading: Reading) {
        let Some(now) = io.clock.now() else {
            warn!("wall clock not set, skipping journal entry");
            return;
        };

        if let Err(err) = journal::append_reading(io.store, now, &self.config.timezone, reading) {
            warn!("failed to append reading journal: {err}");
        }
    }

    fn persist(&self, io: &mut NodeIo<'_>) -> bool {
        match save_record(io.store, &self.state) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to persist hysteresis state: {err}");
                false
            }
        }
    }
}

fn send(io: &mut NodeIo<'_>, text: &str) -> bool {
    match io.notifier.send(text) {
        Ok(()) => true,
        Err(err) => {
            warn!("notification send failed: {err}");
            false
        }
    }
}

fn log_defaults<T>(what: &str, loaded: &Loaded<T>) {
    match loaded {
        Loaded::Absent(_) => info!("no {what} record, using defaults"),
        Loaded::Stored(decoded) if decoded.malformed => {
            warn!("{what} record is malformed, using defaults")
        }
        Loaded::Stored(decoded) if !decoded.defaulted.is_empty() => {
            warn!("{what} record defaulted fields: {}", decoded.defaulted.join(", "))
        }
        Loaded::Stored(_) => {}
    }
}
