pub mod alarm;
pub mod commands;
pub mod config;
pub mod cycle;
pub mod hysteresis;
pub mod journal;
pub mod notify;
pub mod record;
pub mod store;
pub mod telegram;
pub mod thingspeak;
pub mod types;

pub use alarm::classify;
pub use commands::OperatorCommand;
pub use config::NodeConfig;
pub use cycle::{
    BlinkPattern, Clock, CycleReport, Indicator, Network, Node, NodeIo, Notifier, Power, Sensor,
    Telemetry, TransportError, UnavailableNetwork, UnavailableSensor,
};
pub use hysteresis::HysteresisState;
pub use notify::{decide, Decision, Message};
pub use store::{DurableStore, MemoryStore, StoreError};
pub use types::{Classification, InboundMessage, Reading, Thresholds, WakeReason};
