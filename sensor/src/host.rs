use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use greenhouse_common::{
    telegram::{self, SendMessage},
    thingspeak, Clock, CycleReport, DurableStore, InboundMessage, Indicator, Network, Node,
    NodeConfig, NodeIo, Notifier, Power, Reading, Sensor, StoreError, Telemetry, TransportError,
    WakeReason,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Simulated greenhouse day, one sample per wake.
const TEMPERATURE_PROFILE: [u8; 12] = [21, 23, 26, 29, 31, 33, 30, 26, 22, 17, 12, 9];
const HUMIDITY_PROFILE: [u8; 6] = [42, 45, 50, 55, 52, 47];

#[derive(Debug, Clone)]
struct HostSettings {
    data_dir: PathBuf,
    sleep_override: Option<Duration>,
    notify_api: String,
    telemetry_api: String,
    max_cycles: Option<u64>,
}

impl HostSettings {
    fn from_env() -> Self {
        Self {
            data_dir: std::env::var("GREENHOUSE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./.greenhouse")),
            sleep_override: env_parse::<u64>("GREENHOUSE_SLEEP_SECS").map(Duration::from_secs),
            notify_api: std::env::var("GREENHOUSE_NOTIFY_API")
                .unwrap_or_else(|_| telegram::DEFAULT_API_BASE.to_string()),
            telemetry_api: std::env::var("GREENHOUSE_TELEMETRY_API")
                .unwrap_or_else(|_| thingspeak::DEFAULT_API_BASE.to_string()),
            max_cycles: env_parse::<u64>("GREENHOUSE_CYCLES"),
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = HostSettings::from_env();
    info!(
        "sensor node simulator started, data dir {}",
        settings.data_dir.display()
    );

    let mut wake_reason = WakeReason::ColdBoot;
    let mut cycle: u64 = 0;

    loop {
        cycle = cycle.saturating_add(1);

        // Each wake is a fresh boot: nothing but the store carries over.
        let cycle_settings = settings.clone();
        let (report, armed) = tokio::task::spawn_blocking(move || {
            run_wake(&cycle_settings, wake_reason, cycle)
        })
        .await
        .context("wake cycle task failed")??;

        info!(
            "cycle {cycle}: {} {}°C {}%, message sent: {}, telemetry: {:?}, commands: {}, persisted: {}",
            report.classification.as_str(),
            report.reading.temperature,
            report.reading.humidity,
            report.message_sent,
            report.telemetry_status,
            report.commands_handled,
            report.state_persisted,
        );

        if settings.max_cycles.is_some_and(|max| cycle >= max) {
            info!("reached {cycle} cycles, stopping");
            return Ok(());
        }

        let sleep = settings.sleep_override.unwrap_or(armed);
        info!("sleeping for {}s", sleep.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }

        wake_reason = WakeReason::Timer;
    }
}

fn run_wake(
    settings: &HostSettings,
    wake_reason: WakeReason,
    cycle: u64,
) -> anyhow::Result<(CycleReport, Duration)> {
    let mut store = FileStore::new(&settings.data_dir);
    let mut node = Node::boot(&mut store);

    let client = Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build http client")?;

    let mut sensor = SimulatedSensor { tick: cycle };
    let mut network = HostNetwork;
    let mut notifier = TelegramNotifier::new(client.clone(), &settings.notify_api, &node.config);
    let mut telemetry = ThingSpeakTelemetry::new(client, &settings.telemetry_api);
    let mut indicator = LogIndicator;
    let mut power = HostPower {
        reason: wake_reason,
        armed: None,
    };

    let report = node.wake_cycle(&mut NodeIo {
        store: &mut store,
        sensor: &mut sensor,
        network: &mut network,
        notifier: &mut notifier,
        telemetry: &mut telemetry,
        indicator: &mut indicator,
        power: &mut power,
        clock: &SystemClock,
    });

    let armed = power.armed.unwrap_or_else(|| node.sleep_interval());
    Ok((report, armed))
}

/// Records as files under one directory; names may contain `/` subdirectories.
struct FileStore {
    root: PathBuf,
}

impl FileStore {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn path(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(StoreError::Backend(format!("invalid record name `{name}`")));
        }
        Ok(self.root.join(relative))
    }

    fn ensure_parent(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.path(name)?) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path(name)?;
        Self::ensure_parent(&path)?;

        // A torn write must leave the previous record readable.
        let staging = path.with_extension("tmp");
        std::fs::write(&staging, bytes)?;
        std::fs::rename(&staging, &path)?;
        Ok(())
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path(name)?;
        Self::ensure_parent(&path)?;

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(bytes)?;
        Ok(())
    }
}

struct SimulatedSensor {
    tick: u64,
}

impl Sensor for SimulatedSensor {
    fn read(&mut self) -> Reading {
        // Hardware integration point: the esp32 back end reads a DHT11 here.
        let temperature = TEMPERATURE_PROFILE[(self.tick % 12) as usize];
        let humidity = HUMIDITY_PROFILE[(self.tick % 6) as usize];
        self.tick = self.tick.wrapping_add(1);
        Reading::new(temperature, humidity)
    }
}

/// The host OS owns the network; there is nothing to bring up.
struct HostNetwork;

impl Network for HostNetwork {
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    fn new(client: Client, api_base: &str, config: &NodeConfig) -> Self {
        Self {
            client,
            api_base: api_base.to_string(),
            token: config.notify_token.clone(),
            chat_id: config.notify_channel.clone(),
        }
    }

    fn ensure_configured(&self) -> Result<(), TransportError> {
        if self.token.is_empty() || self.chat_id.is_empty() {
            return Err(TransportError::Rejected(
                "notifyToken/notifyChannel not configured".to_string(),
            ));
        }
        Ok(())
    }

    fn get(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        let response = self.client.get(url).send().map_err(request_error)?;
        Ok(response.bytes().map_err(request_error)?.to_vec())
    }
}

impl Notifier for TelegramNotifier {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.ensure_configured()?;

        let response = self
            .client
            .post(telegram::send_message_url(&self.api_base, &self.token))
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .map_err(request_error)?;
        let body = response.bytes().map_err(request_error)?;
        telegram::check_send_response(&body)
    }

    fn poll_inbound(&mut self) -> Result<Vec<InboundMessage>, TransportError> {
        self.ensure_configured()?;

        let body = self.get(&telegram::get_updates_url(&self.api_base, &self.token, None))?;
        let batch = telegram::parse_updates(&body)?;

        if let Some(offset) = batch.next_offset {
            let ack = telegram::acknowledge_url(&self.api_base, &self.token, offset);
            if let Err(err) = self.get(&ack) {
                warn!("failed to acknowledge telegram updates up to {offset}: {err}");
            }
        }

        Ok(batch.messages)
    }
}

struct ThingSpeakTelemetry {
    client: Client,
    api_base: String,
}

impl ThingSpeakTelemetry {
    fn new(client: Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.to_string(),
        }
    }
}

impl Telemetry for ThingSpeakTelemetry {
    fn publish(
        &mut self,
        channel_id: &str,
        key: &str,
        field1: i32,
        field2: i32,
    ) -> Result<u16, TransportError> {
        let response = self
            .client
            .get(thingspeak::update_url(&self.api_base, key, field1, field2))
            .send()
            .map_err(request_error)?;
        let status = response.status().as_u16();
        let body = response.text().unwrap_or_default();

        match thingspeak::entry_id(&body) {
            Some(entry) => debug!("channel {channel_id} accepted entry {entry}"),
            None if status == 200 => warn!("channel {channel_id} dropped the update"),
            None => {}
        }
        Ok(status)
    }
}

struct LogIndicator;

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        debug!("indicator {}", if on { "on" } else { "off" });
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}

struct HostPower {
    reason: WakeReason,
    armed: Option<Duration>,
}

impl Power for HostPower {
    fn wake_reason(&self) -> WakeReason {
        self.reason
    }

    fn arm_wake(&mut self, after: Duration) {
        self.armed = Some(after);
    }
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        Some(Utc::now())
    }
}

fn request_error(err: reqwest::Error) -> TransportError {
    TransportError::Request(err.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<T>().ok())
}
