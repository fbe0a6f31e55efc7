use std::{thread, time::Duration};

use anyhow::anyhow;
use chrono::{DateTime, Datelike, Utc};
use dht_sensor::dht11;
use embedded_svc::{
    http::{client::Client as HttpClient, Method, Status},
    io::{Read, Write},
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::{Ets, FreeRtos},
    gpio::{AnyIOPin, AnyOutputPin, IOPin, InputOutput, Output, OutputPin, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    http::client::{Configuration as HttpClientConfiguration, EspHttpConnection},
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault},
    sntp::{EspSntp, SyncStatus},
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};

use greenhouse_common::{
    journal::JOURNAL_DIR,
    telegram::{self, SendMessage},
    thingspeak, Clock, DurableStore, InboundMessage, Indicator, MemoryStore, Network, Node,
    NodeConfig, NodeIo, Notifier, Power, Reading, Sensor, StoreError, Telemetry, TransportError,
    UnavailableNetwork, UnavailableSensor, WakeReason,
};

const NVS_NAMESPACE: &str = "greenhouse";
const NVS_JOURNAL_KEY: &str = "journal";
const NVS_MAX_KEY_LEN: usize = 15;
/// Flash only keeps the newest part of the reading journal.
const NVS_JOURNAL_MAX_BYTES: usize = 4096;

const DHT11_PIN: i32 = 16;
const DHT11_ATTEMPTS: u32 = 3;
const DHT11_RETRY_DELAY_MS: u32 = 1_200;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HTTP_BODY: usize = 8192;

const WIFI_CONNECT_ATTEMPTS: u32 = 3;
const WIFI_RETRY_DELAY_MS: u64 = 2_000;
const SNTP_WAIT_MS: u64 = 10_000;

/// Used only when the system peripherals could not be taken.
const FALLBACK_SLEEP: Duration = Duration::from_secs(900);

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let wake_reason = hardware_wake_reason();
    info!("boot after {wake_reason:?}");

    if let Err(err) = wake(wake_reason) {
        warn!("wake cycle aborted: {err:#}");
        arm_timer(FALLBACK_SLEEP);
    }

    info!("entering deep sleep");
    unsafe { esp_idf_svc::sys::esp_deep_sleep_start() }
}

fn wake(wake_reason: WakeReason) -> anyhow::Result<()> {
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;

    let mut store: Box<dyn DurableStore> = match NvsStore::open(nvs_partition.clone()) {
        Ok(store) => Box::new(store),
        Err(err) => {
            warn!("NVS unavailable, state will not survive sleep: {err:#}");
            Box::new(MemoryStore::new())
        }
    };

    let mut node = Node::boot(store.as_mut());
    ensure_wifi_defaults(&mut node.config);

    let Peripherals { modem, pins, .. } = Peripherals::take()?;

    let mut sensor: Box<dyn Sensor> = match Dht11Sensor::new(pins.gpio16.downgrade()) {
        Ok(sensor) => Box::new(sensor),
        Err(err) => {
            warn!("failed to initialize DHT11, reporting sensor fault: {err:#}");
            Box::new(UnavailableSensor)
        }
    };
    let mut indicator: Box<dyn Indicator> = match LedIndicator::new(pins.gpio2.downgrade_output())
    {
        Ok(indicator) => Box::new(indicator),
        Err(err) => {
            warn!("failed to initialize LED: {err:#}");
            Box::new(DarkIndicator)
        }
    };
    let mut network: Box<dyn Network> =
        match WifiNetwork::new(modem, sys_loop, nvs_partition, &node.config) {
            Ok(network) => Box::new(network),
            Err(err) => {
                warn!("failed to initialize wifi, running offline: {err:#}");
                Box::new(UnavailableNetwork)
            }
        };
    let mut notifier = TelegramNotifier::new(&node.config);
    let mut telemetry = ThingSpeakTelemetry;
    let mut power = DeepSleepPower {
        reason: wake_reason,
    };

    let report = node.wake_cycle(&mut NodeIo {
        store: store.as_mut(),
        sensor: sensor.as_mut(),
        network: network.as_mut(),
        notifier: &mut notifier,
        telemetry: &mut telemetry,
        indicator: indicator.as_mut(),
        power: &mut power,
        clock: &RtcClock,
    });

    info!(
        "cycle done: {} message sent: {} telemetry: {:?} commands: {} persisted: {}",
        report.classification.as_str(),
        report.message_sent,
        report.telemetry_status,
        report.commands_handled,
        report.state_persisted,
    );
    Ok(())
}

fn hardware_wake_reason() -> WakeReason {
    let cause = unsafe { esp_idf_svc::sys::esp_sleep_get_wakeup_cause() };
    if cause == esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER {
        WakeReason::Timer
    } else {
        WakeReason::ColdBoot
    }
}

fn arm_timer(after: Duration) {
    let micros = u64::try_from(after.as_micros()).unwrap_or(u64::MAX);
    let rc = unsafe { esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(micros) };
    if let Err(err) = esp_idf_svc::sys::EspError::convert(rc) {
        warn!("failed to arm wake timer: {err}");
    }
}

fn ensure_wifi_defaults(config: &mut NodeConfig) {
    if config.wifi_ssid.is_empty() {
        config.wifi_ssid = option_env!("WIFI_SSID").unwrap_or_default().to_string();
    }

    if config.wifi_pass.is_empty() {
        config.wifi_pass = option_env!("WIFI_PASS").unwrap_or_default().to_string();
    }
}

struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    fn open(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, NVS_NAMESPACE, true)?,
        })
    }

    /// `config.json` -> `config`; every journal day shares one rolling key.
    fn key(name: &str) -> Result<&str, StoreError> {
        let key = if name.starts_with(JOURNAL_DIR) {
            NVS_JOURNAL_KEY
        } else {
            name.split('.').next().unwrap_or(name)
        };

        if key.is_empty() || key.len() > NVS_MAX_KEY_LEN {
            return Err(StoreError::Backend(format!("no NVS key for record `{name}`")));
        }
        Ok(key)
    }
}

impl DurableStore for NvsStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = Self::key(name)?;
        let Some(len) = self.nvs.blob_len(key).map_err(backend_error)? else {
            return Ok(None);
        };

        let mut buffer = vec![0_u8; len];
        let data = self.nvs.get_blob(key, &mut buffer).map_err(backend_error)?;
        Ok(data.map(<[u8]>::to_vec))
    }

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let key = Self::key(name)?;
        self.nvs.set_blob(key, bytes).map_err(backend_error)?;
        Ok(())
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut existing = self.load(name)?.unwrap_or_default();
        existing.extend_from_slice(bytes);

        if existing.len() > NVS_JOURNAL_MAX_BYTES {
            let cut = existing.len() - NVS_JOURNAL_MAX_BYTES;
            // Drop whole lines only.
            let start = existing[cut..]
                .iter()
                .position(|byte| *byte == b'\n')
                .map_or(existing.len(), |offset| cut + offset + 1);
            existing.drain(..start);
        }

        self.save(name, &existing)
    }
}

struct Dht11Sensor {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

impl Dht11Sensor {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }
}

impl Sensor for Dht11Sensor {
    fn read(&mut self) -> Reading {
        for attempt in 1..=DHT11_ATTEMPTS {
            if let Err(err) = self.pin.set_high() {
                warn!("failed to set DHT11 line high before read: {err:?}");
                return Reading::FAULT;
            }

            match dht11::blocking::read(&mut self.delay, &mut self.pin) {
                Ok(sample) => {
                    // DHT11 cannot report below 0°C; clamp into the valid range.
                    let temperature = u8::try_from(sample.temperature).unwrap_or(0);
                    let humidity = sample.relative_humidity.min(254);
                    info!("[DHT11] {temperature}°C {humidity}%");
                    return Reading::new(temperature, humidity);
                }
                Err(err) => {
                    warn!("DHT11 read on GPIO{DHT11_PIN} failed (attempt {attempt}): {err:?}");
                    FreeRtos::delay_ms(DHT11_RETRY_DELAY_MS);
                }
            }
        }

        Reading::FAULT
    }
}

/// Onboard LED, wired active-low.
struct LedIndicator {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl LedIndicator {
    fn new(pin: AnyOutputPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::output(pin)?;
        pin.set_high()?;
        Ok(Self { pin })
    }
}

impl Indicator for LedIndicator {
    fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_low()
        } else {
            self.pin.set_high()
        };
        if let Err(err) = result {
            warn!("failed to drive LED: {err:?}");
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

/// Keeps blink timing when the LED pin is unusable.
struct DarkIndicator;

impl Indicator for DarkIndicator {
    fn set(&mut self, _on: bool) {}

    fn delay_ms(&mut self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

struct WifiNetwork {
    wifi: BlockingWifi<EspWifi<'static>>,
    ssid: String,
    pass: String,
    sntp: Option<EspSntp<'static>>,
}

impl WifiNetwork {
    fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs_partition: EspDefaultNvsPartition,
        config: &NodeConfig,
    ) -> anyhow::Result<Self> {
        let esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
        Ok(Self {
            wifi: BlockingWifi::wrap(esp_wifi, sys_loop)?,
            ssid: config.wifi_ssid.clone(),
            pass: config.wifi_pass.clone(),
            sntp: None,
        })
    }

    fn configure(&mut self) -> anyhow::Result<()> {
        let auth_method = if self.pass.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };

        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: self
                    .ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi ssid too long"))?,
                password: self
                    .pass
                    .as_str()
                    .try_into()
                    .map_err(|_| anyhow!("wifi password too long"))?,
                auth_method,
                ..Default::default()
            }))?;
        self.wifi.start()?;
        Ok(())
    }

    fn sync_time(&mut self) {
        let sntp = match EspSntp::new_default() {
            Ok(sntp) => sntp,
            Err(err) => {
                warn!("failed to start SNTP: {err:?}");
                return;
            }
        };

        let mut waited = 0;
        while sntp.get_sync_status() != SyncStatus::Completed && waited < SNTP_WAIT_MS {
            thread::sleep(Duration::from_millis(200));
            waited += 200;
        }
        if sntp.get_sync_status() != SyncStatus::Completed {
            warn!("time not synced after {}ms", SNTP_WAIT_MS);
        }
        self.sntp = Some(sntp);
    }
}

impl Network for WifiNetwork {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.ssid.trim().is_empty() {
            return Err(TransportError::Rejected("wifi credentials missing".to_string()));
        }

        self.configure()
            .map_err(|err| TransportError::Request(format!("{err:#}")))?;
        info!("wifi started, connecting to `{}`", self.ssid);

        let mut last_err = None;
        for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
            match self.wifi.connect().and_then(|()| self.wifi.wait_netif_up()) {
                Ok(()) => {
                    info!("wifi connected on attempt {attempt}");
                    last_err = None;
                    break;
                }
                Err(err) => {
                    warn!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS} failed: {err:?}");
                    last_err = Some(err);
                }
            }

            if attempt < WIFI_CONNECT_ATTEMPTS {
                let _ = self.wifi.disconnect();
                thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
            }
        }

        if let Some(err) = last_err {
            let _ = self.wifi.stop();
            return Err(TransportError::Request(format!("wifi connect failed: {err:?}")));
        }

        self.sync_time();
        Ok(())
    }
}

struct TelegramNotifier {
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    fn new(config: &NodeConfig) -> Self {
        Self {
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
}

impl Notifier for TelegramNotifier {
    fn send(&mut self, text: &str) -> Result<(), TransportError> {
        self.ensure_configured()?;

        let body = serde_json::to_vec(&SendMessage {
            chat_id: &self.chat_id,
            text,
        })
        .map_err(|err| TransportError::Request(err.to_string()))?;
        let url = telegram::send_message_url(telegram::DEFAULT_API_BASE, &self.token);
        let (_, response) = http_request(Method::Post, &url, Some(&body))?;
        telegram::check_send_response(&response)
    }

    fn poll_inbound(&mut self) -> Result<Vec<InboundMessage>, TransportError> {
        self.ensure_configured()?;

        let url = telegram::get_updates_url(telegram::DEFAULT_API_BASE, &self.token, None);
        let (_, body) = http_request(Method::Get, &url, None)?;
        let batch = telegram::parse_updates(&body)?;

        if let Some(offset) = batch.next_offset {
            let ack = telegram::acknowledge_url(telegram::DEFAULT_API_BASE, &self.token, offset);
            if let Err(err) = http_request(Method::Get, &ack, None) {
                warn!("failed to acknowledge telegram updates up to {offset}: {err}");
            }
        }

        Ok(batch.messages)
    }
}

struct ThingSpeakTelemetry;

impl Telemetry for ThingSpeakTelemetry {
    fn publish(
        &mut self,
        channel_id: &str,
        key: &str,
        field1: i32,
        field2: i32,
    ) -> Result<u16, TransportError> {
        let url = thingspeak::update_url(thingspeak::DEFAULT_API_BASE, key, field1, field2);
        let (status, body) = http_request(Method::Get, &url, None)?;

        let body = String::from_utf8_lossy(&body);
        match thingspeak::entry_id(&body) {
            Some(entry) => info!("channel {channel_id} accepted entry {entry}"),
            None if status == 200 => warn!("channel {channel_id} dropped the update"),
            None => {}
        }
        Ok(status)
    }
}

struct DeepSleepPower {
    reason: WakeReason,
}

impl Power for DeepSleepPower {
    fn wake_reason(&self) -> WakeReason {
        self.reason
    }

    fn arm_wake(&mut self, after: Duration) {
        arm_timer(after);
    }
}

struct RtcClock;

impl Clock for RtcClock {
    fn now(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();
        // The RTC starts at the epoch until SNTP has run at least once.
        (now.year() >= 2024).then_some(now)
    }
}

fn http_request(
    method: Method,
    url: &str,
    body: Option<&[u8]>,
) -> Result<(u16, Vec<u8>), TransportError> {
    let conf = HttpClientConfiguration {
        timeout: Some(HTTP_TIMEOUT),
        crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
        ..Default::default()
    };
    let mut client = HttpClient::wrap(EspHttpConnection::new(&conf).map_err(request_error)?);

    let content_length = body.map(|body| body.len().to_string());
    let headers: Vec<(&str, &str)> = match content_length.as_deref() {
        Some(len) => vec![("content-type", "application/json"), ("content-length", len)],
        None => Vec::new(),
    };

    let mut request = client
        .request(method, url, &headers)
        .map_err(request_error)?;
    if let Some(body) = body {
        request.write_all(body).map_err(request_error)?;
        request.flush().map_err(request_error)?;
    }

    let mut response = request.submit().map_err(request_error)?;
    let status = response.status();

    let mut raw = Vec::new();
    let mut chunk = [0_u8; 512];
    loop {
        let read = response.read(&mut chunk).map_err(request_error)?;
        if read == 0 {
            break;
        }
        if raw.len() + read > MAX_HTTP_BODY {
            return Err(TransportError::InvalidResponse(
                "response body too large".to_string(),
            ));
        }
        raw.extend_from_slice(&chunk[..read]);
    }

    Ok((status, raw))
}

fn request_error<E: core::fmt::Debug>(err: E) -> TransportError {
    TransportError::Request(format!("{err:?}"))
}

fn backend_error(err: esp_idf_svc::sys::EspError) -> StoreError {
    StoreError::Backend(err.to_string())
}
