//! Glowroom firmware entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                   │
//! │                                                            │
//! │  NvsAdapter     WifiAdapter      SmartconfigAdapter        │
//! │  (Storage)      (WifiPort)       (ProvisioningChannel)     │
//! │  HttpCloud      HttpCommandStream                          │
//! │  (CloudPort)    (CommandStreamPort)                        │
//! │                                                            │
//! │  ───────────── Port Trait Boundary ──────────────────      │
//! │                                                            │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │   Boot selector · Provisioning FSM · Operational     │  │
//! │  │   supervisor · Recovery trigger   (pure logic)       │  │
//! │  └──────────────────────────────────────────────────────┘  │
//! │                                                            │
//! │  Drivers: RgbLed (LEDC) · ButtonDriver · DhtSensor         │
//! └────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};

use glowroom::adapters::http::{HttpCloud, HttpCommandStream};
use glowroom::adapters::nvs::{self, NvsAdapter, NvsConfigStore};
use glowroom::adapters::smartconfig::SmartconfigAdapter;
use glowroom::adapters::wifi::{self, WifiAdapter};
use glowroom::app::credentials::CredentialStore;
use glowroom::app::ports::{ConfigPort, RecoveryPort, RestartPort, WifiPort};
use glowroom::boot::{self, Mode};
use glowroom::config::SystemConfig;
use glowroom::drivers::button::ButtonDriver;
use glowroom::drivers::rgb_led::{RgbLed, SharedRgbLed};
use glowroom::events::{self, Event};
use glowroom::identity::{DeviceIdentity, NetworkCredentials};
use glowroom::operational::{Action, OperationalController, Teardown, stream, telemetry};
use glowroom::provisioning::{ProvisioningController, Terminal};
use glowroom::recovery::{self, RecoveryLatch};
use glowroom::sensors::dht::DhtSensor;

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;

/// Control loop poll period while waiting on the event ring.
const LOOP_TICK: Duration = Duration::from_millis(50);
/// Worker threads touch TLS buffers; the default stack is too small.
const WORKER_STACK_BYTES: usize = 8 * 1024;

// ── Process-control adapters ──────────────────────────────────

struct EspRestart;

impl RestartPort for EspRestart {
    fn restart(&self) {
        info!("restarting");
        // SAFETY: esp_restart does not return.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }
}

/// Workers request recovery through the ring; the control loop owns the
/// actual wipe-and-restart.
struct RingRecovery;

impl RecoveryPort for RingRecovery {
    fn request_recovery(&self) {
        events::push_event(Event::RecoveryRequested);
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Glowroom v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Storage + config ───────────────────────────────────
    nvs::init_flash().map_err(|e| anyhow!("NVS flash init failed: {e}"))?;
    let storage = NvsAdapter::open(nvs::CREDENTIAL_NAMESPACE)
        .map_err(|e| anyhow!("credential namespace open failed: {e}"))?;
    let mut credentials = CredentialStore::new(storage);

    let config = match NvsConfigStore::open().and_then(|store| store.load()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("config load failed ({e}), using defaults");
            SystemConfig::default()
        }
    };

    // ── 3. Peripherals + network stack ────────────────────────
    let peripherals = Peripherals::take().context("peripherals unavailable")?;
    let sysloop = EspSystemEventLoop::take().context("event loop unavailable")?;
    let mut wifi_sta = WifiAdapter::new(peripherals.modem, sysloop)
        .map_err(|e| anyhow!("wifi init failed: {e}"))?;
    wifi::register_event_handlers().map_err(|e| anyhow!("event bridge failed: {e}"))?;

    let button = ButtonDriver::new(glowroom::pins::RESET_BUTTON_GPIO);
    button
        .install_isr()
        .map_err(|e| anyhow!("button init failed: {e}"))?;

    // ── 4. Mode selection, exactly once per boot ──────────────
    match boot::select_mode(&credentials) {
        Mode::Provisioning => run_provisioning(&mut credentials, &mut wifi_sta, button),
        Mode::Operational(identity) => {
            run_operational(&mut credentials, &mut wifi_sta, button, identity, config)
        }
    }
}

/// Drain the ring; recovery-class events short-circuit everything else.
fn wants_recovery(event: Event) -> bool {
    matches!(event, Event::ButtonPressed | Event::RecoveryRequested)
}

// ── Provisioning mode ─────────────────────────────────────────

fn run_provisioning(
    credentials: &mut CredentialStore<NvsAdapter>,
    wifi_sta: &mut WifiAdapter,
    mut button: ButtonDriver,
) -> Result<()> {
    let restart = EspRestart;
    let latch = RecoveryLatch::new();
    let mut channel = SmartconfigAdapter::new();
    let mut cloud = ProvisioningCloud::new();
    let mut controller = ProvisioningController::new();

    // The broadcast receiver listens on a running station.
    wifi_sta
        .start()
        .map_err(|e| anyhow!("wifi start failed: {e}"))?;
    if let Err(e) = controller.begin(&mut channel) {
        error!("provisioning channel failed ({e})");
        restart.restart();
    }

    loop {
        if button.tick() {
            events::push_event(Event::ButtonPressed);
        }

        let mut terminal = None;
        events::drain_events(|event| {
            if terminal.is_some() {
                return;
            }
            if wants_recovery(event) {
                if latch.try_fire() {
                    terminal = Some(Terminal::Reset);
                }
                return;
            }
            terminal = controller.handle_event(
                event,
                &mut channel,
                wifi_sta,
                &mut cloud,
                credentials,
            );
        });

        match terminal {
            Some(Terminal::Restart) => restart.restart(),
            Some(Terminal::Reset) => recovery::hard_reset(credentials, &restart),
            None => {}
        }

        thread::sleep(LOOP_TICK);
    }
}

/// Registration needs the configured database root, which provisioning
/// loads lazily once the network is up.
struct ProvisioningCloud {
    inner: Option<HttpCloud>,
}

impl ProvisioningCloud {
    fn new() -> Self {
        Self { inner: None }
    }

    fn get(&mut self) -> &mut HttpCloud {
        self.inner.get_or_insert_with(|| {
            let config = NvsConfigStore::open()
                .and_then(|store| store.load())
                .unwrap_or_default();
            HttpCloud::new(config)
        })
    }
}

impl glowroom::app::ports::CloudPort for ProvisioningCloud {
    fn register_device(
        &mut self,
        room_id: &str,
    ) -> std::result::Result<glowroom::app::ports::RegisterResponse, glowroom::NetError> {
        self.get().register_device(room_id)
    }

    fn publish_telemetry(
        &mut self,
        room_id: &str,
        device_id: &str,
        reading: &glowroom::app::ports::SensorReading,
    ) -> std::result::Result<u16, glowroom::NetError> {
        self.get().publish_telemetry(room_id, device_id, reading)
    }
}

// ── Operational mode ──────────────────────────────────────────

struct Workers {
    stop: Arc<AtomicBool>,
    telemetry: thread::JoinHandle<()>,
    stream: thread::JoinHandle<()>,
}

fn spawn_workers(
    identity: &DeviceIdentity,
    config: &SystemConfig,
    lamp: SharedRgbLed,
) -> Result<Workers> {
    let stop = Arc::new(AtomicBool::new(false));

    let telemetry = {
        let stop = Arc::clone(&stop);
        let config = config.clone();
        let room_id = identity.room_id.clone();
        let device_id = identity.device_id.clone();
        thread::Builder::new()
            .name("telemetry".into())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || {
                let mut sensor = DhtSensor::new(glowroom::pins::DHT_GPIO);
                let mut cloud = HttpCloud::new(config.clone());
                telemetry::run_publisher(
                    &mut sensor,
                    &mut cloud,
                    &RingRecovery,
                    &room_id,
                    &device_id,
                    Duration::from_secs(u64::from(config.telemetry_interval_secs)),
                    &stop,
                );
            })
            .context("telemetry worker spawn failed")?
    };

    let stream = {
        let stop = Arc::clone(&stop);
        let config = config.clone();
        let room_id = identity.room_id.clone();
        let device_id = identity.device_id.clone();
        let mut lamp = lamp;
        thread::Builder::new()
            .name("stream".into())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || {
                let retry = Duration::from_millis(u64::from(config.stream_retry_delay_ms));
                let mut connection = HttpCommandStream::new(config);
                stream::run_consumer(
                    &mut connection,
                    &mut lamp,
                    &RingRecovery,
                    &room_id,
                    &device_id,
                    retry,
                    &stop,
                );
            })
            .context("stream worker spawn failed")?
    };

    Ok(Workers {
        stop,
        telemetry,
        stream,
    })
}

impl Workers {
    fn stop_and_join(self) {
        self.stop.store(true, Ordering::Release);
        if self.telemetry.join().is_err() {
            warn!("telemetry worker panicked");
        }
        if self.stream.join().is_err() {
            warn!("stream worker panicked");
        }
    }
}

fn run_operational(
    credentials: &mut CredentialStore<NvsAdapter>,
    wifi_sta: &mut WifiAdapter,
    mut button: ButtonDriver,
    identity: DeviceIdentity,
    config: SystemConfig,
) -> Result<()> {
    let restart = EspRestart;
    let latch = RecoveryLatch::new();
    let mut controller = OperationalController::new();
    let mut workers: Option<Workers> = None;

    // LEDC is configured once per boot. Worker restarts after transient
    // disconnects reuse the lamp, so the last commanded colour holds.
    let lamp = SharedRgbLed::new(
        RgbLed::new().map_err(|e| anyhow!("lamp init failed: {e}"))?,
    );

    let station_creds = NetworkCredentials {
        ssid: identity.ssid.clone(),
        password: identity.password.clone(),
        room_id: identity.room_id.clone(),
        bssid: identity.bssid_set.then_some(identity.bssid),
    };
    wifi_sta
        .apply(&station_creds)
        .and_then(|()| wifi_sta.connect())
        .map_err(|e| anyhow!("station bring-up failed: {e}"))?;

    loop {
        if button.tick() {
            events::push_event(Event::ButtonPressed);
        }

        let mut recover = false;
        let mut actions: heapless::Vec<Action, 8> = heapless::Vec::new();
        events::drain_events(|event| {
            if wants_recovery(event) {
                recover = true;
                return;
            }
            let action = controller.handle_event(event);
            if action != Action::None && actions.push(action).is_err() {
                warn!("action backlog full, dropping {action:?}");
            }
        });

        for action in actions {
            match action {
                Action::StartWorkers => {
                    if workers.is_none() {
                        workers = Some(spawn_workers(&identity, &config, lamp.clone())?);
                    }
                }
                Action::StopWorkers(teardown) => {
                    if let Some(w) = workers.take() {
                        w.stop_and_join();
                    }
                    match teardown {
                        Teardown::Reconnect => {
                            if let Err(e) = wifi_sta.connect() {
                                warn!("reconnect request failed ({e})");
                            }
                        }
                        Teardown::Recover => recover = true,
                    }
                }
                Action::None => {}
            }
        }

        if recover && latch.try_fire() {
            if let Some(w) = workers.take() {
                w.stop_and_join();
            }
            wifi_sta.disconnect();
            recovery::hard_reset(credentials, &restart);
        }

        thread::sleep(LOOP_TICK);
    }
}
