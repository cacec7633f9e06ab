//! Port traits: the hexagonal boundary between the control core and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controllers (domain)
//! ```
//!
//! Driven adapters (NVS, WiFi station, HTTP client, smartconfig receiver,
//! DHT sensor, LEDC lamp) implement these traits. The provisioning and
//! operational controllers consume them via generics, so the domain core
//! never touches hardware or the IDF directly.

use crate::command::ColorCommand;
use crate::config::SystemConfig;
use crate::error::{ConfigError, NetError, StoreError};
use crate::identity::{MAX_DEVICE_ID_LEN, NetworkCredentials};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One sample from the temperature/humidity sensor.
///
/// `status` is the driver's raw result flag: non-zero means the sample is
/// invalid and must be discarded for this cycle (no immediate retry; the
/// next cycle reads again).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorReading {
    pub temperature_c: i32,
    pub humidity_pct: u32,
    pub status: i32,
}

impl SensorReading {
    pub fn is_valid(&self) -> bool {
        self.status == 0
    }
}

pub trait SensorPort {
    /// Take one sample. Never blocks longer than the sensor's own protocol.
    fn read(&mut self) -> SensorReading;
}

// ───────────────────────────────────────────────────────────────
// Lamp port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

pub trait LightPort {
    fn set_color(&mut self, color: ColorCommand);
    fn color(&self) -> ColorCommand;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS namespace)
// ───────────────────────────────────────────────────────────────

/// Raw persistent key-value storage, scoped to one namespace.
///
/// `commit` is the atomicity boundary: callers that need all-or-nothing
/// visibility write every key first and commit once at the end.
pub trait StoragePort {
    /// Read a value into `buf`. `Ok(None)` means the key is absent;
    /// `Err` means the store itself failed.
    fn get(&self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError>;

    /// Stage a value for the key.
    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is `Ok(())`.
    fn erase(&mut self, key: &str) -> Result<(), StoreError>;

    /// Remove every key in the namespace. Safe on an empty or
    /// never-initialised store.
    fn erase_all(&mut self) -> Result<(), StoreError>;

    /// Flush staged writes to flash.
    fn commit(&mut self) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`SystemConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// WiFi station port
// ───────────────────────────────────────────────────────────────

/// Station-mode connectivity. Connection outcomes are *not* returned from
/// these calls; the network stack reports them asynchronously through the
/// event ring ([`crate::events::Event::WifiConnected`] /
/// [`WifiDisconnected`](crate::events::Event::WifiDisconnected)), which is
/// the sole trigger for starting and stopping the operational activities.
pub trait WifiPort {
    /// Install credentials (and the optional BSSID pin) into the station
    /// configuration. Does not connect.
    fn apply(&mut self, creds: &NetworkCredentials) -> Result<(), NetError>;

    /// Request a connection attempt.
    fn connect(&mut self) -> Result<(), NetError>;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Provisioning broadcast channel port
// ───────────────────────────────────────────────────────────────

/// The provisioning protocol variant announced with a credential broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// The only variant this firmware accepts.
    EspTouchV2,
    Other(u8),
}

/// Credentials as delivered by the out-of-band broadcast, with the
/// announced protocol variant still attached. The variant must be checked
/// before the payload is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedCredentials {
    pub variant: ProtocolVariant,
    pub credentials: NetworkCredentials,
}

/// The out-of-band credential receiver (smartconfig).
///
/// Delivery is signalled through the event ring; the payload waits in the
/// adapter's mailbox until the controller collects it.
pub trait ProvisioningChannelPort {
    /// Begin listening for the broadcast.
    fn start(&mut self) -> Result<(), NetError>;

    /// Stop listening. Courtesy shutdown, safe to call at any time.
    fn stop(&mut self);

    /// Collect a pending broadcast, if one arrived.
    fn take_credentials(&mut self) -> Option<ReceivedCredentials>;
}

// ───────────────────────────────────────────────────────────────
// Remote store (registration + telemetry)
// ───────────────────────────────────────────────────────────────

/// Cap on the registration response body we keep; the identifier lives
/// well within the first 64 bytes.
pub const MAX_REGISTER_BODY: usize = 64;

/// Status + bounded body of a registration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterResponse {
    pub status: u16,
    pub body: heapless::Vec<u8, MAX_REGISTER_BODY>,
}

pub trait CloudPort {
    /// `POST {root}/{room_id}/devices_map.json` announcing a new device.
    /// The caller extracts the assigned identifier from the body.
    fn register_device(&mut self, room_id: &str) -> Result<RegisterResponse, NetError>;

    /// `PATCH {root}/{room_id}/devices_map/{device_id}/sensors.json` with
    /// the reading. Returns the HTTP status; the caller interprets it.
    fn publish_telemetry(
        &mut self,
        room_id: &str,
        device_id: &str,
        reading: &SensorReading,
    ) -> Result<u16, NetError>;
}

// ───────────────────────────────────────────────────────────────
// Command stream
// ───────────────────────────────────────────────────────────────

/// Receive buffer size for one stream chunk (matches the fixed on-device
/// buffer; commands and heartbeats both fit comfortably).
pub const STREAM_CHUNK_CAP: usize = 128;

/// Outcome of opening the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOpen {
    /// 200: the stream is live.
    Ok,
    /// 404: the device record was deleted server-side.
    NotFound,
    /// Any other status.
    Failed(u16),
}

/// One read from the open stream, already discriminated: the consumer
/// loops on this instead of inspecting transport-level chunking state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRead {
    /// A payload chunk worth parsing.
    Data(heapless::Vec<u8, STREAM_CHUNK_CAP>),
    /// The server's fixed-size keep-alive chunk. Discard.
    Heartbeat,
    /// Nothing arrived within the read timeout. Keep looping.
    Empty,
    /// The stream left its open/chunked state; reopen after the retry
    /// delay.
    Closed,
    /// Transport error mid-stream, same handling as `Closed`.
    Error(NetError),
}

/// Long-lived streaming GET of the device's command path.
pub trait CommandStreamPort {
    /// Open `{root}/{room_id}/devices_map/{device_id}/controllable.json`
    /// with `Accept: text/event-stream`.
    fn open(&mut self, room_id: &str, device_id: &str) -> Result<StreamOpen, NetError>;

    /// Read the next chunk. Only valid after a successful `open`.
    fn read(&mut self) -> StreamRead;

    /// Drop the read timeout from the generous first-chunk value to the
    /// short steady-state value. Called once per session after the 200.
    fn shorten_read_timeout(&mut self);

    /// Close the connection. Safe to call repeatedly.
    fn close(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Process control
// ───────────────────────────────────────────────────────────────

/// Clean process restart (the only clean-shutdown path).
pub trait RestartPort {
    fn restart(&self);
}

/// Handle the worker tasks use to request a hard reset without doing any
/// blocking work themselves; the control loop performs the actual erase
/// and restart.
pub trait RecoveryPort {
    fn request_recovery(&self);
}

/// Extract the assigned device identifier from a registration response
/// body: the text inside the first pair of double quotes after the first
/// colon, truncated to the identifier bound.
pub fn parse_device_id(body: &[u8]) -> Option<heapless::String<MAX_DEVICE_ID_LEN>> {
    let colon = body.iter().position(|&b| b == b':')?;
    let rest = &body[colon + 1..];
    let open = rest.iter().position(|&b| b == b'"')?;
    let rest = &rest[open + 1..];
    let close = rest.iter().position(|&b| b == b'"')?;
    let token = &rest[..close.min(MAX_DEVICE_ID_LEN)];
    let text = core::str::from_utf8(token).ok()?;
    heapless::String::try_from(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_validity_flag() {
        let ok = SensorReading { temperature_c: 21, humidity_pct: 40, status: 0 };
        let bad = SensorReading { temperature_c: 0, humidity_pct: 0, status: -1 };
        assert!(ok.is_valid());
        assert!(!bad.is_valid());
    }

    #[test]
    fn device_id_extracted_from_registration_body() {
        let id = parse_device_id(b"{\"name\":\"-NxQ4f2hGz\"}").unwrap();
        assert_eq!(id.as_str(), "-NxQ4f2hGz");
    }

    #[test]
    fn device_id_requires_colon_and_quotes() {
        assert_eq!(parse_device_id(b"no json here"), None);
        assert_eq!(parse_device_id(b"{\"name\" -NxQ4f2hGz}"), None);
        assert_eq!(parse_device_id(b"{\"name\":\"unterminated"), None);
    }

    #[test]
    fn device_id_truncated_to_bound() {
        let long = "A".repeat(50);
        let body = format!("{{\"name\":\"{long}\"}}");
        let id = parse_device_id(body.as_bytes()).unwrap();
        assert_eq!(id.len(), MAX_DEVICE_ID_LEN);
    }
}
