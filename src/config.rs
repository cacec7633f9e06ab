//! System configuration parameters.
//!
//! All tunable parameters for the Glowroom firmware. Values are persisted
//! as a postcard blob in NVS (see `adapters::nvs`); defaults apply when no
//! stored config exists.

use serde::{Deserialize, Serialize};

pub const MAX_DB_ROOT_URL_LEN: usize = 96;

/// Core system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Remote store ---
    /// Root URL of the realtime database all device paths hang off.
    pub db_root_url: heapless::String<MAX_DB_ROOT_URL_LEN>,

    // --- Telemetry ---
    /// Seconds between sensor publish cycles.
    pub telemetry_interval_secs: u32,

    // --- Event stream ---
    /// Delay before reopening a closed or failed command stream (ms).
    /// Deliberately constant: command responsiveness is prioritised over
    /// backoff politeness.
    pub stream_retry_delay_ms: u32,
    /// Read timeout while waiting for the first response chunk (ms).
    /// Must be generous; first-byte latency on a fresh connection is high.
    pub stream_initial_timeout_ms: u32,
    /// Read timeout once the stream is established (ms). Kept short so
    /// keep-alive turnaround stays low-latency.
    pub stream_read_timeout_ms: u32,
    /// Exact byte length of the server's keep-alive chunk. A length match
    /// is the only heartbeat signal the server gives us; if the upstream
    /// event format ever changes its heartbeat payload, this must follow.
    pub keepalive_chunk_len: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            db_root_url: heapless::String::try_from("https://glowroom-default-rtdb.firebaseio.com")
                .unwrap_or_default(),
            telemetry_interval_secs: 10,
            stream_retry_delay_ms: 1_000,
            stream_initial_timeout_ms: 5_000,
            stream_read_timeout_ms: 500,
            keepalive_chunk_len: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.db_root_url.starts_with("https://"));
        assert!(c.telemetry_interval_secs > 0);
        assert!(c.stream_retry_delay_ms > 0);
        assert!(
            c.stream_initial_timeout_ms > c.stream_read_timeout_ms,
            "first-chunk timeout must be the generous one"
        );
        assert!(c.keepalive_chunk_len > 0);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = SystemConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: SystemConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.db_root_url, c2.db_root_url);
        assert_eq!(c.telemetry_interval_secs, c2.telemetry_interval_secs);
        assert_eq!(c.keepalive_chunk_len, c2.keepalive_chunk_len);
    }

    #[test]
    fn serde_json_roundtrip() {
        let c = SystemConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.stream_read_timeout_ms, c2.stream_read_timeout_ms);
    }
}
