//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] over one NVS namespace and [`ConfigPort`]
//! for the postcard-encoded system configuration blob.
//!
//! On ESP32 the adapter holds one open `nvs_handle_t` for its lifetime,
//! so staged writes stay pending until `commit` flushes them; that handle
//! is the atomicity boundary the credential save relies on. The host
//! backend mirrors the same staged/committed split in memory.

use log::{info, warn};

use crate::app::ports::{ConfigPort, StoragePort};
use crate::config::SystemConfig;
use crate::error::{ConfigError, StoreError};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Namespace holding the device identity.
pub const CREDENTIAL_NAMESPACE: &str = "storage";
/// Namespace and key for the config blob.
const CONFIG_NAMESPACE: &str = "glowcfg";
const CONFIG_KEY: &str = "syscfg";

const MAX_BLOB_SIZE: usize = 4000;

/// Initialise the NVS flash partition. Must run once before any
/// [`NvsAdapter::open`]. On a fresh chip or after a layout change the
/// partition is erased and re-initialised.
pub fn init_flash() -> Result<(), StoreError> {
    #[cfg(target_os = "espidf")]
    {
        // SAFETY: called from the single main-task context before any
        // concurrent NVS access.
        let ret = unsafe { nvs_flash_init() };
        if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
            warn!("NVS: erasing and re-initialising flash partition");
            if unsafe { nvs_flash_erase() } != ESP_OK {
                return Err(StoreError::EraseFailed);
            }
            if unsafe { nvs_flash_init() } != ESP_OK {
                return Err(StoreError::OpenFailed);
            }
        } else if ret != ESP_OK {
            return Err(StoreError::OpenFailed);
        }
        info!("NVS: flash initialised");
    }

    #[cfg(not(target_os = "espidf"))]
    info!("NVS: simulation backend");

    Ok(())
}

pub struct NvsAdapter {
    #[cfg(target_os = "espidf")]
    handle: nvs_handle_t,
    #[cfg(not(target_os = "espidf"))]
    committed: HashMap<String, Vec<u8>>,
    #[cfg(not(target_os = "espidf"))]
    staged: HashMap<String, Option<Vec<u8>>>,
}

impl NvsAdapter {
    /// Open a namespace read-write. The handle stays open for the
    /// adapter's lifetime.
    pub fn open(namespace: &str) -> Result<Self, StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let ns = cstr_buf(namespace);
            let mut handle: nvs_handle_t = 0;
            let ret = unsafe {
                nvs_open(ns.as_ptr().cast(), nvs_open_mode_t_NVS_READWRITE, &mut handle)
            };
            if ret != ESP_OK {
                warn!("NVS: open of namespace '{namespace}' failed ({ret})");
                return Err(StoreError::OpenFailed);
            }
            info!("NVS: namespace '{namespace}' open");
            Ok(Self { handle })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NVS: namespace '{namespace}' open (simulation)");
            Ok(Self {
                committed: HashMap::new(),
                staged: HashMap::new(),
            })
        }
    }
}

/// NVS keys are limited to 15 bytes plus terminator.
#[cfg(target_os = "espidf")]
fn cstr_buf(text: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = text.as_bytes();
    let len = bytes.len().min(15);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

#[cfg(target_os = "espidf")]
impl Drop for NvsAdapter {
    fn drop(&mut self) {
        // Uncommitted writes are discarded with the handle.
        unsafe { nvs_close(self.handle) };
    }
}

impl StoragePort for NvsAdapter {
    fn get(&self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let key_cstr = cstr_buf(key);
            let mut size = buf.len();
            let ret = unsafe {
                nvs_get_blob(
                    self.handle,
                    key_cstr.as_ptr().cast(),
                    buf.as_mut_ptr().cast(),
                    &mut size,
                )
            };
            if ret == ESP_ERR_NVS_NOT_FOUND {
                return Ok(None);
            }
            if ret != ESP_OK {
                warn!("NVS: read of '{key}' failed ({ret})");
                return Err(StoreError::ReadFailed);
            }
            Ok(Some(size))
        }

        #[cfg(not(target_os = "espidf"))]
        {
            match self.committed.get(key) {
                Some(data) if data.len() <= buf.len() => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(Some(data.len()))
                }
                Some(_) => Err(StoreError::ReadFailed),
                None => Ok(None),
            }
        }
    }

    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let key_cstr = cstr_buf(key);
            let ret = unsafe {
                nvs_set_blob(
                    self.handle,
                    key_cstr.as_ptr().cast(),
                    data.as_ptr().cast(),
                    data.len(),
                )
            };
            if ret != ESP_OK {
                warn!("NVS: write of '{key}' failed ({ret})");
                return Err(StoreError::WriteFailed);
            }
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.staged.insert(key.to_string(), Some(data.to_vec()));
            Ok(())
        }
    }

    fn erase(&mut self, key: &str) -> Result<(), StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let key_cstr = cstr_buf(key);
            let ret = unsafe { nvs_erase_key(self.handle, key_cstr.as_ptr().cast()) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                warn!("NVS: erase of '{key}' failed ({ret})");
                return Err(StoreError::EraseFailed);
            }
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.staged.insert(key.to_string(), None);
            Ok(())
        }
    }

    fn erase_all(&mut self) -> Result<(), StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { nvs_erase_all(self.handle) };
            if ret != ESP_OK {
                warn!("NVS: erase-all failed ({ret})");
                return Err(StoreError::EraseFailed);
            }
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.committed.clear();
            self.staged.clear();
            Ok(())
        }
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        #[cfg(target_os = "espidf")]
        {
            let ret = unsafe { nvs_commit(self.handle) };
            if ret != ESP_OK {
                warn!("NVS: commit failed ({ret})");
                return Err(StoreError::CommitFailed);
            }
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            for (key, value) in self.staged.drain() {
                match value {
                    Some(v) => {
                        self.committed.insert(key, v);
                    }
                    None => {
                        self.committed.remove(&key);
                    }
                }
            }
            Ok(())
        }
    }
}

// ── Configuration blob ─────────────────────────────────────────

fn validate_config(cfg: &SystemConfig) -> Result<(), ConfigError> {
    if !cfg.db_root_url.starts_with("https://") {
        return Err(ConfigError::ValidationFailed("db_root_url must be https"));
    }
    if !(1..=3600).contains(&cfg.telemetry_interval_secs) {
        return Err(ConfigError::ValidationFailed(
            "telemetry_interval_secs must be 1–3600",
        ));
    }
    if !(100..=60_000).contains(&cfg.stream_retry_delay_ms) {
        return Err(ConfigError::ValidationFailed(
            "stream_retry_delay_ms must be 100–60000",
        ));
    }
    if cfg.stream_read_timeout_ms == 0 || cfg.stream_initial_timeout_ms < cfg.stream_read_timeout_ms
    {
        return Err(ConfigError::ValidationFailed(
            "stream_initial_timeout_ms must be >= stream_read_timeout_ms > 0",
        ));
    }
    if !(1..=crate::app::ports::STREAM_CHUNK_CAP).contains(&cfg.keepalive_chunk_len) {
        return Err(ConfigError::ValidationFailed(
            "keepalive_chunk_len must fit the receive buffer",
        ));
    }
    Ok(())
}

/// Config store, separate from the credential namespace.
pub struct NvsConfigStore {
    inner: NvsAdapter,
}

impl NvsConfigStore {
    pub fn open() -> Result<Self, ConfigError> {
        let inner = NvsAdapter::open(CONFIG_NAMESPACE).map_err(|_| ConfigError::IoError)?;
        Ok(Self { inner })
    }
}

impl ConfigPort for NvsConfigStore {
    fn load(&self) -> Result<SystemConfig, ConfigError> {
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match self.inner.get(CONFIG_KEY, &mut buf) {
            Ok(Some(len)) => {
                let cfg: SystemConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                validate_config(&cfg)?;
                info!("config: loaded from NVS ({len} bytes)");
                Ok(cfg)
            }
            Ok(None) => {
                info!("config: none stored, using defaults");
                Ok(SystemConfig::default())
            }
            Err(e) => {
                warn!("config: NVS read failed ({e}), using defaults");
                Ok(SystemConfig::default())
            }
        }
    }

    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.inner
            .set(CONFIG_KEY, &bytes)
            .and_then(|()| self.inner.commit())
            .map_err(|_| ConfigError::IoError)?;
        info!("config: saved to NVS ({} bytes)", bytes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&SystemConfig::default()).is_ok());
    }

    #[test]
    fn rejects_plain_http_root() {
        let cfg = SystemConfig {
            db_root_url: heapless::String::try_from("http://insecure.example.com").unwrap(),
            ..SystemConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn rejects_inverted_timeouts() {
        let cfg = SystemConfig {
            stream_initial_timeout_ms: 100,
            stream_read_timeout_ms: 500,
            ..SystemConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn storage_roundtrip_through_commit() {
        let mut nvs = NvsAdapter::open("test_ns").unwrap();
        nvs.set("greeting", b"hello NVS").unwrap();

        // Staged but not committed: not visible yet.
        let mut buf = [0u8; 64];
        assert_eq!(nvs.get("greeting", &mut buf).unwrap(), None);

        nvs.commit().unwrap();
        let len = nvs.get("greeting", &mut buf).unwrap().unwrap();
        assert_eq!(&buf[..len], b"hello NVS");

        nvs.erase("greeting").unwrap();
        nvs.commit().unwrap();
        assert_eq!(nvs.get("greeting", &mut buf).unwrap(), None);
    }

    #[test]
    fn erase_all_clears_everything_immediately() {
        let mut nvs = NvsAdapter::open("test_ns").unwrap();
        nvs.set("a", b"1").unwrap();
        nvs.set("b", b"2").unwrap();
        nvs.commit().unwrap();
        nvs.erase_all().unwrap();
        nvs.commit().unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(nvs.get("a", &mut buf).unwrap(), None);
        assert_eq!(nvs.get("b", &mut buf).unwrap(), None);
    }

    #[test]
    fn erasing_missing_key_is_ok() {
        let mut nvs = NvsAdapter::open("test_ns").unwrap();
        nvs.erase("nope").unwrap();
        nvs.commit().unwrap();
    }

    #[test]
    fn config_store_defaults_when_empty() {
        let store = NvsConfigStore::open().unwrap();
        let cfg = store.load().unwrap();
        assert_eq!(cfg.telemetry_interval_secs, SystemConfig::default().telemetry_interval_secs);
    }

    #[test]
    fn config_store_roundtrip() {
        let mut store = NvsConfigStore::open().unwrap();
        let cfg = SystemConfig {
            telemetry_interval_secs: 30,
            ..SystemConfig::default()
        };
        store.save(&cfg).unwrap();
        assert_eq!(store.load().unwrap().telemetry_interval_secs, 30);
    }
}
