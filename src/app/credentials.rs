//! Persistent device identity over a [`StoragePort`] namespace.
//!
//! The identity decides the boot mode, so its load path is deliberately
//! conservative: any absent field makes the whole identity absent, and a
//! malformed optional BSSID degrades to "no BSSID" instead of failing.

use log::{debug, info, warn};

use crate::app::ports::StoragePort;
use crate::error::StoreError;
use crate::identity::{
    BSSID_LEN, DeviceIdentity, MAX_DEVICE_ID_LEN, MAX_PASSWORD_LEN, MAX_ROOM_ID_LEN, MAX_SSID_LEN,
};

pub const KEY_SSID: &str = "ssid";
pub const KEY_PASSWORD: &str = "password";
pub const KEY_ROOM_ID: &str = "room_id";
pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_BSSID: &str = "bssid";

/// Stored BSSID record length: six address bytes plus a trailing
/// terminator byte. Anything else is treated as not set.
const BSSID_RECORD_LEN: usize = BSSID_LEN + 1;

/// Typed view of the credential namespace.
pub struct CredentialStore<S> {
    storage: S,
}

impl<S: StoragePort> CredentialStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load the stored identity.
    ///
    /// `Ok(None)` when any of the four mandatory fields is absent; a
    /// partially written identity is indistinguishable from no identity.
    /// `Err` only when the store itself fails.
    pub fn load(&self) -> Result<Option<DeviceIdentity>, StoreError> {
        let Some(ssid) = self.get_string::<MAX_SSID_LEN>(KEY_SSID)? else {
            debug!("credentials: no ssid stored");
            return Ok(None);
        };
        let Some(password) = self.get_string::<MAX_PASSWORD_LEN>(KEY_PASSWORD)? else {
            debug!("credentials: no password stored");
            return Ok(None);
        };
        let Some(room_id) = self.get_string::<MAX_ROOM_ID_LEN>(KEY_ROOM_ID)? else {
            debug!("credentials: no room id stored");
            return Ok(None);
        };
        let Some(device_id) = self.get_string::<MAX_DEVICE_ID_LEN>(KEY_DEVICE_ID)? else {
            debug!("credentials: no device id stored");
            return Ok(None);
        };

        let (bssid, bssid_set) = self.load_bssid()?;

        Ok(Some(DeviceIdentity {
            ssid,
            password,
            room_id,
            device_id,
            bssid,
            bssid_set,
        }))
    }

    /// Persist a complete identity. All fields are staged first and made
    /// visible by a single trailing commit; an unset BSSID erases any
    /// stale stored record.
    pub fn save(&mut self, identity: &DeviceIdentity) -> Result<(), StoreError> {
        self.storage.set(KEY_SSID, identity.ssid.as_bytes())?;
        self.storage.set(KEY_PASSWORD, identity.password.as_bytes())?;
        self.storage.set(KEY_ROOM_ID, identity.room_id.as_bytes())?;
        self.storage.set(KEY_DEVICE_ID, identity.device_id.as_bytes())?;

        if identity.bssid_set {
            let mut record = [0u8; BSSID_RECORD_LEN];
            record[..BSSID_LEN].copy_from_slice(&identity.bssid);
            self.storage.set(KEY_BSSID, &record)?;
        } else {
            self.storage.erase(KEY_BSSID)?;
        }

        self.storage.commit()?;
        info!(
            "credentials: identity saved (ssid={}, room={}, device={})",
            identity.ssid, identity.room_id, identity.device_id
        );
        Ok(())
    }

    /// Erase the whole namespace. Idempotent.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        self.storage.erase_all()?;
        self.storage.commit()?;
        info!("credentials: namespace wiped");
        Ok(())
    }

    fn get_string<const N: usize>(
        &self,
        key: &str,
    ) -> Result<Option<heapless::String<N>>, StoreError> {
        let mut buf = [0u8; N];
        let Some(len) = self.storage.get(key, &mut buf)? else {
            return Ok(None);
        };
        if len == 0 {
            // An empty value must read the same as no value at all.
            debug!("credentials: {key} stored empty, treating as absent");
            return Ok(None);
        }
        let Ok(text) = core::str::from_utf8(&buf[..len]) else {
            warn!("credentials: {key} is not valid UTF-8, treating as absent");
            return Ok(None);
        };
        // Infallible: len <= N by construction.
        Ok(heapless::String::try_from(text).ok())
    }

    fn load_bssid(&self) -> Result<([u8; BSSID_LEN], bool), StoreError> {
        let mut buf = [0u8; BSSID_RECORD_LEN];
        match self.storage.get(KEY_BSSID, &mut buf)? {
            Some(BSSID_RECORD_LEN) => {
                let mut bssid = [0u8; BSSID_LEN];
                bssid.copy_from_slice(&buf[..BSSID_LEN]);
                Ok((bssid, true))
            }
            Some(len) => {
                warn!("credentials: bssid record has length {len}, ignoring");
                Ok(([0; BSSID_LEN], false))
            }
            None => Ok(([0; BSSID_LEN], false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory store with fault injection on any single operation.
    #[derive(Default)]
    struct MemStorage {
        map: HashMap<String, Vec<u8>>,
        staged: HashMap<String, Option<Vec<u8>>>,
        fail_commit: bool,
    }

    impl StoragePort for MemStorage {
        fn get(&self, key: &str, buf: &mut [u8]) -> Result<Option<usize>, StoreError> {
            match self.map.get(key) {
                Some(v) if v.len() <= buf.len() => {
                    buf[..v.len()].copy_from_slice(v);
                    Ok(Some(v.len()))
                }
                Some(_) => Err(StoreError::ReadFailed),
                None => Ok(None),
            }
        }

        fn set(&mut self, key: &str, data: &[u8]) -> Result<(), StoreError> {
            self.staged.insert(key.to_string(), Some(data.to_vec()));
            Ok(())
        }

        fn erase(&mut self, key: &str) -> Result<(), StoreError> {
            self.staged.insert(key.to_string(), None);
            Ok(())
        }

        fn erase_all(&mut self) -> Result<(), StoreError> {
            self.map.clear();
            self.staged.clear();
            Ok(())
        }

        fn commit(&mut self) -> Result<(), StoreError> {
            if self.fail_commit {
                return Err(StoreError::CommitFailed);
            }
            for (key, value) in self.staged.drain() {
                match value {
                    Some(v) => {
                        self.map.insert(key, v);
                    }
                    None => {
                        self.map.remove(&key);
                    }
                }
            }
            Ok(())
        }
    }

    fn identity(bssid: Option<[u8; 6]>) -> DeviceIdentity {
        DeviceIdentity {
            ssid: heapless::String::try_from("HomeNet").unwrap(),
            password: heapless::String::try_from("hunter22").unwrap(),
            room_id: heapless::String::try_from("living-room").unwrap(),
            device_id: heapless::String::try_from("-NxAbc123").unwrap(),
            bssid: bssid.unwrap_or_default(),
            bssid_set: bssid.is_some(),
        }
    }

    #[test]
    fn empty_store_loads_as_absent() {
        let store = CredentialStore::new(MemStorage::default());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let mut store = CredentialStore::new(MemStorage::default());
        let id = identity(Some([0xAA, 0xBB, 0xCC, 1, 2, 3]));
        store.save(&id).unwrap();
        assert_eq!(store.load().unwrap(), Some(id));
    }

    #[test]
    fn missing_any_field_means_absent() {
        for missing in [KEY_SSID, KEY_PASSWORD, KEY_ROOM_ID, KEY_DEVICE_ID] {
            let mut store = CredentialStore::new(MemStorage::default());
            store.save(&identity(None)).unwrap();
            store.storage.map.remove(missing);
            assert_eq!(store.load().unwrap(), None, "missing {missing}");
        }
    }

    #[test]
    fn stored_empty_field_means_absent() {
        // A zero-length record must be indistinguishable from no record.
        for emptied in [KEY_SSID, KEY_PASSWORD, KEY_ROOM_ID, KEY_DEVICE_ID] {
            let mut store = CredentialStore::new(MemStorage::default());
            store.save(&identity(None)).unwrap();
            store.storage.map.insert(emptied.to_string(), Vec::new());
            assert_eq!(store.load().unwrap(), None, "empty {emptied}");
        }
    }

    #[test]
    fn malformed_bssid_degrades_to_unset() {
        let mut store = CredentialStore::new(MemStorage::default());
        store.save(&identity(None)).unwrap();
        // A raw 6-byte record (no terminator) must not count as set.
        store
            .storage
            .map
            .insert(KEY_BSSID.to_string(), vec![1, 2, 3, 4, 5, 6]);
        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.bssid_set);
    }

    #[test]
    fn saving_without_bssid_erases_stale_record() {
        let mut store = CredentialStore::new(MemStorage::default());
        store.save(&identity(Some([9; 6]))).unwrap();
        store.save(&identity(None)).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert!(!loaded.bssid_set);
    }

    #[test]
    fn failed_commit_leaves_nothing_visible() {
        let mut storage = MemStorage::default();
        storage.fail_commit = true;
        let mut store = CredentialStore::new(storage);
        assert_eq!(store.save(&identity(None)), Err(StoreError::CommitFailed));
        store.storage.fail_commit = false;
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn wipe_is_idempotent() {
        let mut store = CredentialStore::new(MemStorage::default());
        store.save(&identity(None)).unwrap();
        store.wipe().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.wipe().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
