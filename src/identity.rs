//! The persisted device identity and its provisioning-time precursor.
//!
//! `DeviceIdentity` is written exactly once (by the provisioning controller,
//! just before the post-provisioning restart) and is read-only for the rest
//! of the device's life, so it is passed by value/reference through the
//! boot → controller call chain instead of living in shared mutable state.

use heapless::String;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_ROOM_ID_LEN: usize = 36;
pub const MAX_DEVICE_ID_LEN: usize = 32;
pub const BSSID_LEN: usize = 6;

/// The record that gates mode selection at boot.
///
/// Either *complete* (all four strings non-empty) or treated as absent;
/// partial identities are never acted on. The BSSID is independently
/// optional and does not affect completeness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    /// Partition key under which the device's remote paths are namespaced.
    pub room_id: String<MAX_ROOM_ID_LEN>,
    /// Assigned by the remote store during registration.
    pub device_id: String<MAX_DEVICE_ID_LEN>,
    /// Fixed access-point address, only meaningful when `bssid_set`.
    pub bssid: [u8; BSSID_LEN],
    pub bssid_set: bool,
}

impl DeviceIdentity {
    pub fn is_complete(&self) -> bool {
        !self.ssid.is_empty()
            && !self.password.is_empty()
            && !self.room_id.is_empty()
            && !self.device_id.is_empty()
    }

    /// Assemble the full identity once registration has assigned an id.
    pub fn from_provisioning(
        creds: &NetworkCredentials,
        device_id: String<MAX_DEVICE_ID_LEN>,
    ) -> Self {
        Self {
            ssid: creds.ssid.clone(),
            password: creds.password.clone(),
            room_id: creds.room_id.clone(),
            device_id,
            bssid: creds.bssid.unwrap_or([0; BSSID_LEN]),
            bssid_set: creds.bssid.is_some(),
        }
    }
}

/// Working-memory credentials captured from the provisioning broadcast,
/// before the remote store has assigned a device id. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: String<MAX_SSID_LEN>,
    pub password: String<MAX_PASSWORD_LEN>,
    pub room_id: String<MAX_ROOM_ID_LEN>,
    pub bssid: Option<[u8; BSSID_LEN]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s<const N: usize>(text: &str) -> String<N> {
        String::try_from(text).unwrap()
    }

    #[test]
    fn identity_completeness() {
        let mut id = DeviceIdentity {
            ssid: s("HomeNet"),
            password: s("hunter22"),
            room_id: s("living-room"),
            device_id: s("-NxAbc123"),
            bssid: [0; BSSID_LEN],
            bssid_set: false,
        };
        assert!(id.is_complete());

        id.device_id.clear();
        assert!(!id.is_complete());
    }

    #[test]
    fn from_provisioning_carries_optional_bssid() {
        let creds = NetworkCredentials {
            ssid: s("HomeNet"),
            password: s("hunter22"),
            room_id: s("living-room"),
            bssid: Some([0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]),
        };
        let id = DeviceIdentity::from_provisioning(&creds, s("-NxAbc123"));
        assert!(id.bssid_set);
        assert_eq!(id.bssid, [0xAA, 0xBB, 0xCC, 0x01, 0x02, 0x03]);

        let creds = NetworkCredentials { bssid: None, ..creds };
        let id = DeviceIdentity::from_provisioning(&creds, s("-NxAbc123"));
        assert!(!id.bssid_set);
    }
}
