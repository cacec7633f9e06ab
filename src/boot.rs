//! Boot-time mode selection.
//!
//! One decision, made exactly once per boot: a complete stored identity
//! puts the device into operational mode, anything else (no identity,
//! incomplete identity, or a store that cannot even be read) falls back
//! to provisioning. The fallback on store errors means a corrupted flash
//! region degrades to "re-provision me" instead of a boot loop with no
//! way out.

use log::{info, warn};

use crate::app::credentials::CredentialStore;
use crate::app::ports::StoragePort;
use crate::identity::DeviceIdentity;

/// Which control loop owns this boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// No usable identity; listen for the provisioning broadcast.
    Provisioning,
    /// Identity present; connect and serve.
    Operational(DeviceIdentity),
}

pub fn select_mode<S: StoragePort>(store: &CredentialStore<S>) -> Mode {
    match store.load() {
        Ok(Some(identity)) if identity.is_complete() => {
            info!(
                "boot: stored identity found (room={}, device={})",
                identity.room_id, identity.device_id
            );
            Mode::Operational(identity)
        }
        Ok(Some(_)) => {
            warn!("boot: stored identity incomplete, entering provisioning");
            Mode::Provisioning
        }
        Ok(None) => {
            info!("boot: no stored identity, entering provisioning");
            Mode::Provisioning
        }
        Err(e) => {
            warn!("boot: credential load failed ({e}), entering provisioning");
            Mode::Provisioning
        }
    }
}
