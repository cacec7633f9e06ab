//! Provisioning mode: broadcast credentials → join → register → persist.
//!
//! The flow is an explicit state machine fed by the event ring. Network
//! notifications arrive as [`Event`]s; the registration and persistence
//! steps run inline once the station reports connected. Both terminal
//! outcomes leave the device in a self-consistent state:
//!
//! - `Terminal::Restart`: identity persisted, next boot goes operational.
//! - `Terminal::Reset`: provisioning failed, recovery wipes whatever may
//!   have been half-written and restarts into provisioning again.

use log::{debug, error, info, warn};

use crate::app::credentials::CredentialStore;
use crate::app::ports::{
    CloudPort, ProtocolVariant, ProvisioningChannelPort, StoragePort, WifiPort, parse_device_id,
};
use crate::error::NetError;
use crate::events::Event;
use crate::identity::{DeviceIdentity, NetworkCredentials};

/// How a provisioning session ends. Both end in a restart; `Reset` wipes
/// the credential namespace first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Restart,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingCredentials,
    Connecting,
    Registering,
    Persisting,
}

pub struct ProvisioningController {
    state: State,
    pending: Option<NetworkCredentials>,
}

impl Default for ProvisioningController {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningController {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingCredentials,
            pending: None,
        }
    }

    /// Start listening on the provisioning channel.
    pub fn begin<C: ProvisioningChannelPort>(&mut self, channel: &mut C) -> Result<(), NetError> {
        info!("provisioning: waiting for credential broadcast");
        channel.start()
    }

    /// Feed one event through the state machine. `Some(terminal)` ends the
    /// session; the caller restarts or recovers accordingly.
    pub fn handle_event<C, W, N, S>(
        &mut self,
        event: Event,
        channel: &mut C,
        wifi: &mut W,
        cloud: &mut N,
        store: &mut CredentialStore<S>,
    ) -> Option<Terminal>
    where
        C: ProvisioningChannelPort,
        W: WifiPort,
        N: CloudPort,
        S: StoragePort,
    {
        match (self.state, event) {
            (State::AwaitingCredentials, Event::CredentialsReady) => {
                self.on_credentials(channel, wifi)
            }
            (State::Connecting, Event::WifiConnected) => self.on_connected(cloud, store),
            (State::Connecting, Event::WifiDisconnected(reason)) => {
                if reason.is_credential_failure() {
                    error!("provisioning: connect rejected ({reason}), resetting");
                    return Some(Terminal::Reset);
                }
                warn!("provisioning: disconnected ({reason}), retrying connect");
                if let Err(e) = wifi.connect() {
                    error!("provisioning: reconnect request failed ({e})");
                    return Some(Terminal::Restart);
                }
                None
            }
            (_, Event::BroadcastAckDone) => {
                // Courtesy shutdown of the broadcast listener; never a
                // state transition.
                debug!("provisioning: broadcast acknowledged, stopping listener");
                channel.stop();
                None
            }
            (state, event) => {
                debug!("provisioning: ignoring {event:?} in {state:?}");
                None
            }
        }
    }

    fn on_credentials<C, W>(&mut self, channel: &mut C, wifi: &mut W) -> Option<Terminal>
    where
        C: ProvisioningChannelPort,
        W: WifiPort,
    {
        let Some(received) = channel.take_credentials() else {
            warn!("provisioning: credential event without a pending payload");
            return None;
        };

        if received.variant != ProtocolVariant::EspTouchV2 {
            // Unknown payload shape; nothing persisted yet, so a plain
            // restart is the safe exit.
            error!(
                "provisioning: unsupported protocol variant {:?}, restarting",
                received.variant
            );
            return Some(Terminal::Restart);
        }

        let creds = received.credentials;
        info!(
            "provisioning: credentials received (ssid={}, room={}, bssid={})",
            creds.ssid,
            creds.room_id,
            if creds.bssid.is_some() { "pinned" } else { "any" }
        );

        if let Err(e) = wifi.apply(&creds).and_then(|()| wifi.connect()) {
            error!("provisioning: could not start connection ({e})");
            return Some(Terminal::Restart);
        }

        self.pending = Some(creds);
        self.state = State::Connecting;
        None
    }

    fn on_connected<N, S>(
        &mut self,
        cloud: &mut N,
        store: &mut CredentialStore<S>,
    ) -> Option<Terminal>
    where
        N: CloudPort,
        S: StoragePort,
    {
        let Some(creds) = self.pending.take() else {
            error!("provisioning: connected with no pending credentials");
            return Some(Terminal::Restart);
        };

        self.state = State::Registering;
        info!("provisioning: registering device in room {}", creds.room_id);

        let device_id = match cloud.register_device(&creds.room_id) {
            Ok(resp) if resp.status == 200 => match parse_device_id(&resp.body) {
                Some(id) => id,
                None => {
                    error!("provisioning: no device id in registration response");
                    return Some(Terminal::Reset);
                }
            },
            Ok(resp) => {
                error!("provisioning: registration returned status {}", resp.status);
                return Some(Terminal::Reset);
            }
            Err(e) => {
                error!("provisioning: registration call failed ({e})");
                return Some(Terminal::Reset);
            }
        };

        self.state = State::Persisting;
        let identity = DeviceIdentity::from_provisioning(&creds, device_id);
        match store.save(&identity) {
            Ok(()) => {
                info!("provisioning: complete, restarting into operational mode");
                Some(Terminal::Restart)
            }
            Err(e) => {
                error!("provisioning: could not persist identity ({e})");
                Some(Terminal::Reset)
            }
        }
    }
}
