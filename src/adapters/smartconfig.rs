//! Smartconfig adapter: the out-of-band credential broadcast receiver.
//!
//! Implements [`ProvisioningChannelPort`]. The IDF delivers smartconfig
//! results on its event-loop task; the handler copies the payload into a
//! process-wide mailbox with explicit bounds (the raw ssid/password
//! arrays are not guaranteed to be terminated) and signals the control
//! loop through the ring. The control loop collects the payload with
//! `take_credentials` at its own pace.

use std::sync::Mutex;

use log::{info, warn};

use crate::app::ports::{ProtocolVariant, ProvisioningChannelPort, ReceivedCredentials};
use crate::error::NetError;
use crate::events::{Event, push_event};
use crate::identity::{MAX_ROOM_ID_LEN, NetworkCredentials};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys;

static MAILBOX: Mutex<Option<ReceivedCredentials>> = Mutex::new(None);

fn deliver(received: ReceivedCredentials) {
    if let Ok(mut slot) = MAILBOX.lock() {
        if slot.replace(received).is_some() {
            warn!("smartconfig: overwriting uncollected credential payload");
        }
    }
    push_event(Event::CredentialsReady);
}

/// Copy a possibly-unterminated byte array into a bounded string,
/// stopping at the first NUL.
fn bounded_text<const N: usize>(raw: &[u8]) -> heapless::String<N> {
    let len = raw
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(raw.len())
        .min(N);
    core::str::from_utf8(&raw[..len])
        .ok()
        .and_then(|s| heapless::String::try_from(s).ok())
        .unwrap_or_default()
}

pub struct SmartconfigAdapter {
    running: bool,
}

impl SmartconfigAdapter {
    pub fn new() -> Self {
        Self { running: false }
    }
}

impl Default for SmartconfigAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProvisioningChannelPort for SmartconfigAdapter {
    fn start(&mut self) -> Result<(), NetError> {
        if self.running {
            return Ok(());
        }

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: registration and start run on the main task before
            // the event loop hands us anything.
            let ret = unsafe {
                sys::esp_event_handler_register(
                    sys::SC_EVENT,
                    sys::ESP_EVENT_ANY_ID,
                    Some(on_sc_event),
                    core::ptr::null_mut(),
                )
            };
            if ret != sys::ESP_OK {
                return Err(NetError::Io);
            }
            if unsafe { sys::esp_smartconfig_set_type(sys::smartconfig_type_t_SC_TYPE_ESPTOUCH_V2) }
                != sys::ESP_OK
            {
                return Err(NetError::Io);
            }
            let config = sys::smartconfig_start_config_t::default();
            if unsafe { sys::esp_smartconfig_start(&config) } != sys::ESP_OK {
                warn!("smartconfig: start failed");
                return Err(NetError::Io);
            }
        }

        info!("smartconfig: listening for credential broadcast");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }

        #[cfg(target_os = "espidf")]
        // SAFETY: stop is idempotent in the IDF.
        unsafe {
            sys::esp_smartconfig_stop();
        }

        info!("smartconfig: stopped");
        self.running = false;
    }

    fn take_credentials(&mut self) -> Option<ReceivedCredentials> {
        MAILBOX.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_sc_event(
    _arg: *mut core::ffi::c_void,
    _base: sys::esp_event_base_t,
    event_id: i32,
    event_data: *mut core::ffi::c_void,
) {
    if event_id == sys::smartconfig_event_t_SC_EVENT_SEND_ACK_DONE as i32 {
        push_event(Event::BroadcastAckDone);
        return;
    }
    if event_id != sys::smartconfig_event_t_SC_EVENT_GOT_SSID_PSWD as i32 {
        return;
    }

    // SAFETY: the IDF guarantees event_data points at a
    // smartconfig_event_got_ssid_pswd_t for this event id.
    let evt = unsafe { &*event_data.cast::<sys::smartconfig_event_got_ssid_pswd_t>() };

    let variant = if evt.type_ == sys::smartconfig_type_t_SC_TYPE_ESPTOUCH_V2 {
        ProtocolVariant::EspTouchV2
    } else {
        ProtocolVariant::Other(evt.type_ as u8)
    };

    // The reserved-data field of the v2 broadcast carries the room id.
    let mut rvd = [0u8; MAX_ROOM_ID_LEN];
    // SAFETY: buffer length is passed alongside the pointer.
    unsafe {
        sys::esp_smartconfig_get_rvd_data(rvd.as_mut_ptr(), rvd.len() as u8);
    }

    let bssid = if evt.bssid_set {
        let mut b = [0u8; 6];
        b.copy_from_slice(&evt.bssid);
        Some(b)
    } else {
        None
    };

    deliver(ReceivedCredentials {
        variant,
        credentials: NetworkCredentials {
            ssid: bounded_text(&evt.ssid),
            password: bounded_text(&evt.password),
            room_id: bounded_text(&rvd),
            bssid,
        },
    });
}

/// Host-side stand-in for the broadcast arriving.
#[cfg(not(target_os = "espidf"))]
pub fn inject_broadcast(received: ReceivedCredentials) {
    deliver(received);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events;

    fn received() -> ReceivedCredentials {
        ReceivedCredentials {
            variant: ProtocolVariant::EspTouchV2,
            credentials: NetworkCredentials {
                ssid: heapless::String::try_from("HomeNet").unwrap(),
                password: heapless::String::try_from("hunter22").unwrap(),
                room_id: heapless::String::try_from("living-room").unwrap(),
                bssid: None,
            },
        }
    }

    #[test]
    fn broadcast_lands_in_mailbox_and_ring() {
        let _guard = events::testing::exclusive();
        while events::pop_event().is_some() {}

        let mut adapter = SmartconfigAdapter::new();
        adapter.start().unwrap();
        inject_broadcast(received());

        assert_eq!(events::pop_event(), Some(Event::CredentialsReady));
        assert_eq!(adapter.take_credentials(), Some(received()));
        // Collected once; the mailbox is now empty.
        assert_eq!(adapter.take_credentials(), None);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut adapter = SmartconfigAdapter::new();
        adapter.start().unwrap();
        adapter.start().unwrap();
        adapter.stop();
        adapter.stop();
    }

    #[test]
    fn bounded_text_stops_at_nul_and_capacity() {
        let raw = *b"HomeNet\0garbage!";
        assert_eq!(bounded_text::<32>(&raw).as_str(), "HomeNet");

        let unterminated = [b'A'; 40];
        assert_eq!(bounded_text::<32>(&unterminated).len(), 32);
    }
}
