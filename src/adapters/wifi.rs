//! WiFi station adapter.
//!
//! Implements [`WifiPort`]. Connection outcomes never come back through
//! the port calls: the IDF raises them asynchronously, and the raw event
//! handlers here translate them into ring events (got-IP becomes
//! [`Event::WifiConnected`], a disconnect carries its supplicant reason
//! code). The host backend fakes the same notification pattern so the
//! control loop behaves identically under test.

use log::{info, warn};

use crate::app::ports::WifiPort;
use crate::error::NetError;
use crate::identity::NetworkCredentials;

#[cfg(target_os = "espidf")]
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::modem::Modem,
    sys,
    wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi},
};

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate(creds: &NetworkCredentials) -> Result<(), NetError> {
    if creds.ssid.is_empty() || !is_printable_ascii(&creds.ssid) {
        warn!("wifi: rejecting invalid SSID");
        return Err(NetError::ConnectFailed);
    }
    if !creds.password.is_empty() && creds.password.len() < 8 {
        warn!("wifi: rejecting short WPA2 password");
        return Err(NetError::ConnectFailed);
    }
    Ok(())
}

pub struct WifiAdapter {
    #[cfg(target_os = "espidf")]
    driver: EspWifi<'static>,
    #[cfg(target_os = "espidf")]
    started: bool,
    #[cfg(not(target_os = "espidf"))]
    applied: Option<NetworkCredentials>,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    /// Bring up the station driver. Connection events are delivered
    /// through [`register_event_handlers`], which must be called once
    /// before `connect`.
    pub fn new(modem: Modem, sysloop: EspSystemEventLoop) -> Result<Self, NetError> {
        let driver = EspWifi::new(modem, sysloop, None).map_err(|e| {
            warn!("wifi: driver init failed ({e})");
            NetError::Io
        })?;
        Ok(Self {
            driver,
            started: false,
        })
    }

    /// Start the station driver without connecting. The smartconfig
    /// receiver needs a running station to listen on.
    pub fn start(&mut self) -> Result<(), NetError> {
        if self.started {
            return Ok(());
        }
        self.driver.start().map_err(|e| {
            warn!("wifi: start failed ({e})");
            NetError::Io
        })?;
        self.started = true;
        Ok(())
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    pub fn new() -> Self {
        info!("wifi: simulation backend");
        Self { applied: None }
    }

    pub fn applied_credentials(&self) -> Option<&NetworkCredentials> {
        self.applied.as_ref()
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl WifiPort for WifiAdapter {
    fn apply(&mut self, creds: &NetworkCredentials) -> Result<(), NetError> {
        validate(creds)?;

        #[cfg(target_os = "espidf")]
        {
            let config = ClientConfiguration {
                ssid: creds.ssid.clone(),
                password: creds.password.clone(),
                bssid: creds.bssid,
                auth_method: if creds.password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..ClientConfiguration::default()
            };
            self.driver
                .set_configuration(&Configuration::Client(config))
                .map_err(|e| {
                    warn!("wifi: set_configuration failed ({e})");
                    NetError::Io
                })?;
            info!(
                "wifi: station configured (ssid={}, bssid={})",
                creds.ssid,
                if creds.bssid.is_some() { "pinned" } else { "any" }
            );
            Ok(())
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("wifi(sim): station configured (ssid={})", creds.ssid);
            self.applied = Some(creds.clone());
            Ok(())
        }
    }

    fn connect(&mut self) -> Result<(), NetError> {
        #[cfg(target_os = "espidf")]
        {
            self.start()?;
            self.driver.connect().map_err(|e| {
                warn!("wifi: connect request failed ({e})");
                NetError::ConnectFailed
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            if self.applied.is_none() {
                return Err(NetError::ConnectFailed);
            }
            // The real stack reports the outcome asynchronously; the
            // simulation reports instant success the same way.
            info!("wifi(sim): connect requested");
            crate::events::push_event(crate::events::Event::WifiConnected);
            Ok(())
        }
    }

    fn disconnect(&mut self) {
        #[cfg(target_os = "espidf")]
        if let Err(e) = self.driver.disconnect() {
            warn!("wifi: disconnect failed ({e})");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("wifi(sim): disconnected");
    }
}

// ── Raw event bridge ───────────────────────────────────────────
//
// The supplicant's disconnect reason code only surfaces through the raw
// C event payload, so the bridge registers against the IDF event loop
// directly instead of going through the wrapped subscription API.

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_wifi_event(
    _arg: *mut core::ffi::c_void,
    _base: sys::esp_event_base_t,
    event_id: i32,
    event_data: *mut core::ffi::c_void,
) {
    use crate::error::DisconnectReason;
    use crate::events::{Event, push_event};

    if event_id == sys::wifi_event_t_WIFI_EVENT_STA_DISCONNECTED as i32 {
        // SAFETY: the IDF guarantees event_data points at a
        // wifi_event_sta_disconnected_t for this event id.
        let reason = unsafe {
            (*event_data.cast::<sys::wifi_event_sta_disconnected_t>()).reason as u8
        };
        push_event(Event::WifiDisconnected(DisconnectReason::from_code(reason)));
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_ip_event(
    _arg: *mut core::ffi::c_void,
    _base: sys::esp_event_base_t,
    event_id: i32,
    _event_data: *mut core::ffi::c_void,
) {
    use crate::events::{Event, push_event};

    if event_id == sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32 {
        push_event(Event::WifiConnected);
    }
}

/// Register the WiFi/IP event handlers that feed the ring. Call once,
/// after the default event loop exists.
#[cfg(target_os = "espidf")]
pub fn register_event_handlers() -> Result<(), NetError> {
    // SAFETY: handler registration against the default loop; the handlers
    // only touch the lock-free ring.
    let ret = unsafe {
        sys::esp_event_handler_register(
            sys::WIFI_EVENT,
            sys::ESP_EVENT_ANY_ID,
            Some(on_wifi_event),
            core::ptr::null_mut(),
        )
    };
    if ret != sys::ESP_OK {
        return Err(NetError::Io);
    }
    let ret = unsafe {
        sys::esp_event_handler_register(
            sys::IP_EVENT,
            sys::ip_event_t_IP_EVENT_STA_GOT_IP as i32,
            Some(on_ip_event),
            core::ptr::null_mut(),
        )
    };
    if ret != sys::ESP_OK {
        return Err(NetError::Io);
    }
    Ok(())
}
