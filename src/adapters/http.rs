//! HTTP adapter over the IDF's `esp_http_client`.
//!
//! Two halves: [`HttpCloud`] for the request/response calls (device
//! registration, telemetry PATCH) and [`HttpCommandStream`] for the
//! long-lived streaming GET. Both build their URLs from the configured
//! database root and the identity's room/device path segments.
//!
//! The raw client is used in its open/write/fetch/read form rather than
//! `perform`, matching the streaming half and keeping response bodies in
//! fixed buffers.

use core::fmt::Write as _;
use std::ffi::CString;

use log::warn;

use crate::app::ports::{
    CloudPort, CommandStreamPort, MAX_REGISTER_BODY, RegisterResponse, STREAM_CHUNK_CAP,
    SensorReading, StreamOpen, StreamRead,
};
use crate::config::SystemConfig;
use crate::error::NetError;

use esp_idf_svc::sys;

const MAX_URL_LEN: usize = 192;

type Url = heapless::String<MAX_URL_LEN>;

fn registration_url(root: &str, room_id: &str) -> Result<Url, NetError> {
    let mut url = Url::new();
    write!(url, "{root}/{room_id}/devices_map.json").map_err(|_| NetError::RequestFailed)?;
    Ok(url)
}

fn telemetry_url(root: &str, room_id: &str, device_id: &str) -> Result<Url, NetError> {
    let mut url = Url::new();
    write!(url, "{root}/{room_id}/devices_map/{device_id}/sensors.json")
        .map_err(|_| NetError::RequestFailed)?;
    Ok(url)
}

fn stream_url(root: &str, room_id: &str, device_id: &str) -> Result<Url, NetError> {
    let mut url = Url::new();
    write!(url, "{root}/{room_id}/devices_map/{device_id}/controllable.json")
        .map_err(|_| NetError::RequestFailed)?;
    Ok(url)
}

struct Client {
    handle: sys::esp_http_client_handle_t,
}

impl Client {
    fn new(url: &str, method: sys::esp_http_client_method_t, timeout_ms: u32) -> Result<Self, NetError> {
        let url_c = CString::new(url).map_err(|_| NetError::RequestFailed)?;
        let config = sys::esp_http_client_config_t {
            url: url_c.as_ptr(),
            method,
            timeout_ms: timeout_ms as i32,
            ..Default::default()
        };
        // SAFETY: the client copies the config (including the url) during
        // init; url_c outlives the call.
        let handle = unsafe { sys::esp_http_client_init(&config) };
        if handle.is_null() {
            return Err(NetError::ConnectFailed);
        }
        Ok(Self { handle })
    }

    fn set_header(&mut self, name: &str, value: &str) -> Result<(), NetError> {
        let name_c = CString::new(name).map_err(|_| NetError::RequestFailed)?;
        let value_c = CString::new(value).map_err(|_| NetError::RequestFailed)?;
        let ret =
            unsafe { sys::esp_http_client_set_header(self.handle, name_c.as_ptr(), value_c.as_ptr()) };
        if ret != sys::ESP_OK {
            return Err(NetError::RequestFailed);
        }
        Ok(())
    }

    fn open(&mut self, body_len: usize) -> Result<(), NetError> {
        let ret = unsafe { sys::esp_http_client_open(self.handle, body_len as i32) };
        if ret != sys::ESP_OK {
            return Err(NetError::ConnectFailed);
        }
        Ok(())
    }

    fn write_all(&mut self, body: &[u8]) -> Result<(), NetError> {
        let written = unsafe {
            sys::esp_http_client_write(self.handle, body.as_ptr().cast(), body.len() as i32)
        };
        if written != body.len() as i32 {
            return Err(NetError::RequestFailed);
        }
        Ok(())
    }

    fn fetch_status(&mut self) -> Result<u16, NetError> {
        if unsafe { sys::esp_http_client_fetch_headers(self.handle) } < 0 {
            return Err(NetError::RequestFailed);
        }
        let status = unsafe { sys::esp_http_client_get_status_code(self.handle) };
        u16::try_from(status).map_err(|_| NetError::RequestFailed)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let n = unsafe {
            sys::esp_http_client_read(self.handle, buf.as_mut_ptr().cast(), buf.len() as i32)
        };
        if let Ok(len) = usize::try_from(n) {
            return Ok(len);
        }
        // Depending on the IDF version an idle receive window surfaces
        // as EAGAIN instead of a zero-length read.
        if n == -(sys::ESP_ERR_HTTP_EAGAIN as i32) {
            return Err(NetError::Timeout);
        }
        Err(NetError::Io)
    }

    fn is_chunked(&self) -> bool {
        unsafe { sys::esp_http_client_is_chunked_response(self.handle) }
    }

    fn set_timeout_ms(&mut self, timeout_ms: u32) {
        unsafe { sys::esp_http_client_set_timeout_ms(self.handle, timeout_ms as i32) };
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        // SAFETY: close before cleanup; both tolerate an unopened client.
        unsafe {
            sys::esp_http_client_close(self.handle);
            sys::esp_http_client_cleanup(self.handle);
        }
    }
}

// ── Request/response half ──────────────────────────────────────

pub struct HttpCloud {
    config: SystemConfig,
}

impl HttpCloud {
    pub fn new(config: SystemConfig) -> Self {
        Self { config }
    }

    fn send_json(
        &self,
        url: &str,
        method: sys::esp_http_client_method_t,
        body: &[u8],
        response: &mut [u8],
    ) -> Result<(u16, usize), NetError> {
        let mut client = Client::new(url, method, self.config.stream_initial_timeout_ms)?;
        client.set_header("Content-Type", "application/json")?;
        client.open(body.len())?;
        client.write_all(body)?;
        let status = client.fetch_status()?;
        let len = client.read(response)?;
        Ok((status, len))
    }
}

impl CloudPort for HttpCloud {
    fn register_device(&mut self, room_id: &str) -> Result<RegisterResponse, NetError> {
        let url = registration_url(&self.config.db_root_url, room_id)?;
        let body = serde_json::json!({ "registered": true }).to_string();

        let mut buf = [0u8; MAX_REGISTER_BODY];
        let (status, len) = self.send_json(
            &url,
            sys::esp_http_client_method_t_HTTP_METHOD_POST,
            body.as_bytes(),
            &mut buf,
        )?;

        Ok(RegisterResponse {
            status,
            body: heapless::Vec::from_slice(&buf[..len]).map_err(|()| NetError::RequestFailed)?,
        })
    }

    fn publish_telemetry(
        &mut self,
        room_id: &str,
        device_id: &str,
        reading: &SensorReading,
    ) -> Result<u16, NetError> {
        let url = telemetry_url(&self.config.db_root_url, room_id, device_id)?;
        let body = serde_json::json!({
            "temperature": reading.temperature_c,
            "humidity": reading.humidity_pct,
        })
        .to_string();

        let mut sink = [0u8; 64];
        let (status, _) = self.send_json(
            &url,
            sys::esp_http_client_method_t_HTTP_METHOD_PATCH,
            body.as_bytes(),
            &mut sink,
        )?;
        Ok(status)
    }
}

// ── Streaming half ─────────────────────────────────────────────

pub struct HttpCommandStream {
    config: SystemConfig,
    client: Option<Client>,
}

impl HttpCommandStream {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }
}

impl CommandStreamPort for HttpCommandStream {
    fn open(&mut self, room_id: &str, device_id: &str) -> Result<StreamOpen, NetError> {
        self.close();

        let url = stream_url(&self.config.db_root_url, room_id, device_id)?;
        let mut client = Client::new(
            &url,
            sys::esp_http_client_method_t_HTTP_METHOD_GET,
            self.config.stream_initial_timeout_ms,
        )?;
        client.set_header("Accept", "text/event-stream")?;
        client.open(0)?;

        let status = client.fetch_status()?;
        let open = match status {
            200 => {
                self.client = Some(client);
                StreamOpen::Ok
            }
            404 => StreamOpen::NotFound,
            other => StreamOpen::Failed(other),
        };
        Ok(open)
    }

    fn read(&mut self) -> StreamRead {
        let Some(client) = self.client.as_mut() else {
            return StreamRead::Closed;
        };
        if !client.is_chunked() {
            return StreamRead::Closed;
        }

        let mut buf = [0u8; STREAM_CHUNK_CAP];
        match client.read(&mut buf) {
            // A quiet window is not a stream failure; keep the session.
            Ok(0) | Err(NetError::Timeout) => StreamRead::Empty,
            Ok(len) if len == self.config.keepalive_chunk_len => StreamRead::Heartbeat,
            Ok(len) => match heapless::Vec::from_slice(&buf[..len]) {
                Ok(chunk) => StreamRead::Data(chunk),
                Err(()) => StreamRead::Error(NetError::Io),
            },
            Err(e) => {
                warn!("http stream: read failed ({e})");
                StreamRead::Error(e)
            }
        }
    }

    fn shorten_read_timeout(&mut self) {
        if let Some(client) = self.client.as_mut() {
            client.set_timeout_ms(self.config.stream_read_timeout_ms);
        }
    }

    fn close(&mut self) {
        // Drop closes and cleans up the handle.
        self.client = None;
    }
}
