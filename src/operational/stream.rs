//! Command stream consumer: a forever-loop that keeps a streaming GET
//! open against the device's command path and drives the lamp from what
//! arrives.
//!
//! One *session* is one open-read-until-closed pass; [`run_consumer`]
//! reopens sessions with a constant delay until torn down. The delay is
//! deliberately constant (no backoff growth) so a flapping connection
//! costs responsiveness, not availability.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use log::{debug, error, info, warn};

use crate::app::ports::{CommandStreamPort, LightPort, RecoveryPort, StreamOpen, StreamRead};
use crate::command;

/// How one stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Stream closed or errored; reopen after the retry delay.
    Closed,
    /// Could not open at all; same retry handling.
    OpenFailed,
    /// 404 on open: the device record is gone server-side. Recovery has
    /// been requested; the worker must exit.
    Recovered,
    /// The stop flag was raised mid-session.
    Stopped,
}

/// Run one session: open, consume until the stream dies or the worker is
/// stopped, close.
pub fn run_session<St, L, R>(
    stream: &mut St,
    light: &mut L,
    recovery: &R,
    room_id: &str,
    device_id: &str,
    stop: &AtomicBool,
) -> SessionEnd
where
    St: CommandStreamPort,
    L: LightPort,
    R: RecoveryPort,
{
    match stream.open(room_id, device_id) {
        Ok(StreamOpen::Ok) => {}
        Ok(StreamOpen::NotFound) => {
            error!("stream: 404 on open, device record deleted server-side");
            stream.close();
            recovery.request_recovery();
            return SessionEnd::Recovered;
        }
        Ok(StreamOpen::Failed(status)) => {
            warn!("stream: open returned status {status}");
            stream.close();
            return SessionEnd::OpenFailed;
        }
        Err(e) => {
            warn!("stream: open failed ({e})");
            stream.close();
            return SessionEnd::OpenFailed;
        }
    }

    // First-byte latency is behind us; steady-state reads are cheap.
    stream.shorten_read_timeout();
    info!("stream: open, listening for commands");

    let end = loop {
        if stop.load(Ordering::Acquire) {
            break SessionEnd::Stopped;
        }
        match stream.read() {
            StreamRead::Empty => {}
            StreamRead::Heartbeat => {
                debug!("stream: heartbeat");
            }
            StreamRead::Data(chunk) => {
                if let Some(color) = command::parse(&chunk) {
                    debug!(
                        "stream: applying colour #{:02X}{:02X}{:02X}",
                        color.red, color.green, color.blue
                    );
                    light.set_color(color);
                }
            }
            StreamRead::Closed => {
                debug!("stream: closed by peer");
                break SessionEnd::Closed;
            }
            StreamRead::Error(e) => {
                warn!("stream: read failed ({e})");
                break SessionEnd::Closed;
            }
        }
    };

    stream.close();
    end
}

/// Worker loop: sessions forever, constant reopen delay, until stopped or
/// recovery fires.
pub fn run_consumer<St, L, R>(
    stream: &mut St,
    light: &mut L,
    recovery: &R,
    room_id: &str,
    device_id: &str,
    retry_delay: Duration,
    stop: &AtomicBool,
) where
    St: CommandStreamPort,
    L: LightPort,
    R: RecoveryPort,
{
    while !stop.load(Ordering::Acquire) {
        match run_session(stream, light, recovery, room_id, device_id, stop) {
            SessionEnd::Recovered => return,
            SessionEnd::Stopped => break,
            SessionEnd::Closed | SessionEnd::OpenFailed => {
                sleep_interruptibly(retry_delay, stop);
            }
        }
    }
    debug!("stream: worker stopped");
}

fn sleep_interruptibly(total: Duration, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() && !stop.load(Ordering::Acquire) {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
