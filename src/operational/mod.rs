//! Operational mode: supervise connectivity, run the two workers.
//!
//! The controller itself is a small connectivity-driven supervisor.
//! Worker lifecycles hang off network events alone: a connected event
//! starts the telemetry publisher and the stream consumer (once, never
//! twice concurrently), a disconnect tears both down. The workers do
//! their own I/O loops in [`telemetry`] and [`stream`]; the controller
//! only decides *whether* they should be running.

pub mod stream;
pub mod telemetry;

use log::{debug, info, warn};

use crate::events::Event;

/// Why the workers are being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Transient disconnect: stop workers, request a reconnect.
    Reconnect,
    /// Credential-flavoured disconnect: stop workers, run recovery.
    Recover,
}

/// What the control loop should do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Spawn the telemetry publisher and the stream consumer.
    StartWorkers,
    /// Stop both workers, then reconnect or recover.
    StopWorkers(Teardown),
    None,
}

/// Connectivity supervisor for the provisioned device.
#[derive(Debug, Default)]
pub struct OperationalController {
    workers_running: bool,
}

impl OperationalController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers_running(&self) -> bool {
        self.workers_running
    }

    pub fn handle_event(&mut self, event: Event) -> Action {
        match event {
            Event::WifiConnected => {
                if self.workers_running {
                    // Duplicate got-IP notifications happen (DHCP renew);
                    // the workers must never be started twice.
                    debug!("operational: already running, ignoring connect event");
                    return Action::None;
                }
                info!("operational: connected, starting workers");
                self.workers_running = true;
                Action::StartWorkers
            }
            Event::WifiDisconnected(reason) => {
                self.workers_running = false;
                if reason.is_credential_failure() {
                    warn!("operational: disconnected ({reason}), recovering");
                    Action::StopWorkers(Teardown::Recover)
                } else {
                    warn!("operational: disconnected ({reason}), reconnecting");
                    Action::StopWorkers(Teardown::Reconnect)
                }
            }
            other => {
                debug!("operational: ignoring {other:?}");
                Action::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DisconnectReason;

    #[test]
    fn connect_starts_workers_exactly_once() {
        let mut ctl = OperationalController::new();
        assert_eq!(ctl.handle_event(Event::WifiConnected), Action::StartWorkers);
        assert!(ctl.workers_running());
        // A second got-IP must not start a second set.
        assert_eq!(ctl.handle_event(Event::WifiConnected), Action::None);
    }

    #[test]
    fn transient_disconnect_stops_and_reconnects() {
        let mut ctl = OperationalController::new();
        ctl.handle_event(Event::WifiConnected);
        assert_eq!(
            ctl.handle_event(Event::WifiDisconnected(DisconnectReason::Other(8))),
            Action::StopWorkers(Teardown::Reconnect)
        );
        assert!(!ctl.workers_running());
        // Reconnect then restarts them.
        assert_eq!(ctl.handle_event(Event::WifiConnected), Action::StartWorkers);
    }

    #[test]
    fn credential_disconnect_recovers() {
        let mut ctl = OperationalController::new();
        ctl.handle_event(Event::WifiConnected);
        assert_eq!(
            ctl.handle_event(Event::WifiDisconnected(DisconnectReason::AuthFailed)),
            Action::StopWorkers(Teardown::Recover)
        );
    }

    #[test]
    fn unrelated_events_do_nothing() {
        let mut ctl = OperationalController::new();
        assert_eq!(ctl.handle_event(Event::CredentialsReady), Action::None);
        assert_eq!(ctl.handle_event(Event::BroadcastAckDone), Action::None);
    }
}
