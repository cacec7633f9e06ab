//! Telemetry publisher: one sensor sample per cycle, pushed to the
//! device's telemetry path.
//!
//! The cycle logic is a pure function over the ports so it can be tested
//! without threads; [`run_publisher`] wraps it in the long-running worker
//! loop with the fixed inter-cycle delay.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use log::{debug, error, warn};

use crate::app::ports::{CloudPort, RecoveryPort, SensorPort};

/// Result of one publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Sensor reading invalid; nothing sent, nothing wrong.
    Skipped,
    /// Reading published, server accepted it.
    Published,
    /// 401 from the server: this device's registration was revoked.
    Revoked,
    /// Transient failure, logged; the next cycle retries naturally.
    Failed,
}

/// One sample-and-publish cycle.
pub fn telemetry_cycle<Se, C>(
    sensor: &mut Se,
    cloud: &mut C,
    room_id: &str,
    device_id: &str,
) -> CycleOutcome
where
    Se: SensorPort,
    C: CloudPort,
{
    let reading = sensor.read();
    if !reading.is_valid() {
        debug!("telemetry: invalid reading (status {}), skipping", reading.status);
        return CycleOutcome::Skipped;
    }

    match cloud.publish_telemetry(room_id, device_id, &reading) {
        Ok(status) if (200..300).contains(&status) => {
            debug!(
                "telemetry: published {}°C / {}%",
                reading.temperature_c, reading.humidity_pct
            );
            CycleOutcome::Published
        }
        Ok(401) => {
            error!("telemetry: 401, device registration revoked");
            CycleOutcome::Revoked
        }
        Ok(status) => {
            warn!("telemetry: publish returned status {status}");
            CycleOutcome::Failed
        }
        Err(e) => {
            warn!("telemetry: publish failed ({e})");
            CycleOutcome::Failed
        }
    }
}

/// Worker loop. Runs until the stop flag is raised or the server revokes
/// the device, in which case it requests recovery and exits.
pub fn run_publisher<Se, C, R>(
    sensor: &mut Se,
    cloud: &mut C,
    recovery: &R,
    room_id: &str,
    device_id: &str,
    interval: Duration,
    stop: &AtomicBool,
) where
    Se: SensorPort,
    C: CloudPort,
    R: RecoveryPort,
{
    while !stop.load(Ordering::Acquire) {
        if telemetry_cycle(sensor, cloud, room_id, device_id) == CycleOutcome::Revoked {
            recovery.request_recovery();
            return;
        }
        sleep_interruptibly(interval, stop);
    }
    debug!("telemetry: worker stopped");
}

/// Sleep in short slices so a teardown does not wait out a full interval.
fn sleep_interruptibly(total: Duration, stop: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while !remaining.is_zero() && !stop.load(Ordering::Acquire) {
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{RegisterResponse, SensorReading};
    use crate::error::NetError;

    struct FakeSensor {
        reading: SensorReading,
    }

    impl SensorPort for FakeSensor {
        fn read(&mut self) -> SensorReading {
            self.reading
        }
    }

    struct FakeCloud {
        response: Result<u16, NetError>,
        publishes: Vec<SensorReading>,
    }

    impl CloudPort for FakeCloud {
        fn register_device(&mut self, _: &str) -> Result<RegisterResponse, NetError> {
            unreachable!("registration is not part of telemetry")
        }
        fn publish_telemetry(
            &mut self,
            _: &str,
            _: &str,
            reading: &SensorReading,
        ) -> Result<u16, NetError> {
            self.publishes.push(*reading);
            self.response.clone()
        }
    }

    fn valid_reading() -> SensorReading {
        SensorReading {
            temperature_c: 23,
            humidity_pct: 45,
            status: 0,
        }
    }

    #[test]
    fn invalid_reading_publishes_nothing() {
        let mut sensor = FakeSensor {
            reading: SensorReading {
                temperature_c: 0,
                humidity_pct: 0,
                status: -1,
            },
        };
        let mut cloud = FakeCloud {
            response: Ok(200),
            publishes: Vec::new(),
        };
        let outcome = telemetry_cycle(&mut sensor, &mut cloud, "room", "dev");
        assert_eq!(outcome, CycleOutcome::Skipped);
        assert!(cloud.publishes.is_empty());
    }

    #[test]
    fn valid_reading_publishes() {
        let mut sensor = FakeSensor { reading: valid_reading() };
        let mut cloud = FakeCloud {
            response: Ok(200),
            publishes: Vec::new(),
        };
        assert_eq!(
            telemetry_cycle(&mut sensor, &mut cloud, "room", "dev"),
            CycleOutcome::Published
        );
        assert_eq!(cloud.publishes, vec![valid_reading()]);
    }

    #[test]
    fn revocation_is_terminal_for_the_cycle() {
        let mut sensor = FakeSensor { reading: valid_reading() };
        let mut cloud = FakeCloud {
            response: Ok(401),
            publishes: Vec::new(),
        };
        assert_eq!(
            telemetry_cycle(&mut sensor, &mut cloud, "room", "dev"),
            CycleOutcome::Revoked
        );
    }

    #[test]
    fn other_failures_are_transient() {
        for response in [Ok(500), Ok(404), Err(NetError::Timeout)] {
            let mut sensor = FakeSensor { reading: valid_reading() };
            let mut cloud = FakeCloud {
                response,
                publishes: Vec::new(),
            };
            assert_eq!(
                telemetry_cycle(&mut sensor, &mut cloud, "room", "dev"),
                CycleOutcome::Failed
            );
        }
    }

    struct CountingRecovery {
        count: core::cell::Cell<u32>,
    }

    impl RecoveryPort for CountingRecovery {
        fn request_recovery(&self) {
            self.count.set(self.count.get() + 1);
        }
    }

    #[test]
    fn revoked_worker_requests_recovery_once_and_exits() {
        let mut sensor = FakeSensor { reading: valid_reading() };
        let mut cloud = FakeCloud {
            response: Ok(401),
            publishes: Vec::new(),
        };
        let recovery = CountingRecovery {
            count: core::cell::Cell::new(0),
        };
        let stop = AtomicBool::new(false);
        run_publisher(
            &mut sensor,
            &mut cloud,
            &recovery,
            "room",
            "dev",
            Duration::from_millis(1),
            &stop,
        );
        // Returned without the stop flag: exactly one publish, one recovery.
        assert_eq!(cloud.publishes.len(), 1);
        assert_eq!(recovery.count.get(), 1);
    }

    #[test]
    fn raised_stop_flag_prevents_any_cycle() {
        let mut sensor = FakeSensor { reading: valid_reading() };
        let mut cloud = FakeCloud {
            response: Ok(200),
            publishes: Vec::new(),
        };
        let recovery = CountingRecovery {
            count: core::cell::Cell::new(0),
        };
        let stop = AtomicBool::new(true);
        run_publisher(
            &mut sensor,
            &mut cloud,
            &recovery,
            "room",
            "dev",
            Duration::from_millis(1),
            &stop,
        );
        assert!(cloud.publishes.is_empty());
    }
}
