//! DHT11 temperature/humidity sensor driver (single-wire, bit-banged).
//!
//! A read is start-pulse, response handshake, then 40 data bits timed by
//! high-pulse width, finished with a checksum over the four data bytes.
//! Any timing or checksum failure is reported through the reading's
//! `status` flag rather than an error type: the telemetry cycle treats a
//! bad sample as "skip this cycle" by contract.

#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::{SensorPort, SensorReading};

/// Driver status codes carried in [`SensorReading::status`].
const STATUS_OK: i32 = 0;
const STATUS_TIMEOUT: i32 = -1;
const STATUS_CHECKSUM: i32 = -2;

pub struct DhtSensor {
    gpio: i32,
    #[cfg(not(target_os = "espidf"))]
    sim_counter: u32,
}

impl DhtSensor {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            #[cfg(not(target_os = "espidf"))]
            sim_counter: 0,
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    #[cfg(target_os = "espidf")]
    fn read_raw(&self) -> Result<[u8; 5], i32> {
        use esp_idf_svc::sys;

        /// Wait for the line to reach `level`, bounded in microseconds.
        /// Returns the time waited, or Err on timeout.
        fn wait_level(gpio: i32, level: i32, timeout_us: i64) -> Result<i64, i32> {
            // SAFETY: plain GPIO reads on a configured pin.
            let start = unsafe { sys::esp_timer_get_time() };
            loop {
                if unsafe { sys::gpio_get_level(gpio) } == level {
                    return Ok(unsafe { sys::esp_timer_get_time() } - start);
                }
                if unsafe { sys::esp_timer_get_time() } - start > timeout_us {
                    return Err(STATUS_TIMEOUT);
                }
            }
        }

        // SAFETY: single-task access to the sensor pin; delays are busy
        // waits as the protocol's timings are below tick resolution.
        unsafe {
            // Start pulse: pull low >=18ms, release.
            sys::gpio_set_direction(self.gpio, sys::gpio_mode_t_GPIO_MODE_OUTPUT);
            sys::gpio_set_level(self.gpio, 0);
            sys::esp_rom_delay_us(20_000);
            sys::gpio_set_level(self.gpio, 1);
            sys::esp_rom_delay_us(40);
            sys::gpio_set_direction(self.gpio, sys::gpio_mode_t_GPIO_MODE_INPUT);
        }

        // Response handshake: ~80us low, ~80us high.
        wait_level(self.gpio, 0, 100)?;
        wait_level(self.gpio, 1, 100)?;
        wait_level(self.gpio, 0, 100)?;

        let mut data = [0u8; 5];
        for bit in 0..40 {
            // 50us low preamble, then high: ~27us = 0, ~70us = 1.
            wait_level(self.gpio, 1, 70)?;
            let high_us = wait_level(self.gpio, 0, 100)?;
            if high_us > 40 {
                data[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        Ok(data)
    }
}

impl SensorPort for DhtSensor {
    fn read(&mut self) -> SensorReading {
        #[cfg(target_os = "espidf")]
        {
            match self.read_raw() {
                Ok(data) => {
                    let sum = data[0]
                        .wrapping_add(data[1])
                        .wrapping_add(data[2])
                        .wrapping_add(data[3]);
                    if sum != data[4] {
                        warn!("dht: checksum mismatch");
                        return SensorReading {
                            temperature_c: 0,
                            humidity_pct: 0,
                            status: STATUS_CHECKSUM,
                        };
                    }
                    SensorReading {
                        temperature_c: i32::from(data[2]),
                        humidity_pct: u32::from(data[0]),
                        status: STATUS_OK,
                    }
                }
                Err(status) => {
                    warn!("dht: read timed out");
                    SensorReading {
                        temperature_c: 0,
                        humidity_pct: 0,
                        status,
                    }
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.sim_counter = self.sim_counter.wrapping_add(1);
            // Every 8th sample fails to exercise the skip path.
            if self.sim_counter % 8 == 0 {
                return SensorReading {
                    temperature_c: 0,
                    humidity_pct: 0,
                    status: STATUS_TIMEOUT,
                };
            }
            // Slow oscillation around a plausible room climate.
            let wobble = (self.sim_counter % 5) as i32 - 2;
            SensorReading {
                temperature_c: 22 + wobble,
                humidity_pct: (45 + wobble * 2) as u32,
                status: STATUS_OK,
            }
        }
    }
}
