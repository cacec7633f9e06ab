//! RGB lamp driver over three LEDC PWM channels.
//!
//! The lamp is a common-anode module: a channel at full duty is *off*,
//! so every 8-bit channel value is inverted before it is scaled to the
//! timer's duty range. `set_color` is the only mutator; the last applied
//! colour is kept for readback.

use std::sync::{Arc, Mutex, PoisonError};

use log::info;
#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::LightPort;
use crate::command::ColorCommand;
use crate::error::Error;
use crate::pins;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys;

/// Full duty for the configured timer resolution.
const MAX_DUTY: u32 = (1 << pins::LED_PWM_RESOLUTION_BITS) - 1;

/// Invert for common anode, then scale 0..=255 onto the duty range.
fn channel_duty(value: u8) -> u32 {
    u32::from(255 - value) * MAX_DUTY / 255
}

pub struct RgbLed {
    current: ColorCommand,
}

#[cfg(target_os = "espidf")]
const CHANNELS: [(u32, i32); 3] = [
    (sys::ledc_channel_t_LEDC_CHANNEL_0, pins::LED_R_GPIO),
    (sys::ledc_channel_t_LEDC_CHANNEL_1, pins::LED_G_GPIO),
    (sys::ledc_channel_t_LEDC_CHANNEL_2, pins::LED_B_GPIO),
];

impl RgbLed {
    /// Configure the LEDC timer and one channel per colour, all off.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            let timer = sys::ledc_timer_config_t {
                speed_mode: sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
                duty_resolution: pins::LED_PWM_RESOLUTION_BITS,
                timer_num: sys::ledc_timer_t_LEDC_TIMER_0,
                freq_hz: pins::LED_PWM_FREQ_HZ,
                ..Default::default()
            };
            // SAFETY: one-time peripheral configuration from the main task.
            if unsafe { sys::ledc_timer_config(&timer) } != sys::ESP_OK {
                return Err(Error::Init("ledc timer config failed"));
            }

            for (channel, gpio) in CHANNELS {
                let config = sys::ledc_channel_config_t {
                    gpio_num: gpio,
                    speed_mode: sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
                    channel,
                    timer_sel: sys::ledc_timer_t_LEDC_TIMER_0,
                    duty: channel_duty(0),
                    ..Default::default()
                };
                if unsafe { sys::ledc_channel_config(&config) } != sys::ESP_OK {
                    return Err(Error::Init("ledc channel config failed"));
                }
            }
        }

        info!("rgb_led: initialised, lamp off");
        Ok(Self {
            current: ColorCommand::default(),
        })
    }

    #[cfg(target_os = "espidf")]
    fn apply_channel(channel: u32, value: u8) {
        // SAFETY: channels were configured in new().
        unsafe {
            if sys::ledc_set_duty(
                sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
                channel,
                channel_duty(value),
            ) != sys::ESP_OK
                || sys::ledc_update_duty(sys::ledc_mode_t_LEDC_LOW_SPEED_MODE, channel)
                    != sys::ESP_OK
            {
                warn!("rgb_led: duty update failed on channel {channel}");
            }
        }
    }
}

/// Clonable handle to a lamp that outlives its workers. LEDC is
/// configured once per boot; a restarted stream worker gets a fresh
/// handle to the same lamp and the last commanded colour stays applied.
#[derive(Clone)]
pub struct SharedRgbLed {
    inner: Arc<Mutex<RgbLed>>,
}

impl SharedRgbLed {
    pub fn new(led: RgbLed) -> Self {
        Self {
            inner: Arc::new(Mutex::new(led)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RgbLed> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LightPort for SharedRgbLed {
    fn set_color(&mut self, color: ColorCommand) {
        self.lock().set_color(color);
    }

    fn color(&self) -> ColorCommand {
        self.lock().color()
    }
}

impl LightPort for RgbLed {
    fn set_color(&mut self, color: ColorCommand) {
        #[cfg(target_os = "espidf")]
        {
            Self::apply_channel(CHANNELS[0].0, color.red);
            Self::apply_channel(CHANNELS[1].0, color.green);
            Self::apply_channel(CHANNELS[2].0, color.blue);
        }

        #[cfg(not(target_os = "espidf"))]
        info!(
            "rgb_led(sim): #{:02X}{:02X}{:02X}",
            color.red, color.green, color.blue
        );

        self.current = color;
    }

    fn color(&self) -> ColorCommand {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_is_inverted_for_common_anode() {
        // Full brightness drives the pin low.
        assert_eq!(channel_duty(255), 0);
        assert_eq!(channel_duty(0), MAX_DUTY);
        // Monotonic in between.
        assert!(channel_duty(64) > channel_duty(192));
    }

    #[test]
    fn shared_handle_survives_worker_restarts() {
        let mut handle = SharedRgbLed::new(RgbLed::new().unwrap());
        let color = ColorCommand { red: 0xAA, green: 0x00, blue: 0x55 };
        handle.set_color(color);

        // A restarted worker holds a fresh clone of the same lamp.
        let restarted = handle.clone();
        assert_eq!(restarted.color(), color);
    }

    #[test]
    fn set_color_is_readable_back() {
        let mut led = RgbLed::new().unwrap();
        let color = ColorCommand { red: 0x12, green: 0x34, blue: 0x56 };
        led.set_color(color);
        assert_eq!(led.color(), color);
    }
}
