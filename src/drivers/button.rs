//! Hard-reset button driver.
//!
//! Active-low momentary switch with pull-up. The falling-edge ISR only
//! records a timestamp into an atomic; `tick()`, called from the control
//! loop, debounces it and reports the press. The driver never touches
//! storage or the network itself.

use core::sync::atomic::{AtomicU32, Ordering};

const DEBOUNCE_MS: u32 = 50;

/// Raw ISR timestamp (milliseconds since boot, truncated to u32).
/// Written by the ISR, read by the control loop. Zero means "never".
static BUTTON_ISR_TIMESTAMP: AtomicU32 = AtomicU32::new(0);

pub struct ButtonDriver {
    gpio: i32,
    last_handled_ms: u32,
}

impl ButtonDriver {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            last_handled_ms: 0,
        }
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Call from the control loop. Returns `true` once per debounced
    /// press.
    pub fn tick(&mut self) -> bool {
        let isr_ms = BUTTON_ISR_TIMESTAMP.load(Ordering::Acquire);
        if isr_ms == 0 || isr_ms == self.last_handled_ms {
            return false;
        }
        if isr_ms.wrapping_sub(self.last_handled_ms) < DEBOUNCE_MS && self.last_handled_ms != 0 {
            // Bounce from the same physical press.
            self.last_handled_ms = isr_ms;
            return false;
        }
        self.last_handled_ms = isr_ms;
        true
    }

    /// Configure the GPIO and attach the falling-edge ISR.
    #[cfg(target_os = "espidf")]
    pub fn install_isr(&self) -> Result<(), crate::error::Error> {
        use esp_idf_svc::sys;

        let config = sys::gpio_config_t {
            pin_bit_mask: 1u64 << self.gpio,
            mode: sys::gpio_mode_t_GPIO_MODE_INPUT,
            pull_up_en: sys::gpio_pullup_t_GPIO_PULLUP_ENABLE,
            pull_down_en: sys::gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
            intr_type: sys::gpio_int_type_t_GPIO_INTR_NEGEDGE,
        };
        // SAFETY: one-time GPIO configuration from the main task; the ISR
        // handler only performs an atomic store.
        unsafe {
            if sys::gpio_config(&config) != sys::ESP_OK {
                return Err(crate::error::Error::Init("button gpio config failed"));
            }
            // Service may already be installed by another driver.
            let ret = sys::gpio_install_isr_service(0);
            if ret != sys::ESP_OK && ret != sys::ESP_ERR_INVALID_STATE {
                return Err(crate::error::Error::Init("isr service install failed"));
            }
            if sys::gpio_isr_handler_add(self.gpio, Some(button_isr), core::ptr::null_mut())
                != sys::ESP_OK
            {
                return Err(crate::error::Error::Init("button isr add failed"));
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_isr(_arg: *mut core::ffi::c_void) {
    // SAFETY: esp_timer_get_time is ISR-safe; the store is lock-free.
    let now_ms = (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u32;
    // Avoid the "never pressed" sentinel.
    BUTTON_ISR_TIMESTAMP.store(now_ms.max(1), Ordering::Release);
}

/// Test/simulation hook mirroring the ISR store.
#[cfg(not(target_os = "espidf"))]
pub fn simulate_press(now_ms: u32) {
    BUTTON_ISR_TIMESTAMP.store(now_ms.max(1), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_isr() {
        BUTTON_ISR_TIMESTAMP.store(0, Ordering::SeqCst);
    }

    #[test]
    fn no_press_no_event() {
        let _guard = crate::events::testing::exclusive();
        reset_isr();
        let mut btn = ButtonDriver::new(crate::pins::RESET_BUTTON_GPIO);
        assert!(!btn.tick());
        assert!(!btn.tick());
    }

    #[test]
    fn press_reported_once() {
        let _guard = crate::events::testing::exclusive();
        reset_isr();
        let mut btn = ButtonDriver::new(crate::pins::RESET_BUTTON_GPIO);
        simulate_press(1_000);
        assert!(btn.tick());
        // Same timestamp does not re-trigger.
        assert!(!btn.tick());
    }

    #[test]
    fn bounce_within_debounce_window_swallowed() {
        let _guard = crate::events::testing::exclusive();
        reset_isr();
        let mut btn = ButtonDriver::new(crate::pins::RESET_BUTTON_GPIO);
        simulate_press(1_000);
        assert!(btn.tick());
        simulate_press(1_020);
        assert!(!btn.tick());
        // A later distinct press is reported again.
        simulate_press(2_000);
        assert!(btn.tick());
    }
}
