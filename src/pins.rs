//! GPIO / peripheral pin assignments for the Glowroom main board.
//!
//! Single source of truth; every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// RGB lamp (common-anode LED on three LEDC channels)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 25;
pub const LED_G_GPIO: i32 = 26;
pub const LED_B_GPIO: i32 = 27;

/// LEDC timer resolution (bits). 13-bit gives 0 – 8191 duty levels.
pub const LED_PWM_RESOLUTION_BITS: u32 = 13;
/// LEDC base frequency for the lamp (5 kHz, flicker-free).
pub const LED_PWM_FREQ_HZ: u32 = 5_000;

// ---------------------------------------------------------------------------
// DHT11 temperature / humidity sensor (single-wire)
// ---------------------------------------------------------------------------

pub const DHT_GPIO: i32 = 19;

// ---------------------------------------------------------------------------
// Hard-reset button (boot button, active-low with internal pull-up)
// ---------------------------------------------------------------------------

/// Pressing this erases the persisted identity and restarts the device.
pub const RESET_BUTTON_GPIO: i32 = 0;
