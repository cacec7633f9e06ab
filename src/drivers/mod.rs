//! Hardware drivers: LEDC lamp output, reset button input.

pub mod button;
pub mod rgb_led;
