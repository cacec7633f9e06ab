//! Application core: pure domain logic, zero I/O.
//!
//! Everything the controllers touch in the outside world (storage, network,
//! sensor, lamp, process restart) goes through the **port traits** defined
//! in [`ports`], keeping the mode state machines fully testable without
//! real peripherals.

pub mod credentials;
pub mod ports;
