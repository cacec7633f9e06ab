//! Driven adapters behind the port traits.
//!
//! Each adapter compiles in one of two shapes: real ESP-IDF calls under
//! `target_os = "espidf"`, an in-process simulation everywhere else so
//! the domain core tests on the host.

pub mod nvs;
pub mod smartconfig;
pub mod wifi;

#[cfg(target_os = "espidf")]
pub mod http;
