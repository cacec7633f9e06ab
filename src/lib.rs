//! Glowroom firmware library.
//!
//! Control core for a network-connected RGB room light with a DHT11
//! climate sensor, backed by a realtime database. The pure-logic modules
//! are exposed for integration testing; all ESP-IDF-specific code is
//! guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod boot;
pub mod command;
pub mod config;
pub mod events;
pub mod identity;
pub mod operational;
pub mod provisioning;
pub mod recovery;

mod error;
pub mod pins;

pub use error::{ConfigError, DisconnectReason, Error, NetError, Result, StoreError};

// Adapters and drivers carry host simulations alongside the ESP-IDF
// implementations, guarded by cfg attributes inside.
pub mod adapters;
pub mod drivers;
pub mod sensors;
