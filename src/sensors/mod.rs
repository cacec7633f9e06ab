//! Environmental sensing.

pub mod dht;
