//! Unified error types for the Glowroom firmware.
//!
//! A small `Copy` enum per concern, all funnelling into a single top-level
//! [`Error`], keeps the control loops' error handling uniform. Controllers
//! never propagate errors past their own state machine (every terminal
//! condition maps to retry, restart, or recover), so these types exist for
//! diagnostics and for the port boundaries, not for a bubble-up path.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent key-value store failed.
    Store(StoreError),
    /// A network operation failed.
    Net(NetError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
    /// Peripheral initialisation failed.
    Init(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store: {e}"),
            Self::Net(e) => write!(f, "net: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Persistent store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The namespace could not be opened.
    OpenFailed,
    /// A key read failed (distinct from the key being absent).
    ReadFailed,
    /// A key write failed.
    WriteFailed,
    /// A key or namespace erase failed.
    EraseFailed,
    /// The commit step failed; previously written fields must be
    /// considered uncommitted.
    CommitFailed,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "open failed"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::EraseFailed => write!(f, "erase failed"),
            Self::CommitFailed => write!(f, "commit failed"),
        }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Network errors
// ---------------------------------------------------------------------------

/// Transport-level network failures. These are the *transient* category:
/// callers retry with a fixed delay and never treat them as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// The operation did not complete in time.
    Timeout,
    /// The peer closed or reset the connection.
    ConnectionReset,
    /// The connection could not be established.
    ConnectFailed,
    /// The request was sent but no usable response arrived.
    RequestFailed,
    /// Generic I/O error from the network stack.
    Io,
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::RequestFailed => write!(f, "request failed"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<NetError> for Error {
    fn from(e: NetError) -> Self {
        Self::Net(e)
    }
}

// ---------------------------------------------------------------------------
// Disconnect reasons
// ---------------------------------------------------------------------------

/// Why the station dropped off the access point.
///
/// The raw reason codes follow the WiFi supplicant's numbering:
/// 15 = 4-way handshake timeout, 202 = authentication failure. Those two
/// mean the stored credentials are wrong and must never be retried blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    AuthFailed,
    HandshakeTimeout,
    Other(u8),
}

const REASON_HANDSHAKE_TIMEOUT: u8 = 15;
const REASON_AUTH_FAIL: u8 = 202;

impl DisconnectReason {
    /// Credential-flavoured disconnects route to recovery, not reconnect.
    pub fn is_credential_failure(self) -> bool {
        matches!(self, Self::AuthFailed | Self::HandshakeTimeout)
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            REASON_AUTH_FAIL => Self::AuthFailed,
            REASON_HANDSHAKE_TIMEOUT => Self::HandshakeTimeout,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::AuthFailed => REASON_AUTH_FAIL,
            Self::HandshakeTimeout => REASON_HANDSHAKE_TIMEOUT,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthFailed => write!(f, "authentication failed"),
            Self::HandshakeTimeout => write!(f, "4-way handshake timeout"),
            Self::Other(code) => write!(f, "reason code {code}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
