//! Lock-free event ring between interrupt/callback context and the
//! control loop.
//!
//! Events are produced by:
//! - the network stack's event callbacks (connect / disconnect / got-IP)
//! - the provisioning broadcast receiver (credentials ready, ack sent)
//! - the reset-button ISR path and the operational worker tasks
//!
//! and consumed by the single control loop, which drives whichever
//! controller owns the current mode. Producers may race (several callback
//! contexts plus worker tasks), so slot claims go through a CAS on the
//! head index; there is exactly one consumer.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ WiFi events  │────▶│              │     │              │
//! │ Smartconfig  │────▶│  Event ring  │────▶│ Control loop │
//! │ Button ISR   │────▶│  (lock-free) │     │  (consumer)  │
//! │ Worker tasks │────▶│              │     │              │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, AtomicU16, Ordering};

use crate::error::DisconnectReason;

/// Maximum number of pending events. Power of 2 for cheap modulo.
const EVENT_QUEUE_CAP: usize = 32;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The station got an IP address; the network is usable.
    WifiConnected,
    /// The station dropped off the access point.
    WifiDisconnected(DisconnectReason),
    /// The provisioning broadcast delivered credentials; the receiving
    /// adapter holds them in its mailbox.
    CredentialsReady,
    /// The provisioning protocol acknowledged the phone, a courtesy signal
    /// to stop listening on the provisioning channel.
    BroadcastAckDone,
    /// Debounced hard-reset button press.
    ButtonPressed,
    /// A worker task hit an unrecoverable credential condition and asks
    /// the control loop to run the recovery trigger.
    RecoveryRequested,
}

// Wire format inside the ring: high byte = tag, low byte = argument
// (disconnect reason code). Stored as value+1 so 0 marks an unwritten slot.

const TAG_WIFI_CONNECTED: u8 = 0;
const TAG_WIFI_DISCONNECTED: u8 = 1;
const TAG_CREDENTIALS_READY: u8 = 2;
const TAG_BROADCAST_ACK_DONE: u8 = 3;
const TAG_BUTTON_PRESSED: u8 = 4;
const TAG_RECOVERY_REQUESTED: u8 = 5;

fn encode(event: Event) -> u16 {
    let (tag, arg) = match event {
        Event::WifiConnected => (TAG_WIFI_CONNECTED, 0),
        Event::WifiDisconnected(reason) => (TAG_WIFI_DISCONNECTED, reason.code()),
        Event::CredentialsReady => (TAG_CREDENTIALS_READY, 0),
        Event::BroadcastAckDone => (TAG_BROADCAST_ACK_DONE, 0),
        Event::ButtonPressed => (TAG_BUTTON_PRESSED, 0),
        Event::RecoveryRequested => (TAG_RECOVERY_REQUESTED, 0),
    };
    (u16::from(tag) << 8) | u16::from(arg)
}

fn decode(raw: u16) -> Option<Event> {
    let tag = (raw >> 8) as u8;
    let arg = (raw & 0xFF) as u8;
    match tag {
        TAG_WIFI_CONNECTED => Some(Event::WifiConnected),
        TAG_WIFI_DISCONNECTED => Some(Event::WifiDisconnected(DisconnectReason::from_code(arg))),
        TAG_CREDENTIALS_READY => Some(Event::CredentialsReady),
        TAG_BROADCAST_ACK_DONE => Some(Event::BroadcastAckDone),
        TAG_BUTTON_PRESSED => Some(Event::ButtonPressed),
        TAG_RECOVERY_REQUESTED => Some(Event::RecoveryRequested),
        _ => None,
    }
}

// ── Lock-free MPSC ring buffer ────────────────────────────────
//
// Producers claim a slot with a CAS on HEAD, then publish the encoded
// event with a Release store. The consumer swaps the slot back to 0; a
// zero read means the claiming producer has not published yet, which is
// treated as "empty for now" rather than spinning.

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_SLOTS: [AtomicU16; EVENT_QUEUE_CAP] =
    [const { AtomicU16::new(0) }; EVENT_QUEUE_CAP];

/// Push an event into the ring. Safe from ISR/callback context.
/// Returns `false` if the ring is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let encoded = encode(event) + 1;
    loop {
        let head = EVENT_HEAD.load(Ordering::Acquire);
        let tail = EVENT_TAIL.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false; // Ring full, drop event.
        }

        if EVENT_HEAD
            .compare_exchange_weak(head, next_head, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            EVENT_SLOTS[head as usize].store(encoded, Ordering::Release);
            return true;
        }
    }
}

/// Pop the next event. Single consumer (the control loop).
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = EVENT_SLOTS[tail as usize].swap(0, Ordering::AcqRel);
    if raw == 0 {
        return None; // Slot claimed but not yet published.
    }

    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);
    decode(raw - 1)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Whether the ring currently holds no events.
pub fn queue_is_empty() -> bool {
    EVENT_TAIL.load(Ordering::Relaxed) == EVENT_HEAD.load(Ordering::Acquire)
}

/// Serialises unit tests that touch the process-global ring.
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Mutex, MutexGuard, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());

    pub fn exclusive() -> MutexGuard<'static, ()> {
        LOCK.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The ring is process-global; drain before each test.
    fn flush() {
        while pop_event().is_some() {}
    }

    #[test]
    fn fifo_order_preserved() {
        let _guard = testing::exclusive();
        flush();
        assert!(push_event(Event::WifiConnected));
        assert!(push_event(Event::CredentialsReady));
        assert!(push_event(Event::ButtonPressed));
        assert_eq!(pop_event(), Some(Event::WifiConnected));
        assert_eq!(pop_event(), Some(Event::CredentialsReady));
        assert_eq!(pop_event(), Some(Event::ButtonPressed));
        assert_eq!(pop_event(), None);
    }

    #[test]
    fn disconnect_reason_survives_the_ring() {
        let _guard = testing::exclusive();
        flush();
        push_event(Event::WifiDisconnected(DisconnectReason::AuthFailed));
        push_event(Event::WifiDisconnected(DisconnectReason::Other(8)));
        assert_eq!(
            pop_event(),
            Some(Event::WifiDisconnected(DisconnectReason::AuthFailed))
        );
        assert_eq!(
            pop_event(),
            Some(Event::WifiDisconnected(DisconnectReason::Other(8)))
        );
    }

    #[test]
    fn full_ring_drops_events() {
        let _guard = testing::exclusive();
        flush();
        // Capacity is CAP - 1 with one slot kept open.
        for _ in 0..EVENT_QUEUE_CAP - 1 {
            assert!(push_event(Event::WifiConnected));
        }
        assert!(!push_event(Event::WifiConnected));
        flush();
        assert!(queue_is_empty());
    }
}
