//! Connection state machine.
//!
//! [`TransportState`] moves `Disconnected → Connecting → Connected → Closed`.
//! [`StateCell`] stores it in a single atomic so racing callers settle every
//! transition with compare-and-set instead of a lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    /// No connection attempt is running.
    Disconnected = 0,
    /// A connect sequence won the CAS and is in flight.
    Connecting = 1,
    /// The primary (or legacy) path is live.
    Connected = 2,
    /// Terminal. Nothing leaves this state.
    Closed = 3,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Atomic holder for a [`TransportState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TransportState::Disconnected as u8))
    }

    pub(crate) fn load(&self) -> TransportState {
        TransportState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from → to` atomically.
    ///
    /// On failure returns the state that was actually observed.
    pub(crate) fn transition(
        &self,
        from: TransportState,
        to: TransportState,
    ) -> Result<(), TransportState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(TransportState::from_u8)
    }

    /// Unconditionally enter `Closed`.
    pub(crate) fn close(&self) -> TransportState {
        TransportState::from_u8(self.0.swap(TransportState::Closed as u8, Ordering::AcqRel))
    }
}
