//! Stream resumption tracking.

use std::sync::{Mutex, PoisonError};

/// Holds the last event id observed on a `message` frame.
///
/// Sent back as `Last-Event-ID` when the long-lived stream is (re)opened.
/// The token is only ever replaced, never cleared.
#[derive(Debug, Default)]
pub struct ResumptionTracker {
    last_event_id: Mutex<Option<String>>,
}

impl ResumptionTracker {
    /// Create a tracker with no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.last_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record `id` as the new token. Empty ids are ignored.
    pub fn advance(&self, id: &str) {
        if id.is_empty() {
            return;
        }
        let mut guard = self
            .last_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::trace!(id, "resumption token advanced");
        *guard = Some(id.to_string());
    }
}
