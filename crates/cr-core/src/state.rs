//! Observable session state
//!
//! Transports publish their lifecycle through a `watch` channel so the
//! request engine and the driver can react to shutdown without polling.

use tokio::sync::watch;

use crate::types::SessionState;

/// Holds a [`SessionState`] and enforces the legal transitions
#[derive(Debug)]
pub struct SessionStateCell {
    tx: watch::Sender<SessionState>,
}

impl SessionStateCell {
    /// Create a cell in the `Connecting` state
    pub fn new() -> Self {
        Self::with_state(SessionState::Connecting)
    }

    /// Create a cell in an arbitrary starting state
    pub fn with_state(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(state);
        Self { tx }
    }

    /// Current state
    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Returns whether the state changed. Illegal transitions are ignored,
    /// which makes repeated shutdown calls harmless.
    pub fn transition(&self, next: SessionState) -> bool {
        let mut from = None;
        let changed = self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                from = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            tracing::debug!("Session state {} -> {}", from, next);
        }
        changed
    }

    /// Walk `Closing -> Closed` from any open state; no-op once terminal
    pub fn close(&self) {
        self.transition(SessionState::Closing);
        self.transition(SessionState::Closed);
    }
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}
