//! Client connection-state machine.
//!
//! Tracks the connection phase and the reconnect attempt count, and
//! notifies observers on phase changes. The machine is deliberately
//! permissive: any state may transition to any other, and the only guard
//! is that setting the current state again is a silent no-op. Sequencing
//! legality is the orchestrator's responsibility.

use courier_core::dispatcher::HandlerError;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Connection phase of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport connection.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is open; the handshake has not completed.
    Connected,
    /// The authentication handshake completed.
    Authenticated,
    /// The transport failed.
    Error,
    /// Waiting out a reconnection delay.
    Reconnecting,
}

/// Token identifying one state-change listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type StateListener = Arc<dyn Fn(ConnectionState) -> Result<(), HandlerError> + Send + Sync>;

/// Connection phase plus reconnect bookkeeping for one client instance.
pub struct SessionState {
    state: Mutex<ConnectionState>,
    attempts: AtomicU32,
    max_attempts: u32,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener_id: AtomicU64,
}

impl SessionState {
    /// Create a state machine in `Disconnected` with the given attempt bound.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            attempts: AtomicU32::new(0),
            max_attempts,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Transition to a new state, notifying listeners.
    ///
    /// Setting the current state again is a silent no-op; listeners fire
    /// exactly once per distinct consecutive value.
    pub fn set_state(&self, next: ConnectionState) {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            if *state == next {
                return;
            }
            *state = next;
        }

        let listeners: Vec<StateListener> = {
            let guard = self.listeners.lock().expect("listener lock poisoned");
            guard.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in listeners {
            if let Err(e) = listener(next) {
                warn!(state = ?next, error = %e, "State listener failed");
            }
        }
    }

    /// True while the transport is usable (connected or authenticated).
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }

    /// True once the authentication handshake has completed.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state() == ConnectionState::Authenticated
    }

    /// Register a state-change listener.
    pub fn on_state_change<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ConnectionState) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove exactly the listener identified by `id`.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().expect("listener lock poisoned");
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() < before
    }

    /// Bump the reconnect attempt counter, returning the new count.
    pub fn increment_reconnect_attempts(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Reset the reconnect attempt counter.
    pub fn reset_reconnect_attempts(&self) {
        self.attempts.store(0, Ordering::SeqCst);
    }

    /// Current reconnect attempt count.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Whether another reconnection attempt is allowed.
    #[must_use]
    pub fn can_reconnect(&self) -> bool {
        self.reconnect_attempts() < self.max_attempts
    }

    /// Tear the machine down: state to `Disconnected`, attempts to zero,
    /// listeners cleared. Used on explicit client teardown, as opposed to a
    /// plain disconnect transition.
    pub fn reset(&self) {
        *self.state.lock().expect("state lock poisoned") = ConnectionState::Disconnected;
        self.attempts.store(0, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_fires_once_per_distinct_value() {
        let state = SessionState::new(5);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen2 = Arc::clone(&seen);
        state.on_state_change(move |s| {
            seen2.lock().unwrap().push(s);
            Ok(())
        });

        state.set_state(ConnectionState::Connecting);
        state.set_state(ConnectionState::Connecting); // repeat, no notification
        state.set_state(ConnectionState::Connected);
        state.set_state(ConnectionState::Connected); // repeat, no notification
        state.set_state(ConnectionState::Connecting);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Connecting,
            ]
        );
    }

    #[test]
    fn test_permissive_transitions() {
        let state = SessionState::new(5);
        // No transition validity is enforced.
        state.set_state(ConnectionState::Authenticated);
        assert!(state.is_authenticated());
        state.set_state(ConnectionState::Reconnecting);
        assert!(!state.is_connected());
    }

    #[test]
    fn test_connected_states() {
        let state = SessionState::new(5);
        assert!(!state.is_connected());

        state.set_state(ConnectionState::Connected);
        assert!(state.is_connected());
        assert!(!state.is_authenticated());

        state.set_state(ConnectionState::Authenticated);
        assert!(state.is_connected());
        assert!(state.is_authenticated());
    }

    #[test]
    fn test_attempt_counting_and_bound() {
        let state = SessionState::new(5);

        for expected in 1..=4 {
            assert_eq!(state.increment_reconnect_attempts(), expected);
            assert!(state.can_reconnect());
        }
        assert_eq!(state.increment_reconnect_attempts(), 5);
        assert!(!state.can_reconnect());

        state.reset_reconnect_attempts();
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(state.can_reconnect());
    }

    #[test]
    fn test_failing_listener_isolated() {
        let state = SessionState::new(5);
        let seen = Arc::new(Mutex::new(0));

        state.on_state_change(|_| Err(HandlerError::from("boom")));
        let seen2 = Arc::clone(&seen);
        state.on_state_change(move |_| {
            *seen2.lock().unwrap() += 1;
            Ok(())
        });

        state.set_state(ConnectionState::Connecting);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_remove_listener() {
        let state = SessionState::new(5);
        let seen = Arc::new(Mutex::new(0));

        let seen2 = Arc::clone(&seen);
        let id = state.on_state_change(move |_| {
            *seen2.lock().unwrap() += 1;
            Ok(())
        });

        assert!(state.remove_listener(id));
        assert!(!state.remove_listener(id));

        state.set_state(ConnectionState::Connecting);
        assert_eq!(*seen.lock().unwrap(), 0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let state = SessionState::new(5);
        state.on_state_change(|_| Ok(()));
        state.set_state(ConnectionState::Connected);
        state.increment_reconnect_attempts();

        state.reset();

        assert_eq!(state.state(), ConnectionState::Disconnected);
        assert_eq!(state.reconnect_attempts(), 0);
        assert!(state.listeners.lock().unwrap().is_empty());
    }
}
