//! Reactive state container - whole-state replacement with subscriptions
//!
//! Each process-wide value (worker registry, compiled cells) lives in one
//! `Store`. Mutations go through a pure `Reducer`, and observers hold a
//! `watch` receiver that always sees the latest settled state.

use std::sync::Arc;
use tokio::sync::watch;

/// A state type with named, total transitions
pub trait Reducer: Clone + PartialEq {
    type Action;

    /// Compute the next state. Must not mutate `self`.
    fn reduce(&self, action: Self::Action) -> Self;
}

/// Injectable, cloneable handle to a single state value
pub struct Store<S: Reducer> {
    tx: Arc<watch::Sender<S>>,
}

impl<S: Reducer> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<S: Reducer> Store<S> {
    /// Create a store holding `initial`
    pub fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Apply an action. Returns true when the state changed.
    pub fn dispatch(&self, action: S::Action) -> bool {
        self.tx.send_if_modified(|state| {
            let next = state.reduce(action);
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        })
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> S {
        self.tx.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

impl<S: Reducer + Default> Default for Store<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}
