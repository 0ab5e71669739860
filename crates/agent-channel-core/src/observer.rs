//! Connection state observers.

use std::fmt;

use crate::state::ConnectionState;

type Observer = Box<dyn FnMut(ConnectionState)>;

/// Append-only list of callbacks invoked on every state change.
///
/// Observers are called synchronously, in registration order. There is no
/// way to remove one.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Observer>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, observer: F)
    where
        F: FnMut(ConnectionState) + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Call every observer with the new `state`.
    pub fn notify(&mut self, state: ConnectionState) {
        for observer in &mut self.observers {
            observer(state);
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}
