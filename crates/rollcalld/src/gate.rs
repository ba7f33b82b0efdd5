//! Whether a capture client is currently attached.

use std::sync::atomic::{AtomicBool, Ordering};

/// Connection flag consulted before and after every frame's detection work.
#[derive(Debug, Default)]
pub struct ConnectionGate {
    connected: AtomicBool,
}

impl ConnectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Set the flag and return its previous value.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.connected.swap(connected, Ordering::SeqCst)
    }
}
