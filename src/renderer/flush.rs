//! Cross-thread flush requests
//!
//! Only the render thread touches the GPU. Other threads ask it to flush
//! through a [`FlushHandle`] and block until the next tick has serviced the
//! request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Interval between progress logs while waiting for the render thread
pub const FLUSH_WAIT_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug)]
struct FlushState {
    requested: bool,
    rendering_allowed: bool,
}

#[derive(Debug)]
pub struct FlushRendezvous {
    state: Mutex<FlushState>,
    serviced: Condvar,
}

impl Default for FlushRendezvous {
    fn default() -> Self {
        Self {
            state: Mutex::new(FlushState {
                requested: false,
                rendering_allowed: true,
            }),
            serviced: Condvar::new(),
        }
    }
}

impl FlushRendezvous {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Disallow rendering, raise a request and block until it is serviced
    pub fn request_and_wait(&self) {
        let mut state = self.state.lock();
        state.rendering_allowed = false;
        state.requested = true;

        while state.requested {
            let result = self.serviced.wait_for(&mut state, FLUSH_WAIT_INTERVAL);
            if result.timed_out() && state.requested {
                log::info!("Waiting for the renderer to flush...");
            }
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state.lock().requested
    }

    /// Mark the pending request done and wake the waiters
    pub fn complete(&self) {
        let mut state = self.state.lock();
        if state.requested {
            state.requested = false;
            self.serviced.notify_all();
        }
    }

    pub fn is_rendering_allowed(&self) -> bool {
        self.state.lock().rendering_allowed
    }

    pub fn set_rendering_allowed(&self, allowed: bool) {
        self.state.lock().rendering_allowed = allowed;
    }
}

/// Lets other threads request a flush from the render thread
#[derive(Debug, Clone)]
pub struct FlushHandle {
    rendezvous: Arc<FlushRendezvous>,
}

impl FlushHandle {
    pub(crate) fn new(rendezvous: Arc<FlushRendezvous>) -> Self {
        Self { rendezvous }
    }

    /// Block until the render thread has flushed. Rendering stays
    /// disallowed until the world load end notification.
    pub fn flush(&self) {
        self.rendezvous.request_and_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_blocks_until_completed() {
        let rendezvous = FlushRendezvous::new();
        let handle = FlushHandle::new(rendezvous.clone());

        let waiter = thread::spawn(move || handle.flush());
        while !rendezvous.is_requested() {
            thread::yield_now();
        }
        assert!(!rendezvous.is_rendering_allowed());

        rendezvous.complete();
        waiter.join().unwrap();
        assert!(!rendezvous.is_requested());
    }

    #[test]
    fn test_complete_without_request_is_noop() {
        let rendezvous = FlushRendezvous::new();
        rendezvous.complete();
        assert!(rendezvous.is_rendering_allowed());
        assert!(!rendezvous.is_requested());
    }
}
