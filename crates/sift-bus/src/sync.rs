//! Shutdown signalling for the substrate's background threads.
//!
//! Worker loops sleep in [`ShutdownListener::wait_timeout`] between work
//! items. The owning struct keeps the [`ShutdownHandle`] and drops it
//! before joining the thread; the disconnect wakes the worker immediately
//! instead of letting it sleep out its full interval.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};

/// Owner half of a shutdown channel. Dropping it signals shutdown.
pub struct ShutdownHandle {
    _tx: Sender<()>,
}

/// Worker half of a shutdown channel.
pub struct ShutdownListener {
    rx: Receiver<()>,
}

/// Creates a linked handle/listener pair.
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownListener) {
    let (tx, rx) = bounded(0);
    (ShutdownHandle { _tx: tx }, ShutdownListener { rx })
}

impl ShutdownListener {
    /// Whether the handle is gone. Non-blocking.
    pub fn is_shutdown(&self) -> bool {
        matches!(
            self.rx.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }

    /// Sleeps for `dur` or until shutdown. Returns `true` on shutdown.
    pub fn wait_timeout(&self, dur: Duration) -> bool {
        match self.rx.recv_timeout(dur) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn dropping_the_handle_wakes_the_waiter() {
        let (handle, listener) = shutdown_channel();
        let start = Instant::now();
        let worker = std::thread::spawn(move || listener.wait_timeout(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        drop(handle);
        assert!(worker.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn timeout_without_shutdown_returns_false() {
        let (handle, listener) = shutdown_channel();
        assert!(!listener.wait_timeout(Duration::from_millis(5)));
        assert!(!listener.is_shutdown());
        drop(handle);
        assert!(listener.is_shutdown());
    }
}
