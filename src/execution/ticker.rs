//! Periodic Ticker
//!
//! A background thread that sends [`DriverEvent::Tick`] over the driver's
//! channel at a fixed interval. Ticks are suppressed while suspended; the
//! thread exits when stopped or when the receiving side hangs up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use super::driver::DriverEvent;

/// Handle to the tick thread.
pub struct Ticker {
    suspended: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Starts ticking every `interval` into `tx`.
    pub fn spawn(interval: Duration, tx: Sender<DriverEvent>) -> Self {
        let suspended = Arc::new(AtomicBool::new(false));
        let suspended_flag = Arc::clone(&suspended);
        let (stop_tx, stop_rx) = channel::<()>();

        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if suspended_flag.load(Ordering::Relaxed) {
                        continue;
                    }
                    if tx.send(DriverEvent::Tick).is_err() {
                        debug!("Tick receiver closed, stopping ticker");
                        break;
                    }
                }
                // Stop requested or handle dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            suspended,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stops emitting ticks until `resume`.
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.suspended.store(false, Ordering::Relaxed);
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Relaxed)
    }

    /// True until `stop` has been called.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stops the thread and waits for it to exit. Safe to call twice.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // The thread may already be gone if the receiver hung up
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
