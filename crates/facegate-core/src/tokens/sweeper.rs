use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::errors::AppResult;
use crate::tokens::ledger::TokenLedger;

/// Owns the background sweep thread. Dropping the handle stops it.
#[derive(Debug)]
pub struct SweeperHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signals the thread and waits for the current pass to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("token sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs [`TokenLedger::sweep_expired`] every `interval` until stopped.
/// A failed pass is logged and the next one runs on schedule.
pub fn spawn_sweeper(ledger: Arc<TokenLedger>, interval: Duration) -> AppResult<SweeperHandle> {
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let thread = thread::Builder::new()
        .name("facegate-sweeper".into())
        .spawn(move || {
            info!(interval_secs = interval.as_secs(), "token sweeper started");
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => match ledger.sweep_expired() {
                        Ok(count) => debug!(count, "sweeper pass complete"),
                        Err(err) => error!(error = %err, "sweeper pass failed"),
                    },
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("token sweeper stopped");
        })?;

    Ok(SweeperHandle {
        stop: Some(stop_tx),
        thread: Some(thread),
    })
}
