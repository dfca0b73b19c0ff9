use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// Handle to a background timer thread. Dropping the handle (or calling
/// `cancel`) stops the thread before its next firing.
pub struct TaskHandle {
    shutdown_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl TaskHandle {
    pub fn cancel(self) {
        let _ = self.shutdown_tx.send(());
    }

    #[allow(dead_code)]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Calls `f` every `period` until it returns false or the handle is cancelled.
pub fn spawn_repeating<F>(period: Duration, mut f: F) -> TaskHandle
where
    F: FnMut() -> bool + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = channel::<()>();

    let thread = std::thread::spawn(move || loop {
        match shutdown_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                if !f() {
                    break;
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    });

    TaskHandle { shutdown_tx, thread }
}

/// Calls `f` once after `delay` unless the handle is cancelled first.
pub fn spawn_delayed<F>(delay: Duration, f: F) -> TaskHandle
where
    F: FnOnce() + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = channel::<()>();

    let thread = std::thread::spawn(move || {
        if let Err(RecvTimeoutError::Timeout) = shutdown_rx.recv_timeout(delay) {
            f();
        }
    });

    TaskHandle { shutdown_tx, thread }
}
