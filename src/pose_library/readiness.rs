use crate::pose_library::interface::PoseLibrary;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type SharedPoseLibrary = Arc<dyn PoseLibrary + Send + Sync>;

/// Producer half, handed to whatever brings the library up.
pub struct ReadinessSignal {
    sender: Sender<SharedPoseLibrary>,
}

impl ReadinessSignal {
    pub fn ready(self, library: SharedPoseLibrary) {
        let _ = self.sender.send(library);
    }
}

/// Resolves to the pose library once it becomes available. Resolution is
/// cached, so later waits return immediately.
pub struct LibraryReadiness {
    receiver: Mutex<Receiver<SharedPoseLibrary>>,
    resolved: Mutex<Option<SharedPoseLibrary>>,
}

pub fn channel() -> (ReadinessSignal, LibraryReadiness) {
    let (sender, receiver) = mpsc::channel();
    (
        ReadinessSignal { sender },
        LibraryReadiness {
            receiver: Mutex::new(receiver),
            resolved: Mutex::new(None),
        },
    )
}

impl LibraryReadiness {
    #[allow(dead_code)]
    pub fn resolved(library: SharedPoseLibrary) -> Self {
        let (signal, readiness) = channel();
        signal.ready(library);
        readiness
    }

    fn cached(&self) -> Option<SharedPoseLibrary> {
        self.resolved.lock().ok().and_then(|resolved| resolved.clone())
    }

    pub fn wait(
        &self,
        timeout: Duration,
    ) -> Result<SharedPoseLibrary, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(library) = self.cached() {
            return Ok(library);
        }

        let receiver = self
            .receiver
            .lock()
            .map_err(|_| "pose library readiness lock poisoned")?;

        // Another waiter may have resolved it while we queued for the lock.
        if let Some(library) = self.cached() {
            return Ok(library);
        }

        match receiver.recv_timeout(timeout) {
            Ok(library) => {
                if let Ok(mut resolved) = self.resolved.lock() {
                    *resolved = Some(library.clone());
                }
                Ok(library)
            }
            Err(RecvTimeoutError::Timeout) => Err(format!(
                "pose library is not available after {}ms",
                timeout.as_millis()
            )
            .into()),
            Err(RecvTimeoutError::Disconnected) => Err("pose library failed to load".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::logger::impl_console::LoggerConsole;
    use crate::pose_library::impl_fake::{PoseLibraryFake, PoseLibraryFakeConfig};

    fn library() -> SharedPoseLibrary {
        let logger = Arc::new(LoggerConsole::new(chrono::FixedOffset::east_opt(0).unwrap()));
        Arc::new(PoseLibraryFake::new(PoseLibraryFakeConfig::instant(), logger))
    }

    #[test]
    fn test_times_out_when_never_signalled() {
        let (_signal, readiness) = channel();

        let result = readiness.wait(Duration::from_millis(20));

        assert!(result.is_err());
    }

    #[test]
    fn test_dropped_signal_fails_fast() {
        let (signal, readiness) = channel();
        drop(signal);

        let result = readiness.wait(Duration::from_secs(5));

        assert!(result.is_err());
    }

    #[test]
    fn test_resolves_late_signal_and_caches() {
        let (signal, readiness) = channel();
        let lib = library();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            signal.ready(lib);
        });

        assert!(readiness.wait(Duration::from_secs(2)).is_ok());
        assert!(readiness.wait(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_already_resolved() {
        let readiness = LibraryReadiness::resolved(library());

        assert!(readiness.wait(Duration::from_millis(1)).is_ok());
    }
}
