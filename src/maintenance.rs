use crate::error::Result;
use crate::storage::Storage;
use log::{debug, info};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread that empties all storage areas on a fixed interval.
///
/// Each run goes through [`Storage::clear_all`], so it waits for in-flight
/// report and chart work to finish before deleting anything.
#[derive(Debug)]
pub struct CleanupTask {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl CleanupTask {
    pub fn spawn(storage: Arc<Storage>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("storage-cleanup".to_string())
            .spawn(move || {
                info!("Storage cleanup scheduled every {:?}", interval);
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            let removed = storage.clear_all();
                            debug!("Scheduled cleanup removed {} entries", removed);
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Storage cleanup stopped");
            })?;

        Ok(Self { stop, handle })
    }

    /// Stops the schedule and waits for a run in progress to finish.
    pub fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}
