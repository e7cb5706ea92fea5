use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Timeouts beyond this are treated as this long.
const MAX_DEADLINE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// The instant `timeout` from now.
///
/// Timeouts too large for `Instant` (`Duration::MAX` as "no limit") are
/// clamped instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(MAX_DEADLINE))
        .unwrap_or(now)
}

/// A background wait for a peer to attach to a freshly created pipe.
///
/// The worker runs the blocking accept so the creating thread keeps control.
/// The owner collects the stream with a bounded [`wait`](Self::wait) or polls
/// with [`try_take`](Self::try_take). Cancelling (explicitly, on timeout, or
/// by dropping the handle) runs the backend's cancel hook, which must unblock
/// the worker.
pub struct PendingPeer {
    name: String,
    result: Receiver<Result<IpcStream>>,
    cancel: Option<CancelHook>,
    worker: Option<JoinHandle<()>>,
}

impl PendingPeer {
    pub(crate) fn spawn<F>(name: String, wait: F, cancel: CancelHook) -> Result<Self>
    where
        F: FnOnce() -> Result<IpcStream> + Send + 'static,
    {
        let (tx, result) = mpsc::channel();
        let worker = std::thread::Builder::new()
            .name(format!("pipe-wait:{name}"))
            .spawn(move || {
                let _ = tx.send(wait());
            })?;
        debug!(pipe = %name, "waiting for peer in background");

        Ok(Self {
            name,
            result,
            cancel: Some(cancel),
            worker: Some(worker),
        })
    }

    /// Name of the pipe being waited on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block until a peer attaches or `timeout` elapses.
    ///
    /// On timeout the wait is cancelled.
    pub fn wait(mut self, timeout: Duration) -> Result<IpcStream> {
        match self.result.recv_timeout(timeout) {
            Ok(result) => {
                self.finish();
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                self.cancel_wait();
                Err(TransportError::Timeout {
                    endpoint: self.name.clone(),
                    timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.cancel_wait();
                Err(TransportError::Cancelled(self.name.clone()))
            }
        }
    }

    /// Take the stream if a peer has already attached.
    pub fn try_take(&mut self) -> Option<Result<IpcStream>> {
        match self.result.try_recv() {
            Ok(result) => {
                self.finish();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.cancel_wait();
                Some(Err(TransportError::Cancelled(self.name.clone())))
            }
        }
    }

    /// Abandon the wait.
    pub fn cancel(mut self) {
        self.cancel_wait();
    }

    fn finish(&mut self) {
        self.cancel = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }

    fn cancel_wait(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            debug!(pipe = %self.name, "cancelling peer wait");
            cancel();
        }
        // The hook unblocks the worker; it exits on its own.
        self.worker = None;
    }
}

impl Drop for PendingPeer {
    fn drop(&mut self) {
        self.cancel_wait();
    }
}

impl std::fmt::Debug for PendingPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingPeer")
            .field("name", &self.name)
            .field("pending", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::memory::PipeBroker;

    #[test]
    fn deadline_clamps_oversized_timeouts() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) > before);
        assert!(deadline_after(Duration::from_millis(5)) >= before + Duration::from_millis(5));
    }

    #[test]
    fn wait_returns_stream_once_peer_attaches() {
        let broker = Arc::new(PipeBroker::new());
        let pending = broker.create("ipc-0").unwrap().wait_for_peer().unwrap();

        let connector = {
            let broker = Arc::clone(&broker);
            thread::spawn(move || {
                let mut client = broker.connect("ipc-0", Duration::from_secs(1)).unwrap();
                client.write_all_bytes(b"hi").unwrap();
                client
            })
        };

        let mut server = pending.wait(Duration::from_secs(2)).unwrap();
        let mut buf = [0u8; 2];
        server.read_exact_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");
        let _client = connector.join().unwrap();
    }

    #[test]
    fn wait_timeout_cancels_and_unregisters() {
        let broker = PipeBroker::new();
        let pending = broker.create("ipc-1").unwrap().wait_for_peer().unwrap();
        assert!(broker.exists("ipc-1"));

        let err = pending.wait(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert!(!broker.exists("ipc-1"));
    }

    #[test]
    fn explicit_cancel_unregisters() {
        let broker = PipeBroker::new();
        let pending = broker.create("ipc-2").unwrap().wait_for_peer().unwrap();
        assert_eq!(pending.name(), "ipc-2");
        pending.cancel();
        assert!(!broker.exists("ipc-2"));
    }

    #[test]
    fn try_take_polls_without_blocking() {
        let broker = PipeBroker::new();
        let mut pending = broker.create("ipc-3").unwrap().wait_for_peer().unwrap();
        assert!(pending.try_take().is_none());

        let _client = broker.connect("ipc-3", Duration::from_secs(1)).unwrap();
        let mut taken = None;
        for _ in 0..200 {
            taken = pending.try_take();
            if taken.is_some() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(matches!(taken, Some(Ok(_))));
    }
}
