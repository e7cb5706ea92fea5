//! In-memory pipes served by an explicitly constructed broker.
//!
//! A [`PipeBroker`] maps pipe names to listeners. Each connection is a pair of
//! bounded byte queues, one per direction. Writers block while a queue is
//! full and readers block while it is empty. Closing either end wakes both
//! sides: readers drain what is left and then see end-of-stream, writers get
//! `BrokenPipe`.

use std::collections::{HashMap, VecDeque};
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;
use crate::wait::{deadline_after, PendingPeer};

/// Default bytes buffered per direction before writers block.
pub const DEFAULT_PIPE_CAPACITY: usize = 8 * 1024;

/// Pending connections a listener holds before `connect` has to wait.
const DEFAULT_BACKLOG: usize = 1;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(5);

type Registry = Arc<Mutex<HashMap<String, Registration>>>;

struct Registration {
    id: u64,
    incoming: SyncSender<MemoryStream>,
}

/// Registry of in-memory named pipes.
///
/// Brokers are plain values: create one, share it through an `Arc`, and hand
/// it to the endpoints that should see the same set of pipes.
pub struct PipeBroker {
    pipes: Registry,
    capacity: usize,
    next_id: AtomicU64,
}

impl PipeBroker {
    /// Create an empty broker with the default queue capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PIPE_CAPACITY)
    }

    /// Create an empty broker whose pipes buffer `capacity` bytes per direction.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pipes: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a pipe under `name` and return its listening end.
    pub fn create(&self, name: &str) -> Result<MemoryPipeListener> {
        let mut pipes = lock_registry(&self.pipes)?;
        if pipes.contains_key(name) {
            return Err(TransportError::Bind {
                path: PathBuf::from(name),
                source: std::io::Error::new(ErrorKind::AlreadyExists, "pipe name already in use"),
            });
        }

        let (incoming, pending) = mpsc::sync_channel(DEFAULT_BACKLOG);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        pipes.insert(name.to_string(), Registration { id, incoming });
        info!(pipe = name, "created memory pipe");

        Ok(MemoryPipeListener {
            name: name.to_string(),
            id,
            pending,
            registry: Arc::clone(&self.pipes),
        })
    }

    /// Whether a pipe is currently registered under `name`.
    pub fn exists(&self, name: &str) -> bool {
        lock_registry(&self.pipes)
            .map(|pipes| pipes.contains_key(name))
            .unwrap_or(false)
    }

    /// Unregister `name`. Returns whether a pipe was removed.
    ///
    /// A listener blocked in `accept` on the removed pipe is released.
    pub fn remove(&self, name: &str) -> bool {
        lock_registry(&self.pipes)
            .map(|mut pipes| pipes.remove(name).is_some())
            .unwrap_or(false)
    }

    /// Names of all registered pipes, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock_registry(&self.pipes)
            .map(|pipes| pipes.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Connect to the pipe registered under `name`.
    ///
    /// Waits up to `timeout` while the listener's backlog is full.
    pub fn connect(&self, name: &str, timeout: Duration) -> Result<IpcStream> {
        let incoming = {
            let pipes = lock_registry(&self.pipes)?;
            match pipes.get(name) {
                Some(registration) => registration.incoming.clone(),
                None => return Err(not_found(name)),
            }
        };

        let (client, server) = MemoryStream::pair(self.capacity);
        let deadline = deadline_after(timeout);
        let mut server = server;

        loop {
            match incoming.try_send(server) {
                Ok(()) => break,
                Err(TrySendError::Full(stream)) => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout {
                            endpoint: name.to_string(),
                            timeout,
                        });
                    }
                    server = stream;
                    std::thread::sleep(CONNECT_RETRY_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return Err(not_found(name)),
            }
        }

        debug!(pipe = name, "connected to memory pipe");
        Ok(IpcStream::from_memory(client))
    }
}

impl Default for PipeBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipeBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeBroker")
            .field("pipes", &self.names())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Listening end of a broker pipe.
///
/// Dropping the listener unregisters its name.
pub struct MemoryPipeListener {
    name: String,
    id: u64,
    pending: Receiver<MemoryStream>,
    registry: Registry,
}

impl MemoryPipeListener {
    /// The name this listener is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Accept the next connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let stream = self
            .pending
            .recv()
            .map_err(|_| TransportError::Cancelled(self.name.clone()))?;
        debug!(pipe = %self.name, "accepted memory pipe connection");
        Ok(IpcStream::from_memory(stream))
    }

    /// Accept the next connection, giving up after `timeout`.
    pub fn accept_timeout(&self, timeout: Duration) -> Result<IpcStream> {
        match self.pending.recv_timeout(timeout) {
            Ok(stream) => Ok(IpcStream::from_memory(stream)),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout {
                endpoint: self.name.clone(),
                timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::Cancelled(self.name.clone()))
            }
        }
    }

    /// Wait for one peer on a background worker.
    ///
    /// Cancelling the returned handle unregisters the pipe, which releases the
    /// worker.
    pub fn wait_for_peer(self) -> Result<PendingPeer> {
        let name = self.name.clone();
        let registry = Arc::clone(&self.registry);
        let id = self.id;
        PendingPeer::spawn(
            name.clone(),
            move || self.accept(),
            Box::new(move || unregister(&registry, &name, id)),
        )
    }
}

impl Drop for MemoryPipeListener {
    fn drop(&mut self) {
        unregister(&self.registry, &self.name, self.id);
    }
}

impl std::fmt::Debug for MemoryPipeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPipeListener")
            .field("name", &self.name)
            .finish()
    }
}

fn unregister(registry: &Registry, name: &str, id: u64) {
    if let Ok(mut pipes) = registry.lock() {
        if pipes.get(name).map(|r| r.id) == Some(id) {
            pipes.remove(name);
            debug!(pipe = name, "removed memory pipe");
        }
    }
}

fn lock_registry(registry: &Registry) -> Result<MutexGuard<'_, HashMap<String, Registration>>> {
    registry
        .lock()
        .map_err(|_| TransportError::Io(std::io::Error::other("pipe registry lock poisoned")))
}

fn not_found(name: &str) -> TransportError {
    TransportError::Connect {
        endpoint: name.to_string(),
        source: std::io::Error::new(ErrorKind::NotFound, "no such memory pipe"),
    }
}

/// One direction of an in-memory pipe.
struct Queue {
    state: Mutex<QueueState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

struct QueueState {
    buf: VecDeque<u8>,
    closed: bool,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                buf: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        }
    }

    fn read(&self, out: &mut [u8]) -> std::io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        loop {
            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                for (dst, src) in out.iter_mut().zip(state.buf.drain(..n)) {
                    *dst = src;
                }
                self.writable.notify_all();
                return Ok(n);
            }
            if state.closed {
                return Ok(0);
            }
            state = self.readable.wait(state).map_err(|_| poisoned())?;
        }
    }

    fn write(&self, data: &[u8]) -> std::io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        loop {
            if state.closed {
                return Err(std::io::Error::from(ErrorKind::BrokenPipe));
            }
            let free = self.capacity.saturating_sub(state.buf.len());
            if free > 0 {
                let n = free.min(data.len());
                state.buf.extend(&data[..n]);
                self.readable.notify_all();
                return Ok(n);
            }
            state = self.writable.wait(state).map_err(|_| poisoned())?;
        }
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.readable.notify_all();
        self.writable.notify_all();
    }
}

fn poisoned() -> std::io::Error {
    std::io::Error::other("memory pipe lock poisoned")
}

/// Closes both directions once every handle to one end is dropped.
struct EndGuard {
    inbound: Arc<Queue>,
    outbound: Arc<Queue>,
}

impl Drop for EndGuard {
    fn drop(&mut self) {
        self.inbound.close();
        self.outbound.close();
    }
}

/// One end of an in-memory pipe. Clones share the same end.
#[derive(Clone)]
pub(crate) struct MemoryStream {
    inbound: Arc<Queue>,
    outbound: Arc<Queue>,
    _guard: Arc<EndGuard>,
}

impl MemoryStream {
    fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b = Arc::new(Queue::new(capacity));
        let b_to_a = Arc::new(Queue::new(capacity));
        let a = Self::end(Arc::clone(&b_to_a), Arc::clone(&a_to_b));
        let b = Self::end(a_to_b, b_to_a);
        (a, b)
    }

    fn end(inbound: Arc<Queue>, outbound: Arc<Queue>) -> Self {
        let guard = Arc::new(EndGuard {
            inbound: Arc::clone(&inbound),
            outbound: Arc::clone(&outbound),
        });
        Self {
            inbound,
            outbound,
            _guard: guard,
        }
    }

    pub(crate) fn close(&self) {
        self.inbound.close();
        self.outbound.close();
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inbound.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.outbound.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
