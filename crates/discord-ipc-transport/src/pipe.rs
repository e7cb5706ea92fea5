//! Windows named pipes.
//!
//! The client side opens an existing pipe path like any file, waiting on
//! `ERROR_PIPE_BUSY` with `WaitNamedPipeW` until the timeout runs out. The
//! creating side builds a single-instance byte-mode pipe and waits for a peer
//! on a background [`PendingPeer`].

use std::fs::{File, OpenOptions};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use windows_sys::Win32::Foundation::{
    ERROR_NOT_FOUND, ERROR_PIPE_BUSY, ERROR_PIPE_CONNECTED, HANDLE, INVALID_HANDLE_VALUE,
};
use windows_sys::Win32::Storage::FileSystem::PIPE_ACCESS_DUPLEX;
use windows_sys::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, WaitNamedPipeW, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE,
    PIPE_WAIT,
};
use windows_sys::Win32::System::IO::CancelIoEx;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;
use crate::wait::{deadline_after, PendingPeer};

/// Namespace prefix for local named pipes.
pub const PIPE_PREFIX: &str = r"\\.\pipe\";

const PIPE_BUFFER_SIZE: u32 = 512;

/// Named pipe transport.
pub struct NamedPipe;

impl NamedPipe {
    /// Full pipe path for `name`, adding the `\\.\pipe\` prefix when missing.
    pub fn path_for(name: &str) -> String {
        if name.starts_with(PIPE_PREFIX) || name.starts_with(r"\\?\pipe\") {
            name.to_string()
        } else {
            format!("{PIPE_PREFIX}{name}")
        }
    }

    /// Open an existing pipe as a client, bounded by `timeout`.
    pub fn connect(path: &str, timeout: Duration) -> Result<IpcStream> {
        let deadline = deadline_after(timeout);
        loop {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    debug!(pipe = path, "connected to named pipe");
                    return Ok(IpcStream::from_pipe(file));
                }
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(TransportError::Timeout {
                            endpoint: path.to_string(),
                            timeout,
                        });
                    }
                    let wide = to_wide(path);
                    let millis = remaining.as_millis().clamp(1, u32::MAX as u128 - 1) as u32;
                    // SAFETY: `wide` is a NUL-terminated UTF-16 string that outlives the call.
                    // A zero return means the wait timed out or the pipe vanished;
                    // the next open attempt reports which.
                    unsafe { WaitNamedPipeW(wide.as_ptr(), millis) };
                }
                Err(err) => {
                    return Err(TransportError::Connect {
                        endpoint: path.to_string(),
                        source: err,
                    })
                }
            }
        }
    }

    /// Create a pipe and wait for one peer on a background worker.
    pub fn create(name: &str) -> Result<PendingPeer> {
        let path = Self::path_for(name);
        let wide = to_wide(&path);

        // SAFETY: `wide` is NUL-terminated; a null security descriptor selects defaults.
        let handle = unsafe {
            CreateNamedPipeW(
                wide.as_ptr(),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
                1,
                PIPE_BUFFER_SIZE,
                PIPE_BUFFER_SIZE,
                0,
                std::ptr::null(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(TransportError::Bind {
                path: PathBuf::from(&path),
                source: std::io::Error::last_os_error(),
            });
        }
        // SAFETY: `handle` is a valid pipe handle that nothing else owns.
        let file = File::from(unsafe { OwnedHandle::from_raw_handle(handle as RawHandle) });
        info!(pipe = %path, "created named pipe");

        let cancel_path = path.clone();
        PendingPeer::spawn(
            path,
            move || {
                // SAFETY: the handle stays open for the duration of the call because
                // `file` is owned by this closure.
                let ok = unsafe {
                    ConnectNamedPipe(file.as_raw_handle() as HANDLE, std::ptr::null_mut())
                };
                if ok == 0 {
                    let err = std::io::Error::last_os_error();
                    if err.raw_os_error() != Some(ERROR_PIPE_CONNECTED as i32) {
                        return Err(TransportError::Accept(err));
                    }
                }
                Ok(IpcStream::from_pipe(file))
            },
            // Attaching a throwaway client completes the blocked ConnectNamedPipe.
            Box::new(move || {
                let _ = OpenOptions::new().read(true).write(true).open(&cancel_path);
            }),
        )
    }
}

/// Cancel I/O pending on the file object behind `file`, waking blocked readers.
pub(crate) fn cancel_pending_io(file: &File) {
    // SAFETY: the handle is open for as long as `file` is borrowed.
    let ok = unsafe { CancelIoEx(file.as_raw_handle() as HANDLE, std::ptr::null()) };
    if ok == 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(ERROR_NOT_FOUND as i32) {
            warn!(error = %err, "cancelling pipe I/O failed");
        }
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    std::ffi::OsStr::new(s)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_adds_prefix_once() {
        assert_eq!(NamedPipe::path_for("discord-ipc-0"), r"\\.\pipe\discord-ipc-0");
        assert_eq!(
            NamedPipe::path_for(r"\\.\pipe\discord-ipc-1"),
            r"\\.\pipe\discord-ipc-1"
        );
    }

    #[test]
    fn create_then_connect() {
        let name = format!("dipc-test-{}", std::process::id());
        let pending = NamedPipe::create(&name).unwrap();
        let mut client =
            NamedPipe::connect(&NamedPipe::path_for(&name), Duration::from_secs(2)).unwrap();
        let mut server = pending.wait(Duration::from_secs(2)).unwrap();

        client.write_all_bytes(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn connect_with_unbounded_timeout() {
        let name = format!("dipc-unbounded-{}", std::process::id());
        let pending = NamedPipe::create(&name).unwrap();
        let mut client = NamedPipe::connect(&NamedPipe::path_for(&name), Duration::MAX).unwrap();
        let mut server = pending.wait(Duration::from_secs(2)).unwrap();

        server.write_all_bytes(b"ok").unwrap();
        let mut buf = [0u8; 2];
        client.read_exact_bytes(&mut buf).unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[test]
    fn shutdown_wakes_blocked_reader_as_closed() {
        let name = format!("dipc-shutdown-{}", std::process::id());
        let pending = NamedPipe::create(&name).unwrap();
        let client =
            NamedPipe::connect(&NamedPipe::path_for(&name), Duration::from_secs(2)).unwrap();
        let _server = pending.wait(Duration::from_secs(2)).unwrap();

        let mut reader = client.try_clone().unwrap();
        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read_exact_bytes(&mut buf)
        });

        std::thread::sleep(Duration::from_millis(100));
        client.shutdown();

        let err = handle.join().unwrap().unwrap_err();
        assert!(err.is_closed(), "unexpected error: {err:?}");
    }

    #[test]
    fn connect_missing_pipe_fails() {
        let result = NamedPipe::connect(
            r"\\.\pipe\dipc-definitely-missing",
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
