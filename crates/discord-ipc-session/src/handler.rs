use crate::error::SessionError;
use crate::session::SessionState;

/// Where a session fault was observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultContext {
    /// The operation that failed (`connect`, `send`, `receive`).
    pub operation: &'static str,
    /// Session state when the failure was detected.
    pub state: SessionState,
    /// Display form of the endpoint.
    pub endpoint: String,
}

/// Callback invoked with every error a session operation returns.
///
/// Runs synchronously on the thread that hit the failure, before the error
/// is handed back to the caller.
pub type ErrorHandler = Box<dyn FnMut(&SessionError, &FaultContext) + Send>;
