//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|------------------|
// | EventError              | Errors surfaced to bus callers                    | error, from       |
// | ListenerError           | Errors raised by a single listener delivery       | error, from       |
// | EmitReport              | Outcome of one emission                           | total             |
//--------------------------------------------------------------------------------------------------

use serde::Serialize;
use thiserror::Error;

use crate::domain::models::event_key::EventKey;
use crate::domain::models::wildcard::{ConversionError, TypeTag};

/// Errors that can occur in the event system
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// The key already holds a pinned value; it has to be unpinned first
    #[error("Event {key} is already pinned, unpin it before pinning again")]
    AlreadyPinned { key: EventKey },

    /// The same receiver function (or delegate) is already bound to the key
    #[error("Listener '{listener}' is already bound to {key}")]
    DuplicateListener { key: EventKey, listener: String },

    /// The payload kind cannot travel through the bus
    #[error("Payloads of type {0} cannot be emitted")]
    UnsupportedPayload(TypeTag),
}

/// Type alias for Result with EventError
pub type EventResult<T> = Result<T, EventError>;

/// Errors produced while delivering to one listener. The bus logs them and moves on to
/// the next listener.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ListenerError {
    /// The receiver has no function with that name
    #[error("Receiving function '{0}' not found")]
    FunctionNotFound(String),

    /// The function's declared parameter does not match the emitted payload
    #[error("Function '{function}' expects {expected}, event carries {found}")]
    ParameterMismatch {
        function: String,
        expected: String,
        found: String,
    },

    /// The receiver could not convert the payload
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Any other failure reported by the receiver
    #[error("Listener failed: {0}")]
    Failed(String),
}

/// What happened during one emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmitReport {
    /// Sequence number assigned to the emission
    pub sequence: u64,
    /// Listeners that were invoked and returned normally
    pub delivered: usize,
    /// Listeners that were skipped or failed
    pub skipped: usize,
    /// Registrations dropped because their receiver no longer exists
    pub stale_removed: usize,
}

impl EmitReport {
    /// Number of listeners that were looked at during the sweep
    pub fn total(&self) -> usize {
        self.delivered + self.skipped
    }
}
