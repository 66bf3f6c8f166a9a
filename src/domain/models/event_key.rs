//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Identity types shared by the registry, the pin store and the bus.
//
// | Name          | Description                                                      |
// |---------------|------------------------------------------------------------------|
// | EventKey      | (domain, event) pair used as the lookup key for every operation  |
// | EventContext  | Diagnostic label of the calling environment (log scoping only)   |
// | ReceiverId    | Identity of a receiver object, derived from its Arc allocation   |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Domain used when the caller does not name one.
pub const DEFAULT_DOMAIN: &str = "global.default";

/// Identifies an event inside a domain.
///
/// Both fields compare case-sensitively. Keys never change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    domain: String,
    event: String,
}

impl EventKey {
    /// Creates a key for `event` inside `domain`.
    pub fn new(domain: impl Into<String>, event: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            event: event.into(),
        }
    }

    /// Creates a key for `event` inside [`DEFAULT_DOMAIN`].
    pub fn global(event: impl Into<String>) -> Self {
        Self::new(DEFAULT_DOMAIN, event)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl Default for EventKey {
    fn default() -> Self {
        Self::global("")
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.event)
    }
}

/// Opaque handle to the calling environment.
///
/// Only ever shows up in log output, routing never looks at it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventContext {
    label: String,
}

impl EventContext {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }

    /// A context for callers that have nothing meaningful to report.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl fmt::Display for EventContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

/// Identity of a receiver object.
///
/// Derived from the address of the shared allocation. The registry keeps a `Weak` to the
/// receiver alongside the id, which keeps the allocation (and therefore the address)
/// reserved for as long as the registration exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(usize);

impl ReceiverId {
    pub fn of<R: ?Sized>(receiver: &Arc<R>) -> Self {
        Self(Arc::as_ptr(receiver) as *const () as usize)
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver@{:#x}", self.0)
    }
}
