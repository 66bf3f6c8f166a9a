//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements the event bus: listeners bind to (domain, event) keys, emissions
// carry one wildcard payload and are delivered synchronously in bind order, and pinned
// emissions are replayed to listeners that bind later.
//
// | Component                | Description                                                |
// |--------------------------|-----------------------------------------------------------|
// | EventError               | Errors surfaced to callers of the bus                     |
// | EventReceiver            | Trait for objects exposing named receiving functions      |
// | WildcardDelegate         | Opaque callable listener                                  |
// | ListenerRegistry         | Listeners per key, in bind order                          |
// | PinStore                 | Pinned emission per key                                   |
// | EventBus                 | Facade driving bind, emit, pin and dispatch               |
//--------------------------------------------------------------------------------------------------

mod event_types;
mod event_bus;
mod handlers;
mod pin_store;
mod registry;

#[cfg(test)]
mod tests;

// Re-exports
pub use event_types::{EmitReport, EventError, EventResult, ListenerError};
pub use event_bus::EventBus;
pub use handlers::{
    DelegateId, EventReceiver, EventRecorder, FunctionReceiver, FunctionSignature, Parameter,
    RecordedEvent, WildcardDelegate,
};
pub use pin_store::{PinStore, PinnedEvent};
pub use registry::{ListenerRegistration, ListenerRegistry, ListenerTarget};
