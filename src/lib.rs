// Expose the modules
pub mod config;
pub mod domain;

// Re-export key types for easier usage
pub use config::{ConfigError, GlobalOptions};
pub use domain::models::{
    ConversionError, DEFAULT_DOMAIN, EventContext, EventKey, Name, ObjectRef, ReceiverId, StructValue, TypeTag,
    WildcardValue,
};
pub use domain::services::events::{
    DelegateId, EmitReport, EventBus, EventError, EventReceiver, EventRecorder, EventResult, FunctionReceiver,
    FunctionSignature, ListenerError, Parameter, PinnedEvent, RecordedEvent, WildcardDelegate,
};
