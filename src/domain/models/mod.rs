pub mod event_key;
pub mod wildcard;

pub use event_key::{DEFAULT_DOMAIN, EventContext, EventKey, ReceiverId};
pub use wildcard::{ConversionError, Name, ObjectRef, StructValue, TypeTag, WildcardValue};
