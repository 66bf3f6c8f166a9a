//--------------------------------------------------------------------------------------------------
// STRUCTS & TRAITS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|------------------|
// | EventReceiver           | Object exposing named receiving functions        | signature, receive|
// | FunctionSignature       | Declared parameter of a receiving function       | accepts           |
// | WildcardDelegate        | Opaque callable bound without a function name    | call              |
// | FunctionReceiver        | Receiver assembled from named closures           | with_function     |
// | EventRecorder           | Keeps a bounded history of received payloads     | history           |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::event_types::ListenerError;
use crate::domain::models::wildcard::{TypeTag, WildcardValue};

/// Parameter a receiving function declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parameter {
    /// The function takes nothing; any payload is ignored
    None,
    /// The function takes the wildcard itself and converts on its own
    Wildcard,
    /// The function takes one concrete value. `struct_type` narrows struct parameters to
    /// one struct type name.
    Typed {
        tag: TypeTag,
        struct_type: Option<String>,
    },
}

/// Signature of a receiving function, as reported by its receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    parameter: Parameter,
}

impl FunctionSignature {
    pub fn no_parameter() -> Self {
        Self { parameter: Parameter::None }
    }

    pub fn wildcard() -> Self {
        Self { parameter: Parameter::Wildcard }
    }

    pub fn typed(tag: TypeTag) -> Self {
        Self {
            parameter: Parameter::Typed { tag, struct_type: None },
        }
    }

    /// A struct parameter of one specific struct type.
    pub fn structure(type_name: impl Into<String>) -> Self {
        Self {
            parameter: Parameter::Typed {
                tag: TypeTag::Struct,
                struct_type: Some(type_name.into()),
            },
        }
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    /// Whether a delivery of `payload` matches the declared parameter.
    pub fn accepts(&self, payload: Option<&WildcardValue>) -> bool {
        match (&self.parameter, payload) {
            (Parameter::None, _) | (Parameter::Wildcard, _) => true,
            (Parameter::Typed { .. }, None) => false,
            (Parameter::Typed { tag, struct_type }, Some(value)) => {
                if value.type_tag() != *tag {
                    return false;
                }
                match struct_type {
                    Some(expected) => value.struct_type_name() == Some(expected.as_str()),
                    None => true,
                }
            }
        }
    }

    pub fn describe(&self) -> String {
        match &self.parameter {
            Parameter::None => "no parameter".to_string(),
            Parameter::Wildcard => "wildcard".to_string(),
            Parameter::Typed { tag, struct_type: Some(name) } => format!("{} '{}'", tag, name),
            Parameter::Typed { tag, struct_type: None } => tag.to_string(),
        }
    }
}

/// Describes the payload of an emission the way [`FunctionSignature::describe`] does.
pub(crate) fn describe_payload(payload: Option<&WildcardValue>) -> String {
    match payload {
        None => "no payload".to_string(),
        Some(value) => match value.struct_type_name() {
            Some(name) => format!("{} '{}'", value.type_tag(), name),
            None => value.type_tag().to_string(),
        },
    }
}

/// An object whose named functions can be bound to events.
///
/// The bus holds receivers weakly: dropping the last `Arc` of a receiver silently retires
/// all of its registrations.
pub trait EventReceiver: Send + Sync {
    /// Returns the signature of `function`, or `None` when the receiver has no such function.
    fn signature(&self, function: &str) -> Option<FunctionSignature>;

    /// Invokes `function` with the emitted payload.
    fn receive(&self, function: &str, payload: Option<&WildcardValue>) -> Result<(), ListenerError>;
}

/// Identifier of a bound delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId(Uuid);

impl fmt::Display for DelegateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delegate:{}", self.0)
    }
}

type DelegateFn = dyn Fn(Option<&WildcardValue>) + Send + Sync;

/// A callable that receives the raw wildcard of every emission it is bound to.
///
/// Clones share the callable and the id, so a clone can be used to unbind.
#[derive(Clone)]
pub struct WildcardDelegate {
    id: DelegateId,
    callback: Arc<DelegateFn>,
}

impl WildcardDelegate {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Option<&WildcardValue>) + Send + Sync + 'static,
    {
        Self {
            id: DelegateId(Uuid::new_v4()),
            callback: Arc::new(callback),
        }
    }

    pub fn id(&self) -> DelegateId {
        self.id
    }

    pub fn call(&self, payload: Option<&WildcardValue>) {
        (self.callback)(payload)
    }
}

impl fmt::Debug for WildcardDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildcardDelegate").field("id", &self.id).finish()
    }
}

type ReceivingFn = dyn Fn(Option<&WildcardValue>) -> Result<(), ListenerError> + Send + Sync;

/// A receiver assembled from named closures, each with a declared signature.
#[derive(Default)]
pub struct FunctionReceiver {
    name: String,
    functions: HashMap<String, (FunctionSignature, Box<ReceivingFn>)>,
}

impl FunctionReceiver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
        }
    }

    /// Adds a receiving function. A later function with the same name replaces the earlier one.
    pub fn with_function<F>(
        mut self,
        function: impl Into<String>,
        signature: FunctionSignature,
        body: F,
    ) -> Self
    where
        F: Fn(Option<&WildcardValue>) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.functions.insert(function.into(), (signature, Box::new(body)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FunctionReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&String> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("FunctionReceiver")
            .field("name", &self.name)
            .field("functions", &functions)
            .finish()
    }
}

impl EventReceiver for FunctionReceiver {
    fn signature(&self, function: &str) -> Option<FunctionSignature> {
        self.functions.get(function).map(|(signature, _)| signature.clone())
    }

    fn receive(&self, function: &str, payload: Option<&WildcardValue>) -> Result<(), ListenerError> {
        let (_, body) = self
            .functions
            .get(function)
            .ok_or_else(|| ListenerError::FunctionNotFound(function.to_string()))?;
        body(payload)
    }
}

/// A payload seen by an [`EventRecorder`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub payload: Option<WildcardValue>,
    pub received_at: DateTime<Utc>,
}

/// A simple in-memory recorder for debugging and tests
#[derive(Debug, Clone)]
pub struct EventRecorder {
    /// Maximum number of events to keep in history
    max_history: usize,
    /// Event history
    history: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    /// Name of the wildcard function the recorder exposes as a receiver
    pub const FUNCTION: &'static str = "OnEvent";

    pub fn new(max_history: usize) -> Self {
        Self {
            max_history,
            history: Arc::new(Mutex::new(Vec::with_capacity(max_history))),
        }
    }

    /// Returns the event history, oldest first
    pub fn history(&self) -> Vec<RecordedEvent> {
        self.history.lock().clone()
    }

    /// Payloads only, oldest first
    pub fn payloads(&self) -> Vec<Option<WildcardValue>> {
        self.history.lock().iter().map(|e| e.payload.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, payload: Option<&WildcardValue>) {
        let mut history = self.history.lock();

        // Remove oldest event if at capacity
        if history.len() >= self.max_history {
            if history.is_empty() {
                return;
            }
            history.remove(0);
        }

        history.push(RecordedEvent {
            payload: payload.cloned(),
            received_at: Utc::now(),
        });
    }

    /// A delegate that records into this recorder's history.
    pub fn delegate(&self) -> WildcardDelegate {
        let recorder = self.clone();
        WildcardDelegate::new(move |payload| recorder.record(payload))
    }
}

impl EventReceiver for EventRecorder {
    fn signature(&self, function: &str) -> Option<FunctionSignature> {
        (function == Self::FUNCTION).then(FunctionSignature::wildcard)
    }

    fn receive(&self, function: &str, payload: Option<&WildcardValue>) -> Result<(), ListenerError> {
        if function != Self::FUNCTION {
            return Err(ListenerError::FunctionNotFound(function.to_string()));
        }
        self.record(payload);
        Ok(())
    }
}
