//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Type-erased payload carried by an emission. The emitting side only knows it has "some
// value"; the receiving side asks for the concrete type it expects and gets a
// ConversionError when the tag does not match. Nothing here reinterprets memory, every
// conversion goes through the tag.
//
// | Name            | Description                                              |
// |-----------------|----------------------------------------------------------|
// | TypeTag         | Discriminant of the supported payload kinds              |
// | Name            | Case-insensitive identifier payload                      |
// | StructValue     | Named struct payload stored as a serde_json blob         |
// | ObjectRef       | Opaque object handle (conversion layer only)             |
// | WildcardValue   | The tagged union itself                                  |
// | ConversionError | Failure of a conversion request                          |
//--------------------------------------------------------------------------------------------------

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Kinds of value a [`WildcardValue`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Int,
    Float,
    Bool,
    String,
    Name,
    Struct,
    Object,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bool => "bool",
            TypeTag::String => "string",
            TypeTag::Name => "name",
            TypeTag::Struct => "struct",
            TypeTag::Object => "object",
        };
        f.write_str(name)
    }
}

/// Errors returned by the wildcard conversions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    /// The stored value is of another kind
    #[error("Cannot convert {found} wildcard to {expected}")]
    TypeMismatch { expected: TypeTag, found: TypeTag },

    /// The stored struct blob does not decode into the requested type
    #[error("Struct '{type_name}' could not be decoded: {message}")]
    StructDecode { type_name: String, message: String },
}

/// An identifier-like string. Comparison ignores ASCII case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A struct payload: the struct's type name plus its fields as a JSON blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    type_name: String,
    fields: serde_json::Value,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>, fields: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    /// Serializes `value` into a struct payload tagged with `type_name`.
    pub fn from_serde<T: Serialize>(
        type_name: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(type_name, serde_json::to_value(value)?))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &serde_json::Value {
        &self.fields
    }

    /// Decodes the blob into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ConversionError> {
        serde_json::from_value(self.fields.clone()).map_err(|e| ConversionError::StructDecode {
            type_name: self.type_name.clone(),
            message: e.to_string(),
        })
    }
}

/// Opaque handle to an engine object.
///
/// Only the conversion layer knows about objects; the bus refuses to emit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef(Uuid);

impl ObjectRef {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

/// A single value of one supported kind, resolved to a concrete type only when consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WildcardValue {
    Int(i32),
    Float(f32),
    Bool(bool),
    String(String),
    Name(Name),
    Struct(StructValue),
    Object(ObjectRef),
}

impl WildcardValue {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            WildcardValue::Int(_) => TypeTag::Int,
            WildcardValue::Float(_) => TypeTag::Float,
            WildcardValue::Bool(_) => TypeTag::Bool,
            WildcardValue::String(_) => TypeTag::String,
            WildcardValue::Name(_) => TypeTag::Name,
            WildcardValue::Struct(_) => TypeTag::Struct,
            WildcardValue::Object(_) => TypeTag::Object,
        }
    }

    /// Type name of a struct payload, `None` for every other kind.
    pub fn struct_type_name(&self) -> Option<&str> {
        match self {
            WildcardValue::Struct(value) => Some(value.type_name()),
            _ => None,
        }
    }

    fn mismatch(&self, expected: TypeTag) -> ConversionError {
        ConversionError::TypeMismatch {
            expected,
            found: self.type_tag(),
        }
    }

    pub fn to_int(&self) -> Result<i32, ConversionError> {
        match self {
            WildcardValue::Int(v) => Ok(*v),
            _ => Err(self.mismatch(TypeTag::Int)),
        }
    }

    /// No widening: an `Int` wildcard does not convert to float.
    pub fn to_float(&self) -> Result<f32, ConversionError> {
        match self {
            WildcardValue::Float(v) => Ok(*v),
            _ => Err(self.mismatch(TypeTag::Float)),
        }
    }

    pub fn to_bool(&self) -> Result<bool, ConversionError> {
        match self {
            WildcardValue::Bool(v) => Ok(*v),
            _ => Err(self.mismatch(TypeTag::Bool)),
        }
    }

    pub fn to_string(&self) -> Result<String, ConversionError> {
        match self {
            WildcardValue::String(v) => Ok(v.clone()),
            _ => Err(self.mismatch(TypeTag::String)),
        }
    }

    pub fn to_name(&self) -> Result<Name, ConversionError> {
        match self {
            WildcardValue::Name(v) => Ok(v.clone()),
            _ => Err(self.mismatch(TypeTag::Name)),
        }
    }

    /// Borrows the raw struct payload.
    pub fn as_struct(&self) -> Result<&StructValue, ConversionError> {
        match self {
            WildcardValue::Struct(v) => Ok(v),
            _ => Err(self.mismatch(TypeTag::Struct)),
        }
    }

    /// Decodes a struct payload into `T`.
    pub fn to_struct<T: DeserializeOwned>(&self) -> Result<T, ConversionError> {
        self.as_struct()?.decode()
    }

    pub fn to_object(&self) -> Result<ObjectRef, ConversionError> {
        match self {
            WildcardValue::Object(v) => Ok(*v),
            _ => Err(self.mismatch(TypeTag::Object)),
        }
    }
}

macro_rules! wildcard_conversions {
    ($($ty:ty => $variant:ident, $method:ident;)*) => {
        $(
            impl From<$ty> for WildcardValue {
                fn from(value: $ty) -> Self {
                    WildcardValue::$variant(value)
                }
            }

            impl TryFrom<&WildcardValue> for $ty {
                type Error = ConversionError;

                fn try_from(value: &WildcardValue) -> Result<Self, Self::Error> {
                    value.$method()
                }
            }
        )*
    };
}

wildcard_conversions! {
    i32 => Int, to_int;
    f32 => Float, to_float;
    bool => Bool, to_bool;
    String => String, to_string;
    Name => Name, to_name;
    ObjectRef => Object, to_object;
}

impl From<&str> for WildcardValue {
    fn from(value: &str) -> Self {
        WildcardValue::String(value.to_owned())
    }
}

impl From<StructValue> for WildcardValue {
    fn from(value: StructValue) -> Self {
        WildcardValue::Struct(value)
    }
}

impl TryFrom<&WildcardValue> for StructValue {
    type Error = ConversionError;

    fn try_from(value: &WildcardValue) -> Result<Self, Self::Error> {
        value.as_struct().cloned()
    }
}
