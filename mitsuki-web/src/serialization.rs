//! JSON encoding conventions of the framework. Most values reach the wire through their `serde`
//! implementations: `chrono` instants and dates as ISO-8601, `uuid` textually, `rust_decimal`
//! losslessly numeric (arbitrary-precision JSON), enum variants by tag, structs as deep
//! dictionaries, sets as ordered sequences. [Base64Bytes] opts byte arrays into base-64 instead
//! of serde's default number-array form.
//!
//! Payloads without a `Serialize` implementation go through the [JsonEncoderRegistry]: a built-in
//! set of type encoders extensible by the application through a reserved component (see
//! [JSON_ENCODERS_COMPONENT]); custom mappings extend, never replace, the built-ins.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use fxhash::FxHashMap;
use mitsuki_di::instance_provider::{convert_error, ErrorPtr};
use rust_decimal::Decimal;
use serde::de::{Deserializer, Error as DeError};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::any::{Any, TypeId};
use std::sync::Arc;
use uuid::Uuid;

/// Reserved component name under which an application-supplied [JsonEncoderRegistry] is looked
/// up by the request pipeline.
pub const JSON_ENCODERS_COMPONENT: &str = "jsonEncoders";

/// Serializes any `Serialize` value into a JSON document.
pub fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, ErrorPtr> {
    serde_json::to_value(value).map_err(convert_error)
}

/// Byte array carrying base-64 JSON representation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Base64Bytes)
            .map_err(DeError::custom)
    }
}

type EncodeFunction = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<JsonValue> + Send + Sync>;

/// Maps Rust types to JSON encoders for type-erased response payloads
/// ([ResponseBody::Any](crate::response::ResponseBody::Any)).
#[derive(Clone, Default)]
pub struct JsonEncoderRegistry {
    custom: FxHashMap<TypeId, EncodeFunction>,
}

impl JsonEncoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an encoder for `T`, extending the built-in set. Re-registering a type replaces
    /// only the custom mapping.
    pub fn register<T, F>(&mut self, encode: F) -> &mut Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> JsonValue + Send + Sync + 'static,
    {
        self.custom.insert(
            TypeId::of::<T>(),
            Arc::new(move |value| value.downcast_ref::<T>().map(&encode)),
        );
        self
    }

    /// Encodes a type-erased payload, consulting custom mappings before the built-ins.
    pub fn encode(&self, value: &(dyn Any + Send + Sync)) -> Option<JsonValue> {
        if let Some(encode) = self.custom.get(&value.type_id()) {
            if let Some(encoded) = encode(value) {
                return Some(encoded);
            }
        }
        builtin_encode(value)
    }
}

fn builtin_encode(value: &(dyn Any + Send + Sync)) -> Option<JsonValue> {
    if let Some(value) = value.downcast_ref::<JsonValue>() {
        return Some(value.clone());
    }
    if let Some(value) = value.downcast_ref::<DateTime<Utc>>() {
        return serde_json::to_value(value).ok();
    }
    if let Some(value) = value.downcast_ref::<NaiveDateTime>() {
        return serde_json::to_value(value).ok();
    }
    if let Some(value) = value.downcast_ref::<NaiveDate>() {
        return serde_json::to_value(value).ok();
    }
    if let Some(value) = value.downcast_ref::<NaiveTime>() {
        return serde_json::to_value(value).ok();
    }
    if let Some(value) = value.downcast_ref::<Uuid>() {
        return Some(JsonValue::String(value.to_string()));
    }
    if let Some(value) = value.downcast_ref::<Decimal>() {
        return serde_json::to_value(value).ok();
    }
    if let Some(value) = value.downcast_ref::<Vec<u8>>() {
        return Some(JsonValue::String(BASE64.encode(value)));
    }
    if let Some(value) = value.downcast_ref::<String>() {
        return Some(JsonValue::String(value.clone()));
    }
    if let Some(value) = value.downcast_ref::<bool>() {
        return Some(JsonValue::Bool(*value));
    }
    if let Some(value) = value.downcast_ref::<i64>() {
        return Some(JsonValue::Number((*value).into()));
    }
    if let Some(value) = value.downcast_ref::<f64>() {
        return serde_json::Number::from_f64(*value).map(JsonValue::Number);
    }
    None
}
