//! Response shaping. Handlers either return a bare JSON-serializable value (wrapped as `200 OK`)
//! or an explicit [ResponseEntity] carrying status, headers and body. Content type is
//! auto-detected from the body kind unless set explicitly.

use crate::serialization::to_json;
use axum::http::StatusCode;
use mitsuki_di::instance_provider::ErrorPtr;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::any::Any;

/// A response body in one of the transport-serializable representations.
#[derive(Debug)]
pub enum ResponseBody {
    Empty,
    Json(JsonValue),
    Text(String),
    Bytes(Vec<u8>),
    /// A type-erased payload encoded through the
    /// [JsonEncoderRegistry](crate::serialization::JsonEncoderRegistry) at egress time.
    Any(Box<dyn Any + Send + Sync>),
}

/// Explicit response wrapper: status, headers and body.
#[derive(Debug)]
pub struct ResponseEntity {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl ResponseEntity {
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Empty,
        }
    }

    pub fn ok() -> Self {
        Self::status(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::status(StatusCode::CREATED)
    }

    pub fn accepted() -> Self {
        Self::status(StatusCode::ACCEPTED)
    }

    pub fn no_content() -> Self {
        Self::status(StatusCode::NO_CONTENT)
    }

    pub fn bad_request() -> Self {
        Self::status(StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized() -> Self {
        Self::status(StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden() -> Self {
        Self::status(StatusCode::FORBIDDEN)
    }

    pub fn not_found() -> Self {
        Self::status(StatusCode::NOT_FOUND)
    }

    pub fn conflict() -> Self {
        Self::status(StatusCode::CONFLICT)
    }

    pub fn internal_server_error() -> Self {
        Self::status(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Serializes a value into the JSON body. The shorthand for the common
    /// "bare value with 200" contract is [ResponseEntity::of].
    pub fn body<T: Serialize>(mut self, value: &T) -> Result<Self, ErrorPtr> {
        self.body = ResponseBody::Json(to_json(value)?);
        Ok(self)
    }

    /// `200 OK` with a JSON body.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, ErrorPtr> {
        Self::ok().body(value)
    }

    pub fn json_value(mut self, value: JsonValue) -> Self {
        self.body = ResponseBody::Json(value);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = ResponseBody::Text(text.into());
        self
    }

    pub fn bytes(mut self, bytes: Vec<u8>) -> Self {
        self.body = ResponseBody::Bytes(bytes);
        self
    }

    /// A payload without a `Serialize` implementation, encoded through the encoder registry.
    pub fn any<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.body = ResponseBody::Any(Box::new(value));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn explicit_content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
    }
}
