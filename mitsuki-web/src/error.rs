//! Error taxonomy of the web layer. Route errors are startup-time and fatal; request errors are
//! classified per request and converted into HTTP responses at the pipeline boundary, never
//! escaping into the event loop.

use axum::http::{Method, StatusCode};
use mitsuki_di::instance_provider::ErrorPtr;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Startup-time route table faults.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("conflicting route registration: {method} {pattern}")]
    RouteConflict { method: Method, pattern: String },
    #[error("route {method} {pattern}: duplicate placeholder '{{{name}}}'")]
    DuplicatePlaceholder {
        method: Method,
        pattern: String,
        name: String,
    },
    #[error("route {method} {pattern}: placeholder '{{{name}}}' has no path parameter binding")]
    UnboundPlaceholder {
        method: Method,
        pattern: String,
        name: String,
    },
    #[error("route {method} {pattern}: path parameter '{name}' has no placeholder in the pattern")]
    UnknownPathParameter {
        method: Method,
        pattern: String,
        name: String,
    },
    #[error("route {method} {pattern}: no handler attached")]
    MissingHandler { method: Method, pattern: String },
    #[error("error enumerating controllers: {0}")]
    ControllerLookup(ErrorPtr),
}

/// Per-request faults, classified for response mapping.
#[derive(Error, Clone, Debug)]
pub enum RequestError {
    #[error("cannot bind parameter '{parameter}': {message}")]
    Binding { parameter: String, message: String },
    #[error("missing required parameter '{parameter}'")]
    MissingParameter { parameter: String },
    #[error("request body failed validation against {type_name}: {message}")]
    IngressValidation {
        type_name: String,
        message: String,
    },
    #[error("unsupported content type: expected {expected}")]
    InvalidContentType { expected: String },
    #[error("file '{parameter}' exceeds the allowed size ({size} > {limit} bytes)")]
    FileTooLarge {
        parameter: String,
        size: usize,
        limit: usize,
    },
    #[error("file '{parameter}' has disallowed content type '{content_type}'")]
    InvalidFileType {
        parameter: String,
        content_type: String,
    },
    #[error("response failed validation against {type_name}: {message}")]
    EgressValidation {
        type_name: String,
        message: String,
    },
    #[error("handler error: {0}")]
    Handler(ErrorPtr),
    #[error("response body could not be serialized: {0}")]
    Serialization(String),
    #[error("request timed out")]
    Timeout,
}

impl RequestError {
    pub fn status(&self) -> StatusCode {
        match self {
            RequestError::Binding { .. }
            | RequestError::MissingParameter { .. }
            | RequestError::IngressValidation { .. }
            | RequestError::InvalidContentType { .. }
            | RequestError::FileTooLarge { .. }
            | RequestError::InvalidFileType { .. } => StatusCode::BAD_REQUEST,
            RequestError::EgressValidation { .. }
            | RequestError::Handler(_)
            | RequestError::Serialization(_)
            | RequestError::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The user-visible error body. Client faults carry their message; server faults are opaque
    /// unless debug mode is on.
    pub fn public_body(&self, debug: bool) -> JsonValue {
        if self.status() == StatusCode::BAD_REQUEST {
            let mut body = json!({ "error": self.to_string() });
            if let Some(parameter) = self.parameter() {
                body["details"] = json!({ "parameter": parameter });
            }
            return body;
        }

        if debug {
            json!({ "error": "Internal server error", "details": self.to_string() })
        } else {
            json!({ "error": "Internal server error" })
        }
    }

    fn parameter(&self) -> Option<&str> {
        match self {
            RequestError::Binding { parameter, .. }
            | RequestError::MissingParameter { parameter }
            | RequestError::FileTooLarge { parameter, .. }
            | RequestError::InvalidFileType { parameter, .. } => Some(parameter),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn should_map_client_faults_to_400() {
        let error = RequestError::Binding {
            parameter: "id".to_string(),
            message: "not an integer".to_string(),
        };
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);

        let body = error.public_body(false);
        assert!(body["error"].as_str().unwrap().contains("id"));
        assert_eq!(body["details"]["parameter"], "id");
    }

    #[test]
    fn should_keep_server_faults_opaque_outside_debug() {
        let error = RequestError::Handler(Arc::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "secret detail",
        )));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = error.public_body(false);
        assert_eq!(body, serde_json::json!({ "error": "Internal server error" }));

        let debug_body = error.public_body(true);
        assert!(debug_body["details"]
            .as_str()
            .unwrap()
            .contains("secret detail"));
    }
}
