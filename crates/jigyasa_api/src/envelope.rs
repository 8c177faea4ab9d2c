//! Transport-neutral request/response envelopes.
//!
//! # Invariants
//! - Query values arrive already percent-decoded.
//! - Header names compare case-insensitively.
//! - Every JSON error body is `{"detail": ...}` except validation failures,
//!   which carry the field-keyed map itself.

use jigyasa_core::ServiceError;
use serde::Serialize;
use serde_json::json;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// HTTP methods the route table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Parses an upper- or lower-case method name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json(self, value: &serde_json::Value) -> Self {
        let body = value.to_string().into_bytes();
        self.with_header("Content-Type", CONTENT_TYPE_JSON)
            .with_body(body)
    }

    /// First value of header `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// First value of query parameter `key`.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// Token from an `Authorization: Bearer <token>` header.
    ///
    /// Other schemes are ignored, which leaves the request anonymous.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header("Authorization")?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if scheme.eq_ignore_ascii_case("bearer") {
            Some(token.trim())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Serializes `value` as the JSON body.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Result<Self, ServiceError> {
        let body = serde_json::to_vec(value).map_err(|err| {
            ServiceError::IntegrityFailure(format!("response serialization failed: {err}"))
        })?;
        Ok(Self {
            status,
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            headers: Vec::new(),
            body,
        })
    }

    /// `{"detail": message}` body.
    pub fn detail(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: Some(CONTENT_TYPE_JSON.to_string()),
            headers: Vec::new(),
            body: json!({ "detail": message }).to_string().into_bytes(),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Binary download with an attachment file name.
    pub fn attachment(content_type: &str, file_name: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.to_string()),
            headers: vec![(
                "Content-Disposition".to_string(),
                format!("attachment; filename=\"{file_name}\""),
            )],
            body,
        }
    }

    pub fn not_found() -> Self {
        Self::detail(404, "Not found.")
    }

    pub fn method_not_allowed(method: &str) -> Self {
        Self::detail(405, &format!("Method \"{method}\" not allowed."))
    }

    pub fn internal_error() -> Self {
        Self::detail(500, INTERNAL_ERROR_MESSAGE)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parses the body as JSON; `Value::Null` when it is not JSON.
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&ServiceError> for ApiResponse {
    fn from(value: &ServiceError) -> Self {
        match value {
            ServiceError::NotFound(message) => Self::detail(404, message),
            ServiceError::Unauthenticated(message) => {
                let mut response = Self::detail(401, message);
                response
                    .headers
                    .push(("WWW-Authenticate".to_string(), "Bearer realm=\"api\"".to_string()));
                response
            }
            ServiceError::Forbidden(message) => Self::detail(403, message),
            ServiceError::ValidationFailed(fields) => {
                Self::json(400, fields).unwrap_or_else(|_| Self::detail(400, "Invalid input."))
            }
            ServiceError::BadRequest(message) => Self::detail(400, message),
            ServiceError::Conflict(message) => Self::detail(409, message),
            ServiceError::IntegrityFailure(_) => Self::internal_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiRequest, ApiResponse, Method};
    use jigyasa_core::{FieldErrors, ServiceError};
    use serde_json::json;

    #[test]
    fn bearer_token_requires_bearer_scheme() {
        let request = ApiRequest::new(Method::Get, "/auth/profile").with_bearer("abc");
        assert_eq!(request.bearer_token(), Some("abc"));

        let basic = ApiRequest::new(Method::Get, "/auth/profile")
            .with_header("authorization", "Basic Zm9vOmJhcg==");
        assert_eq!(basic.bearer_token(), None);
    }

    #[test]
    fn validation_failures_render_the_field_map() {
        let mut fields = FieldErrors::new();
        fields.insert("question_3".to_string(), "This field is required".to_string());
        let response = ApiResponse::from(&ServiceError::ValidationFailed(fields));
        assert_eq!(response.status, 400);
        assert_eq!(
            response.json_body(),
            json!({"question_3": "This field is required"})
        );
    }

    #[test]
    fn integrity_failures_hide_detail() {
        let response =
            ApiResponse::from(&ServiceError::IntegrityFailure("disk I/O error".to_string()));
        assert_eq!(response.status, 500);
        assert_eq!(response.json_body(), json!({"detail": "Internal server error"}));
    }

    #[test]
    fn unauthenticated_carries_challenge_header() {
        let response = ApiResponse::from(&ServiceError::unauthenticated());
        assert_eq!(response.status, 401);
        assert!(response.header("www-authenticate").is_some());
    }

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("patch"), Some(Method::Patch));
        assert_eq!(Method::parse("OPTIONS"), None);
    }
}
