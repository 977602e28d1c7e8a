use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier correlating logs, spans and errors of one inbound request.
///
/// Either taken from the caller's `x-request-id` header or generated at
/// the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Creates a new random request ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-request data threaded explicitly through handler, service and
/// repository calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    request_id: RequestId,
}

impl RequestContext {
    pub fn new(request_id: RequestId) -> Self {
        Self { request_id }
    }

    /// Context with a freshly generated request ID, for background and test use.
    pub fn detached() -> Self {
        Self::new(RequestId::generate())
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}
