//! Type-safe identifier newtypes for the record/replay proxy.
//!
//! These types keep the three levels of the data model (Session →
//! Interaction → StreamChunk) from being accidentally mixed up, and keep the
//! externally-assigned `request_id` token distinct from the store's internal
//! row ids.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Internal, store-assigned identifier for a Session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal, store-assigned identifier for an Interaction row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InteractionId(pub i64);

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal, store-assigned identifier for a StreamChunk row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamChunkId(pub i64);

impl fmt::Display for StreamChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally-assigned, opaque, globally-unique request identifier.
///
/// Generated by the REST handler or the gRPC codec when a live request is
/// received, carried through recording and matching, and stored verbatim.
/// Never reused across interactions (the store enforces uniqueness).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id for a REST call.
    pub fn new_rest() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Generate a fresh request id for a gRPC call (`grpc-<nanotime>`, per
    /// the spec's documented scheme).
    pub fn new_grpc() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        Self(format!("grpc-{nanos}"))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::new_rest();
        let b = RequestId::new_rest();
        assert_ne!(a, b);
    }

    #[test]
    fn grpc_request_id_has_expected_prefix() {
        let id = RequestId::new_grpc();
        assert!(id.as_str().starts_with("grpc-"));
    }

    #[test]
    fn session_id_displays_as_integer() {
        assert_eq!(SessionId(42).to_string(), "42");
    }
}
