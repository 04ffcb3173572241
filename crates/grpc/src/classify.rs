//! Unary-vs-streaming classification for an incoming gRPC call.
//!
//! No schema is available to answer this precisely (see the codec's raw
//! byte-forwarding design), so the call is classified heuristically from
//! the method's simple name. This is an acknowledged approximation: a
//! method named e.g. `ListenForUpdates` that is actually unary would be
//! misclassified.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Unary,
    Streaming,
}

const STREAMING_HINTS: &[&str] = &["Stream", "Watch", "Subscribe", "Listen", "Monitor", "Observe"];
const UNARY_HINTS: &[&str] = &[
    "Get", "Create", "Update", "Delete", "Check", "Validate", "Info", "Status", "Health", "Ping",
    "Version", "List",
];

/// `method` is the simple method name (no package/service prefix).
pub fn classify(method: &str) -> CallKind {
    if STREAMING_HINTS.iter().any(|hint| method.contains(hint)) {
        return CallKind::Streaming;
    }
    if UNARY_HINTS.iter().any(|hint| method.contains(hint)) {
        return CallKind::Unary;
    }
    CallKind::Unary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_streaming_hints() {
        assert_eq!(classify("WatchEvents"), CallKind::Streaming);
        assert_eq!(classify("SubscribeToUpdates"), CallKind::Streaming);
    }

    #[test]
    fn classifies_unary_hints() {
        assert_eq!(classify("GetUser"), CallKind::Unary);
        assert_eq!(classify("ListItems"), CallKind::Unary);
    }

    #[test]
    fn defaults_to_unary_when_no_hint_matches() {
        assert_eq!(classify("DoSomethingWeird"), CallKind::Unary);
    }

    #[test]
    fn streaming_hint_takes_precedence_over_unary_hint() {
        // Contains both "List" (unary hint) and "Stream" (streaming hint).
        assert_eq!(classify("ListStream"), CallKind::Streaming);
    }
}
