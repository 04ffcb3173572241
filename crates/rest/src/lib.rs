//! REST/HTTP side of the Relaydeck record/replay proxy: request parsing and
//! redaction ([`handler`]), request-content matching strategies
//! ([`matching`]), and server-sent-events framing ([`sse`]).

pub mod handler;
pub mod matching;
pub mod redact;
pub mod sse;

pub use matching::{matches, MatchCandidate, MatchStrategy, DEFAULT_FUZZY_IGNORED_HEADERS};
pub use redact::Redactor;
pub use sse::{SseChunk, SseDecoder};
