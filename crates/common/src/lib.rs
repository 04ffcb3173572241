//! Shared types and utilities for the Relaydeck record/replay API proxy.
//!
//! This crate holds the pieces every other `relaydeck-*` crate needs: the
//! identifier newtypes for the Session → Interaction → StreamChunk data
//! model, the shared `Protocol` tag, and a lock-free circuit breaker used by
//! the record/replay engines to protect against a continuously-failing
//! upstream.

pub mod circuit_breaker;
pub mod errors;
pub mod ids;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState};
pub use errors::Protocol;
pub use ids::{InteractionId, RequestId, SessionId, StreamChunkId};
