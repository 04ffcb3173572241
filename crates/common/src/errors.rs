//! Shared error glue between the proxy crates.
//!
//! Each crate defines its own `thiserror` enum for the failures specific to
//! its layer (store, codec, engine); this module only holds the pieces that
//! are genuinely shared, namely the protocol tag used across the data model.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two protocols the core understands. Carried on every `Interaction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Rest,
    Grpc,
}

impl Protocol {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Protocol::Rest => "REST",
            Protocol::Grpc => "gRPC",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "REST" => Some(Protocol::Rest),
            "gRPC" => Some(Protocol::Grpc),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_round_trips_through_db_string() {
        for p in [Protocol::Rest, Protocol::Grpc] {
            assert_eq!(Protocol::from_db_str(p.as_db_str()), Some(p));
        }
    }

    #[test]
    fn unknown_protocol_string_is_rejected() {
        assert_eq!(Protocol::from_db_str("carrier-pigeon"), None);
    }
}
