//! Raw gRPC byte-level forwarding: an opaque-payload codec ([`codec`]), an
//! acknowledged-heuristic unary/streaming classifier ([`classify`]), and a
//! service/method router ([`router`]).

pub mod classify;
pub mod codec;
pub mod frame;
pub mod router;

pub use classify::{classify, CallKind};
pub use codec::{RawCodec, RawMessage};
pub use frame::{decode_frame, encode_frame};
pub use router::{GrpcRoute, GrpcRouter, RouterError};

/// A fresh opaque `request_id` for a newly-observed gRPC call:
/// `grpc-<nanotime>`, monotonically unique in process.
pub fn new_request_id() -> relaydeck_common::RequestId {
    relaydeck_common::RequestId::new_grpc()
}
