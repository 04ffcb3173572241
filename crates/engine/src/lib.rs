//! Record, Mock, and Replay engines: the orchestration layer that ties the
//! [`relaydeck_store`] persistence contract to the wire-level parsing/
//! matching in [`relaydeck_rest`] and [`relaydeck_grpc`].

pub mod cursor;
pub mod grpc_mock;
pub mod grpc_record;
pub mod mock;
pub mod observer;
pub mod record;
pub mod replay;

pub use cursor::SequenceCursor;
pub use grpc_mock::{GrpcMockEngine, GrpcMockOutcome, GrpcMockRequest};
pub use grpc_record::{GrpcLiveCall, GrpcRecordEngine, GrpcRecordError, GrpcRecordedCall};
pub use mock::{replay_chunks, MockEngine, MockOutcome, MockRequest, NotFoundResponse};
pub use observer::{ChannelObserver, NullObserver, Observer, RequestEvent, ResponseEvent};
pub use record::{LiveRequest, RecordEngine, RecordError, RecordedResponse};
pub use replay::{
    GrpcReplayError, GrpcReplayTarget, ReplayEngine, ReplayResult, ReplayTarget, SessionReplayReport,
    ValidationStrategy,
};
