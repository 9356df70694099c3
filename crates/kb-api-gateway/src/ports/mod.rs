//! Ports for the API Gateway.

pub mod outbound;

pub use outbound::{
    BackendResult, ChatBackend, KvBackend, Limited, PushStream, Session, SessionBackend,
    SystemTimeSource, TeamBackend, TimeSource,
};
