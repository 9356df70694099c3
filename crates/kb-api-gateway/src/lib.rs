// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! KB API Gateway - JSON call envelopes for chat, team and key-value store
//! backends, plus a chat notification relay.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        API GATEWAY                               │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   send_chat_api     send_team_api     send_kvstore_api           │
//! │         │                 │                  │                   │
//! │  ┌──────┴─────────────────┴──────────────────┴──────┐            │
//! │  │   Call decoder → Registry → options → handler    │            │
//! │  │        (per-method timeout, rate-limit merge)    │            │
//! │  └──────────────────────┬───────────────────────────┘            │
//! │                         │                                        │
//! │  ┌──────────────────────┴───────────────────────────┐            │
//! │  │   Session: Chat / Team / Kv / Session ports      │            │
//! │  └──────────────────────┬───────────────────────────┘            │
//! │                         │                                        │
//! │  Relay: subscribe → formatter → sink    (+ heartbeat task)       │
//! └─────────────────────────┼────────────────────────────────────────┘
//!                           │
//!                    Messaging backend
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use kb_api_gateway::{Gateway, GatewayConfig, InMemoryBackend, Session};
//! use std::sync::Arc;
//!
//! let session = Arc::new(Session::new(Arc::new(InMemoryBackend::new("alice"))));
//! let gateway = Gateway::new(GatewayConfig::default(), session)?;
//! let mut out = Vec::new();
//! gateway.send_chat_api(br#"{"method": "list"}"#, &mut out).await?;
//! ```
//!
//! # Failure layers
//!
//! - Transport errors (`GatewayError`) abort a request and produce no reply
//! - Call errors (`ApiError`) come back inside the reply
//! - Relay errors (`RelayError`) end the relay

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod notify;
pub mod ports;
pub mod rpc;
pub mod service;

// Re-exports for public API
pub use adapters::InMemoryBackend;
pub use domain::config::{GatewayConfig, LimitsConfig, RelayConfig};
pub use domain::envelope::{Call, Reply, API_VERSION};
pub use domain::error::{ApiError, ApiResult, BackendError, GatewayError, RelayError};
pub use domain::methods::{get_method_info, is_method_supported, ApiSurface, MethodInfo};
pub use domain::rate_limit::RateLimit;
pub use domain::types::*;
pub use notify::{Relay, RelayExit, RelayHandle, RelayState};
pub use ports::Session;
pub use service::Gateway;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
