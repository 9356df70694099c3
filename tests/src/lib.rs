//! # kb-api-gateway Test Suite
//!
//! End-to-end flows through the public gateway API, backed by the in-memory
//! backend.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── api_flows.rs      # send_*_api: envelopes, dispatch, replies
//!     └── relay_flows.rs    # notification relay: filter, heartbeat, shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p kb-tests
//!
//! # With logs
//! RUST_LOG=kb_api_gateway=debug cargo test -p kb-tests -- --nocapture
//! ```

#![allow(dead_code)]

pub mod integration;
