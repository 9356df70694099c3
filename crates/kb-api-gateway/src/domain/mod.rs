//! Domain types for the API Gateway.
//!
//! Envelopes, options, wire types, configuration and error handling. Nothing
//! in here talks to a backend.

pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod events;
pub mod methods;
pub mod options;
pub mod rate_limit;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig, LimitsConfig, RelayConfig};
pub use correlation::CorrelationId;
pub use envelope::{encode, Call, CallDecoder, Params, Reply, API_VERSION};
pub use events::{ActivitySource, ChatActivity, PushEvent};
pub use error::{codes, ApiError, ApiResult, BackendError, DecodeError, GatewayError, RelayError};
pub use methods::{get_method_info, is_method_supported, ApiSurface, MethodInfo};
pub use rate_limit::{aggregate, RateLimit, RateLimitCollector, RateLimitRes};
pub use types::*;
