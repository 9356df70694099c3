//! Chat notification relay.
//!
//! - `handler`: one callback per push kind plus the no-op default
//! - `formatter`: the `chat` / `chat_conv` output rules
//! - `relay`: subscription, heartbeat and the write loop

pub mod formatter;
pub mod handler;
pub mod relay;

pub use formatter::{FormatterOptions, NotificationFormatter, SubscriptionFilter};
pub use handler::{NoopNotifyHandler, Notification, NotifyHandler};
pub use relay::{Relay, RelayExit, RelayHandle, RelayState};
