//! Gateway service - entry point for the three API surfaces and the relay.
//!
//! Each `send_*_api` call reads every call envelope from its input, runs
//! them in order and writes one newline-terminated reply per call. The first
//! transport-level error aborts the rest of the input; replies already
//! written stay written.

use crate::domain::config::GatewayConfig;
use crate::domain::envelope::{encode, CallDecoder};
use crate::domain::error::GatewayError;
use crate::domain::methods::ApiSurface;
use crate::domain::types::ChatChannel;
use crate::notify::relay::{Relay, RelayHandle};
use crate::ports::outbound::Session;
use crate::rpc::Surfaces;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};

/// API gateway bound to one backend session
pub struct Gateway {
    config: GatewayConfig,
    session: Arc<Session>,
    surfaces: Arc<Surfaces>,
}

impl Gateway {
    /// Create a gateway after validating `config`
    pub fn new(config: GatewayConfig, session: Arc<Session>) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        info!(username = %session.username(), "API gateway ready");
        Ok(Self {
            config,
            session,
            surfaces: Arc::new(Surfaces::new()),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run chat API calls from `input`, writing replies to `output`.
    /// Returns the number of replies written.
    pub async fn send_chat_api<W>(&self, input: &[u8], output: &mut W) -> Result<usize, GatewayError>
    where
        W: AsyncWrite + Unpin,
    {
        self.send_api(ApiSurface::Chat, input, output).await
    }

    /// Run team API calls
    pub async fn send_team_api<W>(&self, input: &[u8], output: &mut W) -> Result<usize, GatewayError>
    where
        W: AsyncWrite + Unpin,
    {
        self.send_api(ApiSurface::Team, input, output).await
    }

    /// Run key-value store API calls
    pub async fn send_kvstore_api<W>(
        &self,
        input: &[u8],
        output: &mut W,
    ) -> Result<usize, GatewayError>
    where
        W: AsyncWrite + Unpin,
    {
        self.send_api(ApiSurface::KvStore, input, output).await
    }

    #[instrument(skip(self, input, output), fields(bytes = input.len()))]
    async fn send_api<W>(
        &self,
        surface: ApiSurface,
        input: &[u8],
        output: &mut W,
    ) -> Result<usize, GatewayError>
    where
        W: AsyncWrite + Unpin,
    {
        let limits = &self.config.limits;
        if input.len() > limits.max_request_bytes {
            return Err(GatewayError::LimitExceeded(format!(
                "request of {} bytes exceeds {} bytes",
                input.len(),
                limits.max_request_bytes
            )));
        }

        let registry = self.surfaces.get(surface);
        let mut decoder = CallDecoder::new(input);
        let mut written = 0;

        while let Some(call) = decoder.next_call()? {
            if written >= limits.max_batch_size {
                return Err(GatewayError::LimitExceeded(format!(
                    "more than {} calls in one request",
                    limits.max_batch_size
                )));
            }

            let reply = registry.dispatch(&self.session, &call).await?;
            output.write_all(&encode(&reply)?).await?;
            written += 1;
        }

        output.flush().await?;
        debug!(replies = written, "Request processed");
        Ok(written)
    }

    /// Relay for `channels` using the configured relay settings. An empty
    /// list relays every conversation.
    pub fn relay(&self, channels: Vec<ChatChannel>) -> Relay {
        Relay::new(Arc::clone(&self.session), self.config.relay.clone()).with_channels(channels)
    }

    /// Start a relay writing notifications to `sink`
    pub fn spawn_relay<W>(&self, channels: Vec<ChatChannel>, sink: W) -> RelayHandle
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.relay(channels).spawn(sink)
    }
}
