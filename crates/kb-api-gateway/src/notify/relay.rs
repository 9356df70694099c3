//! Notification relay.
//!
//! Subscribes to the backend push stream, formats every event and writes
//! one JSON object per line to a sink. A heartbeat task probes the backend
//! alongside; the relay ends on shutdown, a failed probe, a failed write or
//! the end of the stream. There is no reconnect.

use crate::domain::config::RelayConfig;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ApiError, RelayError};
use crate::domain::options::ConvAddress;
use crate::domain::types::{ChatChannel, ConversationId, MembersType};
use crate::notify::formatter::{FormatterOptions, NotificationFormatter, SubscriptionFilter};
use crate::notify::handler::Notification;
use crate::ports::outbound::Session;
use crate::rpc::resolve::find_conversation;
use crate::rpc::CallContext;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Lifecycle of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Building the filter
    Init,
    /// Push stream open, heartbeat not started yet
    Subscribed,
    /// Relaying events
    Streaming,
    /// At least one probe missed, still relaying
    Degraded,
    /// Finished; nothing more is written
    Terminated,
}

/// Graceful end of a relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayExit {
    Cancelled,
}

/// Heartbeat outcome reported to the relay loop
#[derive(Debug)]
enum Beat {
    Missed { count: u32, reason: String },
    Recovered,
    Lost(String),
}

/// Relay configuration plus the channels to report on
pub struct Relay {
    session: Arc<Session>,
    config: RelayConfig,
    channels: Vec<ChatChannel>,
}

impl Relay {
    pub fn new(session: Arc<Session>, config: RelayConfig) -> Self {
        Self {
            session,
            config,
            channels: Vec::new(),
        }
    }

    /// Restrict output to these channels. No channels means every conversation.
    pub fn with_channels(mut self, channels: Vec<ChatChannel>) -> Self {
        self.channels = channels;
        self
    }

    /// Resolve the configured channels into a conversation filter
    pub async fn build_filter(&self) -> Result<SubscriptionFilter, RelayError> {
        let ctx = CallContext::new(self.session.clone());
        let mut ids: Vec<ConversationId> = Vec::new();

        for channel in &self.channels {
            channel
                .check()
                .map_err(|reason| RelayError::Setup(ApiError::address_resolution(reason)))?;

            if channel.members() == MembersType::Team && channel.topic_name.is_empty() {
                let convs = ctx
                    .track(
                        self.session
                            .chat
                            .get_tlf_conversations(&channel.name, MembersType::Team, channel.topic())
                            .await,
                    )
                    .map_err(RelayError::Setup)?;
                debug!(team = %channel.name, count = convs.len(), "Expanded team channel");
                ids.extend(convs.into_iter().map(|c| c.summary.id));
            } else {
                let conv = find_conversation(&ctx, &ConvAddress::by_channel(channel.clone()))
                    .await
                    .map_err(RelayError::Setup)?;
                ids.push(conv.summary.id);
            }
        }

        Ok(SubscriptionFilter::new(ids))
    }

    /// Run the relay on its own task
    pub fn spawn<W>(self, sink: W) -> RelayHandle
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (state_tx, state_rx) = watch::channel(RelayState::Init);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let span = info_span!("relay", relay_id = %CorrelationId::new());
        let task = tokio::spawn(self.run(sink, state_tx, shutdown_rx).instrument(span));
        RelayHandle {
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Run the relay to completion on the current task
    pub async fn run<W>(
        self,
        sink: W,
        state: watch::Sender<RelayState>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<RelayExit, RelayError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let result = self.stream(sink, &state, shutdown).await;
        state.send_replace(RelayState::Terminated);
        match &result {
            Ok(exit) => info!(?exit, "Notification relay stopped"),
            Err(e) => error!(error = %e, "Notification relay terminated"),
        }
        result
    }

    async fn stream<W>(
        self,
        mut sink: W,
        state: &watch::Sender<RelayState>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RelayExit, RelayError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let filter = self.build_filter().await?;
        let mut events = self
            .session
            .account
            .subscribe()
            .await
            .map_err(|e| RelayError::Setup(ApiError::from(e)))?;
        state.send_replace(RelayState::Subscribed);
        info!(
            username = %self.session.username(),
            filtered = filter.ids().len(),
            "Notification relay subscribed"
        );

        let formatter = NotificationFormatter::new(
            self.session.username(),
            self.session.clock.clone(),
            filter,
            FormatterOptions::from(&self.config),
        );

        let (beat_tx, mut beats) = mpsc::channel(4);
        let heartbeat = tokio::spawn(
            heartbeat(self.session.clone(), self.config.clone(), beat_tx).in_current_span(),
        );
        let _abort = AbortOnDrop(heartbeat);
        state.send_replace(RelayState::Streaming);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    return Ok(RelayExit::Cancelled);
                }

                beat = beats.recv() => on_beat(beat, state)?,

                event = events.next() => {
                    let Some(event) = event else {
                        return Err(RelayError::ConnectionLost("notification stream closed".into()));
                    };
                    let Some(notification) = event.deliver(&formatter) else {
                        debug!(kind = event.kind(), "Push produced no output");
                        continue;
                    };

                    // A stalled sink must not hide a lost backend or a shutdown
                    let write = write_line(&mut sink, &notification);
                    tokio::pin!(write);
                    loop {
                        tokio::select! {
                            biased;

                            _ = shutdown.changed() => return Ok(RelayExit::Cancelled),
                            beat = beats.recv() => on_beat(beat, state)?,
                            written = &mut write => {
                                written?;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }
}

fn on_beat(beat: Option<Beat>, state: &watch::Sender<RelayState>) -> Result<(), RelayError> {
    match beat {
        Some(Beat::Lost(reason)) => Err(RelayError::ConnectionLost(reason)),
        Some(Beat::Missed { count, reason }) => {
            warn!(missed = count, %reason, "Heartbeat missed");
            state.send_replace(RelayState::Degraded);
            Ok(())
        }
        Some(Beat::Recovered) => {
            info!("Heartbeat recovered");
            state.send_replace(RelayState::Streaming);
            Ok(())
        }
        None => Err(RelayError::ConnectionLost("heartbeat stopped".into())),
    }
}

async fn write_line<W>(sink: &mut W, notification: &Notification) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(notification)
        .map_err(|e| RelayError::ConnectionLost(format!("unable to encode notification: {}", e)))?;
    line.push(b'\n');
    sink.write_all(&line)
        .await
        .map_err(|e| RelayError::ConnectionLost(format!("unable to write notification: {}", e)))?;
    sink.flush()
        .await
        .map_err(|e| RelayError::ConnectionLost(format!("unable to write notification: {}", e)))
}

/// Probe the backend every `heartbeat_interval` until the limit of
/// consecutive misses is reached or the relay goes away
async fn heartbeat(session: Arc<Session>, config: RelayConfig, beats: mpsc::Sender<Beat>) {
    let mut ticker = tokio::time::interval(config.heartbeat_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    let mut missed = 0u32;
    loop {
        ticker.tick().await;
        let failure = match timeout(config.probe_timeout, session.account.ping()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {:?}", config.probe_timeout)),
        };

        let beat = match failure {
            None if missed == 0 => continue,
            None => {
                missed = 0;
                Beat::Recovered
            }
            Some(reason) => {
                missed += 1;
                let reason = format!("connection to service lost: error during ping: {}", reason);
                if missed >= config.max_missed_heartbeats {
                    let _ = beats.send(Beat::Lost(reason)).await;
                    return;
                }
                Beat::Missed {
                    count: missed,
                    reason,
                }
            }
        };

        if beats.send(beat).await.is_err() {
            return;
        }
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Control handle of a spawned relay
pub struct RelayHandle {
    state: watch::Receiver<RelayState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<RelayExit, RelayError>>,
}

impl RelayHandle {
    /// Current lifecycle state
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Receiver for state transitions
    pub fn watch_state(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }

    /// Ask the relay to stop. It finishes with `RelayExit::Cancelled`;
    /// dropping the handle has the same effect.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the relay to finish
    pub async fn join(self) -> Result<RelayExit, RelayError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RelayError::ConnectionLost(format!("relay task failed: {}", e))),
        }
    }
}
