//! Outbound ports for the API Gateway.
//!
//! The gateway never talks to a service directly. Every backend operation
//! goes through one of these traits and reports the rate-limit records it
//! touched alongside its value.

use crate::domain::error::BackendError;
use crate::domain::events::PushEvent;
use crate::domain::options::AdvertisementKind;
use crate::domain::rate_limit::RateLimit;
use crate::domain::types::{
    BotCommand, ChatChannel, Conversation, ConversationId, KvDeleteResult, KvEntryList,
    KvGetResult, KvNamespaceList, KvPutResult, MembersDetails, MembersType, MessageId,
    MessageUnboxed, Pagination, TeamDetails, TeamList, TopicType, UserBotCommand,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

/// Backend value together with the rate limits the call reported
#[derive(Debug, Clone, PartialEq)]
pub struct Limited<T> {
    pub value: T,
    pub rate_limits: Vec<RateLimit>,
}

impl<T> Limited<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            rate_limits: Vec::new(),
        }
    }

    pub fn with_limits(value: T, rate_limits: Vec<RateLimit>) -> Self {
        Self { value, rate_limits }
    }
}

pub type BackendResult<T> = Result<Limited<T>, BackendError>;

/// Live push events for one subscription, in backend order
pub type PushStream = BoxStream<'static, PushEvent>;

// ═══════════════════════════════════════════════════════════════════════
// REQUEST AND RESPONSE SHAPES
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct InboxQuery {
    pub topic_type: TopicType,
    pub unread_only: bool,
    pub conversation_id: Option<ConversationId>,
}

#[derive(Debug, Clone, Default)]
pub struct Inbox {
    pub conversations: Vec<Conversation>,
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadQuery {
    pub pagination: Option<Pagination>,
    pub mark_as_read: bool,
}

/// Messages of one conversation, newest first
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub messages: Vec<MessageUnboxed>,
    pub pagination: Option<Pagination>,
    pub offline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct OutgoingText {
    pub body: String,
    pub nonblock: bool,
    pub exploding_lifetime: Option<Duration>,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone, Default)]
pub struct Upload {
    pub filename: String,
    pub title: String,
    pub preview: String,
    pub exploding_lifetime: Option<Duration>,
}

/// Outcome of posting a message. Non-blocking sends have no id yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Posted {
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAdvertisement {
    pub kind: AdvertisementKind,
    pub commands: Vec<BotCommand>,
    pub team_name: Option<String>,
    pub conv_id: Option<ConversationId>,
}

/// Fully qualified key-value entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryRef {
    pub team: String,
    pub namespace: String,
    pub entry_key: String,
}

// ═══════════════════════════════════════════════════════════════════════
// PORTS
// ═══════════════════════════════════════════════════════════════════════

/// Messaging backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn get_inbox(&self, query: &InboxQuery) -> BackendResult<Inbox>;

    /// `None` when no conversation has this id
    async fn get_conversation(&self, id: &ConversationId) -> BackendResult<Option<Conversation>>;

    /// Conversations matching a channel address
    async fn find_conversations(&self, channel: &ChatChannel) -> BackendResult<Vec<Conversation>>;

    async fn new_conversation(&self, channel: &ChatChannel) -> BackendResult<Conversation>;

    /// Every conversation on a team or TLF name with the given topic type
    async fn get_tlf_conversations(
        &self,
        name: &str,
        members: MembersType,
        topic: TopicType,
    ) -> BackendResult<Vec<Conversation>>;

    async fn get_thread(&self, conv: &ConversationId, query: &ThreadQuery)
        -> BackendResult<ThreadPage>;

    async fn get_messages(
        &self,
        conv: &ConversationId,
        ids: &[MessageId],
        mark_as_read: bool,
    ) -> BackendResult<ThreadPage>;

    async fn post_text(&self, conv: &ConversationId, msg: &OutgoingText) -> BackendResult<Posted>;

    async fn edit_message(
        &self,
        conv: &ConversationId,
        target: MessageId,
        body: &str,
    ) -> BackendResult<Posted>;

    async fn post_reaction(
        &self,
        conv: &ConversationId,
        target: MessageId,
        reaction: &str,
    ) -> BackendResult<Posted>;

    async fn upload_attachment(&self, conv: &ConversationId, upload: &Upload)
        -> BackendResult<Posted>;

    async fn join_conversation(&self, conv: &ConversationId) -> BackendResult<()>;

    async fn leave_conversation(&self, conv: &ConversationId) -> BackendResult<()>;

    async fn advertise_commands(
        &self,
        alias: Option<&str>,
        ads: &[CommandAdvertisement],
    ) -> BackendResult<()>;

    async fn clear_commands(&self) -> BackendResult<()>;

    async fn list_commands(&self, conv: &ConversationId) -> BackendResult<Vec<UserBotCommand>>;

    async fn list_members(&self, conv: &ConversationId) -> BackendResult<MembersDetails>;
}

/// Team directory backend
#[async_trait]
pub trait TeamBackend: Send + Sync {
    async fn team_get(&self, team: &str, force_poll: bool) -> BackendResult<TeamDetails>;

    async fn team_list_for_user(
        &self,
        username: &str,
        include_implicit: bool,
    ) -> BackendResult<TeamList>;
}

/// Key-value store backend
#[async_trait]
pub trait KvBackend: Send + Sync {
    async fn get_entry(&self, entry: &EntryRef) -> BackendResult<KvGetResult>;

    async fn put_entry(
        &self,
        entry: &EntryRef,
        value: &str,
        revision: Option<u32>,
    ) -> BackendResult<KvPutResult>;

    async fn list_namespaces(&self, team: &str) -> BackendResult<KvNamespaceList>;

    async fn list_entries(&self, team: &str, namespace: &str) -> BackendResult<KvEntryList>;

    async fn delete_entry(
        &self,
        entry: &EntryRef,
        revision: Option<u32>,
    ) -> BackendResult<KvDeleteResult>;
}

/// Session-level operations: identity, liveness and push subscription
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Username the session is logged in as
    fn username(&self) -> &str;

    /// Liveness probe
    async fn ping(&self) -> Result<(), BackendError>;

    /// Start receiving push events
    async fn subscribe(&self) -> Result<PushStream, BackendError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Unix time in milliseconds
    fn now_ms(&self) -> i64;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Immutable handle to everything a call needs. Shared by concurrent calls
/// and by the notification relay.
#[derive(Clone)]
pub struct Session {
    pub chat: Arc<dyn ChatBackend>,
    pub team: Arc<dyn TeamBackend>,
    pub kv: Arc<dyn KvBackend>,
    pub account: Arc<dyn SessionBackend>,
    pub clock: Arc<dyn TimeSource>,
}

impl Session {
    /// Session over a single backend implementing every port
    pub fn new<B>(backend: Arc<B>) -> Self
    where
        B: ChatBackend + TeamBackend + KvBackend + SessionBackend + 'static,
    {
        Self {
            chat: backend.clone(),
            team: backend.clone(),
            kv: backend.clone(),
            account: backend,
            clock: Arc::new(SystemTimeSource),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn username(&self) -> &str {
        self.account.username()
    }

    /// The implicit team of the session user alone, `"<user>,<user>"`
    pub fn self_team(&self) -> String {
        let user = self.username();
        format!("{},{}", user, user)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}
