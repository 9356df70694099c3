//! In-process backend implementing every outbound port.
//!
//! Holds conversations, teams and key-value entries in memory, fans push
//! events out to subscribers and counts every backend call. Used as the
//! reference adapter by the test suites and for local experiments.

use crate::domain::error::BackendError;
use crate::domain::events::{ActivitySource, ChatActivity, PushEvent};
use crate::domain::options::AdvertisementKind;
use crate::domain::rate_limit::RateLimit;
use crate::domain::types::{
    ChatChannel, Conversation, ConversationId, ConvSummary, KvDeleteResult, KvEntryKey,
    KvEntryList, KvGetResult, KvNamespaceList, KvPutResult, MemberInfo, MembersDetails,
    MembersType, MessageId, MessageType, MessageUnboxed, MessageValid, MsgContent, MsgSender,
    Pagination, ReactionBody, EditBody, TeamDetails, TeamList, TeamMembership, TeamRole,
    TopicType, UserBotCommand,
};
use crate::ports::outbound::{
    BackendResult, ChatBackend, CommandAdvertisement, EntryRef, Inbox, InboxQuery, KvBackend,
    Limited, OutgoingText, Posted, PushStream, SessionBackend, TeamBackend, ThreadPage,
    ThreadQuery, Upload,
};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct ConvState {
    conv: Conversation,
    /// Oldest first
    messages: Vec<MessageUnboxed>,
    members: BTreeMap<String, TeamRole>,
    next_msg_id: MessageId,
}

impl ConvState {
    fn latest_id(&self) -> MessageId {
        self.next_msg_id.saturating_sub(1)
    }

    fn contains(&self, id: MessageId) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m, MessageUnboxed::Valid(v) if v.id == id))
    }

    /// Summary with the unread flag computed for the reader
    fn snapshot(&self) -> Conversation {
        let mut conv = self.conv.clone();
        conv.summary.unread = self.latest_id() > conv.read_msg_id;
        conv
    }
}

#[derive(Debug, Clone)]
struct TeamState {
    members: BTreeMap<String, TeamRole>,
    open: bool,
}

#[derive(Debug, Clone)]
struct KvEntry {
    value: Option<String>,
    revision: u32,
}

#[derive(Debug, Clone)]
struct Advertised {
    username: String,
    ads: Vec<CommandAdvertisement>,
}

#[derive(Debug, Default)]
struct State {
    conversations: BTreeMap<ConversationId, ConvState>,
    teams: HashMap<String, TeamState>,
    kv: BTreeMap<EntryRef, KvEntry>,
    advertised: Vec<Advertised>,
    subscribers: Vec<mpsc::UnboundedSender<PushEvent>>,
    rate_limits: Vec<RateLimit>,
    throttle: Option<RateLimit>,
}

/// In-memory backend
pub struct InMemoryBackend {
    username: String,
    state: RwLock<State>,
    calls: AtomicU64,
    next_conv: AtomicU64,
    healthy: AtomicBool,
    offline: AtomicBool,
}

impl InMemoryBackend {
    /// Create a backend whose session is logged in as `username`
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: RwLock::new(State::default()),
            calls: AtomicU64::new(0),
            next_conv: AtomicU64::new(1),
            healthy: AtomicBool::new(true),
            offline: AtomicBool::new(false),
        }
    }

    /// Number of backend operations served so far. Pings and subscriptions
    /// are not counted.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Rate limits reported by every subsequent call
    pub fn set_rate_limits(&self, limits: Vec<RateLimit>) {
        self.state.write().rate_limits = limits;
    }

    /// Throttle every subsequent call with this record, or stop throttling
    pub fn set_throttle(&self, limit: Option<RateLimit>) {
        self.state.write().throttle = limit;
    }

    /// Make liveness probes fail or succeed
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    /// Serve inbox and thread reads as stale offline data
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Create a conversation for `channel` and return its id
    pub fn add_conversation(&self, channel: ChatChannel) -> ConversationId {
        let conv = self.create(&channel);
        conv.summary.id
    }

    /// Create a team with the given members
    pub fn add_team(&self, name: &str, members: &[(&str, TeamRole)], open: bool) {
        let members = members
            .iter()
            .map(|(user, role)| (user.to_string(), *role))
            .collect();
        self.state
            .write()
            .teams
            .insert(name.to_string(), TeamState { members, open });
    }

    /// Append a text message from `sender` without publishing an event
    pub fn add_text(&self, conv: &ConversationId, sender: &str, body: &str) -> Option<MessageId> {
        let mut state = self.state.write();
        let conv_state = state.conversations.get_mut(conv)?;
        let id = append(conv_state, sender, MsgContent::text(body), None);
        Some(id)
    }

    /// Append a text message from another user and push it to subscribers
    /// as remote activity
    pub fn receive_text(&self, conv: &ConversationId, sender: &str, body: &str) -> Option<MessageId> {
        let (id, snapshot, message) = {
            let mut state = self.state.write();
            let conv_state = state.conversations.get_mut(conv)?;
            let id = append(conv_state, sender, MsgContent::text(body), None);
            let message = conv_state.messages.last().cloned()?;
            (id, conv_state.snapshot(), message)
        };
        self.publish(PushEvent::NewChatActivity {
            source: ActivitySource::Remote,
            activity: ChatActivity::IncomingMessage {
                conv_id: conv.clone(),
                conv: Some(snapshot),
                message,
                pagination: None,
            },
        });
        Some(id)
    }

    /// Append an arbitrary message without publishing an event
    pub fn add_message(&self, conv: &ConversationId, message: MessageUnboxed) -> bool {
        let mut state = self.state.write();
        match state.conversations.get_mut(conv) {
            Some(conv_state) => {
                if let MessageUnboxed::Valid(ref valid) = message {
                    conv_state.next_msg_id = conv_state.next_msg_id.max(valid.id + 1);
                }
                conv_state.messages.push(message);
                true
            }
            None => false,
        }
    }

    /// Move the session user's read marker
    pub fn mark_read(&self, conv: &ConversationId, up_to: MessageId) {
        if let Some(conv_state) = self.state.write().conversations.get_mut(conv) {
            conv_state.conv.read_msg_id = up_to;
        }
    }

    /// Conversation as the session currently sees it
    pub fn conversation(&self, conv: &ConversationId) -> Option<Conversation> {
        self.state.read().conversations.get(conv).map(ConvState::snapshot)
    }

    pub fn conversation_count(&self) -> usize {
        self.state.read().conversations.len()
    }

    /// Deliver a push event to every live subscriber. Returns the number of
    /// subscribers reached.
    pub fn publish(&self, event: PushEvent) -> usize {
        let mut state = self.state.write();
        state
            .subscribers
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
        let receivers = state.subscribers.len();
        if receivers == 0 {
            warn!(kind = event.kind(), "Event dropped (no subscribers)");
        } else {
            debug!(kind = event.kind(), receivers, "Event published");
        }
        receivers
    }

    /// End every open subscription stream
    pub fn close_subscriptions(&self) {
        self.state.write().subscribers.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.read().subscribers.len()
    }

    fn begin(&self, op: &'static str) -> Result<Vec<RateLimit>, BackendError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        if let Some(limit) = state.throttle.clone() {
            debug!(op, tank = %limit.name, "Backend call throttled");
            return Err(BackendError::RateLimited {
                message: format!("{}: rate limit exceeded", op),
                limit,
            });
        }
        Ok(state.rate_limits.clone())
    }

    fn create(&self, channel: &ChatChannel) -> Conversation {
        let n = self.next_conv.fetch_add(1, Ordering::Relaxed);
        let id = ConversationId::from_bytes(&n.to_be_bytes());
        let members_type = channel.members();
        let topic_type = channel.topic();
        let topic_name = match (members_type, channel.topic_name.is_empty()) {
            (MembersType::Team, true) => "general".to_string(),
            _ => channel.topic_name.clone(),
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        let conv = Conversation {
            summary: ConvSummary {
                id: id.clone(),
                channel: ChatChannel {
                    name: channel.name.clone(),
                    members_type: members_type.as_str().to_string(),
                    topic_type: topic_type.as_str().to_string(),
                    topic_name: topic_name.clone(),
                    public: channel.public,
                },
                is_default_conv: members_type != MembersType::Team || topic_name == "general",
                unread: false,
                active_at: now_ms / 1000,
                active_at_ms: now_ms,
                member_status: "active".to_string(),
            },
            read_msg_id: 0,
        };

        let mut members = BTreeMap::new();
        if members_type != MembersType::Team {
            for user in channel.name.split(',').filter(|u| !u.is_empty()) {
                members.insert(user.to_string(), TeamRole::Writer);
            }
        }
        self.state.write().conversations.insert(
            id,
            ConvState {
                conv: conv.clone(),
                messages: Vec::new(),
                members,
                next_msg_id: 1,
            },
        );
        conv
    }

    fn post(
        &self,
        conv: &ConversationId,
        content: MsgContent,
        etime: Option<i64>,
    ) -> Result<(MessageId, Conversation, MessageUnboxed), BackendError> {
        let mut state = self.state.write();
        let conv_state = state
            .conversations
            .get_mut(conv)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))?;
        let id = append(conv_state, &self.username, content, etime);
        // Own messages are never unread
        conv_state.conv.read_msg_id = id;
        let message = conv_state
            .messages
            .last()
            .cloned()
            .unwrap_or(MessageUnboxed::Placeholder);
        Ok((id, conv_state.snapshot(), message))
    }

    fn announce(&self, conv: Conversation, message: MessageUnboxed) {
        self.publish(PushEvent::NewChatActivity {
            source: ActivitySource::Local,
            activity: ChatActivity::IncomingMessage {
                conv_id: conv.summary.id.clone(),
                conv: Some(conv),
                message,
                pagination: None,
            },
        });
    }

    fn with_conv<T>(
        &self,
        conv: &ConversationId,
        f: impl FnOnce(&ConvState) -> T,
    ) -> Result<T, BackendError> {
        self.state
            .read()
            .conversations
            .get(conv)
            .map(f)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))
    }

    fn conv_members(&self, state: &State, conv: &ConvState) -> BTreeMap<String, TeamRole> {
        if conv.conv.summary.channel.members() == MembersType::Team {
            if let Some(team) = state.teams.get(&conv.conv.summary.channel.name) {
                return team.members.clone();
            }
        }
        conv.members.clone()
    }
}

fn append(
    conv_state: &mut ConvState,
    sender: &str,
    content: MsgContent,
    etime: Option<i64>,
) -> MessageId {
    let id = conv_state.next_msg_id;
    conv_state.next_msg_id += 1;
    let prev = conv_state
        .messages
        .iter()
        .rev()
        .find_map(|m| match m {
            MessageUnboxed::Valid(v) => Some(crate::domain::types::MessagePrev {
                id: v.id,
                hash: format!("{:08x}", v.id),
            }),
            _ => None,
        })
        .into_iter()
        .collect();
    let now_ms = chrono::Utc::now().timestamp_millis();
    conv_state.messages.push(MessageUnboxed::Valid(MessageValid {
        id,
        sender: MsgSender {
            uid: hex::encode(sender.as_bytes()),
            username: sender.to_string(),
            device_id: String::new(),
            device_name: String::new(),
        },
        sent_at_ms: now_ms,
        prev,
        content,
        is_ephemeral: etime.is_some(),
        etime: etime.unwrap_or(0),
        revoked_device: false,
        kbfs_encrypted: false,
        has_pairwise_macs: false,
        at_mentions: Vec::new(),
        channel_mention: "none".to_string(),
        channel_name_mentions: Vec::new(),
        reactions: None,
        bot: None,
    }));
    conv_state.conv.summary.active_at_ms = now_ms;
    conv_state.conv.summary.active_at = now_ms / 1000;
    id
}

fn matches_channel(conv: &Conversation, channel: &ChatChannel) -> bool {
    let have = &conv.summary.channel;
    have.name == channel.name
        && have.topic() == channel.topic()
        && (channel.members_type.is_empty() || have.members() == channel.members())
        && (channel.topic_name.is_empty() || have.topic_name == channel.topic_name)
}

fn explode_at(lifetime: Option<std::time::Duration>) -> Option<i64> {
    lifetime.map(|d| chrono::Utc::now().timestamp_millis() + d.as_millis() as i64)
}

#[async_trait]
impl ChatBackend for InMemoryBackend {
    async fn get_inbox(&self, query: &InboxQuery) -> BackendResult<Inbox> {
        let limits = self.begin("get_inbox")?;
        let state = self.state.read();
        let mut conversations: Vec<Conversation> = state
            .conversations
            .values()
            .map(ConvState::snapshot)
            .filter(|c| c.summary.channel.topic() == query.topic_type)
            .filter(|c| !query.unread_only || c.summary.unread)
            .filter(|c| {
                query
                    .conversation_id
                    .as_ref()
                    .map_or(true, |id| c.summary.id == *id)
            })
            .collect();
        conversations.sort_by(|a, b| b.summary.active_at_ms.cmp(&a.summary.active_at_ms));
        Ok(Limited::with_limits(
            Inbox {
                conversations,
                offline: self.offline.load(Ordering::Relaxed),
            },
            limits,
        ))
    }

    async fn get_conversation(&self, id: &ConversationId) -> BackendResult<Option<Conversation>> {
        let limits = self.begin("get_conversation")?;
        let conv = self.state.read().conversations.get(id).map(ConvState::snapshot);
        Ok(Limited::with_limits(conv, limits))
    }

    async fn find_conversations(&self, channel: &ChatChannel) -> BackendResult<Vec<Conversation>> {
        let limits = self.begin("find_conversations")?;
        let found = self
            .state
            .read()
            .conversations
            .values()
            .map(ConvState::snapshot)
            .filter(|c| matches_channel(c, channel))
            .collect();
        Ok(Limited::with_limits(found, limits))
    }

    async fn new_conversation(&self, channel: &ChatChannel) -> BackendResult<Conversation> {
        let limits = self.begin("new_conversation")?;
        let conv = self.create(channel);
        self.publish(PushEvent::NewChatActivity {
            source: ActivitySource::Local,
            activity: ChatActivity::NewConversation {
                conv_id: conv.summary.id.clone(),
                conv: Some(conv.clone()),
            },
        });
        Ok(Limited::with_limits(conv, limits))
    }

    async fn get_tlf_conversations(
        &self,
        name: &str,
        members: MembersType,
        topic: TopicType,
    ) -> BackendResult<Vec<Conversation>> {
        let limits = self.begin("get_tlf_conversations")?;
        let found = self
            .state
            .read()
            .conversations
            .values()
            .map(ConvState::snapshot)
            .filter(|c| {
                let channel = &c.summary.channel;
                channel.name == name && channel.members() == members && channel.topic() == topic
            })
            .collect();
        Ok(Limited::with_limits(found, limits))
    }

    async fn get_thread(
        &self,
        conv: &ConversationId,
        query: &ThreadQuery,
    ) -> BackendResult<ThreadPage> {
        let limits = self.begin("get_thread")?;
        let mut state = self.state.write();
        let conv_state = state
            .conversations
            .get_mut(conv)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))?;

        let num = query
            .pagination
            .as_ref()
            .map(|p| p.num)
            .filter(|n| *n > 0)
            .map_or(usize::MAX, |n| n as usize);
        let messages: Vec<_> = conv_state.messages.iter().rev().take(num).cloned().collect();
        let last = messages.len() >= conv_state.messages.len();
        let page = ThreadPage {
            pagination: Some(Pagination {
                num: messages.len() as i32,
                last,
                ..Default::default()
            }),
            messages,
            offline: self.offline.load(Ordering::Relaxed),
        };
        if query.mark_as_read {
            conv_state.conv.read_msg_id = conv_state.latest_id();
        }
        Ok(Limited::with_limits(page, limits))
    }

    async fn get_messages(
        &self,
        conv: &ConversationId,
        ids: &[MessageId],
        mark_as_read: bool,
    ) -> BackendResult<ThreadPage> {
        let limits = self.begin("get_messages")?;
        let mut state = self.state.write();
        let conv_state = state
            .conversations
            .get_mut(conv)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))?;
        let messages = ids
            .iter()
            .map(|id| {
                conv_state
                    .messages
                    .iter()
                    .find(|m| matches!(m, MessageUnboxed::Valid(v) if v.id == *id))
                    .cloned()
                    .unwrap_or_else(|| MessageUnboxed::Error {
                        err_msg: format!("message {} not found", id),
                    })
            })
            .collect();
        if mark_as_read {
            let highest = ids.iter().copied().max().unwrap_or(0);
            conv_state.conv.read_msg_id = conv_state.conv.read_msg_id.max(highest);
        }
        let page = ThreadPage {
            messages,
            pagination: None,
            offline: self.offline.load(Ordering::Relaxed),
        };
        Ok(Limited::with_limits(page, limits))
    }

    async fn post_text(&self, conv: &ConversationId, msg: &OutgoingText) -> BackendResult<Posted> {
        let limits = self.begin("post_text")?;
        let (id, snapshot, message) = self.post(
            conv,
            MsgContent::text(&msg.body),
            explode_at(msg.exploding_lifetime),
        )?;
        self.announce(snapshot, message);
        let posted = Posted {
            message_id: (!msg.nonblock).then_some(id),
        };
        Ok(Limited::with_limits(posted, limits))
    }

    async fn edit_message(
        &self,
        conv: &ConversationId,
        target: MessageId,
        body: &str,
    ) -> BackendResult<Posted> {
        let limits = self.begin("edit_message")?;
        if !self.with_conv(conv, |c| c.contains(target))? {
            return Err(BackendError::NotFound(format!("message {} not found", target)));
        }
        let mut content = MsgContent::empty(MessageType::Edit);
        content.edit = Some(EditBody {
            message_id: target,
            body: body.to_string(),
        });
        let (id, snapshot, message) = self.post(conv, content, None)?;
        self.announce(snapshot, message);
        Ok(Limited::with_limits(Posted { message_id: Some(id) }, limits))
    }

    async fn post_reaction(
        &self,
        conv: &ConversationId,
        target: MessageId,
        reaction: &str,
    ) -> BackendResult<Posted> {
        let limits = self.begin("post_reaction")?;
        if !self.with_conv(conv, |c| c.contains(target))? {
            return Err(BackendError::NotFound(format!("message {} not found", target)));
        }
        let mut content = MsgContent::empty(MessageType::Reaction);
        content.reaction = Some(ReactionBody {
            message_id: target,
            body: reaction.to_string(),
        });
        let (id, snapshot, message) = self.post(conv, content, None)?;
        self.announce(snapshot, message);
        Ok(Limited::with_limits(Posted { message_id: Some(id) }, limits))
    }

    async fn upload_attachment(
        &self,
        conv: &ConversationId,
        upload: &Upload,
    ) -> BackendResult<Posted> {
        let limits = self.begin("upload_attachment")?;
        let mut content = MsgContent::empty(MessageType::Attachment);
        content.attachment = Some(serde_json::json!({
            "object": {"filename": upload.filename, "title": upload.title},
            "uploaded": true,
        }));
        let (id, snapshot, message) =
            self.post(conv, content, explode_at(upload.exploding_lifetime))?;
        self.announce(snapshot, message);
        Ok(Limited::with_limits(Posted { message_id: Some(id) }, limits))
    }

    async fn join_conversation(&self, conv: &ConversationId) -> BackendResult<()> {
        let limits = self.begin("join_conversation")?;
        let snapshot = {
            let mut state = self.state.write();
            let conv_state = state.conversations.get_mut(conv).ok_or_else(|| {
                BackendError::NotFound(format!("conversation {} not found", conv))
            })?;
            conv_state
                .members
                .entry(self.username.clone())
                .or_insert(TeamRole::Writer);
            conv_state.snapshot()
        };
        self.publish(PushEvent::JoinedConversation {
            conv_id: conv.clone(),
            conv: Some(snapshot),
        });
        Ok(Limited::with_limits((), limits))
    }

    async fn leave_conversation(&self, conv: &ConversationId) -> BackendResult<()> {
        let limits = self.begin("leave_conversation")?;
        {
            let mut state = self.state.write();
            let conv_state = state.conversations.get_mut(conv).ok_or_else(|| {
                BackendError::NotFound(format!("conversation {} not found", conv))
            })?;
            conv_state.members.remove(&self.username);
        }
        self.publish(PushEvent::LeftConversation {
            conv_id: conv.clone(),
        });
        Ok(Limited::with_limits((), limits))
    }

    async fn advertise_commands(
        &self,
        alias: Option<&str>,
        ads: &[CommandAdvertisement],
    ) -> BackendResult<()> {
        let limits = self.begin("advertise_commands")?;
        let username = alias.unwrap_or(&self.username).to_string();
        let mut state = self.state.write();
        state.advertised.retain(|a| a.username != username);
        state.advertised.push(Advertised {
            username,
            ads: ads.to_vec(),
        });
        Ok(Limited::with_limits((), limits))
    }

    async fn clear_commands(&self) -> BackendResult<()> {
        let limits = self.begin("clear_commands")?;
        let mut state = self.state.write();
        let before = state.advertised.len();
        state.advertised.clear();
        debug!(cleared = before, "Cleared advertised commands");
        Ok(Limited::with_limits((), limits))
    }

    async fn list_commands(&self, conv: &ConversationId) -> BackendResult<Vec<UserBotCommand>> {
        let limits = self.begin("list_commands")?;
        let state = self.state.read();
        let conv_state = state
            .conversations
            .get(conv)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))?;
        let channel = &conv_state.conv.summary.channel;
        let visible = |ad: &CommandAdvertisement| match ad.kind {
            AdvertisementKind::Public => true,
            AdvertisementKind::Conversation => ad.conv_id.as_ref() == Some(conv),
            AdvertisementKind::TeamConvs | AdvertisementKind::TeamMembers => {
                channel.members() == MembersType::Team
                    && ad.team_name.as_deref() == Some(channel.name.as_str())
            }
        };

        let mut commands = Vec::new();
        for advertised in &state.advertised {
            for ad in advertised.ads.iter().filter(|ad| visible(ad)) {
                commands.extend(ad.commands.iter().map(|c| UserBotCommand {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    usage: c.usage.clone(),
                    username: advertised.username.clone(),
                }));
            }
        }
        Ok(Limited::with_limits(commands, limits))
    }

    async fn list_members(&self, conv: &ConversationId) -> BackendResult<MembersDetails> {
        let limits = self.begin("list_members")?;
        let state = self.state.read();
        let conv_state = state
            .conversations
            .get(conv)
            .ok_or_else(|| BackendError::NotFound(format!("conversation {} not found", conv)))?;
        let mut details = MembersDetails::default();
        for (username, role) in self.conv_members(&state, conv_state) {
            details.push(
                role,
                MemberInfo {
                    username,
                    full_name: String::new(),
                },
            );
        }
        Ok(Limited::with_limits(details, limits))
    }
}

#[async_trait]
impl TeamBackend for InMemoryBackend {
    async fn team_get(&self, team: &str, _force_poll: bool) -> BackendResult<TeamDetails> {
        let limits = self.begin("team_get")?;
        let state = self.state.read();
        let team_state = state
            .teams
            .get(team)
            .ok_or_else(|| BackendError::NotFound(format!("team {:?} does not exist", team)))?;
        let mut members = MembersDetails::default();
        for (username, role) in &team_state.members {
            members.push(
                *role,
                MemberInfo {
                    username: username.clone(),
                    full_name: String::new(),
                },
            );
        }
        let details = TeamDetails {
            name: team.to_string(),
            members,
            open: team_state.open,
        };
        Ok(Limited::with_limits(details, limits))
    }

    async fn team_list_for_user(
        &self,
        username: &str,
        include_implicit: bool,
    ) -> BackendResult<TeamList> {
        let limits = self.begin("team_list_for_user")?;
        let state = self.state.read();
        let mut teams: Vec<TeamMembership> = state
            .teams
            .iter()
            .filter_map(|(name, team)| {
                team.members.get(username).map(|role| TeamMembership {
                    fq_name: name.clone(),
                    username: username.to_string(),
                    role: *role,
                    member_count: team.members.len() as u32,
                    is_implicit_team: false,
                    is_open_team: team.open,
                })
            })
            .collect();

        if include_implicit {
            let implicit: BTreeSet<_> = state
                .conversations
                .values()
                .map(|c| &c.conv.summary.channel)
                .filter(|ch| ch.members() == MembersType::ImpTeamNative)
                .filter(|ch| ch.name.split(',').any(|u| u == username))
                .map(|ch| ch.name.clone())
                .collect();
            teams.extend(implicit.into_iter().map(|name| TeamMembership {
                member_count: name.split(',').collect::<BTreeSet<_>>().len() as u32,
                fq_name: name,
                username: username.to_string(),
                role: TeamRole::Writer,
                is_implicit_team: true,
                is_open_team: false,
            }));
        }
        teams.sort_by(|a, b| a.fq_name.cmp(&b.fq_name));
        Ok(Limited::with_limits(TeamList { teams }, limits))
    }
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn get_entry(&self, entry: &EntryRef) -> BackendResult<KvGetResult> {
        let limits = self.begin("get_entry")?;
        let stored = self.state.read().kv.get(entry).cloned();
        let result = KvGetResult {
            team_name: entry.team.clone(),
            namespace: entry.namespace.clone(),
            entry_key: entry.entry_key.clone(),
            entry_value: stored.as_ref().and_then(|e| e.value.clone()),
            revision: stored.map_or(0, |e| e.revision),
        };
        Ok(Limited::with_limits(result, limits))
    }

    async fn put_entry(
        &self,
        entry: &EntryRef,
        value: &str,
        revision: Option<u32>,
    ) -> BackendResult<KvPutResult> {
        let limits = self.begin("put_entry")?;
        let mut state = self.state.write();
        let current = state.kv.get(entry).map_or(0, |e| e.revision);
        let next = current + 1;
        if let Some(requested) = revision {
            if requested != next {
                return Err(BackendError::Rejected(format!(
                    "revision out of date: expected {}, got {}",
                    next, requested
                )));
            }
        }
        state.kv.insert(
            entry.clone(),
            KvEntry {
                value: Some(value.to_string()),
                revision: next,
            },
        );
        let result = KvPutResult {
            team_name: entry.team.clone(),
            namespace: entry.namespace.clone(),
            entry_key: entry.entry_key.clone(),
            revision: next,
        };
        Ok(Limited::with_limits(result, limits))
    }

    async fn list_namespaces(&self, team: &str) -> BackendResult<KvNamespaceList> {
        let limits = self.begin("list_namespaces")?;
        let namespaces: BTreeSet<String> = self
            .state
            .read()
            .kv
            .iter()
            .filter(|(k, v)| k.team == team && v.value.is_some())
            .map(|(k, _)| k.namespace.clone())
            .collect();
        let result = KvNamespaceList {
            team_name: team.to_string(),
            namespaces: namespaces.into_iter().collect(),
        };
        Ok(Limited::with_limits(result, limits))
    }

    async fn list_entries(&self, team: &str, namespace: &str) -> BackendResult<KvEntryList> {
        let limits = self.begin("list_entries")?;
        let entry_keys = self
            .state
            .read()
            .kv
            .iter()
            .filter(|(k, v)| k.team == team && k.namespace == namespace && v.value.is_some())
            .map(|(k, v)| KvEntryKey {
                entry_key: k.entry_key.clone(),
                revision: v.revision,
            })
            .collect();
        let result = KvEntryList {
            team_name: team.to_string(),
            namespace: namespace.to_string(),
            entry_keys,
        };
        Ok(Limited::with_limits(result, limits))
    }

    async fn delete_entry(
        &self,
        entry: &EntryRef,
        revision: Option<u32>,
    ) -> BackendResult<KvDeleteResult> {
        let limits = self.begin("delete_entry")?;
        let mut state = self.state.write();
        let stored = state
            .kv
            .get_mut(entry)
            .filter(|e| e.value.is_some())
            .ok_or_else(|| {
                BackendError::NotFound(format!(
                    "no entry {:?} in namespace {:?}",
                    entry.entry_key, entry.namespace
                ))
            })?;
        let next = stored.revision + 1;
        if let Some(requested) = revision {
            if requested != next {
                return Err(BackendError::Rejected(format!(
                    "revision out of date: expected {}, got {}",
                    next, requested
                )));
            }
        }
        stored.value = None;
        stored.revision = next;
        let result = KvDeleteResult {
            team_name: entry.team.clone(),
            namespace: entry.namespace.clone(),
            entry_key: entry.entry_key.clone(),
            revision: next,
        };
        Ok(Limited::with_limits(result, limits))
    }
}

#[async_trait]
impl SessionBackend for InMemoryBackend {
    fn username(&self) -> &str {
        &self.username
    }

    async fn ping(&self) -> Result<(), BackendError> {
        if self.healthy.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(BackendError::Unavailable("service is not responding".to_string()))
        }
    }

    async fn subscribe(&self) -> Result<PushStream, BackendError> {
        let (tx, rx) = mpsc::unbounded();
        self.state.write().subscribers.push(tx);
        debug!(username = %self.username, "New push subscription");
        Ok(rx.boxed())
    }
}
