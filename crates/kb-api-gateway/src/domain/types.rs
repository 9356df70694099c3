//! Core types for the gateway with their JSON shapes.
//!
//! Field names follow the chat API wire format (snake_case for chat, camelCase
//! for key-value results).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message id within a conversation
pub type MessageId = u32;

/// Opaque conversation identifier, a lowercase hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Parse and normalize an identifier supplied by a caller
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty conversation ID".to_string());
        }
        hex::decode(s).map_err(|_| format!("invalid conversation ID: {}", s))?;
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Build from raw id bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of conversation topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    #[default]
    Chat,
    Dev,
    KbfsFileEdit,
    Emoji,
}

impl TopicType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicType::Chat => "chat",
            TopicType::Dev => "dev",
            TopicType::KbfsFileEdit => "kbfsfileedit",
            TopicType::Emoji => "emoji",
        }
    }

    /// Empty strings mean `chat`
    pub fn parse_or_default(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(TopicType::Chat);
        }
        s.parse()
    }
}

impl FromStr for TopicType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(TopicType::Chat),
            "dev" => Ok(TopicType::Dev),
            "kbfsfileedit" => Ok(TopicType::KbfsFileEdit),
            "emoji" => Ok(TopicType::Emoji),
            _ => Err(format!("invalid topic type: '{}'", s)),
        }
    }
}

/// How conversation membership is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembersType {
    Kbfs,
    Team,
    #[default]
    ImpTeamNative,
    ImpTeamUpgrade,
}

impl MembersType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembersType::Kbfs => "kbfs",
            MembersType::Team => "team",
            MembersType::ImpTeamNative => "impteamnative",
            MembersType::ImpTeamUpgrade => "impteamupgrade",
        }
    }

    /// Empty strings mean the implicit-team default
    pub fn parse_or_default(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(MembersType::default());
        }
        s.parse()
    }
}

impl FromStr for MembersType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kbfs" => Ok(MembersType::Kbfs),
            "team" => Ok(MembersType::Team),
            "impteamnative" => Ok(MembersType::ImpTeamNative),
            "impteamupgrade" => Ok(MembersType::ImpTeamUpgrade),
            _ => Err(format!("invalid members type: '{}'", s)),
        }
    }
}

/// Human-addressable channel address.
///
/// Used both as an address in call options and as the descriptive channel
/// block of conversation and message summaries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChannel {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub members_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub public: bool,
}

impl ChatChannel {
    /// Every field at its default
    pub fn is_nil(&self) -> bool {
        *self == ChatChannel::default()
    }

    /// A channel needs a name, and a members type when given must be known
    pub fn check(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("channel name required".to_string());
        }
        if !self.members_type.is_empty() {
            self.members_type.parse::<MembersType>()?;
        }
        TopicType::parse_or_default(&self.topic_type)?;
        Ok(())
    }

    pub fn members(&self) -> MembersType {
        MembersType::parse_or_default(&self.members_type).unwrap_or_default()
    }

    pub fn topic(&self) -> TopicType {
        TopicType::parse_or_default(&self.topic_type).unwrap_or_default()
    }
}

/// Text body of a message to send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub body: String,
}

impl ChatMessage {
    pub fn check(&self) -> Result<(), String> {
        if self.body.is_empty() {
            return Err("message body required".to_string());
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CONVERSATIONS
// ═══════════════════════════════════════════════════════════════════════

/// Conversation summary as returned by `list` and in `chat_conv` notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvSummary {
    pub id: ConversationId,
    pub channel: ChatChannel,
    #[serde(default)]
    pub is_default_conv: bool,
    #[serde(default)]
    pub unread: bool,
    #[serde(default)]
    pub active_at: i64,
    #[serde(default)]
    pub active_at_ms: i64,
    #[serde(default)]
    pub member_status: String,
}

/// Conversation as the messaging backend knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub summary: ConvSummary,
    /// Highest message id the session user has read
    pub read_msg_id: MessageId,
}

impl Conversation {
    pub fn id(&self) -> &ConversationId {
        &self.summary.id
    }
}

/// Result of `list` and `listconvsonname`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatList {
    pub conversations: Vec<ConvSummary>,
    #[serde(default)]
    pub offline: bool,
}

/// Paging cursor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub next: String,
    #[serde(default)]
    pub previous: String,
    #[serde(default)]
    pub num: i32,
    #[serde(default)]
    pub last: bool,
}

// ═══════════════════════════════════════════════════════════════════════
// MESSAGES
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Attachment,
    Edit,
    Delete,
    Metadata,
    Tlfname,
    Headline,
    Join,
    Leave,
    System,
    Reaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditBody {
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionBody {
    #[serde(rename = "m")]
    pub message_id: MessageId,
    #[serde(rename = "b")]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBody {
    #[serde(rename = "messageIDs")]
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadlineBody {
    pub headline: String,
}

/// Decoded message body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgContent {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit: Option<EditBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<ReactionBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<DeleteBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<HeadlineBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<serde_json::Value>,
}

impl MsgContent {
    pub fn text(body: impl Into<String>) -> Self {
        Self::empty(MessageType::Text).with_text(body)
    }

    pub fn empty(message_type: MessageType) -> Self {
        Self {
            message_type,
            text: None,
            edit: None,
            reaction: None,
            delete: None,
            headline: None,
            attachment: None,
            system: None,
        }
    }

    fn with_text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(TextBody { body: body.into() });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSender {
    pub uid: String,
    pub username: String,
    pub device_id: String,
    pub device_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgBotInfo {
    pub bot_uid: String,
    pub bot_username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePrev {
    pub id: MessageId,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelNameMention {
    pub conv_id: ConversationId,
    pub topic_name: String,
}

/// A successfully unboxed message, as delivered by the backend
#[derive(Debug, Clone, PartialEq)]
pub struct MessageValid {
    pub id: MessageId,
    pub sender: MsgSender,
    pub sent_at_ms: i64,
    pub prev: Vec<MessagePrev>,
    pub content: MsgContent,
    pub is_ephemeral: bool,
    /// Explosion time in unix milliseconds, zero when not ephemeral
    pub etime: i64,
    pub revoked_device: bool,
    pub kbfs_encrypted: bool,
    pub has_pairwise_macs: bool,
    pub at_mentions: Vec<String>,
    pub channel_mention: String,
    pub channel_name_mentions: Vec<ChannelNameMention>,
    pub reactions: Option<serde_json::Value>,
    pub bot: Option<MsgBotInfo>,
}

impl MessageValid {
    pub fn is_ephemeral_expired(&self, now_ms: i64) -> bool {
        self.is_ephemeral && self.etime <= now_ms
    }
}

/// Backend message in one of its unboxing states
#[derive(Debug, Clone, PartialEq)]
pub enum MessageUnboxed {
    Valid(MessageValid),
    Error { err_msg: String },
    Outbox,
    Placeholder,
    /// The backend could not even determine the message state
    Undecodable(String),
}

impl MessageUnboxed {
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, MessageUnboxed::Valid(m) if m.is_ephemeral)
    }
}

/// Output form of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgSummary {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub channel: ChatChannel,
    pub sender: MsgSender,
    pub sent_at: i64,
    pub sent_at_ms: i64,
    pub content: MsgContent,
    #[serde(default)]
    pub prev: Vec<MessagePrev>,
    #[serde(default)]
    pub unread: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub revoked_device: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub kbfs_encrypted: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ephemeral: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ephemeral_expired: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub e_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<serde_json::Value>,
    #[serde(default)]
    pub has_pairwise_macs: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub at_mention_usernames: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel_mention: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channel_name_mentions: Vec<ChannelNameMention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_info: Option<MsgBotInfo>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// One entry of a thread: a message or the reason it could not be shown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<MsgSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of `read` and `get`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Thread {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub offline: bool,
}

/// Result of message-posting methods
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResult {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
}

/// Result of methods with nothing to report beyond rate limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResult {}

// ═══════════════════════════════════════════════════════════════════════
// BOT COMMANDS
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
}

/// Command as listed for a conversation, with the advertising bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBotCommand {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub usage: String,
    pub username: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListCommandsResult {
    pub commands: Vec<UserBotCommand>,
}

// ═══════════════════════════════════════════════════════════════════════
// TEAMS
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    #[default]
    None,
    RestrictedBot,
    Bot,
    Reader,
    Writer,
    Admin,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub username: String,
    #[serde(default, rename = "fullName")]
    pub full_name: String,
}

/// Members grouped by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersDetails {
    pub owners: Vec<MemberInfo>,
    pub admins: Vec<MemberInfo>,
    pub writers: Vec<MemberInfo>,
    pub readers: Vec<MemberInfo>,
    pub bots: Vec<MemberInfo>,
    #[serde(rename = "restrictedBots")]
    pub restricted_bots: Vec<MemberInfo>,
}

impl MembersDetails {
    /// Append a member to the group for `role`; `None` is ignored
    pub fn push(&mut self, role: TeamRole, member: MemberInfo) {
        let group = match role {
            TeamRole::Owner => &mut self.owners,
            TeamRole::Admin => &mut self.admins,
            TeamRole::Writer => &mut self.writers,
            TeamRole::Reader => &mut self.readers,
            TeamRole::Bot => &mut self.bots,
            TeamRole::RestrictedBot => &mut self.restricted_bots,
            TeamRole::None => return,
        };
        group.push(member);
    }
}

/// Result of `list-team-memberships`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamDetails {
    pub name: String,
    pub members: MembersDetails,
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMembership {
    #[serde(rename = "fqName")]
    pub fq_name: String,
    pub username: String,
    pub role: TeamRole,
    #[serde(rename = "memberCount")]
    pub member_count: u32,
    #[serde(rename = "isImplicitTeam")]
    pub is_implicit_team: bool,
    #[serde(rename = "isOpenTeam")]
    pub is_open_team: bool,
}

/// Result of `list-user-memberships` and `list-self-memberships`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamList {
    pub teams: Vec<TeamMembership>,
}

// ═══════════════════════════════════════════════════════════════════════
// KEY-VALUE STORE
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvGetResult {
    pub team_name: String,
    pub namespace: String,
    pub entry_key: String,
    pub entry_value: Option<String>,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvPutResult {
    pub team_name: String,
    pub namespace: String,
    pub entry_key: String,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvDeleteResult {
    pub team_name: String,
    pub namespace: String,
    pub entry_key: String,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvNamespaceList {
    pub team_name: String,
    pub namespaces: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvEntryKey {
    pub entry_key: String,
    pub revision: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvEntryList {
    pub team_name: String,
    pub namespace: String,
    pub entry_keys: Vec<KvEntryKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_parse() {
        let id = ConversationId::parse("00ABcd").unwrap();
        assert_eq!(id.as_str(), "00abcd");
        assert!(ConversationId::parse("not-hex").is_err());
        assert!(ConversationId::parse("").is_err());
    }

    #[test]
    fn test_topic_type_default() {
        assert_eq!(TopicType::parse_or_default("").unwrap(), TopicType::Chat);
        assert_eq!(TopicType::parse_or_default("DEV").unwrap(), TopicType::Dev);
        assert!(TopicType::parse_or_default("sports").is_err());
    }

    #[test]
    fn test_channel_check() {
        assert!(ChatChannel::default().is_nil());
        assert!(ChatChannel::default().check().is_err());

        let channel = ChatChannel {
            name: "acme".into(),
            members_type: "team".into(),
            ..Default::default()
        };
        assert!(channel.check().is_ok());
        assert_eq!(channel.members(), MembersType::Team);

        let bad = ChatChannel {
            name: "acme".into(),
            members_type: "cabal".into(),
            ..Default::default()
        };
        assert!(bad.check().is_err());
    }

    #[test]
    fn test_channel_serialization_skips_defaults() {
        let channel = ChatChannel {
            name: "alice,bob".into(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&channel).unwrap(),
            serde_json::json!({"name": "alice,bob"})
        );
    }

    #[test]
    fn test_content_serialize() {
        let json = serde_json::to_value(MsgContent::text("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": {"body": "hi"}}));
    }

    #[test]
    fn test_members_details_push() {
        let mut details = MembersDetails::default();
        let member = MemberInfo {
            username: "alice".into(),
            full_name: String::new(),
        };
        details.push(TeamRole::Owner, member.clone());
        details.push(TeamRole::None, member);
        assert_eq!(details.owners.len(), 1);
        assert!(details.readers.is_empty());
    }
}
