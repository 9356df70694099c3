//! Typed options for every method, with their validity rules.
//!
//! A method's raw options are deserialized into its record and then checked
//! before any backend is touched. Unknown fields are ignored.

use crate::domain::types::{
    BotCommand, ChatChannel, ChatMessage, MembersType, MessageId, Pagination, TopicType,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options record of one method
pub trait MethodOptions: DeserializeOwned + Default + Send + 'static {
    /// Validity predicate, run after deserialization
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Conversation address: a channel, a conversation id, or both
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvAddress {
    #[serde(default)]
    pub channel: ChatChannel,
    #[serde(default)]
    pub conversation_id: String,
}

impl ConvAddress {
    pub fn by_channel(channel: ChatChannel) -> Self {
        Self {
            channel,
            conversation_id: String::new(),
        }
    }

    pub fn by_id(conversation_id: impl Into<String>) -> Self {
        Self {
            channel: ChatChannel::default(),
            conversation_id: conversation_id.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_nil() && self.conversation_id.is_empty()
    }

    /// At least one of channel and id must be given; a given channel must be valid
    pub fn check(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("need channel or conversation_id".to_string());
        }
        if !self.channel.is_nil() {
            self.channel.check()?;
        }
        Ok(())
    }

    /// Name used in resolution error messages. A given channel wins over
    /// the id.
    pub fn describe(&self) -> &str {
        if self.channel.is_nil() {
            &self.conversation_id
        } else {
            &self.channel.name
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("`{}` field required", field));
    }
    Ok(())
}

fn positive_revision(revision: Option<u32>) -> Result<(), String> {
    match revision {
        Some(0) => Err("if setting optional revision field, it must be > 0".to_string()),
        _ => Ok(()),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// CHAT
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub topic_type: String,
    #[serde(default)]
    pub show_errors: bool,
    #[serde(default)]
    pub fail_offline: bool,
}

impl MethodOptions for ListOptions {
    fn check(&self) -> Result<(), String> {
        TopicType::parse_or_default(&self.topic_type)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub peek: bool,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub fail_offline: bool,
}

impl MethodOptions for ReadOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub message_ids: Vec<MessageId>,
    #[serde(default)]
    pub peek: bool,
    #[serde(default)]
    pub fail_offline: bool,
}

impl MethodOptions for GetOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()?;
        if self.message_ids.is_empty() {
            return Err("need at least one message id".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub message: ChatMessage,
    #[serde(default)]
    pub nonblock: bool,
    #[serde(default)]
    pub members_type: String,
    #[serde(default, with = "humantime_serde")]
    pub exploding_lifetime: Option<Duration>,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

impl MethodOptions for SendOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()?;
        if !self.members_type.is_empty() {
            self.members_type.parse::<MembersType>()?;
        }
        self.message.check()
    }
}

impl SendOptions {
    /// Address with the top-level `members_type` applied to the channel
    pub fn target(&self) -> ConvAddress {
        let mut address = self.address.clone();
        if address.channel.members_type.is_empty() && !address.channel.is_nil() {
            address.channel.members_type = self.members_type.clone();
        }
        address
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EditOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub message_id: MessageId,
    #[serde(default)]
    pub message: ChatMessage,
}

impl MethodOptions for EditOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()?;
        if self.message_id == 0 {
            return Err("invalid message id".to_string());
        }
        self.message.check()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReactionOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub message_id: MessageId,
    #[serde(default)]
    pub message: ChatMessage,
}

impl MethodOptions for ReactionOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()?;
        if self.message_id == 0 {
            return Err("invalid message id".to_string());
        }
        self.message.check()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttachOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, with = "humantime_serde")]
    pub exploding_lifetime: Option<Duration>,
}

impl MethodOptions for AttachOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()?;
        require(&self.filename, "filename")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListConvsOnNameOptions {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members_type: String,
    #[serde(default)]
    pub topic_type: String,
}

impl MethodOptions for ListConvsOnNameOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.name, "name")?;
        ChatChannel {
            name: self.name.clone(),
            members_type: self.members_type.clone(),
            topic_type: self.topic_type.clone(),
            ..Default::default()
        }
        .check()
    }
}

/// Options of methods that only address a conversation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationOptions {
    #[serde(flatten)]
    pub address: ConvAddress,
}

impl MethodOptions for ConversationOptions {
    fn check(&self) -> Result<(), String> {
        self.address.check()
    }
}

pub type JoinOptions = ConversationOptions;
pub type LeaveOptions = ConversationOptions;
pub type ListCommandsOptions = ConversationOptions;
pub type ListMembersOptions = ConversationOptions;

/// Where an advertisement makes commands visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertisementKind {
    Public,
    TeamConvs,
    TeamMembers,
    Conversation,
}

impl AdvertisementKind {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "public" => Ok(AdvertisementKind::Public),
            "teamconvs" => Ok(AdvertisementKind::TeamConvs),
            "teammembers" => Ok(AdvertisementKind::TeamMembers),
            "conversation" => Ok(AdvertisementKind::Conversation),
            _ => Err(format!("unknown advertisement type: {:?}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub commands: Vec<BotCommand>,
    #[serde(default)]
    pub team_name: String,
    #[serde(default)]
    pub conv_id: String,
}

impl Advertisement {
    pub fn check(&self) -> Result<AdvertisementKind, String> {
        let kind = AdvertisementKind::parse(&self.kind)?;
        if self.commands.is_empty() {
            return Err("must supply at least one command per advertisement".to_string());
        }
        if let Some(cmd) = self.commands.iter().find(|c| c.name.is_empty()) {
            return Err(format!("command name required (description {:?})", cmd.description));
        }
        match kind {
            AdvertisementKind::TeamConvs | AdvertisementKind::TeamMembers => {
                require(&self.team_name, "team_name")?
            }
            AdvertisementKind::Conversation => require(&self.conv_id, "conv_id")?,
            AdvertisementKind::Public => {}
        }
        Ok(kind)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdvertiseCommandsOptions {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub advertisements: Vec<Advertisement>,
}

impl MethodOptions for AdvertiseCommandsOptions {
    fn check(&self) -> Result<(), String> {
        if self.advertisements.is_empty() {
            return Err("must supply at least one advertisement".to_string());
        }
        for ad in &self.advertisements {
            ad.check()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearCommandsOptions {}

impl MethodOptions for ClearCommandsOptions {}

// ═══════════════════════════════════════════════════════════════════════
// TEAM
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTeamOptions {
    #[serde(default)]
    pub team: String,
    #[serde(default, rename = "force-poll")]
    pub force_poll: bool,
}

impl MethodOptions for ListTeamOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.team, "team")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListUserOptions {
    #[serde(default)]
    pub username: String,
    #[serde(default, rename = "include-implicit-teams")]
    pub include_implicit_teams: bool,
}

impl MethodOptions for ListUserOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.username, "username")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListSelfOptions {
    #[serde(default, rename = "include-implicit-teams")]
    pub include_implicit_teams: bool,
}

impl MethodOptions for ListSelfOptions {}

// ═══════════════════════════════════════════════════════════════════════
// KVSTORE
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEntryOptions {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub entry_key: String,
}

impl MethodOptions for GetEntryOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.namespace, "namespace")?;
        require(&self.entry_key, "entryKey")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutEntryOptions {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub entry_key: String,
    #[serde(default)]
    pub revision: Option<u32>,
    #[serde(default)]
    pub entry_value: String,
}

impl MethodOptions for PutEntryOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.namespace, "namespace")?;
        require(&self.entry_key, "entryKey")?;
        require(&self.entry_value, "entryValue")?;
        positive_revision(self.revision)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesOptions {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub namespace: String,
}

impl MethodOptions for ListEntriesOptions {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEntryOptions {
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub entry_key: String,
    #[serde(default)]
    pub revision: Option<u32>,
}

impl MethodOptions for DeleteEntryOptions {
    fn check(&self) -> Result<(), String> {
        require(&self.namespace, "namespace")?;
        require(&self.entry_key, "entryKey")?;
        positive_revision(self.revision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse<O: MethodOptions>(json: &str) -> O {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_address_required() {
        let opts: ReadOptions = parse("{}");
        assert!(opts.check().is_err());

        let opts: ReadOptions = parse(r#"{"conversation_id": "abcd"}"#);
        assert!(opts.check().is_ok());

        let opts: ReadOptions = parse(r#"{"channel": {"name": "alice,bob"}, "peek": true}"#);
        assert!(opts.check().is_ok());
        assert!(opts.peek);
        assert_eq!(opts.address.describe(), "alice,bob");
    }

    #[test]
    fn test_send_needs_body() {
        let opts: SendOptions = parse(r#"{"channel": {"name": "alice"}, "message": {"body": ""}}"#);
        assert!(opts.check().is_err());

        let opts: SendOptions = parse(
            r#"{"channel": {"name": "alice"}, "message": {"body": "hi"}, "exploding_lifetime": "5m"}"#,
        );
        assert!(opts.check().is_ok());
        assert_eq!(opts.exploding_lifetime, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_edit_needs_message_id() {
        let opts: EditOptions =
            parse(r#"{"conversation_id": "ab", "message": {"body": "fixed"}}"#);
        assert!(opts.check().is_err());

        let opts: EditOptions = parse(
            r#"{"conversation_id": "ab", "message_id": 3, "message": {"body": "fixed"}}"#,
        );
        assert!(opts.check().is_ok());
    }

    #[test]
    fn test_get_needs_message_ids() {
        let opts: GetOptions = parse(r#"{"conversation_id": "ab"}"#);
        assert!(opts.check().is_err());
    }

    #[test]
    fn test_list_rejects_bad_topic() {
        let opts: ListOptions = parse(r#"{"topic_type": "gossip"}"#);
        assert!(opts.check().is_err());
        assert!(ListOptions::default().check().is_ok());
    }

    #[test]
    fn test_advertisement_rules() {
        let opts: AdvertiseCommandsOptions = parse(r#"{"advertisements": []}"#);
        assert!(opts.check().is_err());

        let opts: AdvertiseCommandsOptions = parse(
            r#"{"advertisements": [{"type": "teammembers", "commands": [{"name": "ping"}]}]}"#,
        );
        assert_eq!(opts.check().unwrap_err(), "`team_name` field required");

        let opts: AdvertiseCommandsOptions = parse(
            r#"{"advertisements": [{"type": "public", "commands": [{"name": "ping", "description": "pong"}]}]}"#,
        );
        assert!(opts.check().is_ok());

        let opts: AdvertiseCommandsOptions =
            parse(r#"{"advertisements": [{"type": "everyone", "commands": [{"name": "x"}]}]}"#);
        assert!(opts.check().is_err());
    }

    #[test]
    fn test_team_options() {
        let opts: ListTeamOptions = parse(r#"{"team": "acme", "force-poll": true}"#);
        assert!(opts.check().is_ok());
        assert!(opts.force_poll);

        let opts: ListUserOptions = parse(r#"{"username": ""}"#);
        assert!(opts.check().is_err());
    }

    #[test]
    fn test_kv_options() {
        let opts: PutEntryOptions =
            parse(r#"{"namespace": "ns", "entryKey": "k", "entryValue": "v", "revision": 0}"#);
        assert!(opts.check().is_err());

        let opts: PutEntryOptions =
            parse(r#"{"team": "acme", "namespace": "ns", "entryKey": "k", "entryValue": "v"}"#);
        assert!(opts.check().is_ok());
        assert_eq!(opts.team.as_deref(), Some("acme"));

        let opts: GetEntryOptions = parse(r#"{"namespace": "ns"}"#);
        assert_eq!(opts.check().unwrap_err(), "`entryKey` field required");

        assert!(ListEntriesOptions::default().check().is_ok());
    }
}
