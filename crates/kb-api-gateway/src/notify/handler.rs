//! Push notification callbacks and the JSON they produce.

use crate::domain::events::{ActivitySource, ChatActivity, PushEvent};
use crate::domain::types::{Conversation, ConversationId, ConvSummary, MsgSummary, Pagination};
use serde::Serialize;

/// Notification written to the relay sink, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "chat")]
    Chat {
        source: ActivitySource,
        #[serde(skip_serializing_if = "Option::is_none")]
        msg: Option<MsgSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pagination: Option<Pagination>,
    },
    #[serde(rename = "chat_conv")]
    ChatConv {
        #[serde(skip_serializing_if = "Option::is_none")]
        conv: Option<ConvSummary>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// One callback per push kind. `None` means the event produces no output.
pub trait NotifyHandler: Send + Sync {
    fn new_chat_activity(
        &self,
        source: ActivitySource,
        activity: &ChatActivity,
    ) -> Option<Notification>;

    fn joined_conversation(
        &self,
        conv_id: &ConversationId,
        conv: Option<&Conversation>,
    ) -> Option<Notification>;

    fn left_conversation(&self, conv_id: &ConversationId) -> Option<Notification>;

    fn typing(&self, conv_id: &ConversationId, typers: &[String]) -> Option<Notification>;

    fn inbox_stale(&self) -> Option<Notification>;

    fn threads_stale(&self, conv_ids: &[ConversationId]) -> Option<Notification>;

    fn conversation_update(&self, conv_id: &ConversationId) -> Option<Notification>;
}

/// Handler that ignores every push
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifyHandler;

impl NotifyHandler for NoopNotifyHandler {
    fn new_chat_activity(&self, _: ActivitySource, _: &ChatActivity) -> Option<Notification> {
        None
    }

    fn joined_conversation(&self, _: &ConversationId, _: Option<&Conversation>) -> Option<Notification> {
        None
    }

    fn left_conversation(&self, _: &ConversationId) -> Option<Notification> {
        None
    }

    fn typing(&self, _: &ConversationId, _: &[String]) -> Option<Notification> {
        None
    }

    fn inbox_stale(&self) -> Option<Notification> {
        None
    }

    fn threads_stale(&self, _: &[ConversationId]) -> Option<Notification> {
        None
    }

    fn conversation_update(&self, _: &ConversationId) -> Option<Notification> {
        None
    }
}

impl PushEvent {
    /// Route the event to the matching callback of `handler`
    pub fn deliver(&self, handler: &dyn NotifyHandler) -> Option<Notification> {
        match self {
            PushEvent::NewChatActivity { source, activity } => {
                handler.new_chat_activity(*source, activity)
            }
            PushEvent::JoinedConversation { conv_id, conv } => {
                handler.joined_conversation(conv_id, conv.as_ref())
            }
            PushEvent::LeftConversation { conv_id } => handler.left_conversation(conv_id),
            PushEvent::Typing { conv_id, typers } => handler.typing(conv_id, typers),
            PushEvent::InboxStale => handler.inbox_stale(),
            PushEvent::ThreadsStale { conv_ids } => handler.threads_stale(conv_ids),
            PushEvent::ConversationUpdate { conv_id } => handler.conversation_update(conv_id),
        }
    }
}
