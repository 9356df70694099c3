//! Push events delivered by the messaging backend to a subscribed session.

use crate::domain::types::{Conversation, ConversationId, MessageId, MessageUnboxed, Pagination};
use serde::{Deserialize, Serialize};

/// Where a chat activity originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    /// Generated by this session's own device
    Local,
    /// Arrived from the server
    Remote,
}

/// Payload of a `NewChatActivity` push
#[derive(Debug, Clone, PartialEq)]
pub enum ChatActivity {
    IncomingMessage {
        conv_id: ConversationId,
        conv: Option<Conversation>,
        message: MessageUnboxed,
        pagination: Option<Pagination>,
    },
    NewConversation {
        conv_id: ConversationId,
        conv: Option<Conversation>,
    },
    ReadMessage {
        conv_id: ConversationId,
        msg_id: MessageId,
    },
    MessagesUpdated {
        conv_id: ConversationId,
    },
}

/// Every kind of push the backend can deliver
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    NewChatActivity {
        source: ActivitySource,
        activity: ChatActivity,
    },
    JoinedConversation {
        conv_id: ConversationId,
        conv: Option<Conversation>,
    },
    LeftConversation {
        conv_id: ConversationId,
    },
    Typing {
        conv_id: ConversationId,
        typers: Vec<String>,
    },
    InboxStale,
    ThreadsStale {
        conv_ids: Vec<ConversationId>,
    },
    ConversationUpdate {
        conv_id: ConversationId,
    },
}

impl PushEvent {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::NewChatActivity { .. } => "new_chat_activity",
            PushEvent::JoinedConversation { .. } => "joined_conversation",
            PushEvent::LeftConversation { .. } => "left_conversation",
            PushEvent::Typing { .. } => "typing",
            PushEvent::InboxStale => "inbox_stale",
            PushEvent::ThreadsStale { .. } => "threads_stale",
            PushEvent::ConversationUpdate { .. } => "conversation_update",
        }
    }
}
