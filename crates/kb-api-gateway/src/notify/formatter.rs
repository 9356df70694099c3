//! Turns backend push events into output notifications.

use crate::domain::config::RelayConfig;
use crate::domain::events::{ActivitySource, ChatActivity};
use crate::domain::types::{Conversation, ConversationId, MessageUnboxed, Pagination};
use crate::notify::handler::{NoopNotifyHandler, Notification, NotifyHandler};
use crate::ports::outbound::TimeSource;
use crate::rpc::messages::summarize;
use std::sync::Arc;
use tracing::trace;

/// Conversations a relay reports on. An empty filter passes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    ids: Vec<ConversationId>,
}

impl SubscriptionFilter {
    /// Build from ids, keeping first occurrences in order
    pub fn new(ids: impl IntoIterator<Item = ConversationId>) -> Self {
        let mut filter = Self::default();
        for id in ids {
            if !filter.ids.contains(&id) {
                filter.ids.push(id);
            }
        }
        filter
    }

    pub fn allows(&self, id: &ConversationId) -> bool {
        self.ids.is_empty() || self.ids.contains(id)
    }

    pub fn ids(&self) -> &[ConversationId] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Which events make it to the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatterOptions {
    pub show_local: bool,
    pub show_new_convs: bool,
    pub hide_exploding: bool,
}

impl From<&RelayConfig> for FormatterOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            show_local: config.show_local,
            show_new_convs: config.show_new_convs,
            hide_exploding: config.hide_exploding,
        }
    }
}

/// Notification handler producing `chat` and `chat_conv` output. Every
/// other push kind goes to the no-op handler.
pub struct NotificationFormatter {
    inner: NoopNotifyHandler,
    username: String,
    clock: Arc<dyn TimeSource>,
    filter: SubscriptionFilter,
    options: FormatterOptions,
}

impl NotificationFormatter {
    pub fn new(
        username: impl Into<String>,
        clock: Arc<dyn TimeSource>,
        filter: SubscriptionFilter,
        options: FormatterOptions,
    ) -> Self {
        Self {
            inner: NoopNotifyHandler,
            username: username.into(),
            clock,
            filter,
            options,
        }
    }

    fn incoming_message(
        &self,
        source: ActivitySource,
        conv_id: &ConversationId,
        conv: Option<&Conversation>,
        message: &MessageUnboxed,
        pagination: Option<&Pagination>,
    ) -> Option<Notification> {
        if self.options.hide_exploding && message.is_ephemeral() {
            trace!(conv_id = %conv_id, "Skipping exploding message");
            return None;
        }
        if !self.filter.allows(conv_id) {
            return None;
        }

        let (msg, error) = match message {
            MessageUnboxed::Valid(valid) => match conv {
                Some(conv) => (
                    Some(summarize(valid, conv, &self.username, self.clock.now_ms())),
                    None,
                ),
                None => (None, Some("unable to get chat channel".to_string())),
            },
            MessageUnboxed::Error { err_msg } => (None, Some(err_msg.clone())),
            MessageUnboxed::Undecodable(reason) => (None, Some(reason.clone())),
            MessageUnboxed::Outbox | MessageUnboxed::Placeholder => return None,
        };

        Some(Notification::Chat {
            source,
            msg,
            error,
            pagination: pagination.cloned(),
        })
    }

    fn conversation(&self, conv_id: &ConversationId, conv: Option<&Conversation>) -> Option<Notification> {
        if !self.options.show_new_convs {
            return None;
        }
        let notification = match conv {
            Some(conv) => Notification::ChatConv {
                conv: Some(conv.summary.clone()),
                error: None,
            },
            None => Notification::ChatConv {
                conv: None,
                error: Some(format!("No conversation info found: {}", conv_id)),
            },
        };
        Some(notification)
    }
}

impl NotifyHandler for NotificationFormatter {
    fn new_chat_activity(
        &self,
        source: ActivitySource,
        activity: &ChatActivity,
    ) -> Option<Notification> {
        if source == ActivitySource::Local && !self.options.show_local {
            return None;
        }
        match activity {
            ChatActivity::IncomingMessage {
                conv_id,
                conv,
                message,
                pagination,
            } => self.incoming_message(source, conv_id, conv.as_ref(), message, pagination.as_ref()),
            ChatActivity::NewConversation { conv_id, conv } => {
                self.conversation(conv_id, conv.as_ref())
            }
            other => self.inner.new_chat_activity(source, other),
        }
    }

    fn joined_conversation(
        &self,
        conv_id: &ConversationId,
        conv: Option<&Conversation>,
    ) -> Option<Notification> {
        self.conversation(conv_id, conv)
    }

    fn left_conversation(&self, conv_id: &ConversationId) -> Option<Notification> {
        self.inner.left_conversation(conv_id)
    }

    fn typing(&self, conv_id: &ConversationId, typers: &[String]) -> Option<Notification> {
        self.inner.typing(conv_id, typers)
    }

    fn inbox_stale(&self) -> Option<Notification> {
        self.inner.inbox_stale()
    }

    fn threads_stale(&self, conv_ids: &[ConversationId]) -> Option<Notification> {
        self.inner.threads_stale(conv_ids)
    }

    fn conversation_update(&self, conv_id: &ConversationId) -> Option<Notification> {
        self.inner.conversation_update(conv_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::PushEvent;
    use crate::domain::types::{
        ChatChannel, ConvSummary, MessageValid, MsgContent, MsgSender,
    };

    struct FixedClock(i64);

    impl TimeSource for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0
        }
    }

    fn conv(id: u8) -> Conversation {
        Conversation {
            summary: ConvSummary {
                id: ConversationId::from_bytes(&[id]),
                channel: ChatChannel {
                    name: "alice,bob".into(),
                    ..Default::default()
                },
                is_default_conv: true,
                unread: false,
                active_at: 0,
                active_at_ms: 0,
                member_status: "active".into(),
            },
            read_msg_id: 0,
        }
    }

    fn message(ephemeral: bool) -> MessageUnboxed {
        MessageUnboxed::Valid(MessageValid {
            id: 1,
            sender: MsgSender {
                username: "bob".into(),
                ..Default::default()
            },
            sent_at_ms: 0,
            prev: Vec::new(),
            content: MsgContent::text("hi"),
            is_ephemeral: ephemeral,
            etime: if ephemeral { 60_000 } else { 0 },
            revoked_device: false,
            kbfs_encrypted: false,
            has_pairwise_macs: false,
            at_mentions: Vec::new(),
            channel_mention: String::new(),
            channel_name_mentions: Vec::new(),
            reactions: None,
            bot: None,
        })
    }

    fn incoming(source: ActivitySource, conv: Option<Conversation>, id: u8, msg: MessageUnboxed) -> PushEvent {
        PushEvent::NewChatActivity {
            source,
            activity: ChatActivity::IncomingMessage {
                conv_id: ConversationId::from_bytes(&[id]),
                conv,
                message: msg,
                pagination: None,
            },
        }
    }

    fn formatter(filter: SubscriptionFilter, options: FormatterOptions) -> NotificationFormatter {
        NotificationFormatter::new("alice", Arc::new(FixedClock(0)), filter, options)
    }

    fn defaults() -> FormatterOptions {
        FormatterOptions::from(&RelayConfig::default())
    }

    #[test]
    fn test_filter_dedups_in_order() {
        let a = ConversationId::from_bytes(&[1]);
        let b = ConversationId::from_bytes(&[2]);
        let filter = SubscriptionFilter::new([a.clone(), b.clone(), a.clone()]);
        assert_eq!(filter.ids(), &[a, b]);
    }

    #[test]
    fn test_filter_excludes_other_conversations() {
        let f = formatter(
            SubscriptionFilter::new([ConversationId::from_bytes(&[1])]),
            defaults(),
        );
        let other = incoming(ActivitySource::Remote, Some(conv(2)), 2, message(false));
        assert_eq!(other.deliver(&f), None);

        let wanted = incoming(ActivitySource::Remote, Some(conv(1)), 1, message(false));
        match wanted.deliver(&f) {
            Some(Notification::Chat { msg: Some(msg), .. }) => {
                assert_eq!(msg.conversation_id, ConversationId::from_bytes(&[1]));
                assert!(msg.unread);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let f = formatter(SubscriptionFilter::default(), defaults());
        for id in 1..4 {
            let event = incoming(ActivitySource::Remote, Some(conv(id)), id, message(false));
            assert!(event.deliver(&f).is_some());
        }
    }

    #[test]
    fn test_local_activity_hidden_by_default() {
        let event = incoming(ActivitySource::Local, Some(conv(1)), 1, message(false));
        assert_eq!(event.deliver(&formatter(SubscriptionFilter::default(), defaults())), None);

        let options = FormatterOptions {
            show_local: true,
            ..defaults()
        };
        assert!(event.deliver(&formatter(SubscriptionFilter::default(), options)).is_some());
    }

    #[test]
    fn test_hide_exploding() {
        let options = FormatterOptions {
            hide_exploding: true,
            ..defaults()
        };
        let f = formatter(SubscriptionFilter::default(), options);
        let event = incoming(ActivitySource::Remote, Some(conv(1)), 1, message(true));
        assert_eq!(event.deliver(&f), None);
        let event = incoming(ActivitySource::Remote, Some(conv(1)), 1, message(false));
        assert!(event.deliver(&f).is_some());
    }

    #[test]
    fn test_message_errors() {
        let f = formatter(SubscriptionFilter::default(), defaults());

        let event = incoming(ActivitySource::Remote, None, 1, message(false));
        let json = serde_json::to_value(event.deliver(&f).unwrap()).unwrap();
        assert_eq!(json["error"], "unable to get chat channel");

        let event = incoming(
            ActivitySource::Remote,
            Some(conv(1)),
            1,
            MessageUnboxed::Error {
                err_msg: "unable to decrypt".into(),
            },
        );
        let json = serde_json::to_value(event.deliver(&f).unwrap()).unwrap();
        assert_eq!(json["error"], "unable to decrypt");
        assert_eq!(json["source"], "remote");

        let event = incoming(ActivitySource::Remote, Some(conv(1)), 1, MessageUnboxed::Outbox);
        assert_eq!(event.deliver(&f), None);
    }

    #[test]
    fn test_conversation_notifications() {
        let event = PushEvent::JoinedConversation {
            conv_id: ConversationId::from_bytes(&[9]),
            conv: None,
        };
        let f = formatter(SubscriptionFilter::default(), defaults());
        let json = serde_json::to_value(event.deliver(&f).unwrap()).unwrap();
        assert_eq!(json["type"], "chat_conv");
        assert_eq!(json["error"], "No conversation info found: 09");

        let event = PushEvent::NewChatActivity {
            source: ActivitySource::Remote,
            activity: ChatActivity::NewConversation {
                conv_id: ConversationId::from_bytes(&[1]),
                conv: Some(conv(1)),
            },
        };
        let json = serde_json::to_value(event.deliver(&f).unwrap()).unwrap();
        assert_eq!(json["conv"]["channel"]["name"], "alice,bob");

        let options = FormatterOptions {
            show_new_convs: false,
            ..defaults()
        };
        let quiet = formatter(SubscriptionFilter::default(), options);
        assert_eq!(event.deliver(&quiet), None);
    }

    #[test]
    fn test_other_pushes_produce_nothing() {
        let f = formatter(SubscriptionFilter::default(), defaults());
        assert_eq!(PushEvent::InboxStale.deliver(&f), None);
        let typing = PushEvent::Typing {
            conv_id: ConversationId::from_bytes(&[1]),
            typers: vec!["bob".into()],
        };
        assert_eq!(typing.deliver(&f), None);
    }
}
