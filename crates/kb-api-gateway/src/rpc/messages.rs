//! Conversion of backend messages into their output form.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::types::{Conversation, Message, MessageType, MessageUnboxed, MessageValid, MsgSummary};

/// Output summary of a valid message seen by `username`.
///
/// A message is unread when it is newer than the reader's marker, except
/// that messages sent by the reader are never unread.
pub fn summarize(msg: &MessageValid, conv: &Conversation, username: &str, now_ms: i64) -> MsgSummary {
    let own = msg.sender.username == username;
    MsgSummary {
        id: msg.id,
        conversation_id: conv.summary.id.clone(),
        channel: conv.summary.channel.clone(),
        sender: msg.sender.clone(),
        sent_at: msg.sent_at_ms / 1000,
        sent_at_ms: msg.sent_at_ms,
        content: msg.content.clone(),
        prev: msg.prev.clone(),
        unread: !own && msg.id > conv.read_msg_id,
        revoked_device: msg.revoked_device,
        kbfs_encrypted: msg.kbfs_encrypted,
        is_ephemeral: msg.is_ephemeral,
        is_ephemeral_expired: msg.is_ephemeral_expired(now_ms),
        e_time: msg.etime,
        reactions: msg.reactions.clone(),
        has_pairwise_macs: msg.has_pairwise_macs,
        at_mention_usernames: msg.at_mentions.clone(),
        channel_mention: msg.channel_mention.clone(),
        channel_name_mentions: msg.channel_name_mentions.clone(),
        bot_info: msg.bot.clone(),
    }
}

/// Format a page of messages for `read` and `get`.
///
/// Errors are always reported in place, even with `unread_only`. Outbox
/// entries, placeholders and TLF name messages are skipped. A message whose
/// state is unknown fails the call.
pub fn format_messages(
    messages: &[MessageUnboxed],
    conv: &Conversation,
    username: &str,
    unread_only: bool,
    now_ms: i64,
) -> ApiResult<Vec<Message>> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            MessageUnboxed::Valid(valid) => {
                if valid.content.message_type == MessageType::Tlfname {
                    continue;
                }
                let summary = summarize(valid, conv, username, now_ms);
                if unread_only && !summary.unread {
                    continue;
                }
                out.push(Message {
                    msg: Some(summary),
                    error: None,
                });
            }
            MessageUnboxed::Error { err_msg } => {
                out.push(Message {
                    msg: None,
                    error: Some(err_msg.clone()),
                });
            }
            MessageUnboxed::Outbox | MessageUnboxed::Placeholder => continue,
            MessageUnboxed::Undecodable(_) => {
                return Err(ApiError::server_error("invalid message: unknown state"));
            }
        }
    }
    Ok(out)
}
