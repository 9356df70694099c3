//! Conversation address resolution.
//!
//! Turns a channel or conversation id into exactly one backend conversation.
//! Every failure here is an address-resolution error on the reply.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::options::ConvAddress;
use crate::domain::types::{Conversation, ConversationId};
use crate::rpc::CallContext;
use tracing::debug;

/// Parse a caller-supplied conversation id
pub fn parse_conversation_id(raw: &str) -> ApiResult<ConversationId> {
    ConversationId::parse(raw)
        .map_err(|_| ApiError::address_resolution(format!("invalid conversation ID: {}", raw)))
}

/// Resolve an address to exactly one existing conversation
pub async fn find_conversation(ctx: &CallContext, address: &ConvAddress) -> ApiResult<Conversation> {
    let mut matches = lookup(ctx, address).await?;
    match matches.len() {
        0 => Err(no_match(address)),
        1 => Ok(matches.remove(0)),
        _ => Err(multiple_matches(address)),
    }
}

/// Resolve an address, creating the conversation when a channel matches
/// nothing yet
pub async fn find_or_create_conversation(
    ctx: &CallContext,
    address: &ConvAddress,
) -> ApiResult<Conversation> {
    let mut matches = lookup(ctx, address).await?;
    match matches.len() {
        0 if !address.channel.is_nil() => {
            debug!(channel = %address.channel.name, "Creating conversation");
            ctx.track(ctx.session.chat.new_conversation(&address.channel).await)
        }
        0 => Err(no_match(address)),
        1 => Ok(matches.remove(0)),
        _ => Err(multiple_matches(address)),
    }
}

async fn lookup(ctx: &CallContext, address: &ConvAddress) -> ApiResult<Vec<Conversation>> {
    if address.is_empty() {
        return Err(ApiError::address_resolution("missing conversation specifier"));
    }

    if !address.channel.is_nil() {
        return ctx.track(ctx.session.chat.find_conversations(&address.channel).await);
    }

    let id = parse_conversation_id(&address.conversation_id)?;
    let conv = ctx.track(ctx.session.chat.get_conversation(&id).await)?;
    Ok(conv.into_iter().collect())
}

fn no_match(address: &ConvAddress) -> ApiError {
    ApiError::address_resolution(format!("no conversations matched {:?}", address.describe()))
}

fn multiple_matches(address: &ConvAddress) -> ApiError {
    ApiError::address_resolution(format!(
        "multiple conversations matched {:?}",
        address.describe()
    ))
}
