//! Chat API methods.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::methods::ApiSurface;
use crate::domain::options::{
    AdvertiseCommandsOptions, AttachOptions, ClearCommandsOptions, EditOptions, GetOptions,
    JoinOptions, LeaveOptions, ListCommandsOptions, ListConvsOnNameOptions, ListMembersOptions,
    ListOptions, ReactionOptions, ReadOptions, SendOptions,
};
use crate::domain::types::{
    ChatList, Conversation, EmptyResult, ListCommandsResult, MembersDetails, MembersType,
    SendResult, Thread, TopicType,
};
use crate::ports::outbound::{CommandAdvertisement, InboxQuery, OutgoingText, ThreadQuery, Upload};
use crate::rpc::messages::format_messages;
use crate::rpc::resolve::{find_conversation, find_or_create_conversation, parse_conversation_id};
use crate::rpc::{CallContext, Registry};
use tracing::{debug, instrument};

/// Method table of the chat surface
pub fn routes() -> Registry {
    Registry::new(ApiSurface::Chat)
        .route("list", list)
        .route("read", read)
        .route("get", get)
        .route("send", send)
        .route("edit", edit)
        .route("reaction", reaction)
        .route("attach", attach)
        .route("listconvsonname", list_convs_on_name)
        .route("join", join)
        .route("leave", leave)
        .route("advertisecommands", advertise_commands)
        .route("clearcommands", clear_commands)
        .route("listcommands", list_commands)
        .route("listmembers", list_members)
}

/// list - inbox summary
#[instrument(skip(ctx))]
async fn list(ctx: CallContext, opts: ListOptions) -> ApiResult<ChatList> {
    let conversation_id = if opts.conversation_id.is_empty() {
        None
    } else {
        Some(parse_conversation_id(&opts.conversation_id)?)
    };
    let query = InboxQuery {
        topic_type: TopicType::parse_or_default(&opts.topic_type).unwrap_or_default(),
        unread_only: opts.unread_only,
        conversation_id,
    };
    let inbox = ctx.track(ctx.session.chat.get_inbox(&query).await)?;
    if opts.fail_offline && inbox.offline {
        return Err(ApiError::offline());
    }
    debug!(count = inbox.conversations.len(), offline = inbox.offline, "Inbox loaded");
    Ok(ChatList {
        conversations: inbox.conversations.into_iter().map(|c| c.summary).collect(),
        offline: inbox.offline,
    })
}

/// read - newest-first thread of one conversation
#[instrument(skip(ctx))]
async fn read(ctx: CallContext, opts: ReadOptions) -> ApiResult<Thread> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let query = ThreadQuery {
        pagination: opts.pagination.clone(),
        mark_as_read: !opts.peek,
    };
    let page = ctx.track(ctx.session.chat.get_thread(conv.id(), &query).await)?;
    if opts.fail_offline && page.offline {
        return Err(ApiError::offline());
    }
    let messages = format_messages(
        &page.messages,
        &conv,
        ctx.session.username(),
        opts.unread_only,
        ctx.session.clock.now_ms(),
    )?;
    Ok(Thread {
        messages,
        pagination: page.pagination,
        offline: page.offline,
    })
}

/// get - specific messages by id
#[instrument(skip(ctx))]
async fn get(ctx: CallContext, opts: GetOptions) -> ApiResult<Thread> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let page = ctx.track(
        ctx.session
            .chat
            .get_messages(conv.id(), &opts.message_ids, !opts.peek)
            .await,
    )?;
    if opts.fail_offline && page.offline {
        return Err(ApiError::offline());
    }
    // Fetched messages are reported against an unset read marker
    let unmarked = Conversation {
        read_msg_id: 0,
        ..conv
    };
    let messages = format_messages(
        &page.messages,
        &unmarked,
        ctx.session.username(),
        false,
        ctx.session.clock.now_ms(),
    )?;
    Ok(Thread {
        messages,
        pagination: None,
        offline: page.offline,
    })
}

/// send - post a text message, creating the conversation if needed
#[instrument(skip(ctx, opts), fields(nonblock = opts.nonblock))]
async fn send(ctx: CallContext, opts: SendOptions) -> ApiResult<SendResult> {
    let conv = find_or_create_conversation(&ctx, &opts.target()).await?;
    let msg = OutgoingText {
        body: opts.message.body,
        nonblock: opts.nonblock,
        exploding_lifetime: opts.exploding_lifetime,
        reply_to: opts.reply_to,
    };
    let posted = ctx.track(ctx.session.chat.post_text(conv.id(), &msg).await)?;
    Ok(SendResult {
        message: "message sent".to_string(),
        id: posted.message_id,
    })
}

/// edit - replace the body of an earlier message
#[instrument(skip(ctx, opts), fields(message_id = opts.message_id))]
async fn edit(ctx: CallContext, opts: EditOptions) -> ApiResult<SendResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let posted = ctx.track(
        ctx.session
            .chat
            .edit_message(conv.id(), opts.message_id, &opts.message.body)
            .await,
    )?;
    Ok(SendResult {
        message: "message edited".to_string(),
        id: posted.message_id,
    })
}

/// reaction - react to an earlier message
#[instrument(skip(ctx, opts), fields(message_id = opts.message_id))]
async fn reaction(ctx: CallContext, opts: ReactionOptions) -> ApiResult<SendResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let posted = ctx.track(
        ctx.session
            .chat
            .post_reaction(conv.id(), opts.message_id, &opts.message.body)
            .await,
    )?;
    Ok(SendResult {
        message: "message reacted to".to_string(),
        id: posted.message_id,
    })
}

/// attach - hand a local file to the backend upload operation
#[instrument(skip(ctx, opts), fields(filename = %opts.filename))]
async fn attach(ctx: CallContext, opts: AttachOptions) -> ApiResult<SendResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let upload = Upload {
        filename: opts.filename,
        title: opts.title,
        preview: opts.preview,
        exploding_lifetime: opts.exploding_lifetime,
    };
    let posted = ctx.track(ctx.session.chat.upload_attachment(conv.id(), &upload).await)?;
    Ok(SendResult {
        message: "attachment sent".to_string(),
        id: posted.message_id,
    })
}

/// listconvsonname - every conversation on a team or TLF name
#[instrument(skip(ctx))]
async fn list_convs_on_name(ctx: CallContext, opts: ListConvsOnNameOptions) -> ApiResult<ChatList> {
    let members = MembersType::parse_or_default(&opts.members_type).unwrap_or_default();
    let topic = TopicType::parse_or_default(&opts.topic_type).unwrap_or_default();
    let convs = ctx.track(
        ctx.session
            .chat
            .get_tlf_conversations(&opts.name, members, topic)
            .await,
    )?;
    Ok(ChatList {
        conversations: convs.into_iter().map(|c| c.summary).collect(),
        offline: false,
    })
}

#[instrument(skip(ctx))]
async fn join(ctx: CallContext, opts: JoinOptions) -> ApiResult<EmptyResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    ctx.track(ctx.session.chat.join_conversation(conv.id()).await)?;
    Ok(EmptyResult {})
}

#[instrument(skip(ctx))]
async fn leave(ctx: CallContext, opts: LeaveOptions) -> ApiResult<EmptyResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    ctx.track(ctx.session.chat.leave_conversation(conv.id()).await)?;
    Ok(EmptyResult {})
}

/// advertisecommands - publish bot commands for the session user (or alias)
#[instrument(skip(ctx, opts), fields(count = opts.advertisements.len()))]
async fn advertise_commands(
    ctx: CallContext,
    opts: AdvertiseCommandsOptions,
) -> ApiResult<EmptyResult> {
    let mut ads = Vec::with_capacity(opts.advertisements.len());
    for ad in opts.advertisements {
        let kind = ad.check().map_err(ApiError::server_error)?;
        let conv_id = if ad.conv_id.is_empty() {
            None
        } else {
            Some(parse_conversation_id(&ad.conv_id)?)
        };
        ads.push(CommandAdvertisement {
            kind,
            commands: ad.commands,
            team_name: (!ad.team_name.is_empty()).then_some(ad.team_name),
            conv_id,
        });
    }
    let alias = (!opts.alias.is_empty()).then_some(opts.alias.as_str());
    ctx.track(ctx.session.chat.advertise_commands(alias, &ads).await)?;
    Ok(EmptyResult {})
}

/// clearcommands - the result is intentionally empty
#[instrument(skip(ctx, _opts))]
async fn clear_commands(ctx: CallContext, _opts: ClearCommandsOptions) -> ApiResult<()> {
    ctx.track(ctx.session.chat.clear_commands().await)
}

#[instrument(skip(ctx))]
async fn list_commands(ctx: CallContext, opts: ListCommandsOptions) -> ApiResult<ListCommandsResult> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    let commands = ctx.track(ctx.session.chat.list_commands(conv.id()).await)?;
    Ok(ListCommandsResult { commands })
}

#[instrument(skip(ctx))]
async fn list_members(ctx: CallContext, opts: ListMembersOptions) -> ApiResult<MembersDetails> {
    let conv = find_conversation(&ctx, &opts.address).await?;
    ctx.track(ctx.session.chat.list_members(conv.id()).await)
}
