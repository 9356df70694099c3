//! Key-value store API methods.
//!
//! An absent `team` addresses the session user's own implicit team.

use crate::domain::error::{ApiError, ApiResult};
use crate::domain::methods::ApiSurface;
use crate::domain::options::{
    DeleteEntryOptions, GetEntryOptions, ListEntriesOptions, PutEntryOptions,
};
use crate::domain::types::{KvDeleteResult, KvGetResult, KvPutResult};
use crate::ports::outbound::EntryRef;
use crate::rpc::{CallContext, Registry};
use serde_json::Value;
use tracing::instrument;

/// Method table of the kvstore surface
pub fn routes() -> Registry {
    Registry::new(ApiSurface::KvStore)
        .route("get", get)
        .route("put", put)
        .route("list", list)
        .route("del", del)
}

fn team_or_self(ctx: &CallContext, team: Option<String>) -> String {
    team.filter(|t| !t.is_empty())
        .unwrap_or_else(|| ctx.session.self_team())
}

fn entry(ctx: &CallContext, team: Option<String>, namespace: String, entry_key: String) -> EntryRef {
    EntryRef {
        team: team_or_self(ctx, team),
        namespace,
        entry_key,
    }
}

#[instrument(skip(ctx))]
async fn get(ctx: CallContext, opts: GetEntryOptions) -> ApiResult<KvGetResult> {
    let entry = entry(&ctx, opts.team, opts.namespace, opts.entry_key);
    ctx.track(ctx.session.kv.get_entry(&entry).await)
}

#[instrument(skip(ctx, opts), fields(namespace = %opts.namespace, entry_key = %opts.entry_key))]
async fn put(ctx: CallContext, opts: PutEntryOptions) -> ApiResult<KvPutResult> {
    let entry = entry(&ctx, opts.team, opts.namespace, opts.entry_key);
    ctx.track(
        ctx.session
            .kv
            .put_entry(&entry, &opts.entry_value, opts.revision)
            .await,
    )
}

/// Without a namespace, lists namespaces; with one, lists its entry keys
#[instrument(skip(ctx))]
async fn list(ctx: CallContext, opts: ListEntriesOptions) -> ApiResult<Value> {
    let team = team_or_self(&ctx, opts.team);
    let value = if opts.namespace.is_empty() {
        serde_json::to_value(ctx.track(ctx.session.kv.list_namespaces(&team).await)?)
    } else {
        serde_json::to_value(ctx.track(ctx.session.kv.list_entries(&team, &opts.namespace).await)?)
    };
    value.map_err(|e| ApiError::internal(e.to_string()))
}

#[instrument(skip(ctx))]
async fn del(ctx: CallContext, opts: DeleteEntryOptions) -> ApiResult<KvDeleteResult> {
    let entry = entry(&ctx, opts.team, opts.namespace, opts.entry_key);
    ctx.track(ctx.session.kv.delete_entry(&entry, opts.revision).await)
}
