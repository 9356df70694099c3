//! Team API methods.

use crate::domain::error::ApiResult;
use crate::domain::methods::ApiSurface;
use crate::domain::options::{ListSelfOptions, ListTeamOptions, ListUserOptions};
use crate::domain::types::{TeamDetails, TeamList};
use crate::rpc::{CallContext, Registry};
use tracing::instrument;

/// Method table of the team surface
pub fn routes() -> Registry {
    Registry::new(ApiSurface::Team)
        .route("list-team-memberships", list_team_memberships)
        .route("list-user-memberships", list_user_memberships)
        .route("list-self-memberships", list_self_memberships)
}

#[instrument(skip(ctx))]
async fn list_team_memberships(ctx: CallContext, opts: ListTeamOptions) -> ApiResult<TeamDetails> {
    ctx.track(ctx.session.team.team_get(&opts.team, opts.force_poll).await)
}

#[instrument(skip(ctx))]
async fn list_user_memberships(ctx: CallContext, opts: ListUserOptions) -> ApiResult<TeamList> {
    ctx.track(
        ctx.session
            .team
            .team_list_for_user(&opts.username, opts.include_implicit_teams)
            .await,
    )
}

#[instrument(skip(ctx))]
async fn list_self_memberships(ctx: CallContext, opts: ListSelfOptions) -> ApiResult<TeamList> {
    let username = ctx.session.username().to_string();
    ctx.track(
        ctx.session
            .team
            .team_list_for_user(&username, opts.include_implicit_teams)
            .await,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::Call;
    use crate::domain::error::{codes, GatewayError};
    use crate::domain::types::{ChatChannel, TeamRole};
    use crate::rpc::test_support::{call, session};
    use serde_json::json;

    #[tokio::test]
    async fn test_list_team_memberships() {
        let (backend, session) = session();
        backend.add_team("acme", &[("alice", TeamRole::Admin), ("bob", TeamRole::Writer)], true);

        let reply = routes()
            .dispatch(&session, &call("list-team-memberships", json!({"team": "acme"})))
            .await
            .unwrap();
        let result = reply.result.unwrap();
        assert_eq!(result["name"], "acme");
        assert_eq!(result["members"]["admins"][0]["username"], "alice");
        assert_eq!(result["members"]["writers"][0]["username"], "bob");
        assert_eq!(result["open"], true);

        let reply = routes()
            .dispatch(&session, &call("list-team-memberships", json!({"team": "nope"})))
            .await
            .unwrap();
        assert_eq!(reply.error.unwrap().code, codes::RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_user_needs_username() {
        let (backend, session) = session();
        let err = routes()
            .dispatch(&session, &Call::new("list-user-memberships", None))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidOptions { .. }));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_list_self_without_options() {
        let (backend, session) = session();
        backend.add_team("acme", &[("alice", TeamRole::Owner)], false);
        backend.add_team("globex", &[("bob", TeamRole::Owner)], false);
        backend.add_conversation(ChatChannel {
            name: "alice,carol".into(),
            ..Default::default()
        });

        let reply = routes()
            .dispatch(&session, &Call::new("list-self-memberships", None))
            .await
            .unwrap();
        let teams = reply.result.unwrap()["teams"].clone();
        assert_eq!(teams.as_array().unwrap().len(), 1);
        assert_eq!(teams[0]["fqName"], "acme");
        assert_eq!(teams[0]["role"], "owner");

        let reply = routes()
            .dispatch(
                &session,
                &call("list-self-memberships", json!({"include-implicit-teams": true})),
            )
            .await
            .unwrap();
        let teams = reply.result.unwrap()["teams"].clone();
        assert_eq!(teams.as_array().unwrap().len(), 2);
        assert_eq!(teams[1]["isImplicitTeam"], true);
    }
}
