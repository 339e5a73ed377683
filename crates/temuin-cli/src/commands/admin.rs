use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::anyhow;
use temuin_client::{PromotionOutcome, PromotionPrompt};

use crate::cli::{AdminUsersArgs, OutputFormat, PromoteArgs};
use crate::client::{AppContext, CliError, CliResult, classify_client_error};
use crate::output::{render_audit, render_users};

/// Restore the session and refuse non-administrators before any admin call.
async fn require_admin(ctx: &AppContext) -> CliResult<()> {
    let state = ctx.app.session().initialize().await;
    match state.user {
        None => Err(CliError::validation("sign in first (temuin login)")),
        Some(_) if !ctx.app.session().is_admin() => {
            Err(CliError::validation("administrator role required"))
        }
        Some(_) => Ok(()),
    }
}

pub(crate) async fn handle_admin_users(
    ctx: &AppContext,
    args: AdminUsersArgs,
    format: OutputFormat,
) -> CliResult<()> {
    require_admin(ctx).await?;
    let rows = ctx
        .app
        .admin()
        .users(args.page, &args.q)
        .await
        .map_err(classify_client_error)?;
    render_users(&rows, args.page, format)
}

pub(crate) async fn handle_admin_audit(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    require_admin(ctx).await?;
    let entries = ctx
        .app
        .admin()
        .audit()
        .await
        .map_err(classify_client_error)?;
    render_audit(&entries, format)
}

pub(crate) async fn handle_admin_promote(ctx: &AppContext, args: PromoteArgs) -> CliResult<()> {
    require_admin(ctx).await?;
    let prompt = ctx
        .app
        .admin()
        .request_promotion(&args.email)
        .map_err(classify_client_error)?;
    if !args.yes && !confirm_interactively(&prompt)? {
        println!("Promotion cancelled.");
        return Ok(());
    }

    match ctx
        .app
        .admin()
        .promote(prompt.confirm())
        .await
        .map_err(classify_client_error)?
    {
        PromotionOutcome::Promoted { email } => {
            println!("Promoted {email} to admin.");
            Ok(())
        }
        PromotionOutcome::RolledBack { email, message } => Err(CliError::failure(anyhow!(
            "failed to promote {email}: {message}"
        ))),
    }
}

fn confirm_interactively(prompt: &PromotionPrompt) -> CliResult<bool> {
    if !io::stdin().is_terminal() {
        return Err(CliError::validation(
            "confirmation required; pass --yes when running non-interactively",
        ));
    }
    eprint!("{} [y/N] ", prompt.message());
    io::stderr()
        .flush()
        .map_err(|err| CliError::failure(anyhow!("failed to write prompt: {err}")))?;
    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|err| CliError::failure(anyhow!("failed to read confirmation: {err}")))?;
    Ok(is_affirmative(&answer))
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context, signed_in_context};
    use anyhow::Result;
    use httpmock::prelude::*;
    use serde_json::json;

    const ADMIN_TOKEN: &str = "admin-token";

    fn mock_admin_identity(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/me")
                .header("authorization", "Bearer admin-token");
            then.status(200).json_body(json!({
                "user": { "id": 9, "email": "root@x", "role": "admin" }
            }));
        })
    }

    #[tokio::test]
    async fn promote_with_yes_calls_the_backend() -> Result<()> {
        let server = MockServer::start_async().await;
        let me = mock_admin_identity(&server);
        let promote = server.mock(|when, then| {
            when.method(POST)
                .path("/api/admin/promote")
                .header("authorization", "Bearer admin-token")
                .json_body(json!({ "email": "a@x" }));
            then.status(200).json_body(json!({ "status": "promoted" }));
        });
        let (ctx, _store) = signed_in_context(&server, ADMIN_TOKEN)?;

        handle_admin_promote(
            &ctx,
            PromoteArgs {
                email: "a@x".into(),
                yes: true,
            },
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        me.assert();
        promote.assert();
        assert!(!ctx.app.admin().is_promoting());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_promotion_is_reported_after_rollback() -> Result<()> {
        let server = MockServer::start_async().await;
        let _me = mock_admin_identity(&server);
        let promote = server.mock(|when, then| {
            when.method(POST).path("/api/admin/promote");
            then.status(500)
                .json_body(json!({ "error": "promotion rejected" }));
        });
        let (ctx, _store) = signed_in_context(&server, ADMIN_TOKEN)?;

        let err = handle_admin_promote(
            &ctx,
            PromoteArgs {
                email: "a@x".into(),
                yes: true,
            },
        )
        .await
        .expect_err("promotion rejected");

        promote.assert();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.display_message(),
            "failed to promote a@x: promotion rejected"
        );
        Ok(())
    }

    #[tokio::test]
    async fn users_are_filtered_and_paged_locally() -> Result<()> {
        let server = MockServer::start_async().await;
        let _me = mock_admin_identity(&server);
        let users = server.mock(|when, then| {
            when.method(GET).path("/api/admin/users");
            then.status(200).json_body(json!({
                "users": [
                    { "id": 1, "email": "a@x", "name": "Alice", "role": "user" },
                    { "id": 2, "email": "b@x", "name": "Bob", "role": "user" }
                ]
            }));
        });
        let (ctx, _store) = signed_in_context(&server, ADMIN_TOKEN)?;

        handle_admin_users(
            &ctx,
            AdminUsersArgs {
                page: 1,
                q: "bob".into(),
            },
            OutputFormat::Json,
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        users.assert();
        let rows = ctx
            .app
            .admin()
            .cached_users(1, "bob")
            .ok_or_else(|| anyhow!("rows cached"))?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email, "b@x");
        Ok(())
    }

    #[tokio::test]
    async fn non_admins_are_refused_before_admin_calls() -> Result<()> {
        let server = MockServer::start_async().await;
        let me = server.mock(|when, then| {
            when.method(GET).path("/api/me");
            then.status(200).json_body(json!({
                "user": { "id": 1, "email": "demo@user.test", "role": "user" }
            }));
        });
        let (ctx, _store) = signed_in_context(&server, "user-token")?;

        let err = handle_admin_audit(&ctx, OutputFormat::Table)
            .await
            .expect_err("not an admin");
        me.assert();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "administrator role required");
        Ok(())
    }

    #[tokio::test]
    async fn anonymous_callers_are_asked_to_sign_in() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/me");
            then.status(401).json_body(json!({ "error": "unauthorized" }));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/auth/refresh");
            then.status(401).json_body(json!({ "error": "no refresh cookie" }));
        });
        let (ctx, _store) = context(&server)?;

        let err = handle_admin_users(
            &ctx,
            AdminUsersArgs {
                page: 1,
                q: String::new(),
            },
            OutputFormat::Table,
        )
        .await
        .expect_err("anonymous");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "sign in first (temuin login)");
        Ok(())
    }

    #[test]
    fn only_explicit_yes_confirms() {
        assert!(is_affirmative("y\n"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative("\n"));
        assert!(!is_affirmative("no"));
    }
}
