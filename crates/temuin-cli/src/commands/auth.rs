use std::io::{self, IsTerminal};

use anyhow::anyhow;

use crate::cli::{LoginArgs, OutputFormat, RegisterArgs};
use crate::client::{AppContext, CliError, CliResult, classify_client_error};
use crate::output::render_user;

pub(crate) async fn handle_login(
    ctx: &AppContext,
    args: LoginArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let email = require_email(&args.email)?;
    let password = resolve_password(args.password)?;
    let user = ctx
        .app
        .session()
        .login(email, &password)
        .await
        .map_err(classify_client_error)?;
    render_user(Some(&user), format)
}

pub(crate) async fn handle_register(
    ctx: &AppContext,
    args: RegisterArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let email = require_email(&args.email)?;
    let password = resolve_password(args.password)?;
    let name = args
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let user = ctx
        .app
        .session()
        .register(email, &password, name)
        .await
        .map_err(classify_client_error)?;
    render_user(Some(&user), format)
}

pub(crate) async fn handle_logout(ctx: &AppContext) -> CliResult<()> {
    ctx.app.session().logout().await;
    println!("Session cleared.");
    Ok(())
}

pub(crate) async fn handle_whoami(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let state = ctx.app.session().initialize().await;
    render_user(state.user.as_ref(), format)
}

fn require_email(raw: &str) -> CliResult<&str> {
    let email = raw.trim();
    if email.is_empty() {
        return Err(CliError::validation("email cannot be empty"));
    }
    Ok(email)
}

pub(crate) fn resolve_password(provided: Option<String>) -> CliResult<String> {
    if let Some(value) = provided {
        if value.is_empty() {
            return Err(CliError::validation("password cannot be empty"));
        }
        return Ok(value);
    }

    if io::stdin().is_terminal() {
        let pass = rpassword::prompt_password("Password: ").map_err(|err| {
            CliError::failure(anyhow!("failed to read password from stdin: {err}"))
        })?;
        if pass.is_empty() {
            return Err(CliError::validation("password cannot be empty"));
        }
        Ok(pass)
    } else {
        Err(CliError::validation(
            "password required; supply via --password when running non-interactively",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context, signed_in_context};
    use anyhow::Result;
    use httpmock::prelude::*;
    use serde_json::json;
    use temuin_client::KeyValueStore;
    use temuin_client::storage::TOKEN_KEY;

    #[tokio::test]
    async fn login_persists_the_session_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/auth/login")
                .json_body(json!({ "email": "demo@user.test", "password": "password" }));
            then.status(200).json_body(json!({
                "token": "mock-jwt-token",
                "user": { "id": 1, "email": "demo@user.test", "role": "user" }
            }));
        });
        let (ctx, store) = context(&server)?;

        handle_login(
            &ctx,
            LoginArgs {
                email: " demo@user.test ".into(),
                password: Some("password".into()),
            },
            OutputFormat::Json,
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        mock.assert();
        assert_eq!(
            store.get(TOKEN_KEY).map_err(|err| anyhow!(err.user_message()))?,
            Some("mock-jwt-token".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejected_login_is_a_failure_without_refresh() -> Result<()> {
        let server = MockServer::start_async().await;
        let login = server.mock(|when, then| {
            when.method(POST).path("/api/auth/login");
            then.status(401)
                .json_body(json!({ "message": "Invalid credentials" }));
        });
        let (ctx, store) = context(&server)?;

        let err = handle_login(
            &ctx,
            LoginArgs {
                email: "demo@user.test".into(),
                password: Some("nope".into()),
            },
            OutputFormat::Table,
        )
        .await
        .expect_err("login rejected");

        login.assert();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "Invalid credentials (status 401)");
        assert!(
            store
                .get(TOKEN_KEY)
                .map_err(|err| anyhow!(err.user_message()))?
                .is_none()
        );
        Ok(())
    }

    #[tokio::test]
    async fn whoami_sends_the_persisted_token() -> Result<()> {
        let server = MockServer::start_async().await;
        let me = server.mock(|when, then| {
            when.method(GET)
                .path("/api/me")
                .header("authorization", "Bearer stored-token");
            then.status(200).json_body(json!({
                "user": { "id": "u1", "email": "root@x", "role": "admin" }
            }));
        });
        let (ctx, _store) = signed_in_context(&server, "stored-token")?;

        handle_whoami(&ctx, OutputFormat::Table)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        me.assert();
        assert!(ctx.app.session().is_admin());
        Ok(())
    }

    #[tokio::test]
    async fn logout_clears_the_token_even_when_the_server_fails() -> Result<()> {
        let server = MockServer::start_async().await;
        let logout = server.mock(|when, then| {
            when.method(POST).path("/api/auth/logout");
            then.status(500);
        });
        let (ctx, store) = signed_in_context(&server, "stored-token")?;

        handle_logout(&ctx)
            .await
            .map_err(|err| anyhow!(err.display_message()))?;

        logout.assert();
        assert!(
            store
                .get(TOKEN_KEY)
                .map_err(|err| anyhow!(err.user_message()))?
                .is_none()
        );
        Ok(())
    }

    #[test]
    fn blank_credentials_are_validation_errors() {
        assert_eq!(
            require_email("  ").map_err(|err| err.exit_code()),
            Err(2)
        );
        assert!(matches!(
            resolve_password(Some(String::new())),
            Err(CliError::Validation(_))
        ));
        assert_eq!(
            resolve_password(Some("secret".into())).ok().as_deref(),
            Some("secret")
        );
    }
}
