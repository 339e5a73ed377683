use anyhow::anyhow;
use temuin_client::SlotLoad;

use crate::cli::{OutputFormat, SlotsArgs};
use crate::client::{AppContext, CliError, CliResult, classify_client_error};
use crate::output::{render_health, render_providers, render_services, render_slots};

pub(crate) async fn handle_health(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let ack = ctx.app.api().health().await.map_err(classify_client_error)?;
    render_health(&ack, format)
}

pub(crate) async fn handle_services(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let services = ctx
        .app
        .catalog()
        .services()
        .await
        .map_err(classify_client_error)?;
    render_services(&services, format)
}

pub(crate) async fn handle_providers(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let providers = ctx
        .app
        .catalog()
        .providers()
        .await
        .map_err(classify_client_error)?;
    render_providers(&providers, format)
}

pub(crate) async fn handle_slots(
    ctx: &AppContext,
    args: SlotsArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let provider = args.provider.trim();
    if provider.is_empty() {
        return Err(CliError::validation("provider cannot be empty"));
    }
    let loader = ctx.app.catalog().slot_loader();
    match loader.select(Some(provider), Some(args.date)).await {
        SlotLoad::Applied(slots) => render_slots(provider, args.date, &slots, format),
        SlotLoad::Failed(message) => Err(CliError::failure(anyhow!(
            "failed to load slots: {message}"
        ))),
        SlotLoad::Cleared | SlotLoad::Superseded => Err(CliError::failure(anyhow!(
            "slot selection changed before the load finished"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::context;
    use anyhow::Result;
    use chrono::NaiveDate;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn slots_query_provider_and_date() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/availability")
                .query_param("providerId", "p1")
                .query_param("date", "2025-05-06");
            then.status(200).json_body(json!({
                "providerId": "p1",
                "date": "2025-05-06",
                "slots": ["2025-05-06T09:00:00Z", "2025-05-06T10:00:00Z"]
            }));
        });
        let (ctx, _store) = context(&server)?;

        handle_slots(
            &ctx,
            SlotsArgs {
                provider: "p1".into(),
                date: NaiveDate::from_ymd_opt(2025, 5, 6).ok_or_else(|| anyhow!("date"))?,
            },
            OutputFormat::Table,
        )
        .await
        .map_err(|err| anyhow!(err.display_message()))?;

        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn failed_slot_load_is_reported() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(GET).path("/availability");
            then.status(503)
                .json_body(json!({ "message": "availability offline" }));
        });
        let (ctx, _store) = context(&server)?;

        let err = handle_slots(
            &ctx,
            SlotsArgs {
                provider: "p1".into(),
                date: NaiveDate::from_ymd_opt(2025, 5, 6).ok_or_else(|| anyhow!("date"))?,
            },
            OutputFormat::Json,
        )
        .await
        .expect_err("load failed");

        mock.assert();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(
            err.display_message(),
            "failed to load slots: availability offline"
        );
        Ok(())
    }

    #[tokio::test]
    async fn catalogue_lists_render() -> Result<()> {
        let server = MockServer::start_async().await;
        let services = server.mock(|when, then| {
            when.method(GET).path("/services");
            then.status(200).json_body(json!([
                { "id": "s1", "name": "Haircut", "durationMinutes": 30, "price": 50000 }
            ]));
        });
        let providers = server.mock(|when, then| {
            when.method(GET).path("/providers");
            then.status(200).json_body(json!([
                { "id": "p1", "name": "Salon A", "available": true }
            ]));
        });
        let health = server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({ "status": "ok" }));
        });
        let (ctx, _store) = context(&server)?;

        let run = async {
            handle_services(&ctx, OutputFormat::Table).await?;
            handle_providers(&ctx, OutputFormat::Json).await?;
            handle_health(&ctx, OutputFormat::Table).await
        };
        run.await.map_err(|err| anyhow!(err.display_message()))?;

        services.assert();
        providers.assert();
        health.assert();
        Ok(())
    }
}
