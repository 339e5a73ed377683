use anyhow::anyhow;
use temuin_client::{BookingOutcome, BookingRequest};

use crate::cli::{BookArgs, OutputFormat};
use crate::client::{AppContext, CliError, CliResult, classify_client_error};
use crate::output::render_booking;

/// Run the booking saga; a declined payment renders the booking and fails.
pub(crate) async fn handle_book(
    ctx: &AppContext,
    args: BookArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let request = BookingRequest {
        provider_id: args
            .provider
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()),
        customer_name: args.customer_name,
        slot: args.slot,
        force_payment_failure: args.force_payment_failure,
    };
    let outcome = ctx
        .app
        .booking()
        .confirm(request)
        .await
        .map_err(classify_client_error)?;
    render_booking(&outcome, format)?;

    match outcome {
        BookingOutcome::Confirmed { .. } => Ok(()),
        BookingOutcome::PaymentDeclined { booking, message } => Err(CliError::failure(anyhow!(
            "payment for booking {} declined: {message}",
            booking.id
        ))),
    }
}
