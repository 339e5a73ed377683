//! Output renderers for CLI commands.

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use temuin_api_models::{
    AdminUserRow, AuditEntry, Booking, Provider, Service, StatusAck, User,
};
use temuin_client::BookingOutcome;

use crate::cli::OutputFormat;
use crate::client::{CliError, CliResult};

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

pub(crate) fn render_health(ack: &StatusAck, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(ack)?,
        OutputFormat::Table => println!("backend: {}", ack.status),
    }
    Ok(())
}

pub(crate) fn render_user(user: Option<&User>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&user)?,
        OutputFormat::Table => match user {
            Some(user) => {
                println!("id: {}", user.id);
                println!("email: {}", user.email);
                if let Some(name) = &user.name {
                    println!("name: {name}");
                }
                println!("role: {}", user.role.as_str());
            }
            None => println!("not signed in"),
        },
    }
    Ok(())
}

pub(crate) fn render_services(services: &[Service], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(services)?,
        OutputFormat::Table => {
            println!("{:<12} {:>8} {:>10} NAME", "ID", "MINUTES", "PRICE");
            for service in services {
                println!(
                    "{:<12} {:>8} {:>10} {}",
                    service.id, service.duration_minutes, service.price, service.name
                );
            }
        }
    }
    Ok(())
}

pub(crate) fn render_providers(providers: &[Provider], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(providers)?,
        OutputFormat::Table => {
            println!("{:<12} {:<10} NAME", "ID", "AVAILABLE");
            for provider in providers {
                println!(
                    "{:<12} {:<10} {}",
                    provider.id,
                    if provider.available { "yes" } else { "no" },
                    provider.name
                );
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SlotReport<'a> {
    provider_id: &'a str,
    date: NaiveDate,
    slots: &'a [DateTime<Utc>],
}

pub(crate) fn render_slots(
    provider_id: &str,
    date: NaiveDate,
    slots: &[DateTime<Utc>],
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&SlotReport {
            provider_id,
            date,
            slots,
        })?,
        OutputFormat::Table => {
            if slots.is_empty() {
                println!("no open slots for {provider_id} on {date}");
            }
            for slot in slots {
                println!("{}", slot.to_rfc3339());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingReport<'a> {
    booking: &'a Booking,
    payment: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl<'a> From<&'a BookingOutcome> for BookingReport<'a> {
    fn from(outcome: &'a BookingOutcome) -> Self {
        match outcome {
            BookingOutcome::Confirmed {
                booking,
                transaction_id,
            } => Self {
                booking,
                payment: "succeeded",
                transaction_id: transaction_id.as_deref(),
                message: None,
            },
            BookingOutcome::PaymentDeclined { booking, message } => Self {
                booking,
                payment: "declined",
                transaction_id: None,
                message: Some(message),
            },
        }
    }
}

pub(crate) fn render_booking(outcome: &BookingOutcome, format: OutputFormat) -> CliResult<()> {
    let report = BookingReport::from(outcome);
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            let booking = report.booking;
            println!("booking: {}", booking.id);
            println!("provider: {}", booking.provider_id);
            println!("customer: {}", booking.customer_name);
            if let Some(slot) = booking.slot {
                println!("slot: {}", slot.to_rfc3339());
            }
            println!("status: {}", booking.status);
            println!("payment: {}", report.payment);
            if let Some(tx) = report.transaction_id {
                println!("transaction: {tx}");
            }
            if let Some(message) = report.message {
                println!("reason: {message}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_users(
    rows: &[AdminUserRow],
    page: usize,
    format: OutputFormat,
) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(rows)?,
        OutputFormat::Table => {
            println!("{:<8} {:<32} {:<6} NAME", "ID", "EMAIL", "ROLE");
            for row in rows {
                println!(
                    "{:<8} {:<32} {:<6} {}",
                    row.id,
                    row.email,
                    row.role.as_str(),
                    row.name
                );
            }
            println!("page: {page}");
        }
    }
    Ok(())
}

pub(crate) fn render_audit(entries: &[AuditEntry], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(entries)?,
        OutputFormat::Table => {
            println!("{:<25} {:<8} {:<12} {:<24} DETAILS", "AT", "ACTOR", "ACTION", "TARGET");
            for entry in entries {
                println!(
                    "{:<25} {:<8} {:<12} {:<24} {}",
                    entry.created_at.to_rfc3339(),
                    entry.actor_id,
                    entry.action,
                    entry.target,
                    entry.details
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking() -> Booking {
        Booking {
            id: "b_1".into(),
            provider_id: "p1".into(),
            customer_name: "Demo User".into(),
            slot: None,
            status: "confirmed".into(),
        }
    }

    #[test]
    fn booking_report_describes_both_outcomes() -> anyhow::Result<()> {
        let confirmed = BookingOutcome::Confirmed {
            booking: booking(),
            transaction_id: Some("tx_1".into()),
        };
        let value = serde_json::to_value(BookingReport::from(&confirmed))?;
        assert_eq!(value["payment"], "succeeded");
        assert_eq!(value["transactionId"], "tx_1");
        assert!(value.get("message").is_none());

        let declined = BookingOutcome::PaymentDeclined {
            booking: booking(),
            message: "Payment failed".into(),
        };
        let value = serde_json::to_value(BookingReport::from(&declined))?;
        assert_eq!(value["payment"], "declined");
        assert_eq!(value["message"], "Payment failed");
        assert_eq!(value["booking"]["id"], "b_1");
        Ok(())
    }

    #[test]
    fn renderers_accept_empty_lists() -> CliResult<()> {
        render_services(&[], OutputFormat::Table)?;
        render_users(&[], 1, OutputFormat::Json)?;
        render_user(None, OutputFormat::Table)?;
        Ok(())
    }
}
