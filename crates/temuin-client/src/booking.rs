//! Booking and payment saga.
//!
//! # Design
//! - Steps run strictly in sequence: create booking, create payment intent,
//!   derive the confirmation secret, confirm payment. There is no compensation;
//!   a declined payment leaves the booking in place.
//! - One saga at a time. The in-progress flag is set with a compare-and-set and
//!   cleared by a drop guard, so it is released on every exit path including
//!   cancellation of the calling future.
//! - Every terminal outcome publishes exactly one event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use temuin_api_models::{Booking, BookingInput, PaymentIntentRequest, PaymentResult};
use temuin_events::{Event, EventBus};

use crate::cache::QueryCache;
use crate::catalog::keys;
use crate::config::PaymentPolicy;
use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;

/// Marker appended to the confirmation secret to force a decline.
pub const FORCED_FAILURE_MARKER: &str = "_fail";
/// Customer name used when the caller leaves it blank.
pub const DEFAULT_CUSTOMER_NAME: &str = "Demo User";
const DEFAULT_DECLINE_MESSAGE: &str = "Payment failed";

/// Caller input for one booking attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingRequest {
    /// Selected provider; required.
    pub provider_id: Option<String>,
    /// Name recorded on the booking.
    pub customer_name: String,
    /// Selected slot, if any.
    pub slot: Option<DateTime<Utc>>,
    /// Corrupt the confirmation secret so the payment is declined.
    pub force_payment_failure: bool,
}

/// Observable saga state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BookingState {
    /// Whether a saga is running; re-submission is refused while set.
    pub in_progress: bool,
    /// Inline error from the last attempt.
    pub error: Option<String>,
}

/// Terminal result of a saga that reached the payment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    /// Booking created and paid.
    Confirmed {
        /// Created booking.
        booking: Booking,
        /// Gateway transaction, when reported.
        transaction_id: Option<String>,
    },
    /// Booking created but the payment was declined.
    PaymentDeclined {
        /// Created booking, left in place.
        booking: Booking,
        /// Decline message shown to the user.
        message: String,
    },
}

/// Runs the booking saga.
#[derive(Clone)]
pub struct BookingOrchestrator {
    api: ApiClient,
    cache: QueryCache,
    events: EventBus,
    payment: PaymentPolicy,
    state: Arc<watch::Sender<BookingState>>,
}

struct InProgress<'a> {
    state: &'a watch::Sender<BookingState>,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.in_progress = false);
    }
}

impl BookingOrchestrator {
    /// Orchestrator charging according to `payment`.
    #[must_use]
    pub fn new(api: ApiClient, cache: QueryCache, events: EventBus, payment: PaymentPolicy) -> Self {
        let (state, _) = watch::channel(BookingState::default());
        Self {
            api,
            cache,
            events,
            payment,
            state: Arc::new(state),
        }
    }

    /// Current saga state.
    #[must_use]
    pub fn state(&self) -> BookingState {
        self.state.borrow().clone()
    }

    /// Watch saga state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BookingState> {
        self.state.subscribe()
    }

    fn enter(&self) -> Option<InProgress<'_>> {
        let acquired = self.state.send_if_modified(|state| {
            if state.in_progress {
                false
            } else {
                state.in_progress = true;
                state.error = None;
                true
            }
        });
        acquired.then_some(InProgress { state: &self.state })
    }

    /// Run the saga for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Busy`] while another saga runs,
    /// [`ClientError::Validation`] without any network call when no provider
    /// is selected, and
    /// the failing step's error for transport or unexpected status failures.
    /// A declined payment is not an error.
    #[instrument(name = "booking.confirm", skip(self, request), fields(provider = ?request.provider_id))]
    pub async fn confirm(&self, request: BookingRequest) -> ClientResult<BookingOutcome> {
        // A busy orchestrator leaves the running saga's state alone.
        let Some(_guard) = self.enter() else {
            return Err(ClientError::Busy {
                operation: "booking",
            });
        };

        let Some(provider_id) = request.provider_id.clone().filter(|id| !id.trim().is_empty())
        else {
            let err = ClientError::validation("Select a provider before booking");
            self.state
                .send_modify(|state| state.error = Some(err.user_message()));
            self.events.publish(Event::BookingRejected {
                message: err.user_message(),
            });
            return Err(err);
        };

        match self.run_steps(provider_id, &request).await {
            Ok(outcome) => {
                self.report(&outcome);
                Ok(outcome)
            }
            Err(err) => {
                warn!(error = %err, detail = %err.user_message(), "booking workflow failed");
                let message = err.user_message();
                self.state
                    .send_modify(|state| state.error = Some(message.clone()));
                self.events.publish(Event::BookingFailed { message });
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        provider_id: String,
        request: &BookingRequest,
    ) -> ClientResult<BookingOutcome> {
        let customer_name = if request.customer_name.trim().is_empty() {
            DEFAULT_CUSTOMER_NAME.to_string()
        } else {
            request.customer_name.clone()
        };
        let booking = self
            .api
            .create_booking(&BookingInput {
                provider_id,
                customer_name,
                slot: request.slot,
            })
            .await?;

        let intent = self
            .api
            .create_payment_intent(&PaymentIntentRequest {
                amount: self.payment.amount,
                currency: self.payment.currency.clone(),
            })
            .await?;

        let secret = confirmation_secret(&intent.client_secret, request.force_payment_failure);
        let result = self.api.confirm_payment(&secret).await?;
        Ok(classify(booking, result))
    }

    fn report(&self, outcome: &BookingOutcome) {
        match outcome {
            BookingOutcome::Confirmed {
                booking,
                transaction_id,
            } => {
                info!(booking = %booking.id, tx = ?transaction_id, "booking confirmed");
                self.cache.invalidate(&keys::providers());
                self.cache.invalidate(&keys::availability_family());
                self.events.publish(Event::BookingConfirmed {
                    booking_id: booking.id.clone(),
                    transaction_id: transaction_id.clone(),
                });
            }
            BookingOutcome::PaymentDeclined { booking, message } => {
                info!(booking = %booking.id, %message, "payment declined");
                self.state
                    .send_modify(|state| state.error = Some(message.clone()));
                self.events.publish(Event::PaymentFailed {
                    booking_id: booking.id.clone(),
                    message: message.clone(),
                });
            }
        }
    }
}

impl std::fmt::Debug for BookingOrchestrator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("BookingOrchestrator")
            .field("payment", &self.payment)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

/// Secret sent to the confirmation step.
#[must_use]
pub fn confirmation_secret(client_secret: &str, force_failure: bool) -> String {
    if force_failure {
        format!("{client_secret}{FORCED_FAILURE_MARKER}")
    } else {
        client_secret.to_string()
    }
}

fn classify(booking: Booking, result: PaymentResult) -> BookingOutcome {
    if result.status.is_succeeded() {
        BookingOutcome::Confirmed {
            booking,
            transaction_id: result.transaction_id,
        }
    } else {
        BookingOutcome::PaymentDeclined {
            booking,
            message: result
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DECLINE_MESSAGE.to_string()),
        }
    }
}
