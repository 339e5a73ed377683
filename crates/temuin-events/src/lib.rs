#![forbid(unsafe_code)]
#![deny(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
//! Notification bus for the Temuin client.
//!
//! Every terminal outcome of a user action (sign-in, booking, promotion) is
//! published here as a typed event; renderers (toasts in a UI, stderr lines in
//! the CLI) subscribe and turn them into user-visible text. The bus assigns
//! sequential identifiers and keeps a bounded replay buffer so a late
//! subscriber can catch up. Internally it uses `tokio::broadcast`; when the
//! channel overflows the oldest events are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, Receiver, Sender, error::RecvError, error::TryRecvError};

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// How a notification should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Terminal success.
    Success,
    /// Terminal failure.
    Error,
    /// Neutral information.
    Info,
}

/// Typed user-facing events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A login or registration succeeded.
    SignedIn {
        /// Email of the signed-in account.
        email: String,
    },
    /// The local session was cleared.
    SignedOut,
    /// Login or registration was rejected.
    AuthFailed {
        /// Reason reported by the backend.
        message: String,
    },
    /// A booking was refused before any network call (local validation).
    BookingRejected {
        /// Validation message.
        message: String,
    },
    /// Booking and payment both succeeded.
    BookingConfirmed {
        /// Created booking.
        booking_id: String,
        /// Gateway transaction, when reported.
        transaction_id: Option<String>,
    },
    /// The booking exists but its payment was declined.
    PaymentFailed {
        /// Booking left in place.
        booking_id: String,
        /// Decline message.
        message: String,
    },
    /// The booking workflow aborted on an unexpected failure.
    BookingFailed {
        /// Failure description.
        message: String,
    },
    /// A user was promoted to administrator.
    UserPromoted {
        /// Promoted account.
        email: String,
    },
    /// A promotion failed and the optimistic change was rolled back.
    PromotionFailed {
        /// Account whose promotion failed.
        email: String,
        /// Failure description.
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn { .. } => "signed_in",
            Self::SignedOut => "signed_out",
            Self::AuthFailed { .. } => "auth_failed",
            Self::BookingRejected { .. } => "booking_rejected",
            Self::BookingConfirmed { .. } => "booking_confirmed",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::BookingFailed { .. } => "booking_failed",
            Self::UserPromoted { .. } => "user_promoted",
            Self::PromotionFailed { .. } => "promotion_failed",
        }
    }

    /// Presentation severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::SignedIn { .. } | Self::BookingConfirmed { .. } | Self::UserPromoted { .. } => {
                Severity::Success
            }
            Self::SignedOut => Severity::Info,
            Self::AuthFailed { .. }
            | Self::BookingRejected { .. }
            | Self::PaymentFailed { .. }
            | Self::BookingFailed { .. }
            | Self::PromotionFailed { .. } => Severity::Error,
        }
    }

    /// Notification text shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::SignedIn { email } => format!("Signed in as {email}"),
            Self::SignedOut => "Signed out".to_string(),
            Self::AuthFailed { message }
            | Self::BookingRejected { message }
            | Self::PaymentFailed { message, .. }
            | Self::BookingFailed { message } => message.clone(),
            Self::BookingConfirmed {
                booking_id,
                transaction_id,
            } => format!(
                "Booking & payment successful: {booking_id} (tx: {})",
                transaction_id.as_deref().unwrap_or("-")
            ),
            Self::UserPromoted { email } => format!("Promoted {email} to admin"),
            Self::PromotionFailed { email, message } => {
                format!("Failed to promote {email}: {message}")
            }
        }
    }
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a bus with the provided capacity (clamped to at least one).
    ///
    /// The broadcast channel uses the same capacity as the replay buffer so
    /// dropped events impact both structures consistently.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, assigning it the next sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No live subscribers is fine; the replay buffer still has the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }
        let replayed_up_to = backlog.back().map(|item: &EventEnvelope| item.id);
        EventStream {
            backlog,
            receiver,
            replayed_up_to,
        }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EventBus")
            .field("last_event_id", &self.last_event_id())
            .field("subscribers", &self.sender.receiver_count())
            .finish_non_exhaustive()
    }
}

/// Stream that yields events from the replay backlog, then the live channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
    replayed_up_to: Option<EventId>,
}

impl EventStream {
    /// Receive the next event, waiting for one to be published.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) if self.is_replayed(&event) => {}
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Receive the next event if one is already available.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.is_replayed(&event) => {}
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every event that is already available.
    pub fn drain(&mut self) -> Vec<EventEnvelope> {
        std::iter::from_fn(|| self.try_next()).collect()
    }

    fn is_replayed(&self, event: &EventEnvelope) -> bool {
        self.replayed_up_to.is_some_and(|last| event.id <= last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn promoted(index: usize) -> Event {
        Event::UserPromoted {
            email: format!("user{index}@example.com"),
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(promoted(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let received = stream.drain();

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().map(|e| e.id), Some(3));
        assert_eq!(received.last().map(|e| e.id), Some(5));
        assert_eq!(bus.last_event_id(), Some(5));
    }

    #[tokio::test]
    async fn live_subscribers_receive_new_events() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);
        assert!(stream.try_next().is_none());

        bus.publish(Event::SignedOut);
        let event = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("event delivered")
            .expect("bus open");
        assert_eq!(event.event, Event::SignedOut);
    }

    #[test]
    fn replay_buffer_drops_oldest_when_full() {
        let bus = EventBus::with_capacity(2);
        for i in 0..4 {
            bus.publish(promoted(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let ids: Vec<_> = stream.drain().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn messages_match_user_facing_copy() {
        let confirmed = Event::BookingConfirmed {
            booking_id: "b_1".into(),
            transaction_id: Some("tx_9".into()),
        };
        assert_eq!(
            confirmed.message(),
            "Booking & payment successful: b_1 (tx: tx_9)"
        );
        assert_eq!(confirmed.severity(), Severity::Success);

        let failed = Event::PromotionFailed {
            email: "a@x".into(),
            message: "user not found".into(),
        };
        assert_eq!(failed.message(), "Failed to promote a@x: user not found");
        assert_eq!(failed.severity(), Severity::Error);
        assert_eq!(failed.kind(), "promotion_failed");
    }
}
