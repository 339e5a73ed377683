//! Single-flight guard: one leader runs an operation, later callers wait for it.
//!
//! # Design
//! - `join` either elects the caller as leader (nothing in flight) or enrols
//!   it as a waiter holding a oneshot receiver.
//! - The leader settles with the outcome; waiters are released in arrival
//!   order and the in-flight flag is cleared before `settle` returns.
//! - Dropping an unsettled leader clears the flag and drops every sender, so
//!   waiters observe [`WaitError::Abandoned`] instead of hanging.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

type Waiter<T, E> = oneshot::Sender<Result<T, E>>;

struct FlightState<T, E> {
    in_flight: bool,
    waiters: VecDeque<Waiter<T, E>>,
}

/// Shared guard; clones observe the same flight.
pub struct SingleFlight<T, E> {
    state: Arc<Mutex<FlightState<T, E>>>,
}

impl<T, E> Clone for SingleFlight<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(FlightState {
                in_flight: false,
                waiters: VecDeque::new(),
            })),
        }
    }
}

/// Role assigned by [`SingleFlight::join`].
pub enum Joined<T, E> {
    /// The caller must run the operation and settle it.
    Leader(FlightLeader<T, E>),
    /// Another caller is running the operation.
    Waiter(FlightWaiter<T, E>),
}

/// Why a waiter did not receive a successful outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitError<E> {
    /// The leader settled with an error.
    Failed(E),
    /// The leader was dropped before settling.
    Abandoned,
}

impl<T, E> SingleFlight<T, E> {
    /// Idle guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an operation is currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.lock().in_flight
    }

    /// Number of callers waiting on the current flight.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Become the leader, or queue behind the current one.
    #[must_use]
    pub fn join(&self) -> Joined<T, E> {
        let mut state = self.lock();
        if state.in_flight {
            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(sender);
            Joined::Waiter(FlightWaiter { receiver })
        } else {
            state.in_flight = true;
            Joined::Leader(FlightLeader {
                flight: self.clone(),
                settled: false,
            })
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FlightState<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self) -> VecDeque<Waiter<T, E>> {
        let mut state = self.lock();
        state.in_flight = false;
        std::mem::take(&mut state.waiters)
    }
}

/// Handle owned by the caller that runs the guarded operation.
pub struct FlightLeader<T, E> {
    flight: SingleFlight<T, E>,
    settled: bool,
}

impl<T: Clone, E: Clone> FlightLeader<T, E> {
    /// Clear the in-flight flag and release every waiter, oldest first.
    pub fn settle(mut self, outcome: &Result<T, E>) {
        self.settled = true;
        for waiter in self.flight.finish() {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }
    }
}

impl<T, E> Drop for FlightLeader<T, E> {
    fn drop(&mut self) {
        if !self.settled {
            drop(self.flight.finish());
        }
    }
}

/// Handle owned by a caller queued behind the leader.
pub struct FlightWaiter<T, E> {
    receiver: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> FlightWaiter<T, E> {
    /// Suspend until the leader settles.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Failed`] with the leader's error, or
    /// [`WaitError::Abandoned`] when the leader was dropped unsettled.
    pub async fn wait(self) -> Result<T, WaitError<E>> {
        match self.receiver.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(WaitError::Failed(err)),
            Err(_) => Err(WaitError::Abandoned),
        }
    }
}
