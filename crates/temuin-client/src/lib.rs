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
#![allow(clippy::module_name_repetitions)]

//! Request lifecycle and optimistic-update core for the Temuin booking client.
//!
//! Layout:
//! - `transport.rs`: request/response types and the `Transport` seam (reqwest-backed)
//! - `single_flight.rs`: leader/waiter guard used for credential refresh
//! - `http.rs`: bearer injection, 401 interception, refresh and single replay
//! - `api.rs`: typed endpoint calls
//! - `storage.rs`: key/value storage and the session token slot
//! - `session.rs`: identity store
//! - `cache.rs` / `optimistic.rs`: query cache and the optimistic mutation primitive
//! - `catalog.rs`: services, providers and last-selection-wins slot loading
//! - `booking.rs`: booking and payment saga
//! - `admin.rs`: user listing, audit log and confirmed promotions
//! - `app.rs`: composition root

pub mod admin;
pub mod api;
pub mod app;
pub mod booking;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod optimistic;
pub mod session;
pub mod single_flight;
pub mod storage;
pub mod transport;

pub use admin::{AdminConsole, ConfirmedPromotion, PromotionOutcome, PromotionPrompt};
pub use app::TemuinApp;
pub use booking::{BookingOrchestrator, BookingOutcome, BookingRequest, BookingState};
pub use cache::{QueryCache, QueryKey};
pub use catalog::{Catalog, SlotLoad, SlotLoader, SlotSelection, SlotView};
pub use config::{ClientConfig, PaymentPolicy};
pub use error::{ClientError, ClientResult};
pub use http::ApiClient;
pub use optimistic::OptimisticMutation;
pub use session::{SessionState, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, TokenStore};
pub use transport::{ApiRequest, ApiResponse, Method, ReqwestTransport, Transport};
