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

//! Shared test helpers used across integration suites.
//! Layout: mocks.rs (scripted in-process backend), fixtures.rs (canned booking API).

pub mod fixtures;
pub mod mocks;

pub use fixtures::{booking_backend, test_app};
pub use mocks::{Gate, MockBackend, MockReply, RecordedCall};
