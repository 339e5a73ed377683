//! Canned booking API mirroring the demo backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{Value, json};

use temuin_client::{ClientConfig, MemoryStore, Method, TemuinApp};

use crate::mocks::{MockBackend, MockReply};

/// Account accepted by the login route.
pub const DEMO_EMAIL: &str = "demo@user.test";
/// Password accepted by the login route.
pub const DEMO_PASSWORD: &str = "password";
/// Token issued by login and registration.
pub const LOGIN_TOKEN: &str = "mock-jwt-token";
/// Token issued by the refresh route.
pub const REFRESHED_TOKEN: &str = "refreshed-token";
/// Client secret issued with every payment intent.
pub const CLIENT_SECRET: &str = "cs_fixture";

/// Slot hours offered on every date.
pub const SLOT_HOURS: [u32; 3] = [9, 10, 14];

/// Backend answering every booking API route with demo data.
#[must_use]
pub fn booking_backend() -> MockBackend {
    let backend = MockBackend::new();
    let sequence = Arc::new(AtomicU64::new(0));

    backend.on(Method::Get, "/health", |_| MockReply::ok(json!({ "status": "ok" })));
    backend.on(Method::Get, "/providers", |_| {
        MockReply::ok(json!([
            { "id": "p1", "name": "Provider A", "available": true },
            { "id": "p2", "name": "Provider B", "available": false }
        ]))
    });
    backend.on(Method::Get, "/services", |_| {
        MockReply::ok(json!([
            { "id": "s1", "name": "Haircut", "durationMinutes": 30, "price": 15000 },
            { "id": "s2", "name": "Massage", "durationMinutes": 60, "price": 75000 }
        ]))
    });
    backend.on(Method::Get, "/availability", |request| {
        let param = |key: &str| {
            request
                .query()
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.clone())
        };
        let provider = param("providerId").unwrap_or_default();
        let Some(date) = param("date").and_then(|raw| raw.parse::<NaiveDate>().ok()) else {
            return MockReply::error(400, "date is required");
        };
        MockReply::ok(availability(&provider, date))
    });

    let bookings = Arc::clone(&sequence);
    backend.on(Method::Post, "/bookings", move |request| {
        let body = request.body().cloned().unwrap_or(Value::Null);
        let id = bookings.fetch_add(1, Ordering::SeqCst) + 1;
        MockReply::json(
            201,
            json!({
                "id": format!("b_{id}"),
                "providerId": body["providerId"],
                "customerName": body["customerName"].as_str().unwrap_or("Guest"),
                "slot": body["slot"],
                "status": "confirmed"
            }),
        )
    });

    let intents = Arc::clone(&sequence);
    backend.on(Method::Post, "/payments/create-intent", move |request| {
        let body = request.body().cloned().unwrap_or(Value::Null);
        let id = intents.fetch_add(1, Ordering::SeqCst) + 1;
        MockReply::json(
            201,
            json!({
                "id": format!("pi_{id}"),
                "amount": body["amount"].as_u64().unwrap_or(0),
                "currency": body["currency"].as_str().unwrap_or("IDR"),
                "client_secret": CLIENT_SECRET
            }),
        )
    });
    backend.on(Method::Post, "/payments/confirm", |request| {
        let secret = request
            .body()
            .and_then(|body| body["client_secret"].as_str())
            .unwrap_or_default();
        if secret.contains("fail") {
            MockReply::json(402, json!({ "status": "failed", "message": "Payment failed" }))
        } else {
            MockReply::ok(json!({ "status": "succeeded", "transactionId": "tx_fixture" }))
        }
    });

    backend.on(Method::Post, "/api/auth/login", |request| {
        let body = request.body().cloned().unwrap_or(Value::Null);
        if body["email"] == DEMO_EMAIL && body["password"] == DEMO_PASSWORD {
            MockReply::ok(json!({
                "token": LOGIN_TOKEN,
                "user": { "id": 1, "email": DEMO_EMAIL, "role": "user" }
            }))
        } else {
            MockReply::error(401, "Invalid credentials")
        }
    });
    backend.on(Method::Post, "/api/auth/register", |request| {
        let body = request.body().cloned().unwrap_or(Value::Null);
        MockReply::ok(json!({
            "token": LOGIN_TOKEN,
            "user": { "id": 2, "email": body["email"], "role": "user" }
        }))
    });
    backend.on(Method::Post, "/api/auth/refresh", |_| {
        MockReply::ok(json!({ "token": REFRESHED_TOKEN }))
    });
    backend.on(Method::Post, "/api/auth/logout", |_| {
        MockReply::ok(json!({ "status": "logged_out" }))
    });
    backend.on(Method::Get, "/api/me", |request| {
        if request.bearer().is_some() {
            MockReply::ok(json!({ "user": { "id": 1, "email": DEMO_EMAIL, "role": "user" } }))
        } else {
            MockReply::json(401, json!({ "error": "missing token" }))
        }
    });

    backend.on(Method::Get, "/api/admin/users", |_| MockReply::ok(users()));
    backend.on(Method::Get, "/api/admin/audit", |_| {
        MockReply::ok(json!({ "audit": [] }))
    });
    backend.on(Method::Post, "/api/admin/promote", |_| {
        MockReply::ok(json!({ "status": "promoted" }))
    });

    backend
}

/// Availability document for `provider` on `date`.
#[must_use]
pub fn availability(provider: &str, date: NaiveDate) -> Value {
    let slots: Vec<String> = SLOT_HOURS
        .iter()
        .filter_map(|hour| date.and_hms_opt(*hour, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive).to_rfc3339())
        .collect();
    json!({
        "providerId": provider,
        "date": date.format("%Y-%m-%d").to_string(),
        "slots": slots
    })
}

/// Admin listing with two regular users and one administrator.
#[must_use]
pub fn users() -> Value {
    json!({
        "users": [
            { "id": 1, "email": "a@x", "name": "Alice", "role": "user" },
            { "id": 2, "email": "b@x", "name": "Bob", "role": "user" },
            { "id": 3, "email": "root@x", "name": "Root", "role": "admin" }
        ]
    })
}

/// Application wired to `backend` with in-memory storage.
///
/// # Panics
///
/// Never in practice; the fixture base URL is a valid constant.
#[must_use]
pub fn test_app(backend: &MockBackend) -> TemuinApp {
    let config = ClientConfig::for_url("http://backend.test").unwrap_or_else(|err| {
        panic!("fixture URL must parse: {err}");
    });
    TemuinApp::with_transport(
        config,
        Arc::new(backend.clone()),
        Arc::new(MemoryStore::new()),
    )
}
