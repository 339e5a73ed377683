//! Typed endpoint calls on top of [`ApiClient`].

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tracing::debug;

use temuin_api_models::{
    AuditResponse, AuthResponse, Availability, Booking, BookingInput, ConfirmPaymentRequest,
    LoginRequest, MeResponse, PaymentIntent, PaymentIntentRequest, PaymentResult,
    PromoteRequest, Provider, RegisterRequest, Service, StatusAck, UsersResponse,
};

use crate::error::{ClientError, ClientResult};
use crate::http::ApiClient;
use crate::transport::ApiRequest;

/// Endpoint paths relative to the API base URL.
pub mod paths {
    /// Liveness probe.
    pub const HEALTH: &str = "/health";
    /// Provider catalogue.
    pub const PROVIDERS: &str = "/providers";
    /// Service catalogue.
    pub const SERVICES: &str = "/services";
    /// Slots for a provider on a date.
    pub const AVAILABILITY: &str = "/availability";
    /// Booking creation.
    pub const BOOKINGS: &str = "/bookings";
    /// Payment intent creation.
    pub const PAYMENT_INTENT: &str = "/payments/create-intent";
    /// Payment confirmation.
    pub const PAYMENT_CONFIRM: &str = "/payments/confirm";
    /// Credential login.
    pub const AUTH_LOGIN: &str = "/api/auth/login";
    /// Account registration.
    pub const AUTH_REGISTER: &str = "/api/auth/register";
    /// Bearer token refresh (cookie-authenticated).
    pub const AUTH_REFRESH: &str = "/api/auth/refresh";
    /// Session teardown.
    pub const AUTH_LOGOUT: &str = "/api/auth/logout";
    /// Who-am-i.
    pub const ME: &str = "/api/me";
    /// Admin user listing.
    pub const ADMIN_USERS: &str = "/api/admin/users";
    /// Admin audit log.
    pub const ADMIN_AUDIT: &str = "/api/admin/audit";
    /// Admin role promotion.
    pub const ADMIN_PROMOTE: &str = "/api/admin/promote";
}

const PAYMENT_REQUIRED: u16 = 402;

impl ApiClient {
    async fn fetch_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        context: &str,
    ) -> ClientResult<T> {
        self.send(request).await?.json(context)
    }

    /// `GET /health`.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn health(&self) -> ClientResult<StatusAck> {
        self.fetch_json(ApiRequest::get(paths::HEALTH), "health response")
            .await
    }

    /// List providers.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn list_providers(&self) -> ClientResult<Vec<Provider>> {
        self.fetch_json(ApiRequest::get(paths::PROVIDERS), "provider list")
            .await
    }

    /// List services.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn list_services(&self) -> ClientResult<Vec<Service>> {
        self.fetch_json(ApiRequest::get(paths::SERVICES), "service list")
            .await
    }

    /// Open slots for `provider_id` on `date`.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn availability(
        &self,
        provider_id: &str,
        date: NaiveDate,
    ) -> ClientResult<Availability> {
        let request = ApiRequest::get(paths::AVAILABILITY)
            .with_query("providerId", provider_id)
            .with_query("date", date.format("%Y-%m-%d").to_string());
        self.fetch_json(request, "availability").await
    }

    /// Create a booking.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn create_booking(&self, input: &BookingInput) -> ClientResult<Booking> {
        let request = ApiRequest::post(paths::BOOKINGS).with_json(input)?;
        self.fetch_json(request, "booking").await
    }

    /// Create a payment intent.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn create_payment_intent(
        &self,
        input: &PaymentIntentRequest,
    ) -> ClientResult<PaymentIntent> {
        let request = ApiRequest::post(paths::PAYMENT_INTENT).with_json(input)?;
        self.fetch_json(request, "payment intent").await
    }

    /// Confirm a payment intent.
    ///
    /// A `402` carrying a payment result document is a declined payment, not a
    /// transport failure, and is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode errors, and status errors other than a
    /// well-formed decline.
    pub async fn confirm_payment(&self, client_secret: &str) -> ClientResult<PaymentResult> {
        let request = ApiRequest::post(paths::PAYMENT_CONFIRM).with_json(&ConfirmPaymentRequest {
            client_secret: client_secret.to_string(),
        })?;
        match self.send(request).await {
            Ok(response) => response.json("payment result"),
            Err(ClientError::Status {
                status: PAYMENT_REQUIRED,
                body: Some(body),
                message,
            }) => serde_json::from_value::<PaymentResult>(body.clone()).map_err(|_| {
                ClientError::Status {
                    status: PAYMENT_REQUIRED,
                    message,
                    body: Some(body),
                }
            }),
            Err(err) => Err(err),
        }
    }

    /// Exchange credentials for a session. Never intercepted for refresh.
    ///
    /// # Errors
    ///
    /// Returns the backend's 401 for bad credentials.
    pub async fn login(&self, input: &LoginRequest) -> ClientResult<AuthResponse> {
        let request = ApiRequest::post(paths::AUTH_LOGIN)
            .without_refresh()
            .with_json(input)?;
        self.fetch_json(request, "login response").await
    }

    /// Create an account and a session. Never intercepted for refresh.
    ///
    /// # Errors
    ///
    /// Returns the backend's error for rejected registrations.
    pub async fn register(&self, input: &RegisterRequest) -> ClientResult<AuthResponse> {
        let request = ApiRequest::post(paths::AUTH_REGISTER)
            .without_refresh()
            .with_json(input)?;
        self.fetch_json(request, "registration response").await
    }

    /// Revoke the server side of the session.
    ///
    /// # Errors
    ///
    /// Propagates transport and status errors.
    pub async fn logout(&self) -> ClientResult<()> {
        let request = ApiRequest::post(paths::AUTH_LOGOUT).without_refresh();
        let response = self.send(request).await?;
        debug!(status = response.status, "logout acknowledged");
        Ok(())
    }

    /// Who-am-i.
    ///
    /// # Errors
    ///
    /// Returns a 401 status error when no session exists.
    pub async fn me(&self) -> ClientResult<MeResponse> {
        self.fetch_json(ApiRequest::get(paths::ME), "identity").await
    }

    /// Admin user listing.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn admin_users(&self) -> ClientResult<UsersResponse> {
        self.fetch_json(ApiRequest::get(paths::ADMIN_USERS), "user list")
            .await
    }

    /// Admin audit log.
    ///
    /// # Errors
    ///
    /// Propagates transport, status and decode errors.
    pub async fn admin_audit(&self) -> ClientResult<AuditResponse> {
        self.fetch_json(ApiRequest::get(paths::ADMIN_AUDIT), "audit log")
            .await
    }

    /// Promote `email` to administrator.
    ///
    /// # Errors
    ///
    /// Propagates transport and status errors.
    pub async fn admin_promote(&self, email: &str) -> ClientResult<()> {
        let request = ApiRequest::post(paths::ADMIN_PROMOTE).with_json(&PromoteRequest {
            email: email.to_string(),
        })?;
        self.send(request).await?;
        Ok(())
    }
}
