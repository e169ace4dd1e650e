//! Consent access sessions.
//!
//! A [Session] is created by the digi.me API for one pull and authenticates the
//! handoff and every download of that pull. The [SessionManager] holds at most
//! one session; creating a new one replaces the previous.
use std::sync::Arc;

use time::{Duration, OffsetDateTime};

use crate::error::Error;
use crate::state::{OperationState, StateMachine};
use crate::transport::{ApiClient, ApiError, HttpClient, SessionResponse};

pub const APP_ID_LENGTH: (usize, usize) = (5, 16);
pub const CONTRACT_ID_LENGTH: (usize, usize) = (1, 64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    key: String,
    created_at: OffsetDateTime,
    expiry: Duration,
}

impl Session {
    pub fn new(key: String, created_at: OffsetDateTime, expiry: Duration) -> Self {
        Self {
            key,
            created_at,
            expiry,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.created_at + self.expiry
    }

    /// A session is usable strictly before `created_at + expiry`.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_at()
    }
}

pub struct SessionManager<C> {
    api: Arc<ApiClient<C>>,
    current: Option<Session>,
}

impl<C: HttpClient> SessionManager<C> {
    pub fn new(api: Arc<ApiClient<C>>) -> Self {
        Self { api, current: None }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn invalidate(&mut self) {
        if let Some(session) = self.current.take() {
            tracing::debug!(expires_at = %session.expires_at(), "session invalidated");
        }
    }

    /// Request a new session from the digi.me API.
    ///
    /// Arguments are checked before anything is sent. Any previous session is
    /// invalidated first, whatever the outcome. On success the state machine is
    /// at [OperationState::SessionKeyReceived].
    pub async fn create_session(
        &mut self,
        state: &mut StateMachine,
        app_id: &str,
        contract_id: &str,
    ) -> Result<&Session, Error> {
        validate_arguments(app_id, contract_id)?;
        self.invalidate();
        state.transition(OperationState::RequestingSessionKey)?;

        let response = self
            .api
            .create_session(app_id, contract_id)
            .await
            .map_err(map_create_error)?;
        let session = session_from_response(response, OffsetDateTime::now_utc())?;

        state.transition(OperationState::SessionKeyReceived)?;
        Ok(self.current.insert(session))
    }

    /// True iff `session_key` is the current session's key and it has not expired.
    pub fn is_valid(&self, session_key: &str) -> bool {
        self.is_valid_at(session_key, OffsetDateTime::now_utc())
    }

    pub fn is_valid_at(&self, session_key: &str, now: OffsetDateTime) -> bool {
        self.current
            .as_ref()
            .map(|s| s.key == session_key && s.is_live_at(now))
            .unwrap_or(false)
    }
}

pub fn validate_arguments(app_id: &str, contract_id: &str) -> Result<(), Error> {
    check_length("app id", app_id, APP_ID_LENGTH)?;
    check_length("contract id", contract_id, CONTRACT_ID_LENGTH)
}

fn check_length(name: &str, value: &str, (min, max): (usize, usize)) -> Result<(), Error> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::InvalidArgument(format!(
            "{name} must be between {min} and {max} characters long, got {len}"
        )));
    }
    Ok(())
}

fn map_create_error(error: ApiError) -> Error {
    match error {
        ApiError::Status(403) => Error::AppIdRevoked,
        ApiError::Status(410) => Error::ContractExpired,
        ApiError::Body(_) => Error::SessionCreateBadResponse,
        e => Error::SessionCreateUnknown(e.to_string()),
    }
}

fn session_from_response(response: SessionResponse, now: OffsetDateTime) -> Result<Session, Error> {
    let key = match response.session_key {
        Some(key) if !key.trim().is_empty() => key,
        _ => return Err(Error::SessionKeyNotReceived),
    };
    // Bounded to keep `created_at + expiry` representable.
    if !response.expiry.is_finite() || response.expiry < 0.0 || response.expiry > 1e9 {
        return Err(Error::SessionCreateBadResponse);
    }
    Ok(Session::new(
        key,
        now,
        Duration::seconds_f64(response.expiry),
    ))
}
