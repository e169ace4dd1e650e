//! Inter-app handoff with the digi.me app.
//!
//! The consent request leaves the host app as a link on the digi.me app's
//! scheme:
//!
//! ```text
//! digime-ca-master://data?appId=..&contractId=..&sessionKey=..&callbackScheme=digime-ca-<app id>
//! ```
//!
//! and the answer comes back on the callback scheme:
//!
//! ```text
//! digime-ca-<app id>://data?result=DATA_READY&sessionKey=..[&payload=..]
//! ```
//!
//! Opening links is platform specific and provided by the host through [AppLauncher].
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::session::{Session, SessionManager};
use crate::state::{OperationState, StateMachine};
use crate::transport::HttpClient;

const HANDOFF_HOST: &str = "data";

pub const PARAM_APP_ID: &str = "appId";
pub const PARAM_CONTRACT_ID: &str = "contractId";
pub const PARAM_SESSION_KEY: &str = "sessionKey";
pub const PARAM_CALLBACK_SCHEME: &str = "callbackScheme";
pub const PARAM_RESULT: &str = "result";
pub const PARAM_PAYLOAD: &str = "payload";

/// Opens links in other applications.
pub trait AppLauncher: Send + Sync {
    /// Hand `url` to the application registered for its scheme.
    ///
    /// Returns `false` if no installed application can open it.
    fn open(&self, url: &Url) -> bool;
}

/// Outcome reported by the digi.me app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandoffResult {
    DataReady,
    Cancelled,
    Failed,
}

impl HandoffResult {
    pub fn as_str(self) -> &'static str {
        match self {
            HandoffResult::DataReady => "DATA_READY",
            HandoffResult::Cancelled => "CANCELLED",
            HandoffResult::Failed => "FAILED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "DATA_READY" => Some(HandoffResult::DataReady),
            "CANCELLED" => Some(HandoffResult::Cancelled),
            "FAILED" => Some(HandoffResult::Failed),
            _ => None,
        }
    }
}

/// Consent request sent to the digi.me app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub app_id: String,
    pub contract_id: String,
    pub session_key: String,
    pub callback_scheme: String,
}

impl HandoffRequest {
    pub fn to_url(&self, sender_scheme: &str) -> Result<Url, Error> {
        Url::parse_with_params(
            &format!("{sender_scheme}://{HANDOFF_HOST}"),
            [
                (PARAM_APP_ID, self.app_id.as_str()),
                (PARAM_CONTRACT_ID, self.contract_id.as_str()),
                (PARAM_SESSION_KEY, self.session_key.as_str()),
                (PARAM_CALLBACK_SCHEME, self.callback_scheme.as_str()),
            ],
        )
        .map_err(|_| Error::HandoffUnknown)
    }
}

/// Answer received from the digi.me app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffResponse {
    pub scheme: String,
    pub result: HandoffResult,
    pub session_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl HandoffResponse {
    /// Parse an inbound link.
    ///
    /// Links whose scheme does not start with `receiver_prefix` fail with
    /// [Error::SchemeMismatch]: they belong to some other handoff of the host.
    pub fn parse(link: &str, receiver_prefix: &str) -> Result<Self, Error> {
        let link = link.trim();
        let scheme = link.split(':').next().unwrap_or_default();
        if !scheme
            .to_ascii_lowercase()
            .starts_with(&receiver_prefix.to_ascii_lowercase())
        {
            return Err(Error::SchemeMismatch);
        }
        let url = Url::parse(link).map_err(|_| Error::HandoffDataIsNull)?;

        let (mut result, mut session_key, mut payload) = (None, None, None);
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                PARAM_RESULT => result = Some(value.into_owned()),
                PARAM_SESSION_KEY => session_key = Some(value.into_owned()),
                PARAM_PAYLOAD => payload = Some(value.into_owned()),
                _ => {}
            }
        }

        let result = result.ok_or(Error::HandoffDataIsNull)?;
        let result = HandoffResult::parse(&result).ok_or(Error::HandoffUnknown)?;
        let session_key = session_key
            .filter(|k| !k.is_empty())
            .ok_or(Error::HandoffDataIsNull)?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            result,
            session_key,
            payload,
        })
    }
}

/// Sends the consent request and validates the answer against the current session.
pub struct HandoffCoordinator {
    launcher: Arc<dyn AppLauncher>,
    receiver_prefix: String,
    sender_scheme: String,
    timeout: Option<time::Duration>,
    sent_at: Option<OffsetDateTime>,
}

impl HandoffCoordinator {
    pub fn new(config: &Config, launcher: Arc<dyn AppLauncher>) -> Self {
        Self {
            launcher,
            receiver_prefix: config.receiver_scheme_prefix.clone(),
            sender_scheme: config.sender_scheme.clone(),
            timeout: config
                .handoff_timeout()
                .and_then(|d| time::Duration::try_from(d).ok()),
            sent_at: None,
        }
    }

    /// Whether a consent request is waiting for its answer.
    pub fn is_pending(&self) -> bool {
        self.sent_at.is_some()
    }

    pub fn clear(&mut self) {
        self.sent_at = None;
    }

    /// Whether the pending request has waited longer than the configured timeout.
    pub fn is_timed_out(&self, now: OffsetDateTime) -> bool {
        match (self.sent_at, self.timeout) {
            (Some(sent_at), Some(timeout)) => sent_at
                .checked_add(timeout)
                .map_or(false, |deadline| now >= deadline),
            _ => false,
        }
    }

    /// Open the consent request in the digi.me app.
    ///
    /// Moves the state machine to [OperationState::PermissionRequestSent].
    pub fn send(
        &mut self,
        state: &mut StateMachine,
        app_id: &str,
        contract_id: &str,
        session: &Session,
    ) -> Result<Url, Error> {
        let request = HandoffRequest {
            app_id: app_id.to_string(),
            contract_id: contract_id.to_string(),
            session_key: session.key().to_string(),
            callback_scheme: format!("{}{}", self.receiver_prefix, app_id),
        };
        let url = request.to_url(&self.sender_scheme)?;
        if !self.launcher.open(&url) {
            return Err(Error::AppNotAvailable);
        }
        state.transition(OperationState::PermissionRequestSent)?;
        self.sent_at = Some(OffsetDateTime::now_utc());
        Ok(url)
    }

    /// Validate an inbound link against the pending request.
    ///
    /// On success the state machine is at [OperationState::PermissionGranted].
    /// A user rejection moves it to [OperationState::PermissionCancelled] and
    /// returns [Error::RejectedByUser]. The pending request is consumed unless
    /// the link fails with [Error::SchemeMismatch].
    pub fn receive<C: HttpClient>(
        &mut self,
        state: &mut StateMachine,
        sessions: &SessionManager<C>,
        link: &str,
        now: OffsetDateTime,
    ) -> Result<HandoffResponse, Error> {
        let response = HandoffResponse::parse(link, &self.receiver_prefix)?;
        if !self.is_pending() {
            tracing::warn!("received a handoff response with no request pending");
            return Err(Error::SessionKeyMismatch);
        }
        let timed_out = self.is_timed_out(now);
        self.clear();

        if sessions.current().map(Session::key) != Some(response.session_key.as_str()) {
            return Err(Error::SessionKeyMismatch);
        }
        if timed_out || !sessions.is_valid_at(&response.session_key, now) {
            return Err(Error::HandoffTimedOut);
        }

        match response.result {
            HandoffResult::DataReady => {
                state.transition(OperationState::PermissionGranted)?;
                Ok(response)
            }
            HandoffResult::Cancelled => {
                state.transition(OperationState::PermissionCancelled)?;
                Err(Error::RejectedByUser)
            }
            HandoffResult::Failed => Err(Error::HandoffResultFailed),
        }
    }
}
