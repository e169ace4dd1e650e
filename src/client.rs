//! Caller facing entry point of a consent access pull.
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::Instrument;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{Config, ConfigError};
use crate::crypto::{self, CryptoProvider};
use crate::error::Error;
use crate::handoff::{AppLauncher, HandoffCoordinator};
use crate::observer::{Observer, Observers};
use crate::pipeline::DownloadPipeline;
use crate::session::{self, SessionManager};
use crate::state::{OperationState, StateMachine};
use crate::store::SecretStore;
use crate::transport::{ApiClient, HttpClient};

/// Wires the session, handoff and download steps of a pull together.
///
/// A pull is driven by two calls from the host:
///
/// 1. [ConsentAccess::initiate_data_request] creates a session and opens the
///    consent request in the digi.me app.
/// 2. [ConsentAccess::open_url] receives the link the digi.me app opens on the
///    way back, then downloads and decrypts the released files.
///
/// Results reach subscribed [Observer]s. Every pull that starts ends with
/// exactly one [Observer::on_result] call.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use digime_consent::*;
/// # struct Launcher;
/// # impl AppLauncher for Launcher { fn open(&self, _: &url::Url) -> bool { true } }
/// # struct Printer;
/// # impl Observer for Printer { fn on_result(&self, _: &Result<DataSet, Error>) {} }
/// # async fn run(key_hex: &str, inbound_link: &str) -> anyhow::Result<()> {
/// let mut access = ConsentAccess::new(
///     Config::default(),
///     ReqwestClient::from_config(&Config::default())?,
///     Arc::new(HybridCipher),
///     Arc::new(MemorySecretStore::new()),
///     Arc::new(Launcher),
/// )?;
/// access.subscribe(Arc::new(Printer));
/// access.initiate_data_request("myappid", "contract", key_hex).await?;
/// // ...later, when the platform hands the app its callback link:
/// access.open_url(inbound_link).await?;
/// # Ok(())
/// # }
/// ```
pub struct ConsentAccess<C> {
    config: Config,
    store: Arc<dyn SecretStore>,
    sessions: SessionManager<C>,
    handoff: HandoffCoordinator,
    pipeline: DownloadPipeline<C>,
    state: StateMachine,
    observers: Observers,
    pull_id: Option<Uuid>,
}

impl<C: HttpClient> ConsentAccess<C> {
    pub fn new(
        config: Config,
        http: C,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn SecretStore>,
        launcher: Arc<dyn AppLauncher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let observers = Observers::default();
        let api = Arc::new(ApiClient::new(http, config.base_url.clone()));
        let pipeline = DownloadPipeline::new(
            api.clone(),
            crypto,
            store.clone(),
            config.key_identifier.clone(),
            config.download_concurrency,
            observers.clone(),
        );
        Ok(Self {
            sessions: SessionManager::new(api),
            handoff: HandoffCoordinator::new(&config, launcher),
            pipeline,
            state: StateMachine::new(observers.clone()),
            store,
            observers,
            pull_id: None,
            config,
        })
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer>) {
        self.observers.push(observer)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> OperationState {
        self.state.current()
    }

    pub fn session_key_is_valid(&self, session_key: &str) -> bool {
        self.sessions.is_valid(session_key)
    }

    /// Start a pull.
    ///
    /// `private_key` is the caller's RSA private key, as a hex dump of its DER
    /// encoding or as PEM. It is kept in the [SecretStore] for the download.
    /// A pull still waiting for the digi.me app is superseded and reported as
    /// [Error::UserCancelled]. On success the consent request is open in the
    /// digi.me app and the pull waits for [ConsentAccess::open_url].
    pub async fn initiate_data_request(
        &mut self,
        app_id: &str,
        contract_id: &str,
        private_key: &str,
    ) -> Result<(), Error> {
        if self.handoff.is_pending() {
            tracing::info!("superseding the pending pull");
            self.fail(Error::UserCancelled);
        }
        let pull_id = Uuid::new_v4();
        self.pull_id = Some(pull_id);
        let span = tracing::info_span!("pull", id = %pull_id);
        let started = self
            .start(app_id, contract_id, private_key)
            .instrument(span)
            .await;
        if let Err(e) = &started {
            self.fail(e.clone());
        }
        started
    }

    async fn start(
        &mut self,
        app_id: &str,
        contract_id: &str,
        private_key: &str,
    ) -> Result<(), Error> {
        self.handoff.clear();
        self.sessions.invalidate();
        self.state.reset();
        self.state.transition(OperationState::FrameworkInit)?;
        session::validate_arguments(app_id, contract_id)?;

        let der = Zeroizing::new(crypto::private_key_der_from_text(private_key).map_err(|e| {
            tracing::warn!("rejected private key: {e}");
            Error::RsaPrivateKeyInvalid
        })?);
        self.store
            .store(&self.config.key_identifier, &der)
            .map_err(|e| {
                tracing::warn!("could not store private key: {e}");
                Error::RsaPrivateKeyInvalid
            })?;

        self.observers.log("requesting session key");
        let session = self
            .sessions
            .create_session(&mut self.state, app_id, contract_id)
            .await?
            .clone();
        self.observers
            .log(format!("session key received, valid until {}", session.expires_at()));

        self.handoff
            .send(&mut self.state, app_id, contract_id, &session)?;
        self.observers.log("consent request sent to the digi.me app");
        Ok(())
    }

    /// Hand an inbound link to the pull.
    ///
    /// Returns `Ok(false)` for links on other schemes; they are left to the
    /// host. Otherwise the link concludes the pending consent request: when
    /// access was granted the files are downloaded before this returns, and
    /// the outcome is reported through [Observer::on_result].
    pub async fn open_url(&mut self, url: &str) -> Result<bool, Error> {
        self.open_url_at(url, OffsetDateTime::now_utc()).await
    }

    /// [ConsentAccess::open_url] with the handoff timeout and session expiry
    /// judged at `now`.
    pub async fn open_url_at(&mut self, url: &str, now: OffsetDateTime) -> Result<bool, Error> {
        let span = match self.pull_id {
            Some(id) => tracing::info_span!("pull", id = %id),
            None => tracing::info_span!("pull"),
        };
        self.complete(url, now).instrument(span).await
    }

    async fn complete(&mut self, url: &str, now: OffsetDateTime) -> Result<bool, Error> {
        let was_pending = self.handoff.is_pending();
        let response = match self.handoff.receive(
            &mut self.state,
            &self.sessions,
            url,
            now,
        ) {
            Ok(response) => response,
            Err(Error::SchemeMismatch) => {
                tracing::debug!("ignoring link on a foreign scheme");
                return Ok(false);
            }
            Err(e) => {
                if was_pending {
                    self.fail(e.clone());
                }
                return Err(e);
            }
        };
        self.observers.log("access granted, downloading files");

        let result = self
            .pipeline
            .fetch_data(&mut self.state, &response.session_key)
            .await;
        self.sessions.invalidate();
        self.pull_id = None;
        if let Ok(data) = &result {
            self.observers
                .log(format!("{} files downloaded and decrypted", data.len()));
        }
        self.observers.result(&result);
        result.map(|_| true)
    }

    /// Cancel a pull that is waiting for the digi.me app.
    ///
    /// Reports [Error::UserCancelled] and returns `true` if there was one.
    pub fn abort(&mut self) -> bool {
        if !self.handoff.is_pending() {
            return false;
        }
        self.fail(Error::UserCancelled);
        self.state.reset();
        true
    }

    /// Fail the pending consent request if it has outlived the configured
    /// handoff timeout at `now`. Returns whether it did.
    pub fn expire_handoff(&mut self, now: OffsetDateTime) -> bool {
        if !self.handoff.is_timed_out(now) {
            return false;
        }
        self.fail(Error::HandoffTimedOut);
        true
    }

    fn fail(&mut self, error: Error) {
        self.handoff.clear();
        self.sessions.invalidate();
        self.pull_id = None;
        self.observers.result(&Err(error));
    }
}
