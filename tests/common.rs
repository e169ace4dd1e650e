use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rsa::RsaPublicKey;
use url::Url;

use digime_consent::crypto::{self, FileFormat, HybridCipher};
use digime_consent::transport::{HttpRequest, HttpResponse};
use digime_consent::{
    encoding, AppLauncher, Config, ConsentAccess, DataSet, Error, Event, HttpClient,
    MemorySecretStore, Observer, OperationState,
};

pub const APP_ID: &str = "myappid";
pub const CONTRACT_ID: &str = "contract";
pub const SESSION_KEY: &str = "0123456789abcdef";
pub const KEY_HEX: &str = include_str!("data/private_key.hex");
#[allow(dead_code)]
pub const KEY_PEM: &str = include_str!("data/private_key.pem");

#[allow(dead_code)]
fn main() {}

#[derive(Debug, thiserror::Error)]
#[error("connection refused: {0}")]
pub struct Unreachable(String);

/// Stands in for the digi.me API: answers by url suffix and records every request.
#[derive(Clone, Default)]
pub struct FakeApi {
    routes: Arc<Mutex<HashMap<String, HttpResponse>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

#[allow(dead_code)]
impl FakeApi {
    pub fn respond(&self, suffix: &str, status: u16, body: String) {
        self.routes.lock().unwrap().insert(
            suffix.to_string(),
            HttpResponse {
                status,
                body: body.into_bytes(),
            },
        );
    }

    /// A session create endpoint returning [SESSION_KEY].
    pub fn with_session(self, expiry: u64) -> Self {
        self.respond(
            "/permission-access/session",
            200,
            serde_json::json!({ "sessionKey": SESSION_KEY, "expiry": expiry }).to_string(),
        );
        self
    }

    /// Serve `files` for [SESSION_KEY], encrypted for the fixture key.
    pub fn with_files(self, files: &[(&str, &[u8])]) -> Result<Self> {
        let files: Vec<_> = files
            .iter()
            .map(|(name, data)| (*name, FileFormat::Encrypted, *data))
            .collect();
        self.with_formats(&files)
    }

    /// Serve `files` for [SESSION_KEY], each stored in the given format.
    pub fn with_formats(self, files: &[(&str, FileFormat, &[u8])]) -> Result<Self> {
        let names: Vec<&str> = files.iter().map(|(name, ..)| *name).collect();
        self.respond(
            &format!("/query/{SESSION_KEY}"),
            200,
            serde_json::json!({ "fileList": names }).to_string(),
        );
        let public_key = public_key()?;
        for (name, format, data) in files {
            let body = match format {
                FileFormat::Encrypted => format.frame(&HybridCipher::encrypt(
                    &mut rand::thread_rng(),
                    &public_key,
                    data,
                )?),
                FileFormat::Unencrypted => format.frame(data),
            };
            self.respond(
                &format!("/query/{SESSION_KEY}/{name}"),
                200,
                serde_json::json!({ "fileContent": encoding::bytes_to_base64(&body) }).to_string(),
            );
        }
        Ok(self)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for FakeApi {
    type Error = Unreachable;

    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
        self.requests.lock().unwrap().push(request.clone());
        let routes = self.routes.lock().unwrap();
        routes
            .iter()
            .filter(|(suffix, _)| request.url.as_str().ends_with(suffix.as_str()))
            .max_by_key(|(suffix, _)| suffix.len())
            .map(|(_, response)| response.clone())
            .ok_or_else(|| Unreachable(request.url.to_string()))
    }
}

/// Plays the digi.me app: remembers the links it was asked to open.
#[derive(Default)]
pub struct FakeLauncher {
    pub installed: bool,
    pub opened: Mutex<Vec<Url>>,
}

#[allow(dead_code)]
impl FakeLauncher {
    pub fn installed() -> Arc<Self> {
        Arc::new(Self {
            installed: true,
            ..Default::default()
        })
    }

    pub fn missing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_opened(&self) -> Option<Url> {
        self.opened.lock().unwrap().last().cloned()
    }
}

impl AppLauncher for FakeLauncher {
    fn open(&self, url: &Url) -> bool {
        self.opened.lock().unwrap().push(url.clone());
        self.installed
    }
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<OperationState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<Result<DataSet, Error>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl Observer for Recorder {
    fn on_log(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Log(message.to_string()))
    }

    fn on_state_change(&self, state: OperationState) {
        self.events.lock().unwrap().push(Event::StateChanged(state))
    }

    fn on_progress(&self, progress: f32) {
        self.events.lock().unwrap().push(Event::Progress(progress))
    }

    fn on_result(&self, result: &Result<DataSet, Error>) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Result(result.clone()))
    }
}

pub fn public_key() -> Result<RsaPublicKey> {
    let der = crypto::private_key_der_from_text(KEY_HEX).context("fixture key")?;
    Ok(crypto::parse_private_key(&der)?.to_public_key())
}

pub fn consent_access(
    api: &FakeApi,
    launcher: Arc<FakeLauncher>,
    config: Config,
) -> Result<(ConsentAccess<FakeApi>, Arc<Recorder>)> {
    let access = ConsentAccess::new(
        config,
        api.clone(),
        Arc::new(HybridCipher),
        Arc::new(MemorySecretStore::new()),
        launcher,
    )?;
    let recorder = Arc::new(Recorder::default());
    access.subscribe(recorder.clone());
    Ok((access, recorder))
}

#[allow(dead_code)]
pub fn callback(result: &str, session_key: &str) -> String {
    format!("digime-ca-{APP_ID}://data?result={result}&sessionKey={session_key}")
}
