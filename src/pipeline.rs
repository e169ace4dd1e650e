//! Download and decryption of the files released by a granted consent request.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Serialize;

use crate::crypto::{CryptoProvider, FileFormat};
use crate::encoding;
use crate::error::Error;
use crate::observer::Observers;
use crate::state::{OperationState, StateMachine};
use crate::store::SecretStore;
use crate::transport::{ApiClient, ApiError, HttpClient};

/// Decrypted files of one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DataSet {
    /// File names in the order the server listed them.
    pub file_names: Vec<String>,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl DataSet {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, file_name: &str) -> Option<&[u8]> {
        self.files.get(file_name).map(Vec::as_slice)
    }

    /// Parse a file as JSON. `None` if there is no such file.
    pub fn json(&self, file_name: &str) -> Option<serde_json::Result<serde_json::Value>> {
        self.get(file_name).map(serde_json::from_slice)
    }

    /// Files in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.file_names
            .iter()
            .filter_map(|name| self.get(name).map(|data| (name.as_str(), data)))
    }
}

pub struct DownloadPipeline<C> {
    api: Arc<ApiClient<C>>,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<dyn SecretStore>,
    key_identifier: String,
    concurrency: usize,
    observers: Observers,
}

impl<C: HttpClient> DownloadPipeline<C> {
    pub fn new(
        api: Arc<ApiClient<C>>,
        crypto: Arc<dyn CryptoProvider>,
        store: Arc<dyn SecretStore>,
        key_identifier: String,
        concurrency: usize,
        observers: Observers,
    ) -> Self {
        Self {
            api,
            crypto,
            store,
            key_identifier,
            concurrency: concurrency.max(1),
            observers,
        }
    }

    /// Fetch the manifest, then every listed file, decrypting each one.
    ///
    /// Up to `concurrency` files are in flight at once but results, and the
    /// progress reported for them, follow manifest order. The first failure
    /// ends the run and nothing downloaded so far is returned.
    pub async fn fetch_data(
        &self,
        state: &mut StateMachine,
        session_key: &str,
    ) -> Result<DataSet, Error> {
        state.transition(OperationState::DataRequestSent)?;
        let manifest = self
            .api
            .file_list(session_key)
            .await
            .map_err(|e| match e {
                ApiError::Body(_) => Error::FilesListDataIncorrect,
                e => Error::FilesListServerError(e.to_string()),
            })?;
        if let Some(name) = first_duplicate(&manifest) {
            tracing::warn!(file = name, "file listed twice");
            return Err(Error::FilesListDataIncorrect);
        }
        state.transition(OperationState::DataRequestReceived)?;
        self.observers
            .log(format!("{} files available for download", manifest.len()));

        let key = self.store.load(&self.key_identifier).map_err(|e| {
            tracing::warn!("private key unavailable: {e}");
            Error::RsaPrivateKeyInvalid
        })?;

        let total = manifest.len();
        let mut files = BTreeMap::new();
        if total == 0 {
            self.observers.progress(1.0);
        }
        {
            let mut downloads = stream::iter(manifest.iter())
                .map(|name| self.fetch_file(session_key, name, &key))
                .buffered(self.concurrency);
            let mut completed = 0usize;
            while let Some(download) = downloads.next().await {
                let (name, data) = download?;
                completed += 1;
                self.observers.progress(completed as f32 / total as f32);
                files.insert(name, data);
            }
        }

        state.transition(OperationState::DataReceivedAllDone)?;
        Ok(DataSet {
            file_names: manifest,
            files,
        })
    }

    async fn fetch_file(
        &self,
        session_key: &str,
        file: &str,
        key: &[u8],
    ) -> Result<(String, Vec<u8>), Error> {
        let content = self
            .api
            .file_content(session_key, file)
            .await
            .map_err(|e| match e {
                ApiError::Body(_) => Error::FileDataDataIncorrect {
                    file: file.to_string(),
                },
                e => Error::FileDataServerError {
                    file: file.to_string(),
                    reason: e.to_string(),
                },
            })?;
        if encoding::is_blank(&content) {
            return Err(Error::FileDataDataIncorrect {
                file: file.to_string(),
            });
        }
        let body =
            encoding::base64_to_bytes(&content).map_err(|_| Error::FileDataDataIncorrect {
                file: file.to_string(),
            })?;
        let (format, payload) = FileFormat::split(&body).map_err(|e| {
            tracing::warn!(file, "{e}");
            Error::FileDataDataIncorrect {
                file: file.to_string(),
            }
        })?;

        let data = match format {
            FileFormat::Unencrypted => payload.to_vec(),
            FileFormat::Encrypted => self.crypto.decrypt(payload, key).map_err(|e| {
                tracing::warn!(file, "decryption failed: {e}");
                Error::RsaPrivateKeyInvalid
            })?,
        };
        if data.is_empty() {
            return Err(Error::DataIsNull {
                file: file.to_string(),
            });
        }
        Ok((file.to_string(), data))
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .find(|name| !seen.insert(*name))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto;
    use crate::observer::test::Recorder;
    use crate::store::MemorySecretStore;
    use crate::transport::mock::MockHttpClient;
    use url::Url;

    const KEY_ID: &str = "key";

    /// Treats the ciphertext as plaintext so tests can focus on the pipeline.
    struct Passthrough;

    impl CryptoProvider for Passthrough {
        fn decrypt(&self, ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, crypto::Error> {
            if key != b"right key" {
                return Err(crypto::Error::InvalidKey("wrong key".into()));
            }
            Ok(ciphertext.to_vec())
        }
    }

    fn pipeline(mock: &MockHttpClient, concurrency: usize) -> (DownloadPipeline<MockHttpClient>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let observers = Observers::default();
        observers.push(recorder.clone());
        let store = MemorySecretStore::new();
        store.store(KEY_ID, b"right key").unwrap();
        let api = ApiClient::new(
            mock.clone(),
            Url::parse("https://api.example.com/v1/").unwrap(),
        );
        let pipeline = DownloadPipeline::new(
            Arc::new(api),
            Arc::new(Passthrough),
            Arc::new(store),
            KEY_ID.into(),
            concurrency,
            observers,
        );
        (pipeline, recorder)
    }

    fn granted_state() -> StateMachine {
        let mut state = StateMachine::new(Observers::default());
        for s in [
            OperationState::FrameworkInit,
            OperationState::RequestingSessionKey,
            OperationState::SessionKeyReceived,
            OperationState::PermissionRequestSent,
            OperationState::PermissionGranted,
        ] {
            state.transition(s).unwrap();
        }
        state
    }

    fn serve_files(mock: &MockHttpClient, files: &[(&str, &str)]) {
        let framed: Vec<_> = files
            .iter()
            .map(|(name, content)| (*name, FileFormat::Encrypted, *content))
            .collect();
        serve_framed(mock, &framed);
    }

    fn serve_framed(mock: &MockHttpClient, files: &[(&str, FileFormat, &str)]) {
        let names: Vec<&str> = files.iter().map(|(name, ..)| *name).collect();
        mock.respond(
            "/query/sk",
            200,
            &serde_json::json!({ "fileList": names }).to_string(),
        );
        for (name, format, content) in files {
            let body = format.frame(content.as_bytes());
            mock.respond(
                &format!("/query/sk/{name}"),
                200,
                &serde_json::json!({ "fileContent": encoding::bytes_to_base64(&body) }).to_string(),
            );
        }
    }

    #[tokio::test]
    async fn downloads_in_manifest_order() {
        let mock = MockHttpClient::default();
        serve_files(
            &mock,
            &[("c.json", "{\"c\":3}"), ("a.json", "{\"a\":1}"), ("b.json", "{\"b\":2}"), ("d.json", "[]")],
        );
        for concurrency in [1, 3] {
            let (pipeline, recorder) = pipeline(&mock, concurrency);
            let mut state = granted_state();
            let data = pipeline.fetch_data(&mut state, "sk").await.unwrap();

            assert_eq!(data.file_names, vec!["c.json", "a.json", "b.json", "d.json"]);
            assert_eq!(data.len(), 4);
            assert_eq!(data.get("a.json"), Some(&b"{\"a\":1}"[..]));
            assert_eq!(data.json("b.json").unwrap().unwrap(), serde_json::json!({"b": 2}));
            assert_eq!(
                data.iter().map(|(name, _)| name).collect::<Vec<_>>(),
                data.file_names
            );
            assert_eq!(recorder.progress(), vec![0.25, 0.5, 0.75, 1.0]);
            assert_eq!(state.current(), OperationState::DataReceivedAllDone);
        }
    }

    #[tokio::test]
    async fn empty_manifest_completes() {
        let mock = MockHttpClient::default();
        serve_files(&mock, &[]);
        let (pipeline, recorder) = pipeline(&mock, 2);
        let mut state = granted_state();
        let data = pipeline.fetch_data(&mut state, "sk").await.unwrap();
        assert!(data.is_empty());
        assert_eq!(recorder.progress(), vec![1.0]);
    }

    #[tokio::test]
    async fn manifest_failures() {
        let mock = MockHttpClient::default();
        let (pipeline, _) = pipeline(&mock, 1);

        mock.respond("/query/sk", 502, "");
        let err = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap_err();
        assert!(matches!(err, Error::FilesListServerError(_)));

        mock.respond("/query/sk", 200, "{\"fileList\":\"nope\"}");
        let mut state = granted_state();
        let err = pipeline.fetch_data(&mut state, "sk").await.unwrap_err();
        assert_eq!(err, Error::FilesListDataIncorrect);
        assert_eq!(state.current(), OperationState::DataRequestSent);
    }

    #[tokio::test]
    async fn one_failing_file_fails_the_pull() {
        let mock = MockHttpClient::default();
        serve_files(&mock, &[("a.json", "1"), ("b.json", "2"), ("c.json", "3")]);
        mock.respond("/query/sk/b.json", 404, "");
        let (pipeline, recorder) = pipeline(&mock, 2);
        let mut state = granted_state();

        let err = pipeline.fetch_data(&mut state, "sk").await.unwrap_err();
        assert!(matches!(err, Error::FileDataServerError { ref file, .. } if file == "b.json"));
        assert_ne!(state.current(), OperationState::DataReceivedAllDone);
        assert!(recorder.progress().iter().all(|p| *p < 1.0));
    }

    #[tokio::test]
    async fn file_content_failures() {
        let cases = [
            ("{\"content\":\"x\"}", Error::FileDataDataIncorrect { file: "a.json".into() }),
            ("{\"fileContent\":\"@@@\"}", Error::FileDataDataIncorrect { file: "a.json".into() }),
            ("{\"fileContent\":\"\"}", Error::FileDataDataIncorrect { file: "a.json".into() }),
            // "AAE=": two bytes, shorter than a type descriptor
            ("{\"fileContent\":\"AAE=\"}", Error::FileDataDataIncorrect { file: "a.json".into() }),
            // "AAAAAAAAAAI=": type descriptor 2
            ("{\"fileContent\":\"AAAAAAAAAAI=\"}", Error::FileDataDataIncorrect { file: "a.json".into() }),
        ];
        for (body, expected) in cases {
            let mock = MockHttpClient::default();
            serve_files(&mock, &[("a.json", "1")]);
            mock.respond("/query/sk/a.json", 200, body);
            let (pipeline, _) = pipeline(&mock, 1);
            let err = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap_err();
            assert_eq!(err, expected, "{body}");
        }
    }

    #[tokio::test]
    async fn unencrypted_files_skip_decryption() {
        let mock = MockHttpClient::default();
        serve_framed(
            &mock,
            &[
                ("plain.json", FileFormat::Unencrypted, "{\"p\":1}"),
                ("sealed.json", FileFormat::Encrypted, "{\"s\":2}"),
            ],
        );
        let (pipeline, _) = pipeline(&mock, 2);
        let data = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap();
        assert_eq!(data.get("plain.json"), Some(&b"{\"p\":1}"[..]));
        assert_eq!(data.get("sealed.json"), Some(&b"{\"s\":2}"[..]));

        // Without a usable key only the unencrypted file can be read.
        serve_framed(&mock, &[("plain.json", FileFormat::Unencrypted, "{}")]);
        pipeline.store.store(KEY_ID, b"wrong key").unwrap();
        let data = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap();
        assert_eq!(data.get("plain.json"), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn duplicate_manifest_entries_are_rejected() {
        let mock = MockHttpClient::default();
        serve_files(&mock, &[("a.json", "1"), ("b.json", "2")]);
        mock.respond("/query/sk", 200, r#"{"fileList":["a.json","b.json","a.json"]}"#);
        let (pipeline, recorder) = pipeline(&mock, 2);
        let mut state = granted_state();

        let err = pipeline.fetch_data(&mut state, "sk").await.unwrap_err();
        assert_eq!(err, Error::FilesListDataIncorrect);
        assert_eq!(state.current(), OperationState::DataRequestSent);
        assert!(recorder.progress().is_empty());
        assert!(!mock.requests().iter().any(|r| r.url.as_str().ends_with("/a.json")));
    }

    #[tokio::test]
    async fn key_problems_are_security_errors() {
        let mock = MockHttpClient::default();
        serve_files(&mock, &[("a.json", "1")]);
        let (pipeline, _) = pipeline(&mock, 1);
        pipeline.store.store(KEY_ID, b"wrong key").unwrap();
        let err = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap_err();
        assert_eq!(err, Error::RsaPrivateKeyInvalid);

        pipeline.store.remove(KEY_ID).unwrap();
        let err = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap_err();
        assert_eq!(err, Error::RsaPrivateKeyInvalid);
    }

    #[tokio::test]
    async fn empty_plaintext_is_data_is_null() {
        struct Empty;
        impl CryptoProvider for Empty {
            fn decrypt(&self, _: &[u8], _: &[u8]) -> Result<Vec<u8>, crypto::Error> {
                Ok(vec![])
            }
        }
        let mock = MockHttpClient::default();
        serve_files(&mock, &[("a.json", "1")]);
        let (mut pipeline, _) = pipeline(&mock, 1);
        pipeline.crypto = Arc::new(Empty);
        let err = pipeline.fetch_data(&mut granted_state(), "sk").await.unwrap_err();
        assert_eq!(err, Error::DataIsNull { file: "a.json".into() });
    }
}
