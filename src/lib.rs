//! Client side of the digi.me consent access flow.
//!
//! A third party application obtains a user's data in three steps:
//!
//! 1. a session is created with the digi.me API for the application's contract,
//! 2. the user is sent to the digi.me app to consent, which hands back to the
//!    application through its `digime-ca-<app id>` url scheme,
//! 3. the files released for the session are downloaded and decrypted with the
//!    application's RSA private key.
//!
//! [ConsentAccess] drives the whole pull. Platform capabilities are injected as
//! traits: [HttpClient] for the network, [AppLauncher] for opening the digi.me
//! app, [SecretStore] for the private key and [CryptoProvider] for decryption.
//! Progress and results are reported to subscribed [Observer]s.
pub mod client;
pub mod config;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod handoff;
pub mod observer;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod store;
pub mod transport;

pub use client::ConsentAccess;
pub use config::Config;
pub use crypto::{CryptoProvider, HybridCipher};
pub use error::Error;
pub use handoff::AppLauncher;
pub use observer::{ChannelObserver, Event, Observer};
pub use pipeline::DataSet;
pub use state::OperationState;
pub use store::{MemorySecretStore, SecretStore};
pub use transport::HttpClient;

#[cfg(feature = "reqwest")]
pub use transport::ReqwestClient;
