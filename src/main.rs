use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Error};
use clap::Parser;
use clap_stdin::MaybeStdin;
use digime_consent::config::{Config, RECEIVER_SCHEME_PREFIX, SENDER_SCHEME};
use digime_consent::crypto::{self, CryptoProvider, FileFormat, HybridCipher};
use digime_consent::encoding;
use digime_consent::handoff::{HandoffRequest, HandoffResponse};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Decrypt a consent access file.
    Decrypt {
        /// RSA private key: hex encoded DER, PEM, or raw DER.
        #[arg(long)]
        key: PathBuf,
        /// Pretty print the decrypted file as JSON.
        #[arg(long)]
        json: bool,
        /// Content is a bare encrypted envelope, without the leading type descriptor.
        #[arg(long)]
        raw: bool,
        /// Base64 encoded file content as returned by the API.
        content: MaybeStdin<String>,
    },
    /// Print the link that opens a consent request in the digi.me app.
    HandoffUrl {
        #[arg(long)]
        app_id: String,
        #[arg(long)]
        contract_id: String,
        #[arg(long)]
        session_key: String,
    },
    /// Parse a link sent back by the digi.me app.
    ParseCallback {
        url: String,
        /// Only accept links on this application's callback scheme.
        #[arg(long)]
        app_id: Option<String>,
    },
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().action {
        Action::Decrypt {
            key,
            json,
            raw,
            content,
        } => {
            let key = read_key(&key)?;
            println!("{}", decrypt(&key, &content.to_string(), json, raw)?);
            Ok(())
        }
        Action::HandoffUrl {
            app_id,
            contract_id,
            session_key,
        } => {
            println!("{}", handoff_url(app_id, contract_id, session_key)?);
            Ok(())
        }
        Action::ParseCallback { url, app_id } => {
            println!("{}", parse_callback(&url, app_id.as_deref())?);
            Ok(())
        }
    }
}

fn read_key(path: &Path) -> Result<Vec<u8>, Error> {
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    match std::str::from_utf8(&bytes) {
        Ok(text) => crypto::private_key_der_from_text(text).context("could not parse key"),
        Err(_) => {
            crypto::parse_private_key(&bytes).context("could not parse DER key")?;
            Ok(bytes)
        }
    }
}

fn decrypt(key: &[u8], content: &str, json: bool, raw: bool) -> Result<String, Error> {
    let body = encoding::base64_to_bytes(content).context("content is not base64")?;
    let data = if raw {
        HybridCipher.decrypt(&body, key)?
    } else {
        match FileFormat::split(&body)? {
            (FileFormat::Encrypted, envelope) => HybridCipher.decrypt(envelope, key)?,
            (FileFormat::Unencrypted, data) => data.to_vec(),
        }
    };
    if json {
        let value: serde_json::Value =
            serde_json::from_slice(&data).context("decrypted content is not JSON")?;
        return Ok(serde_json::to_string_pretty(&value)?);
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn handoff_url(app_id: String, contract_id: String, session_key: String) -> Result<String, Error> {
    let config = Config::default();
    let request = HandoffRequest {
        callback_scheme: config.callback_scheme(&app_id),
        app_id,
        contract_id,
        session_key,
    };
    Ok(request.to_url(SENDER_SCHEME)?.to_string())
}

fn parse_callback(url: &str, app_id: Option<&str>) -> Result<String, Error> {
    let response = HandoffResponse::parse(url, RECEIVER_SCHEME_PREFIX)?;
    if let Some(app_id) = app_id {
        let expected = Config::default().callback_scheme(app_id);
        if !response.scheme.eq_ignore_ascii_case(&expected) {
            bail!("link is for {}, not {expected}", response.scheme);
        }
    }
    Ok(serde_json::to_string_pretty(&response)?)
}
