//! The seam between [ApiClient](super::ApiClient) and the host's networking stack.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Content type of every request and response body of the consent access API.
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A call to the digi.me API. Bodies, when present, are JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub json_body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: HttpMethod::Get,
            url,
            json_body: None,
        }
    }

    pub fn post_json<T: Serialize>(url: Url, body: &T) -> serde_json::Result<Self> {
        Ok(Self {
            method: HttpMethod::Post,
            url,
            json_body: Some(serde_json::to_vec(body)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Moves requests to the digi.me API and back.
///
/// Implementations only deal with bytes on the wire. A non-2xx status is a
/// response like any other; [ApiClient](super::ApiClient) maps it to an error.
/// Mobile hosts implement this over their platform stack, other hosts can use
/// [ReqwestClient](super::ReqwestClient).
#[async_trait]
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn request(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error>;
}
