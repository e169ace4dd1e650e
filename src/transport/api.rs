//! The three consent access endpoints of the digi.me API.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{HttpClient, HttpRequest, HttpResponse};

const PERMISSION_ACCESS: &str = "permission-access";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("base url cannot be extended with a path")]
    BaseUrl,
    #[error("request could not be sent: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("unexpected response body: {0}")]
    Body(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest<'a> {
    app_id: &'a str,
    contract_id: &'a str,
}

/// Body of a successful session create call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(default)]
    pub session_key: Option<String>,
    /// Lifetime of the session in seconds.
    pub expiry: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    file_list: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileContent {
    file_content: String,
}

/// Builds the consent access requests and decodes their JSON bodies.
pub struct ApiClient<C> {
    http: C,
    base_url: Url,
}

impl<C: HttpClient> ApiClient<C> {
    pub fn new(http: C, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `POST permission-access/session`
    pub async fn create_session(
        &self,
        app_id: &str,
        contract_id: &str,
    ) -> Result<SessionResponse, ApiError> {
        let request = HttpRequest::post_json(
            self.endpoint(&["session"])?,
            &SessionRequest {
                app_id,
                contract_id,
            },
        )
        .map_err(|e| ApiError::Body(e.to_string()))?;
        let response = self.send(request).await?;
        decode(&response)
    }

    /// `GET permission-access/query/{sessionKey}`
    pub async fn file_list(&self, session_key: &str) -> Result<Vec<String>, ApiError> {
        let response = self
            .send(HttpRequest::get(self.endpoint(&["query", session_key])?))
            .await?;
        decode::<FileList>(&response).map(|list| list.file_list)
    }

    /// `GET permission-access/query/{sessionKey}/{fileName}`, returning the base64 content.
    pub async fn file_content(&self, session_key: &str, file: &str) -> Result<String, ApiError> {
        let response = self
            .send(HttpRequest::get(
                self.endpoint(&["query", session_key, file])?,
            ))
            .await?;
        decode::<FileContent>(&response).map(|content| content.file_content)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl)?
            .pop_if_empty()
            .push(PERMISSION_ACCESS)
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        tracing::debug!(url = %request.url, "sending request");
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(ApiError::Status(response.status));
        }
        Ok(response)
    }
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    response.json().map_err(|e| ApiError::Body(e.to_string()))
}
