//! Access to the digi.me consent access API.
//!
//! The module separates concerns for cross-platform support:
//!
//! - [`HttpClient`]: pure HTTP abstraction (platform-specific implementations)
//! - [`ApiClient`]: endpoint paths and JSON bodies of the consent access API
//!
//! For mobile platforms only [`HttpClient`] needs a native implementation.

mod api;
mod http;

#[cfg(feature = "reqwest")]
mod reqwest_client;

pub use api::{ApiClient, ApiError, SessionResponse};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, JSON_CONTENT_TYPE};

#[cfg(feature = "reqwest")]
pub use reqwest_client::ReqwestClient;
