//! The wire seam between [`crate::CloudApi`] and the network.
//!
//! `CloudApi` only ever talks JSON through a [`Transport`]; the HTTP
//! implementation lives here and an in-memory double lives in [`crate::mock`].

use crate::error::ApiResult;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Everything except `GET` may change remote state.
    pub fn is_write(&self) -> bool {
        !matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical connection to the API.
///
/// `path` is relative to the API root and may carry a query string
/// (`images?type=snapshot`). Successful responses with an empty body decode to
/// `Value::Null`.
pub trait Transport {
    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResult<Value>;

    /// Swap the bearer token used for subsequent requests.
    fn set_token(&self, token: &str);
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::{Method, Transport};
    use crate::error::{error_from_response, ApiError, ApiResult};
    use serde_json::Value;
    use std::cell::RefCell;
    use std::time::Duration;
    use url::Url;

    pub struct HttpTransport {
        client: reqwest::blocking::Client,
        base_url: String,
        token: RefCell<String>,
    }

    impl HttpTransport {
        pub fn new(base_url: &str, token: &str, timeout: Duration) -> ApiResult<Self> {
            let parsed = Url::parse(base_url)
                .map_err(|e| ApiError::Network(format!("invalid API base URL `{base_url}`: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ApiError::Network(format!(
                    "unsupported scheme `{}` in API base URL",
                    parsed.scheme()
                )));
            }

            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("hicloud/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| ApiError::Network(format!("failed to build http client: {e}")))?;

            Ok(Self {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                token: RefCell::new(token.to_string()),
            })
        }

        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        fn endpoint(&self, path: &str) -> String {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    impl Transport for HttpTransport {
        fn request(&self, method: Method, path: &str, body: Option<&Value>) -> ApiResult<Value> {
            let url = self.endpoint(path);
            let verb = match method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Delete => reqwest::Method::DELETE,
            };

            tracing::debug!(%method, %url, "api request");

            let mut req = self
                .client
                .request(verb, &url)
                .bearer_auth(self.token.borrow().as_str());
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req
                .send()
                .map_err(|e| ApiError::Network(format!("failed to reach {url}: {e}")))?;
            let status = resp.status();
            let text = resp
                .text()
                .map_err(|e| ApiError::Network(format!("failed to read response from {url}: {e}")))?;

            if !status.is_success() {
                tracing::debug!(status = status.as_u16(), %url, "api request failed");
                return Err(error_from_response(status.as_u16(), &text, path));
            }

            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| ApiError::Decode(format!("{url}: {e}")))
        }

        fn set_token(&self, token: &str) {
            *self.token.borrow_mut() = token.to_string();
        }
    }
}
