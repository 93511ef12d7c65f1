// Authenticated request executor: one blocking reqwest client whose default
// headers carry the user agent and the bearer token. Built once after
// sign-in and shared by reference with every Power BI operation.

use crate::auth::AuthToken;
use crate::error::{ApiError, ExecutorError, TransportError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use url::Url;

const JSON_UTF8: &str = "application/json; charset=utf-8";

/// Settings fixed at construction.
#[derive(Clone)]
pub struct ExecutorConfig {
    pub user_agent: String,
    pub authorization: String,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("user_agent", &self.user_agent)
            .field("authorization", &"Bearer ***")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ExecutorConfig {
    pub fn new(user_agent: impl Into<String>, token: &AuthToken) -> Self {
        ExecutorConfig {
            user_agent: user_agent.into(),
            authorization: token.as_str().to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Raw status and body; the executor never interprets either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body of a 2xx response, or the status and body as an [`ApiError`].
    pub fn success_body(self) -> Result<String, ApiError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(self.into_api_error())
        }
    }

    pub fn into_api_error(self) -> ApiError {
        ApiError {
            status: self.status.as_u16(),
            body: self.body,
        }
    }
}

#[derive(Debug)]
pub struct Executor {
    inner: Client,
    root: Url,
}

impl Executor {
    /// Build the executor. Fails before any network traffic when the token
    /// is empty or not a bearer token, or when `root` cannot carry paths.
    pub fn configure(root: Url, config: ExecutorConfig) -> Result<Self, ExecutorError> {
        let token = AuthToken::parse(config.authorization)?;
        if root.cannot_be_a_base() {
            return Err(ExecutorError::InvalidBase(root.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|source| {
                ExecutorError::InvalidHeader {
                    name: "user-agent",
                    source,
                }
            })?,
        );
        let mut auth = HeaderValue::from_str(token.as_str()).map_err(|source| {
            ExecutorError::InvalidHeader {
                name: "authorization",
                source,
            }
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let inner = builder.build().map_err(ExecutorError::Client)?;
        debug!(root = %root, "request executor configured");

        Ok(Executor { inner, root })
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// `root` with `segments` appended, each percent-encoded on its own.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TransportError::InvalidUrl(format!(
                "{}{}",
                self.root,
                segments.join("/")
            )));
        }
        let mut url = self.root.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.root.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn get(&self, url: &Url) -> Result<HttpResponse, TransportError> {
        debug!(%url, "GET");
        let res = self
            .inner
            .get(url.clone())
            .send()
            .map_err(|source| TransportError::Request {
                method: "GET",
                url: url.to_string(),
                source,
            })?;
        read_response(url, res)
    }

    /// POST `body` as UTF-8 JSON. The text is sent as given.
    pub fn post_json(&self, url: &Url, body: String) -> Result<HttpResponse, TransportError> {
        debug!(%url, bytes = body.len(), "POST");
        let res = self
            .inner
            .post(url.clone())
            .header(CONTENT_TYPE, JSON_UTF8)
            .body(body)
            .send()
            .map_err(|source| TransportError::Request {
                method: "POST",
                url: url.to_string(),
                source,
            })?;
        read_response(url, res)
    }
}

fn read_response(
    url: &Url,
    res: reqwest::blocking::Response,
) -> Result<HttpResponse, TransportError> {
    let status = res.status();
    let body = res.text().map_err(|source| TransportError::Body {
        url: url.to_string(),
        source,
    })?;
    debug!(%url, status = status.as_u16(), "response received");
    Ok(HttpResponse { status, body })
}
