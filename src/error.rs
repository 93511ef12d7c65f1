// Error types shared by the authentication pipeline, the request executor
// and the Power BI operations. Every failure that crosses a module boundary
// is one of these; nothing in the library panics on bad input.

use thiserror::Error;

/// Failure to obtain a usable bearer token from the identity provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider answered with an OAuth error response.
    #[error("identity provider rejected the request ({code}): {description}")]
    Provider {
        status: Option<u16>,
        code: String,
        description: String,
    },

    #[error("token request failed")]
    Transport(#[source] reqwest::Error),

    #[error("sign-in was cancelled")]
    Cancelled,

    #[error("sign-in response does not belong to this request (state mismatch)")]
    StateMismatch,

    #[error("sign-in response carries no authorization code")]
    MissingCode,

    /// Header value is empty or does not start with `Bearer `.
    #[error("malformed authorization token: {0}")]
    MalformedToken(String),

    #[error("sign-in prompt failed")]
    Prompt(#[source] std::io::Error),

    #[error("invalid identity provider endpoint `{url}`")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("`{url}` is not a valid redirect address")]
    InvalidRedirect {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client for the identity provider")]
    Client(#[source] reqwest::Error),
}

/// HTTP-level failure: the request never produced a complete response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{method} {url} failed")]
    Request {
        method: &'static str,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response body from {url}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot build request URL from `{0}`")]
    InvalidUrl(String),
}

/// Non-success status, or a success status with a body that is not JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("service returned status {status}: {body}")]
pub struct ApiError {
    pub status: u16,
    pub body: String,
}

/// Well-formed JSON that does not have the shape an operation needs.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("response is missing `{0}`")]
    MissingField(String),

    #[error("`{path}` is invalid: {reason}")]
    InvalidField { path: String, reason: String },

    #[error("column `{column}` holds a {kind}, only scalar values can be sent")]
    UnsupportedValue { column: String, kind: &'static str },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Outcome of a failed Power BI operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0} not found")]
    NotFound(String),
}

impl ServiceError {
    /// HTTP status carried by the error, when the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServiceError::Api(e) => Some(e.status),
            _ => None,
        }
    }
}

/// The executor could not be constructed; no request was sent.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Token(#[from] AuthError),

    #[error("invalid value for header `{name}`")]
    InvalidHeader {
        name: &'static str,
        #[source]
        source: reqwest::header::InvalidHeaderValue,
    },

    #[error("`{0}` cannot be used as an API base URL")]
    InvalidBase(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Problem with the configuration file or environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("`{key}` is not a valid URL: {value}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("`{key}` is not a valid number: {value}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("saved credential requires both a username and a password")]
    MissingCredential,
}
