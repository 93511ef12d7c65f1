// Token acquisition against the Azure AD v1 OAuth2 endpoints.
//
// Two credential variants end in the same place: a validated
// `Authorization` header value (`Bearer <token>`). The interactive variant
// runs an authorization-code grant with PKCE through an
// `AuthorizationPrompt`; the saved-credential variant posts the username and
// password straight to the token endpoint.

use crate::config::AuthConfig;
use crate::error::AuthError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use reqwest::blocking::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use url::Url;

const BEARER_PREFIX: &str = "Bearer ";

/// How the user proves who they are.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Browser sign-in, always prompted.
    Interactive,
    /// Username and password sent directly to the token endpoint.
    ResourceOwnerPassword { username: String, password: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Interactive => f.write_str("Interactive"),
            Credential::ResourceOwnerPassword { username, .. } => f
                .debug_struct("ResourceOwnerPassword")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// A complete `Authorization` header value, guaranteed to start with
/// `Bearer ` followed by token material.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Validate a header value produced by the identity provider.
    pub fn parse(header: impl Into<String>) -> Result<Self, AuthError> {
        let header = header.into();
        if header.is_empty() {
            return Err(AuthError::MalformedToken("token is empty".into()));
        }
        match header.strip_prefix(BEARER_PREFIX) {
            Some(material) if !material.trim().is_empty() => Ok(AuthToken(header)),
            Some(_) => Err(AuthError::MalformedToken(
                "token has no material after the scheme".into(),
            )),
            None => Err(AuthError::MalformedToken(
                "token does not start with `Bearer `".into(),
            )),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for AuthToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(Bearer ***)")
    }
}

/// Presents the provider's sign-in page and hands back the URL the provider
/// redirected to afterwards. Implementations block until the user is done.
pub trait AuthorizationPrompt {
    fn sign_in(&self, authorize_url: &Url) -> Result<Url, AuthError>;
}

/// Progress of one acquisition, traced at debug level. `Acquired` and
/// `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquireState {
    NotStarted,
    Requesting,
    Acquired,
    Failed,
}

/// PKCE verifier and its S256 challenge.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);
        let verifier = URL_SAFE_NO_PAD.encode(random);
        let challenge = challenge_s256(&verifier);
        Pkce {
            verifier,
            challenge,
        }
    }
}

pub fn challenge_s256(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn random_state() -> String {
    let mut random = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random);
    URL_SAFE_NO_PAD.encode(random)
}

#[derive(Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Exchanges a [`Credential`] for an [`AuthToken`]. Single use.
#[derive(Debug)]
pub struct TokenAcquirer {
    client: Client,
    config: AuthConfig,
    authorize_endpoint: Url,
    token_endpoint: Url,
    state: AcquireState,
}

impl TokenAcquirer {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(AuthError::Client)?;
        Ok(TokenAcquirer {
            client,
            authorize_endpoint: oauth_endpoint(&config.authority, "authorize")?,
            token_endpoint: oauth_endpoint(&config.authority, "token")?,
            config: config.clone(),
            state: AcquireState::NotStarted,
        })
    }

    /// Run the flow for `credential`. The acquirer is consumed: there is no
    /// retry and no second attempt with the same instance.
    pub fn acquire(
        mut self,
        credential: &Credential,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<AuthToken, AuthError> {
        self.run(credential, prompt)
    }

    fn run(
        &mut self,
        credential: &Credential,
        prompt: &dyn AuthorizationPrompt,
    ) -> Result<AuthToken, AuthError> {
        self.transition(AcquireState::Requesting);
        let result = match credential {
            Credential::Interactive => self.acquire_interactive(prompt),
            Credential::ResourceOwnerPassword { username, password } => {
                self.acquire_with_password(username, password)
            }
        };
        match &result {
            Ok(_) => {
                self.transition(AcquireState::Acquired);
                info!("API authorization token received");
            }
            Err(e) => {
                self.transition(AcquireState::Failed);
                warn!(error = %e, "unable to retrieve API authorization token");
            }
        }
        result
    }

    fn transition(&mut self, next: AcquireState) {
        debug!(from = ?self.state, to = ?next, "token acquisition");
        self.state = next;
    }

    /// Sign-in page URL for one interactive attempt. `prompt=login` forces
    /// the credential prompt even when the browser holds a session.
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> Url {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("resource", &self.config.resource)
            .append_pair("state", state)
            .append_pair("prompt", "login")
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");
        url
    }

    fn acquire_interactive(&self, prompt: &dyn AuthorizationPrompt) -> Result<AuthToken, AuthError> {
        let pkce = Pkce::generate();
        let state = random_state();
        let url = self.authorize_url(&state, &pkce.challenge);
        debug!(endpoint = %self.authorize_endpoint, "requesting interactive sign-in");

        let redirect = prompt.sign_in(&url)?;
        let code = authorization_code(&redirect, &state)?;

        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("resource", self.config.resource.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ])
    }

    fn acquire_with_password(&self, username: &str, password: &str) -> Result<AuthToken, AuthError> {
        debug!(endpoint = %self.token_endpoint, %username, "requesting token with saved credential");
        self.request_token(&[
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("resource", self.config.resource.as_str()),
            ("username", username),
            ("password", password),
        ])
    }

    fn request_token(&self, form: &[(&str, &str)]) -> Result<AuthToken, AuthError> {
        let res = self
            .client
            .post(self.token_endpoint.clone())
            .form(form)
            .send()
            .map_err(AuthError::Transport)?;
        let status = res.status();
        let body = res.text().map_err(AuthError::Transport)?;

        if !status.is_success() {
            return Err(provider_error(Some(status.as_u16()), &body));
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::Provider {
                status: Some(status.as_u16()),
                code: "invalid_response".into(),
                description: e.to_string(),
            })?;
        AuthToken::parse(authorization_header(&token.token_type, &token.access_token))
    }
}

/// `{authority}/oauth2/{name}`
fn oauth_endpoint(authority: &Url, name: &str) -> Result<Url, AuthError> {
    let mut url = authority.clone();
    url.path_segments_mut()
        .map_err(|_| AuthError::InvalidEndpoint {
            url: authority.to_string(),
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        })?
        .pop_if_empty()
        .push("oauth2")
        .push(name);
    Ok(url)
}

/// Render the token the way it goes on the wire. Only a bearer token type
/// yields a value that passes [`AuthToken::parse`].
fn authorization_header(token_type: &str, access_token: &str) -> String {
    if token_type.eq_ignore_ascii_case("bearer") {
        format!("{BEARER_PREFIX}{access_token}")
    } else {
        format!("{token_type} {access_token}")
    }
}

fn provider_error(status: Option<u16>, body: &str) -> AuthError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => AuthError::Provider {
            status,
            code: err.error,
            description: err.error_description,
        },
        Err(_) => AuthError::Provider {
            status,
            code: "unknown_error".into(),
            description: body.trim().to_string(),
        },
    }
}

/// Pull the authorization code out of the provider's redirect, checking the
/// echoed `state` first.
pub fn authorization_code(redirect: &Url, expected_state: &str) -> Result<String, AuthError> {
    let params: HashMap<String, String> = redirect.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        if error == "access_denied" {
            return Err(AuthError::Cancelled);
        }
        return Err(AuthError::Provider {
            status: None,
            code: error.clone(),
            description: params.get("error_description").cloned().unwrap_or_default(),
        });
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(AuthError::StateMismatch);
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or(AuthError::MissingCode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use mockito::Server;

    fn acquirer_for(authority: &str) -> TokenAcquirer {
        TokenAcquirer::new(&AuthConfig {
            authority: Url::parse(authority).unwrap(),
            client_id: "test-client".into(),
            redirect_uri: Url::parse("https://x.example/cb").unwrap(),
            resource: "https://analysis.windows.net/powerbi/api".into(),
            user_agent: "pbi-export-cli/test".into(),
            timeout: None,
        })
        .unwrap()
    }

    struct Decline;

    impl AuthorizationPrompt for Decline {
        fn sign_in(&self, _: &Url) -> Result<Url, AuthError> {
            Err(AuthError::Cancelled)
        }
    }

    #[test]
    fn state_ends_acquired_after_token_is_issued() {
        //* Given
        let mut server = Server::new();
        let _token_mock = server
            .mock("POST", "/common/oauth2/token")
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","access_token":"abc"}"#)
            .create();
        let mut acquirer = acquirer_for(&format!("{}/common", server.url()));
        assert_eq!(acquirer.state, AcquireState::NotStarted);

        //* When
        let credential = Credential::ResourceOwnerPassword {
            username: "jeff".into(),
            password: "pw".into(),
        };
        let result = acquirer.run(&credential, &Decline);

        //* Then
        assert!(result.is_ok());
        assert_eq!(acquirer.state, AcquireState::Acquired);
    }

    #[test]
    fn state_ends_failed_when_sign_in_is_declined() {
        //* Given
        let mut acquirer = acquirer_for("http://127.0.0.1:1/common");

        //* When
        let result = acquirer.run(&Credential::Interactive, &Decline);

        //* Then
        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(acquirer.state, AcquireState::Failed);
    }

    #[test]
    fn token_must_carry_bearer_scheme() {
        let token = AuthToken::parse("Bearer abc123").unwrap();
        assert_eq!(token.as_str(), "Bearer abc123");
        assert_eq!(&token.as_str()[..7], "Bearer ");

        assert!(matches!(AuthToken::parse(""), Err(AuthError::MalformedToken(_))));
        assert!(matches!(AuthToken::parse("Bearer "), Err(AuthError::MalformedToken(_))));
        assert!(matches!(AuthToken::parse("Bearerabc"), Err(AuthError::MalformedToken(_))));
        assert!(matches!(AuthToken::parse("Basic abc"), Err(AuthError::MalformedToken(_))));
        assert!(matches!(AuthToken::parse("bearer abc"), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AuthToken::parse("Bearer secret-material").unwrap();
        assert!(!format!("{token:?}").contains("secret-material"));

        let cred = Credential::ResourceOwnerPassword {
            username: "jeff".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{cred:?}").contains("hunter2"));
    }

    #[test]
    fn header_normalizes_bearer_type() {
        assert_eq!(authorization_header("bearer", "t"), "Bearer t");
        assert_eq!(authorization_header("Bearer", "t"), "Bearer t");
        assert!(AuthToken::parse(authorization_header("pop", "t")).is_err());
    }

    #[test]
    fn pkce_challenge_matches_verifier() {
        assert_eq!(
            challenge_s256("dBjftJeZ4CVP-mJ92K9qYlQ1K2O6bE6a0Wq1r4Wk2jM"),
            "HKHavRp_tAA_JNIOXfLlNz3cmraCW1Kg0UUIv7W1k5c"
        );
        let pair = Pkce::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge, challenge_s256(&pair.verifier));
    }

    #[test]
    fn redirect_yields_code_when_state_matches() {
        let url = Url::parse(
            "https://login.microsoftonline.com/common/oauth2/nativeclient?code=abc&state=s1",
        )
        .unwrap();
        assert_eq!(authorization_code(&url, "s1").unwrap(), "abc");
        assert!(matches!(
            authorization_code(&url, "other"),
            Err(AuthError::StateMismatch)
        ));
    }

    #[test]
    fn redirect_errors_are_typed() {
        let denied = Url::parse("https://x.example/cb?error=access_denied&state=s").unwrap();
        assert!(matches!(
            authorization_code(&denied, "s"),
            Err(AuthError::Cancelled)
        ));

        let failed = Url::parse(
            "https://x.example/cb?error=invalid_resource&error_description=no+such+resource",
        )
        .unwrap();
        match authorization_code(&failed, "s") {
            Err(AuthError::Provider {
                code, description, ..
            }) => {
                assert_eq!(code, "invalid_resource");
                assert_eq!(description, "no such resource");
            }
            other => panic!("unexpected {other:?}"),
        }

        let no_code = Url::parse("https://x.example/cb?state=s").unwrap();
        assert!(matches!(
            authorization_code(&no_code, "s"),
            Err(AuthError::MissingCode)
        ));
    }

    #[test]
    fn endpoints_hang_off_the_authority() {
        let authority = Url::parse("https://login.windows.net/common").unwrap();
        assert_eq!(
            oauth_endpoint(&authority, "token").unwrap().as_str(),
            "https://login.windows.net/common/oauth2/token"
        );
        let trailing = Url::parse("https://login.windows.net/contoso/").unwrap();
        assert_eq!(
            oauth_endpoint(&trailing, "authorize").unwrap().as_str(),
            "https://login.windows.net/contoso/oauth2/authorize"
        );
    }

    #[test]
    fn provider_error_keeps_unstructured_body() {
        match provider_error(Some(502), "Bad Gateway\n") {
            AuthError::Provider {
                status,
                code,
                description,
            } => {
                assert_eq!(status, Some(502));
                assert_eq!(code, "unknown_error");
                assert_eq!(description, "Bad Gateway");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
