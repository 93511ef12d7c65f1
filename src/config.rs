// Configuration module: reads the optional TOML file and layers `PBI_*`
// environment variables on top of it.
//
// Public endpoints have defaults; the application identifier and the
// saved username/password never do and must be supplied from outside.

use crate::auth::Credential;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_AUTHORITY: &str = "https://login.windows.net/common";
pub const DEFAULT_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";
pub const DEFAULT_REDIRECT_URI: &str =
    "https://login.microsoftonline.com/common/oauth2/nativeclient";
pub const DEFAULT_API_BASE: &str = "https://api.powerbi.com/v1.0/myorg/";

/// Fixed descriptive user agent sent with every request.
pub const USER_AGENT: &str = concat!(
    "pbi-export-cli/",
    env!("CARGO_PKG_VERSION"),
    " (Power BI REST client)"
);

/// Raw shape of `config.toml`. Every key is optional here; validation
/// happens once the environment has been applied.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub client_id: Option<String>,
    pub authority: Option<String>,
    pub resource: Option<String>,
    pub redirect_uri: Option<String>,
    pub api_base: Option<String>,
    pub user_agent: Option<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub credential: FileCredential,
}

#[derive(Default, Deserialize)]
pub struct FileCredential {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for FileCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Identity provider settings consumed by the token acquirer.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub authority: Url,
    pub client_id: String,
    pub redirect_uri: Url,
    pub resource: String,
    pub user_agent: String,
    pub timeout: Option<Duration>,
}

/// Fully resolved settings for one run.
#[derive(Clone)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub api_base: Url,
    saved_username: Option<String>,
    saved_password: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("auth", &self.auth)
            .field("api_base", &self.api_base.as_str())
            .field("saved_username", &self.saved_username)
            .field("saved_password", &self.saved_password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// `<config dir>/pbi-export/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pbi-export").join("config.toml"))
}

/// Parse a configuration file from disk.
pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

impl AppConfig {
    /// Load from the file named by `PBI_CONFIG` (which must exist) or the
    /// default location (which may be absent), then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var_os("PBI_CONFIG") {
            Some(path) => read_file(Path::new(&path))?,
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Merge file values with an environment lookup; the environment wins.
    /// Empty environment values count as unset.
    pub fn from_sources<F>(file: FileConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_id = env("PBI_CLIENT_ID")
            .or(file.client_id)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("client_id"))?;

        let authority = parse_url(
            "authority",
            env("PBI_AUTHORITY")
                .or(file.authority)
                .unwrap_or_else(|| DEFAULT_AUTHORITY.into()),
        )?;
        let redirect_uri = parse_url(
            "redirect_uri",
            env("PBI_REDIRECT_URI")
                .or(file.redirect_uri)
                .unwrap_or_else(|| DEFAULT_REDIRECT_URI.into()),
        )?;
        let api_base = parse_url(
            "api_base",
            env("PBI_API_BASE")
                .or(file.api_base)
                .unwrap_or_else(|| DEFAULT_API_BASE.into()),
        )?;
        let resource = env("PBI_RESOURCE")
            .or(file.resource)
            .unwrap_or_else(|| DEFAULT_RESOURCE.into());

        let timeout_secs = match env("PBI_TIMEOUT_SECS") {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidNumber {
                    key: "timeout_secs",
                    value,
                }
            })?),
            None => file.timeout_secs,
        };

        Ok(AppConfig {
            auth: AuthConfig {
                authority,
                client_id,
                redirect_uri,
                resource,
                user_agent: env("PBI_USER_AGENT")
                    .or(file.user_agent)
                    .unwrap_or_else(|| USER_AGENT.into()),
                timeout: timeout_secs.map(Duration::from_secs),
            },
            api_base,
            saved_username: env("PBI_USERNAME").or(file.credential.username),
            saved_password: env("PBI_PASSWORD").or(file.credential.password),
        })
    }

    /// The resource-owner credential for the "saved credential" login mode.
    pub fn saved_credential(&self) -> Result<Credential, ConfigError> {
        match (&self.saved_username, &self.saved_password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Ok(Credential::ResourceOwnerPassword {
                    username: username.clone(),
                    password: password.clone(),
                })
            }
            _ => Err(ConfigError::MissingCredential),
        }
    }
}

fn parse_url(key: &'static str, value: String) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl {
        key,
        value,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_client_id_is_set() {
        let cfg = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PBI_CLIENT_ID", "app-1")]),
        )
        .unwrap();
        assert_eq!(cfg.auth.client_id, "app-1");
        assert_eq!(cfg.auth.authority.as_str(), DEFAULT_AUTHORITY);
        assert_eq!(cfg.auth.resource, DEFAULT_RESOURCE);
        assert_eq!(cfg.api_base.as_str(), DEFAULT_API_BASE);
        assert_eq!(cfg.auth.user_agent, USER_AGENT);
        assert!(cfg.auth.timeout.is_none());
    }

    #[test]
    fn client_id_is_required() {
        let err = AppConfig::from_sources(FileConfig::default(), env_of(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("client_id")));

        let err = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PBI_CLIENT_ID", "   ")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("client_id")));
    }

    #[test]
    fn environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            client_id = "from-file"
            api_base = "https://file.example/v1.0/myorg/"
            timeout_secs = 5

            [credential]
            username = "file-user"
            password = "file-pass"
            "#,
        )
        .unwrap();
        let cfg = AppConfig::from_sources(
            file,
            env_of(&[
                ("PBI_CLIENT_ID", "from-env"),
                ("PBI_PASSWORD", "env-pass"),
                ("PBI_API_BASE", ""),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.auth.client_id, "from-env");
        assert_eq!(cfg.api_base.as_str(), "https://file.example/v1.0/myorg/");
        assert_eq!(cfg.auth.timeout, Some(Duration::from_secs(5)));
        match cfg.saved_credential().unwrap() {
            Credential::ResourceOwnerPassword { username, password } => {
                assert_eq!(username, "file-user");
                assert_eq!(password, "env-pass");
            }
            other => panic!("unexpected credential {other:?}"),
        }
    }

    #[test]
    fn user_agent_follows_environment_then_file() {
        let file: FileConfig = toml::from_str(
            r#"
            client_id = "app"
            user_agent = "from-file/1.0"
            "#,
        )
        .unwrap();
        let cfg = AppConfig::from_sources(file, env_of(&[])).unwrap();
        assert_eq!(cfg.auth.user_agent, "from-file/1.0");

        let file: FileConfig = toml::from_str(
            r#"
            client_id = "app"
            user_agent = "from-file/1.0"
            "#,
        )
        .unwrap();
        let cfg =
            AppConfig::from_sources(file, env_of(&[("PBI_USER_AGENT", "from-env/2.0")])).unwrap();
        assert_eq!(cfg.auth.user_agent, "from-env/2.0");
    }

    #[test]
    fn saved_credential_needs_both_parts() {
        let cfg = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PBI_CLIENT_ID", "app"), ("PBI_USERNAME", "jeff")]),
        )
        .unwrap();
        assert!(matches!(
            cfg.saved_credential(),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn bad_values_are_reported() {
        let err = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PBI_CLIENT_ID", "app"), ("PBI_AUTHORITY", "not a url")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { key: "authority", .. }));

        let err = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[("PBI_CLIENT_ID", "app"), ("PBI_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
    }

    #[test]
    fn debug_output_hides_password() {
        let cfg = AppConfig::from_sources(
            FileConfig::default(),
            env_of(&[
                ("PBI_CLIENT_ID", "app"),
                ("PBI_USERNAME", "jeff"),
                ("PBI_PASSWORD", "hunter2"),
            ]),
        )
        .unwrap();
        let shown = format!("{cfg:?}");
        assert!(shown.contains("jeff"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn bundled_sample_config_parses() {
        let file: FileConfig = toml::from_str(include_str!("../demos/config.toml")).unwrap();
        assert!(file.client_id.is_some());
        assert!(file.credential.password.is_none());
    }

    #[test]
    fn read_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "client_id = [").unwrap();
        assert!(matches!(read_file(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            read_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
