use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_MAX_BODY_LENGTH: usize = 200;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const NOTEPM_DOMAIN: &str = "notepm.jp";

/// Startup configuration failure. Fatal: the server never starts serving tools.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("NOTEPM_TEAM is required (or set NOTEPM_API_BASE)")]
    MissingTeam,
    #[error("NOTEPM_API_TOKEN is required")]
    MissingApiToken,
    #[error("NOTEPM_TEAM '{0}' is not a valid subdomain (letters, digits and '-' only)")]
    InvalidTeam(String),
    #[error("NOTEPM_API_BASE '{0}' must be an absolute http(s) URL")]
    InvalidApiBase(String),
    #[error("NOTEPM_MAX_BODY_LENGTH must be greater than zero")]
    InvalidMaxBodyLength,
    #[error("NOTEPM_REQUEST_TIMEOUT_SECS must be greater than zero")]
    InvalidRequestTimeout,
    #[error("failed to initialize HTTP client: {0}")]
    HttpClient(String),
}

/// Raw settings as collected from flags / environment, before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub team: Option<String>,
    pub api_token: Option<String>,
    pub api_base: Option<String>,
    pub max_body_length: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub strict_arguments: bool,
}

/// Immutable process configuration, resolved once at startup and shared
/// read-only by every invocation.
#[derive(Clone)]
pub struct NotepmConfig {
    pub team: Option<String>,
    pub api_base: String,
    api_token: String,
    pub max_body_length: usize,
    pub request_timeout: Duration,
    pub strict_arguments: bool,
}

impl NotepmConfig {
    pub fn resolve(inputs: ConfigInputs) -> Result<Self, ConfigError> {
        let api_token = non_blank(inputs.api_token).ok_or(ConfigError::MissingApiToken)?;
        let team = non_blank(inputs.team);

        let api_base = match non_blank(inputs.api_base) {
            Some(base) => {
                let base = base.trim_end_matches('/').to_string();
                if !(base.starts_with("https://") || base.starts_with("http://"))
                    || base.split_once("://").is_none_or(|(_, rest)| rest.is_empty())
                {
                    return Err(ConfigError::InvalidApiBase(base));
                }
                base
            }
            None => {
                let team = team.as_deref().ok_or(ConfigError::MissingTeam)?;
                if !is_valid_team(team) {
                    return Err(ConfigError::InvalidTeam(team.to_string()));
                }
                api_base_for_team(team)
            }
        };

        let max_body_length = inputs.max_body_length.unwrap_or(DEFAULT_MAX_BODY_LENGTH);
        if max_body_length == 0 {
            return Err(ConfigError::InvalidMaxBodyLength);
        }
        let timeout_secs = inputs
            .request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidRequestTimeout);
        }

        Ok(Self {
            team,
            api_base,
            api_token,
            max_body_length,
            request_timeout: Duration::from_secs(timeout_secs),
            strict_arguments: inputs.strict_arguments,
        })
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Overrides the request timeout. Sub-second values are only useful in tests.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl fmt::Debug for NotepmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotepmConfig")
            .field("team", &self.team)
            .field("api_base", &self.api_base)
            .field("api_token", &"<redacted>")
            .field("max_body_length", &self.max_body_length)
            .field("request_timeout", &self.request_timeout)
            .field("strict_arguments", &self.strict_arguments)
            .finish()
    }
}

pub fn api_base_for_team(team: &str) -> String {
    format!("https://{team}.{NOTEPM_DOMAIN}/api/v1")
}

fn is_valid_team(team: &str) -> bool {
    !team.starts_with('-')
        && !team.ends_with('-')
        && team.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(team: Option<&str>, token: Option<&str>) -> ConfigInputs {
        ConfigInputs {
            team: team.map(str::to_string),
            api_token: token.map(str::to_string),
            ..ConfigInputs::default()
        }
    }

    #[test]
    fn derives_api_base_from_team() {
        let config = NotepmConfig::resolve(inputs(Some("acme"), Some("tok"))).unwrap();
        assert_eq!(config.api_base, "https://acme.notepm.jp/api/v1");
        assert_eq!(config.api_token(), "tok");
        assert_eq!(config.max_body_length, DEFAULT_MAX_BODY_LENGTH);
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert!(!config.strict_arguments);
    }

    #[test]
    fn missing_or_blank_token_is_rejected() {
        assert_eq!(
            NotepmConfig::resolve(inputs(Some("acme"), None)).unwrap_err(),
            ConfigError::MissingApiToken
        );
        assert_eq!(
            NotepmConfig::resolve(inputs(Some("acme"), Some("   "))).unwrap_err(),
            ConfigError::MissingApiToken
        );
    }

    #[test]
    fn missing_team_is_rejected_without_api_base() {
        assert_eq!(
            NotepmConfig::resolve(inputs(None, Some("tok"))).unwrap_err(),
            ConfigError::MissingTeam
        );
    }

    #[test]
    fn team_must_be_a_subdomain_label() {
        assert_eq!(
            NotepmConfig::resolve(inputs(Some("acme.evil.com/x"), Some("tok"))).unwrap_err(),
            ConfigError::InvalidTeam("acme.evil.com/x".to_string())
        );
    }

    #[test]
    fn api_base_override_wins_and_drops_trailing_slash() {
        let config = NotepmConfig::resolve(ConfigInputs {
            api_base: Some("http://127.0.0.1:8080/api/v1/".to_string()),
            api_token: Some("tok".to_string()),
            ..ConfigInputs::default()
        })
        .unwrap();
        assert_eq!(config.api_base, "http://127.0.0.1:8080/api/v1");
        assert_eq!(config.team, None);
    }

    #[test]
    fn api_base_must_be_http_url() {
        let err = NotepmConfig::resolve(ConfigInputs {
            api_base: Some("ftp://example.com".to_string()),
            api_token: Some("tok".to_string()),
            ..ConfigInputs::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidApiBase("ftp://example.com".to_string())
        );
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut raw = inputs(Some("acme"), Some("tok"));
        raw.max_body_length = Some(0);
        assert_eq!(
            NotepmConfig::resolve(raw).unwrap_err(),
            ConfigError::InvalidMaxBodyLength
        );

        let mut raw = inputs(Some("acme"), Some("tok"));
        raw.request_timeout_secs = Some(0);
        assert_eq!(
            NotepmConfig::resolve(raw).unwrap_err(),
            ConfigError::InvalidRequestTimeout
        );
    }

    #[test]
    fn debug_output_redacts_token() {
        let config = NotepmConfig::resolve(inputs(Some("acme"), Some("secret-token"))).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
