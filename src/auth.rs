use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Command;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// How a profile authenticates its requests.
///
/// When `command` is set it runs before every request and its output
/// replaces `credentials`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credentials: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub auth_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key_header: String,
}

impl AuthConfig {
    pub fn is_empty(&self) -> bool {
        self == &AuthConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Bearer,
    Basic,
    ApiKey,
}

impl AuthType {
    pub const ALL: [AuthType; 3] = [AuthType::Bearer, AuthType::Basic, AuthType::ApiKey];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Bearer => "bearer",
            AuthType::Basic => "basic",
            AuthType::ApiKey => "api-key",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthType {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AuthError::TypeNotSpecified);
        }
        AuthType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuthError::UnrecognizedType(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("run command: {0}")]
    Command(String),

    #[error("run command: no credentials received")]
    NoCredentials,

    #[error("auth type not specified")]
    TypeNotSpecified,

    #[error("unrecognized auth type {0:?}")]
    UnrecognizedType(String),

    #[error("invalid api key header {0:?}")]
    InvalidHeaderName(String),

    #[error("credentials can't be sent in the {0} header")]
    InvalidCredentials(String),
}

/// Returns the header name and value carrying the credentials.
pub fn auth_header(kind: AuthType, credentials: &str, api_key_header: &str) -> (String, String) {
    match kind {
        AuthType::Bearer => (AUTHORIZATION.to_string(), format!("Bearer {credentials}")),
        AuthType::Basic => (
            AUTHORIZATION.to_string(),
            format!("Basic {}", STANDARD.encode(credentials)),
        ),
        AuthType::ApiKey => {
            let name = if api_key_header.is_empty() {
                DEFAULT_API_KEY_HEADER
            } else {
                api_key_header
            };
            (name.to_string(), credentials.to_string())
        }
    }
}

/// Sets the auth header for `cfg`, running its credential command through `run`.
///
/// A profile without credentials or a command is left unauthenticated.
pub fn authenticate<F>(headers: &mut HeaderMap, cfg: &AuthConfig, run: F) -> Result<(), AuthError>
where
    F: FnOnce(&str) -> Result<String, String>,
{
    if cfg.credentials.is_empty() && cfg.command.is_empty() {
        return Ok(());
    }
    let credentials = if cfg.command.is_empty() {
        cfg.credentials.clone()
    } else {
        log::debug!("running auth command");
        let output = run(&cfg.command).map_err(AuthError::Command)?;
        let output = output.trim();
        if output.is_empty() {
            return Err(AuthError::NoCredentials);
        }
        output.to_string()
    };

    let kind: AuthType = cfg.auth_type.parse()?;
    let (name, value) = auth_header(kind, &credentials, &cfg.api_key_header);
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AuthError::InvalidHeaderName(name.clone()))?;
    let value = HeaderValue::from_str(&value)
        .map_err(|_| AuthError::InvalidCredentials(name.to_string()))?;
    headers.insert(name, value);
    Ok(())
}

/// Runs `command` through `sh -c` and returns its trimmed stdout.
///
/// On failure the error is the command's trimmed stderr.
pub fn run_command(command: &str) -> Result<String, String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .map_err(|err| err.to_string())?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            return Err(format!("command exited with {}", output.status));
        }
        return Err(stderr);
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_command(_: &str) -> Result<String, String> {
        panic!("no command expected")
    }

    fn apply(cfg: &AuthConfig) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::new();
        authenticate(&mut headers, cfg, no_command)?;
        Ok(headers)
    }

    #[test]
    fn no_credentials_is_a_no_op() {
        let headers = apply(&AuthConfig::default()).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn requires_a_known_type() {
        let cfg = AuthConfig {
            credentials: "MYKEY".into(),
            ..Default::default()
        };
        assert_eq!(apply(&cfg).unwrap_err().to_string(), "auth type not specified");

        let cfg = AuthConfig {
            credentials: "MYKEY".into(),
            auth_type: "apikey".into(),
            ..Default::default()
        };
        assert_eq!(
            apply(&cfg).unwrap_err().to_string(),
            r#"unrecognized auth type "apikey""#
        );
    }

    #[test]
    fn api_key_uses_default_or_custom_header() {
        let cfg = AuthConfig {
            credentials: "MYKEY".into(),
            auth_type: "api-key".into(),
            ..Default::default()
        };
        let headers = apply(&cfg).unwrap();
        assert_eq!(headers.get("X-API-Key").unwrap(), "MYKEY");

        let cfg = AuthConfig {
            api_key_header: "X-MyApp-Key".into(),
            ..cfg
        };
        let headers = apply(&cfg).unwrap();
        assert_eq!(headers.get("X-MyApp-Key").unwrap(), "MYKEY");
        assert!(headers.get("X-API-Key").is_none());
    }

    #[test]
    fn basic_and_bearer() {
        let cfg = AuthConfig {
            credentials: "myuser:mypass".into(),
            auth_type: "basic".into(),
            ..Default::default()
        };
        let headers = apply(&cfg).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Basic bXl1c2VyOm15cGFzcw==");

        let cfg = AuthConfig {
            credentials: "MYTOKEN".into(),
            auth_type: "bearer".into(),
            ..Default::default()
        };
        let headers = apply(&cfg).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer MYTOKEN");
    }

    #[test]
    fn command_output_replaces_credentials() {
        let cfg = AuthConfig {
            credentials: "STALE".into(),
            command: "get-token".into(),
            auth_type: "bearer".into(),
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        authenticate(&mut headers, &cfg, |command| {
            assert_eq!(command, "get-token");
            Ok("  FRESH\n".to_string())
        })
        .unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer FRESH");
    }

    #[test]
    fn command_failures() {
        let cfg = AuthConfig {
            command: "get-token".into(),
            auth_type: "bearer".into(),
            ..Default::default()
        };
        let mut headers = HeaderMap::new();
        let err = authenticate(&mut headers, &cfg, |_| Ok("\n".to_string())).unwrap_err();
        assert_eq!(err.to_string(), "run command: no credentials received");

        let err = authenticate(&mut headers, &cfg, |_| Err("token expired".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "run command: token expired");
        assert!(headers.is_empty());
    }

    #[test]
    fn runs_shell_commands() {
        assert_eq!(run_command("echo '  MYTOKEN  '"), Ok("MYTOKEN".to_string()));
        assert_eq!(run_command("echo oops >&2; exit 3"), Err("oops".to_string()));
    }

    #[test]
    fn parses_auth_types() {
        assert_eq!("api-key".parse(), Ok(AuthType::ApiKey));
        assert_eq!("basic".parse(), Ok(AuthType::Basic));
        assert_eq!("bearer".parse::<AuthType>().unwrap().to_string(), "bearer");
    }
}
