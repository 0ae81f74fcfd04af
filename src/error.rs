use std::fmt;

use serde::Deserialize;

/// Low-level cause of a request that never produced an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Timeout,
    Connect,
    Other,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Timeout => write!(f, "timeout"),
            TransportKind::Connect => write!(f, "connection failure"),
            TransportKind::Other => write!(f, "request failure"),
        }
    }
}

/// A raw failure from a catalog adapter, carrying the transport metadata unmodified.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("HTTP {status}: {body}")]
    Http {
        status: u16,
        /// Server-provided `Retry-After`, already converted to milliseconds.
        retry_after_ms: Option<u64>,
        body: String,
    },
    #[error("{kind}: {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },
    #[error("Unrecognized response envelope: {0}")]
    Envelope(String),
}

impl CatalogError {
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return CatalogError::Envelope(error.to_string());
        }
        if let Some(status) = error.status() {
            return CatalogError::Http {
                status: status.as_u16(),
                retry_after_ms: None,
                body: error.to_string(),
            };
        }
        let kind = if error.is_timeout() {
            TransportKind::Timeout
        } else if error.is_connect() {
            TransportKind::Connect
        } else {
            TransportKind::Other
        };
        CatalogError::Transport {
            kind,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    RateLimit,
    Network,
    ServiceUnavailable,
    ClientError,
    Unknown,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit | ErrorKind::Network | ErrorKind::ServiceUnavailable
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rate limit",
            ErrorKind::Network => "network",
            ErrorKind::ServiceUnavailable => "service unavailable",
            ErrorKind::ClientError => "client error",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// A catalog failure sorted into the retry taxonomy.
///
/// Only obtainable through `From<CatalogError>`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    retryable: bool,
    retry_after_ms: Option<u64>,
    message: String,
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn retryable(&self) -> bool {
        self.retryable
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    fn new(kind: ErrorKind, retry_after_ms: Option<u64>, message: String) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            retry_after_ms,
            message,
        }
    }
}

/// OAuth error codes that mean the bearer token itself is bad.
const OAUTH_AUTH_ERRORS: &[&str] = &[
    "invalid_token",
    "invalid_grant",
    "invalid_client",
    "unauthorized_client",
];

#[derive(Deserialize)]
struct OAuthErrorBody {
    error: String,
}

fn is_oauth_error_payload(body: &str) -> bool {
    serde_json::from_str::<OAuthErrorBody>(body)
        .map(|payload| OAUTH_AUTH_ERRORS.contains(&payload.error.as_str()))
        .unwrap_or(false)
}

impl From<CatalogError> for ClassifiedError {
    fn from(error: CatalogError) -> Self {
        let message = error.to_string();
        match error {
            CatalogError::Http { status, .. } if status == 401 || status == 403 => {
                ClassifiedError::new(ErrorKind::Auth, None, message)
            }
            CatalogError::Http {
                status: 400,
                ref body,
                ..
            } if is_oauth_error_payload(body) => ClassifiedError::new(ErrorKind::Auth, None, message),
            CatalogError::Http {
                status: 429,
                retry_after_ms,
                ..
            } => ClassifiedError::new(ErrorKind::RateLimit, retry_after_ms, message),
            CatalogError::Http { status, .. } if (500..600).contains(&status) => {
                ClassifiedError::new(ErrorKind::ServiceUnavailable, None, message)
            }
            CatalogError::Http { status, .. } if (400..500).contains(&status) => {
                ClassifiedError::new(ErrorKind::ClientError, None, message)
            }
            CatalogError::Http { .. } => ClassifiedError::new(ErrorKind::Unknown, None, message),
            CatalogError::Transport {
                kind: TransportKind::Timeout | TransportKind::Connect,
                ..
            } => ClassifiedError::new(ErrorKind::Network, None, message),
            CatalogError::Transport { .. } => {
                ClassifiedError::new(ErrorKind::Unknown, None, message)
            }
            CatalogError::Envelope(_) => {
                ClassifiedError::new(ErrorKind::ClientError, None, message)
            }
        }
    }
}

/// The final error of a retried operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct RetryError {
    pub operation: String,
    pub attempts: u32,
    #[source]
    pub source: ClassifiedError,
}

impl RetryError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn is_auth(&self) -> bool {
        self.source.is_auth()
    }
}

/// Errors that abort a whole sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Authentication failed, re-authenticate and try again: {0}")]
    Auth(RetryError),
    #[error("Failed to fetch playlist roster: {0}")]
    Roster(RetryError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("No config directory found for this platform")]
    NoConfigDir,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16, retry_after_ms: Option<u64>, body: &str) -> CatalogError {
        CatalogError::Http {
            status,
            retry_after_ms,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_auth_statuses_are_not_retryable() {
        for status in [401, 403] {
            let classified = ClassifiedError::from(http(status, None, "nope"));
            assert_eq!(classified.kind(), ErrorKind::Auth);
            assert!(!classified.retryable());
        }
    }

    #[test]
    fn test_oauth_payload_is_auth() {
        let classified = ClassifiedError::from(http(
            400,
            None,
            r#"{"error":"invalid_grant","error_description":"x"}"#,
        ));
        assert_eq!(classified.kind(), ErrorKind::Auth);

        let classified = ClassifiedError::from(http(400, None, r#"{"errors":[{"code":"bad"}]}"#));
        assert_eq!(classified.kind(), ErrorKind::ClientError);
    }

    #[test]
    fn test_rate_limit_keeps_retry_after() {
        let classified = ClassifiedError::from(http(429, Some(3000), ""));
        assert_eq!(classified.kind(), ErrorKind::RateLimit);
        assert!(classified.retryable());
        assert_eq!(classified.retry_after_ms(), Some(3000));
    }

    #[test]
    fn test_server_errors_and_network_are_retryable() {
        let classified = ClassifiedError::from(http(503, None, "down"));
        assert_eq!(classified.kind(), ErrorKind::ServiceUnavailable);
        assert!(classified.retryable());

        let classified = ClassifiedError::from(CatalogError::Transport {
            kind: TransportKind::Timeout,
            message: "timed out".into(),
        });
        assert_eq!(classified.kind(), ErrorKind::Network);
        assert!(classified.retryable());
    }

    #[test]
    fn test_client_and_unknown_are_not_retryable() {
        let classified = ClassifiedError::from(http(404, None, "missing"));
        assert_eq!(classified.kind(), ErrorKind::ClientError);
        assert!(!classified.retryable());

        let classified = ClassifiedError::from(CatalogError::Envelope("no data".into()));
        assert_eq!(classified.kind(), ErrorKind::ClientError);

        let classified = ClassifiedError::from(CatalogError::Transport {
            kind: TransportKind::Other,
            message: "weird".into(),
        });
        assert_eq!(classified.kind(), ErrorKind::Unknown);
        assert!(!classified.retryable());
    }
}
