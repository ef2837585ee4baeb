use serde::Serialize;
use thiserror::Error;

/// 由 OS / HTTP 邊界產生的錯誤種類，流程控制只看這個，不看錯誤字串
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    Timeout,
    NetworkError,
    PermissionDenied,
    Unknown,
}

impl ErrorKind {
    pub fn from_io(error: &std::io::Error) -> Self {
        if let Some(code) = error.raw_os_error() {
            return Self::from_errno(code);
        }
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::TimedOut => Self::Timeout,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => Self::NetworkError,
            _ => Self::Unknown,
        }
    }

    pub fn from_errno(code: i32) -> Self {
        match code {
            libc::ESRCH | libc::ENOENT => Self::NotFound,
            libc::EPERM | libc::EACCES => Self::PermissionDenied,
            libc::ETIMEDOUT => Self::Timeout,
            libc::ECONNREFUSED | libc::ECONNRESET | libc::ENETUNREACH | libc::EHOSTUNREACH => {
                Self::NetworkError
            }
            _ => Self::Unknown,
        }
    }
}

/// Failure of a single source fetch. Never escapes the orchestrator.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub body_snippet: Option<String>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            body_snippet: None,
        }
    }

    /// 記錄到 source.lastError 的完整描述
    pub fn detail(&self) -> String {
        let mut detail = self.message.clone();
        if let Some(status) = self.status {
            detail.push_str(&format!(" | status: {}", status));
        }
        if let Some(body) = self.body_snippet.as_deref().filter(|b| !b.is_empty()) {
            detail.push_str(&format!(" | data: {}", body));
        }
        detail
    }
}

#[derive(Error, Debug)]
pub enum AutoHostsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': '{value}' - {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronError { expression: String, reason: String },

    #[error("URL already exists: {url}")]
    DuplicateUrlError { url: String },

    #[error("URL not found: {id}")]
    SourceNotFoundError { id: String },

    #[error("A hosts fetch is already in progress")]
    SyncBusyError,

    #[error("Failed to write hosts file {path}: {source}")]
    HostsWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DNSMasq is already running (PID: {pid})")]
    AlreadyRunningError { pid: u32 },

    #[error("DNSMasq is not running")]
    NotRunningError,

    #[error("DNSMasq failed to start - {message}")]
    StartFailedError { message: String },

    #[error("DNSMasq is still running after forced termination (PID: {pid})")]
    StopFailedError { pid: u32 },

    #[error("Process introspection failed ({kind:?}): {message}")]
    IntrospectionError { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Fetch,
    Process,
    Persistence,
}

impl AutoHostsError {
    pub fn introspection(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::IntrospectionError {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IoError(e) => ErrorKind::from_io(e),
            Self::HostsWriteError { source, .. } => ErrorKind::from_io(source),
            Self::HttpClientError(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::HttpClientError(_) => ErrorKind::NetworkError,
            Self::SourceNotFoundError { .. } | Self::NotRunningError => ErrorKind::NotFound,
            Self::IntrospectionError { kind, .. } => *kind,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfigValueError { .. }
            | Self::InvalidCronError { .. }
            | Self::DuplicateUrlError { .. }
            | Self::SourceNotFoundError { .. } => ErrorCategory::Validation,
            Self::HttpClientError(_) | Self::SyncBusyError => ErrorCategory::Fetch,
            Self::AlreadyRunningError { .. }
            | Self::NotRunningError
            | Self::StartFailedError { .. }
            | Self::StopFailedError { .. }
            | Self::IntrospectionError { .. } => ErrorCategory::Process,
            Self::IoError(_)
            | Self::SerializationError(_)
            | Self::TomlError(_)
            | Self::HostsWriteError { .. } => ErrorCategory::Persistence,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Validation | ErrorCategory::Process => self.to_string(),
            ErrorCategory::Fetch => format!("Failed to fetch hosts: {}", self),
            ErrorCategory::Persistence => format!("Storage problem: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AutoHostsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_from_errno() {
        assert_eq!(ErrorKind::from_errno(libc::ESRCH), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_errno(libc::EPERM), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_errno(libc::EINVAL), ErrorKind::Unknown);
    }

    #[test]
    fn test_error_kind_from_io() {
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(ErrorKind::from_io(&e), ErrorKind::Timeout);

        let e = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(ErrorKind::from_io(&e), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_fetch_error_detail() {
        let mut error = FetchError::new(ErrorKind::Unknown, "Request failed with status code 503");
        assert_eq!(error.detail(), "Request failed with status code 503");

        error.status = Some(503);
        error.body_snippet = Some("maintenance".to_string());
        assert_eq!(
            error.detail(),
            "Request failed with status code 503 | status: 503 | data: maintenance"
        );
    }

    #[test]
    fn test_category() {
        assert_eq!(AutoHostsError::NotRunningError.category(), ErrorCategory::Process);
        assert_eq!(AutoHostsError::NotRunningError.kind(), ErrorKind::NotFound);
        let dup = AutoHostsError::DuplicateUrlError {
            url: "https://a".to_string(),
        };
        assert_eq!(dup.category(), ErrorCategory::Validation);
        assert_eq!(dup.to_string(), "URL already exists: https://a");
    }
}
