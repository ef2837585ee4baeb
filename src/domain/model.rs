use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A registered remote hosts-list URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Partial edit applied by `SourceRegistry::update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUpdate {
    pub url: Option<String>,
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

/// One validated `address hostname [hostname...]` record, kept as the
/// trimmed source line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostsLine(String);

impl HostsLine {
    /// Caller guarantees the line was validated by the parser.
    pub(crate) fn new_unchecked(line: String) -> Self {
        Self(line)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn address(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or_default()
    }

    pub fn hostnames(&self) -> Vec<&str> {
        self.0.split_whitespace().skip(1).collect()
    }
}

impl fmt::Display for HostsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of one synchronization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub hosts_count: usize,
    pub errors_count: usize,
}

/// Manual trigger report, shaped for CLI / API output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchNowReport {
    pub message: String,
    pub hosts_count: usize,
    pub errors_count: usize,
}

impl From<SyncResult> for FetchNowReport {
    fn from(result: SyncResult) -> Self {
        let message = if result.errors_count > 0 {
            format!(
                "Fetched {} hosts with {} errors",
                result.hosts_count, result.errors_count
            )
        } else {
            format!("Successfully fetched {} hosts", result.hosts_count)
        };
        Self {
            message,
            hosts_count: result.hosts_count,
            errors_count: result.errors_count,
        }
    }
}

/// Live daemon state, recomputed from the process table on every query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub is_running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(rename = "port", skip_serializing_if = "Option::is_none")]
    pub bound_port: Option<u16>,
}

impl ProcessStatus {
    pub fn stopped() -> Self {
        Self::default()
    }
}

/// Runtime settings persisted by the settings store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "hostsFetchCron")]
    pub cron_expression: String,
    #[serde(rename = "hostsFilePath")]
    pub hosts_file_path: PathBuf,
    #[serde(rename = "hostsFetchTimeout")]
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostsFileStats {
    pub file_path: PathBuf,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_count: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosts_line_tokens() {
        let line = HostsLine::new_unchecked("10.0.0.1   nas.lan  nas".to_string());
        assert_eq!(line.address(), "10.0.0.1");
        assert_eq!(line.hostnames(), vec!["nas.lan", "nas"]);
        assert_eq!(line.to_string(), "10.0.0.1   nas.lan  nas");
    }

    #[test]
    fn test_fetch_now_report_messages() {
        let ok = FetchNowReport::from(SyncResult {
            hosts_count: 12,
            errors_count: 0,
        });
        assert_eq!(ok.message, "Successfully fetched 12 hosts");

        let partial = FetchNowReport::from(SyncResult {
            hosts_count: 3,
            errors_count: 2,
        });
        assert_eq!(partial.message, "Fetched 3 hosts with 2 errors");
    }

    #[test]
    fn test_source_json_shape() {
        let source = Source {
            id: "abc".to_string(),
            url: "https://example.com/hosts".to_string(),
            name: None,
            enabled: true,
            last_fetch: None,
            last_error: Some("timeout".to_string()),
        };
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["lastError"], "timeout");
        assert!(json.get("lastFetch").is_none());
    }
}
