use crate::adapters::http::DEFAULT_USER_AGENT;
use crate::core::supervisor::SupervisorConfig;
use crate::utils::error::{AutoHostsError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_path, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Bootstrap configuration (`autohosts.toml`). Every field has a default,
/// so the file itself is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub daemon: DaemonConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub settings_file: String,
    pub sources_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            settings_file: "config.json".to_string(),
            sources_file: "urls.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub program: String,
    pub args: Vec<String>,
    pub hosts_flag: String,
    pub process_pattern: String,
    pub log_file: PathBuf,
    pub resolver_port: u16,
    pub settle_interval_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            program: defaults.program,
            args: defaults.args,
            hosts_flag: defaults.hosts_flag,
            process_pattern: defaults.process_pattern,
            log_file: defaults.log_file,
            resolver_port: defaults.resolver_port,
            settle_interval_ms: defaults.settle_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 檔案不存在時使用預設值
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            tracing::debug!("Loading configuration from {}", path.display());
            Self::from_file(path)
        } else {
            tracing::debug!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// 替換環境變數 (例如 ${DATA_DIR})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    /// Anchors a relative `data_dir` at the current working directory so
    /// every derived path (hosts file, logs, lock files) is absolute.
    pub fn with_absolute_data_dir(mut self) -> Result<Self> {
        if self.storage.data_dir.is_relative() {
            self.storage.data_dir = std::env::current_dir()?.join(&self.storage.data_dir);
        }
        Ok(self)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.settings_file)
    }

    pub fn sources_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.sources_file)
    }

    /// Advisory lock serializing sync passes across processes.
    pub fn sync_lock_path(&self) -> PathBuf {
        self.storage.data_dir.join(".sync.lock")
    }

    /// Relative log paths live under the data directory.
    pub fn log_path(&self) -> PathBuf {
        if self.daemon.log_file.is_absolute() {
            self.daemon.log_file.clone()
        } else {
            self.storage.data_dir.join(&self.daemon.log_file)
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            program: self.daemon.program.clone(),
            args: self.daemon.args.clone(),
            hosts_flag: self.daemon.hosts_flag.clone(),
            process_pattern: self.daemon.process_pattern.clone(),
            log_file: self.log_path(),
            resolver_port: self.daemon.resolver_port,
            settle_interval: Duration::from_millis(self.daemon.settle_interval_ms),
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_path(
            "storage.data_dir",
            &self.storage.data_dir.to_string_lossy(),
        )?;
        validate_non_empty_string("storage.settings_file", &self.storage.settings_file)?;
        validate_non_empty_string("storage.sources_file", &self.storage.sources_file)?;
        validate_non_empty_string("daemon.program", &self.daemon.program)?;
        validate_non_empty_string("daemon.process_pattern", &self.daemon.process_pattern)?;
        validate_non_empty_string("fetch.user_agent", &self.fetch.user_agent)?;

        if self.daemon.resolver_port == 0 {
            return Err(AutoHostsError::InvalidConfigValueError {
                field: "daemon.resolver_port".to_string(),
                value: "0".to_string(),
                reason: "Port must be between 1 and 65535".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.daemon.program, "dnsmasq");
        assert_eq!(config.daemon.settle_interval_ms, 1000);
        assert_eq!(config.fetch.user_agent, "DNSMasq-Manager/1.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let toml_content = r#"
[storage]
data_dir = "/var/lib/autohosts"

[daemon]
args = ["--keep-in-foreground"]
settle_interval_ms = 250
"#;
        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.sources_path(), PathBuf::from("/var/lib/autohosts/urls.json"));
        assert_eq!(config.log_path(), PathBuf::from("/var/lib/autohosts/dnsmasq.log"));

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.args, vec!["--keep-in-foreground"]);
        assert_eq!(supervisor.settle_interval, Duration::from_millis(250));
        assert_eq!(supervisor.hosts_flag, "--addn-hosts=");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("AUTOHOSTS_TEST_DATA_DIR", "/srv/autohosts");

        let config = AppConfig::from_toml_str(
            r#"
[storage]
data_dir = "${AUTOHOSTS_TEST_DATA_DIR}"
settings_file = "${AUTOHOSTS_TEST_UNSET_VAR}"
"#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/autohosts"));
        assert_eq!(config.storage.settings_file, "${AUTOHOSTS_TEST_UNSET_VAR}");

        std::env::remove_var("AUTOHOSTS_TEST_DATA_DIR");
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::from_toml_str(
            r#"
[daemon]
process_pattern = "  "
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str("[daemon]\nresolver_port = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[daemon]\nprogram = \"/usr/sbin/dnsmasq\"\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.daemon.program, "/usr/sbin/dnsmasq");

        let missing = AppConfig::load_or_default("/definitely/not/here.toml").unwrap();
        assert_eq!(missing, AppConfig::default());
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[daemon\nprogram = 1"),
            Err(AutoHostsError::TomlError(_))
        ));
    }

    #[test]
    fn test_relative_data_dir_is_anchored() {
        let config = AppConfig::from_toml_str("[storage]\ndata_dir = \"state\"\n")
            .unwrap()
            .with_absolute_data_dir()
            .unwrap();
        assert!(config.storage.data_dir.is_absolute());
        assert!(config.storage.data_dir.ends_with("state"));
        assert!(config.log_path().is_absolute());
        assert_eq!(config.sync_lock_path(), config.storage.data_dir.join(".sync.lock"));

        let fixed = AppConfig::from_toml_str("[storage]\ndata_dir = \"/var/lib/autohosts\"\n")
            .unwrap()
            .with_absolute_data_dir()
            .unwrap();
        assert_eq!(fixed.storage.data_dir, PathBuf::from("/var/lib/autohosts"));
    }
}
