use crate::domain::model::{HostsFileStats, HostsLine};
use crate::utils::error::{AutoHostsError, Result};
use crate::utils::fs::write_atomic;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

pub const NO_HOSTS_FILE: &str = "# No hosts file found";
pub const HOSTS_READ_ERROR: &str = "# Error reading hosts file";

/// Full file content: marker header, then one mapping per line.
pub fn render(lines: &[HostsLine], generated_at: DateTime<Utc>) -> String {
    let mut content = format!(
        "# DNSMasq hosts file\n\
         # Generated by AutoHosts\n\
         # Last updated: {}\n\
         # Total entries: {}\n\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        lines.len()
    );
    for line in lines {
        content.push_str(line.as_str());
        content.push('\n');
    }
    content
}

/// Replaces the hosts file in one rename; never merges with the old content.
pub async fn publish(path: &Path, lines: &[HostsLine]) -> Result<()> {
    let content = render(lines, Utc::now());
    write_atomic(path, content.as_bytes())
        .await
        .map_err(|source| AutoHostsError::HostsWriteError {
            path: path.display().to_string(),
            source,
        })?;
    tracing::info!("💾 Successfully wrote {} hosts to {}", lines.len(), path.display());
    Ok(())
}

pub async fn read_content(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => NO_HOSTS_FILE.to_string(),
        Err(e) => {
            tracing::error!("❌ Error reading hosts file {}: {}", path.display(), e);
            HOSTS_READ_ERROR.to_string()
        }
    }
}

/// Counts lines that are neither blank nor comments.
pub fn count_entries(content: &str) -> usize {
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .count()
}

pub async fn stats(path: &Path) -> HostsFileStats {
    let missing = HostsFileStats {
        file_path: path.to_path_buf(),
        exists: false,
        size: None,
        last_modified: None,
        line_count: None,
    };

    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::error!("❌ Error getting hosts stats: {}", e);
            }
            return missing;
        }
    };

    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("❌ Error getting hosts stats: {}", e);
            return missing;
        }
    };

    HostsFileStats {
        file_path: path.to_path_buf(),
        exists: true,
        size: Some(metadata.len()),
        last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        line_count: Some(count_entries(&content)),
    }
}
