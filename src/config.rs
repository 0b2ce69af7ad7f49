//! Configuration management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

/// Archive root; one index resource per month lives beneath it.
pub const DEFAULT_ARCHIVE_URL: &str = "https://lists.debian.org/debian-devel-changes/";

/// Earliest year enumerated by default. The notification format is stable
/// from 2008 onward; earlier eras are quarantined, not parsed.
pub const EARLIEST_YEAR: i32 = 2008;

/// Default bound on concurrent message fetches.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Destination for the output dataset.
    pub output_path: PathBuf,
    /// Destination for the URL cache (grows without bound).
    pub cache_path: PathBuf,
    /// Archive root URL.
    pub archive_url: String,
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay before each request in milliseconds.
    pub request_delay_ms: u64,
    /// Retries per request before the unit is skipped.
    pub max_retries: u32,
    /// Maximum concurrent message fetches.
    pub concurrency: usize,
    /// Restrict index enumeration to one year.
    pub year: Option<i32>,
    /// Further restrict to one month within that year (1-12).
    pub month: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        // Cache lives under the user cache dir, separate from the output
        // dataset. Falls back gracefully to the current directory.
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("debchanges");

        Self {
            output_path: PathBuf::from("upload-history.db"),
            cache_path: cache_dir.join("url-cache.db"),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            user_agent: "debchanges/0.3 (upload history extractor)".to_string(),
            request_timeout: 30,
            request_delay_ms: 100,
            max_retries: 3,
            concurrency: DEFAULT_CONCURRENCY,
            year: None,
            month: None,
        }
    }
}

impl Settings {
    /// The archive root as a URL, normalized so month paths join beneath it.
    pub fn archive_base_url(&self) -> Result<Url, url::ParseError> {
        let mut raw = self.archive_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
    }

    /// Ensure the parent directories of both databases exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for path in [&self.output_path, &self.cache_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }
}

/// Configuration file structure (TOML).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Output database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Cache database path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    /// Archive root URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    /// User agent string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay before each request in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Retries per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Maximum concurrent message fetches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {}", path.display(), e))?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Resolve a path that may be relative to the config file.
    fn resolve_path(&self, path_str: &str) -> PathBuf {
        let path = Path::new(path_str);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match self.source_path.as_ref().and_then(|p| p.parent()) {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref output) = self.output {
            settings.output_path = self.resolve_path(output);
        }
        if let Some(ref cache) = self.cache {
            settings.cache_path = self.resolve_path(cache);
        }
        if let Some(ref archive_url) = self.archive_url {
            settings.archive_url = archive_url.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gains_trailing_slash() {
        let settings = Settings {
            archive_url: "https://lists.example.org/devel-changes".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.archive_base_url().unwrap().as_str(),
            "https://lists.example.org/devel-changes/"
        );
    }

    #[test]
    fn test_config_applies_overrides() {
        let config: Config = toml::from_str(
            r#"
            output = "/data/history.db"
            archive_url = "https://mirror.example.org/changes/"
            concurrency = 4
            "#,
        )
        .unwrap();

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(settings.output_path, PathBuf::from("/data/history.db"));
        assert_eq!(settings.archive_url, "https://mirror.example.org/changes/");
        assert_eq!(settings.concurrency, 4);
        // Untouched fields keep their defaults.
        assert_eq!(settings.request_timeout, 30);
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let config = Config {
            output: Some("history.db".to_string()),
            source_path: Some(PathBuf::from("/etc/debchanges/config.toml")),
            ..Default::default()
        };
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(
            settings.output_path,
            PathBuf::from("/etc/debchanges/history.db")
        );
    }
}
