//! Configuration management

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::batch::DEFAULT_BATCH_CONCURRENCY;
use crate::chop::DEFAULT_CHUNK_LINES;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/insp";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Suffixes whose body is searched by the content rules.
pub const DEFAULT_TEXT_SUFFIXES: &str = "txt";

/// Suffixes that are chopped into chunk objects.
pub const DEFAULT_TABULAR_SUFFIXES: &str = "csv";

/// Device clocks are read as UTC unless configured otherwise.
pub const DEFAULT_SOURCE_UTC_OFFSET: &str = "+00:00";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub database: DatabaseConfig,
    pub spec: SpecLocation,
    pub chop: ChopSettings,
    pub suffixes: SuffixConfig,
    /// `+HH:MM` / `-HH:MM`
    pub source_utc_offset: String,
    pub batch_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecLocation {
    S3 { bucket: String, key: String },
    File(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChopSettings {
    pub target_bucket: Option<String>,
    pub chunk_lines: usize,
    pub system_codes: HashSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuffixConfig {
    pub text: HashSet<String>,
    pub tabular: HashSet<String>,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Comma-separated list; entries are trimmed and empty ones dropped
fn list(value: &str, lowercase: bool) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}

/// Parse `+01:00`, `-05:30`, `Z` or `UTC`
pub fn parse_utc_offset(value: &str) -> anyhow::Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow::anyhow!("Invalid UTC offset"));
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => anyhow::bail!("UTC offset must start with '+' or '-': {}", value),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("UTC offset must be formatted as +HH:MM: {}", value))?;
    let hours: i32 = hours.parse()?;
    let minutes: i32 = minutes.parse()?;
    if hours > 14 || minutes > 59 {
        anyhow::bail!("UTC offset out of range: {}", value);
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("UTC offset out of range: {}", value))
}

impl PipelineConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let spec = match std::env::var("INSP_SPEC_PATH") {
            Ok(path) => SpecLocation::File(PathBuf::from(path)),
            Err(_) => SpecLocation::S3 {
                bucket: std::env::var("INSP_SPEC_BUCKET").unwrap_or_default(),
                key: std::env::var("INSP_SPEC_KEY").unwrap_or_default(),
            },
        };

        let config = PipelineConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            spec,
            chop: ChopSettings {
                target_bucket: std::env::var("INSP_CHUNK_BUCKET").ok().filter(|b| !b.is_empty()),
                chunk_lines: env_or("INSP_CHUNK_LINES", DEFAULT_CHUNK_LINES),
                system_codes: list(&std::env::var("INSP_SYSTEM_CODES").unwrap_or_default(), false),
            },
            suffixes: SuffixConfig {
                text: list(
                    &std::env::var("INSP_TEXT_SUFFIXES")
                        .unwrap_or_else(|_| DEFAULT_TEXT_SUFFIXES.to_string()),
                    true,
                ),
                tabular: list(
                    &std::env::var("INSP_TABULAR_SUFFIXES")
                        .unwrap_or_else(|_| DEFAULT_TABULAR_SUFFIXES.to_string()),
                    true,
                ),
            },
            source_utc_offset: std::env::var("INSP_SOURCE_UTC_OFFSET")
                .unwrap_or_else(|_| DEFAULT_SOURCE_UTC_OFFSET.to_string()),
            batch_concurrency: env_or("INSP_BATCH_CONCURRENCY", DEFAULT_BATCH_CONCURRENCY),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if let SpecLocation::S3 { bucket, key } = &self.spec {
            if bucket.is_empty() || key.is_empty() {
                anyhow::bail!("Set INSP_SPEC_PATH or both INSP_SPEC_BUCKET and INSP_SPEC_KEY");
            }
        }

        if self.chop.chunk_lines == 0 {
            anyhow::bail!("INSP_CHUNK_LINES must be greater than 0");
        }

        if self.batch_concurrency == 0 {
            anyhow::bail!("INSP_BATCH_CONCURRENCY must be greater than 0");
        }

        if let Some(overlap) = self.suffixes.text.intersection(&self.suffixes.tabular).next() {
            anyhow::bail!("Suffix '{}' cannot be both text and tabular", overlap);
        }

        parse_utc_offset(&self.source_utc_offset)?;

        if self.chop.system_codes.is_empty() {
            tracing::warn!("No system codes configured - every tabular file will be chopped");
        }

        Ok(())
    }

    pub fn source_offset(&self) -> anyhow::Result<FixedOffset> {
        parse_utc_offset(&self.source_utc_offset)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            spec: SpecLocation::File(PathBuf::from("extraction-spec.json")),
            chop: ChopSettings {
                target_bucket: None,
                chunk_lines: DEFAULT_CHUNK_LINES,
                system_codes: HashSet::new(),
            },
            suffixes: SuffixConfig {
                text: list(DEFAULT_TEXT_SUFFIXES, true),
                tabular: list(DEFAULT_TABULAR_SUFFIXES, true),
            },
            source_utc_offset: DEFAULT_SOURCE_UTC_OFFSET.to_string(),
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.chop.chunk_lines, 50_000);
        assert!(config.suffixes.text.contains("txt"));
        assert!(config.suffixes.tabular.contains("csv"));
    }

    #[test]
    fn test_validate_rejects_bad_pool_settings() {
        let mut config = PipelineConfig::default();
        config.database.min_connections = 20;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_spec_location() {
        let mut config = PipelineConfig::default();
        config.spec = SpecLocation::S3 {
            bucket: "config".to_string(),
            key: String::new(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlapping_suffixes() {
        let mut config = PipelineConfig::default();
        config.suffixes.tabular.insert("txt".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+01:00").unwrap().local_minus_utc(), 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("0100").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }

    #[test]
    fn test_list_parsing() {
        let codes = list(" CMM, XRF ,,", false);
        assert_eq!(codes.len(), 2);
        assert!(codes.contains("CMM") && codes.contains("XRF"));
        assert!(list("CSV,Txt", true).contains("txt"));
    }
}
