//! Structured logging initialization shared by the CLI and tests.
//!
//! Console output by default; an optional daily-rolling file can be added
//! via `ACS_LOG_FILE`. Lifecycle events from the pool and backends are
//! plain `tracing` events, purely observational; callers never depend on
//! them for correctness.

use anyhow::Result;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt, registry};

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly single-line logs.
    Compact,
    /// JSON-formatted logs for machine parsing.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "compact" | "pretty" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional path for a daily-rolling log file.
    pub file_path: Option<PathBuf>,
    /// Per-target level overrides.
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            file_path: None,
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Build a logging configuration from environment variables.
    ///
    /// Supported: `ACS_LOG_LEVEL`, `ACS_LOG_FORMAT` (compact|json),
    /// `ACS_LOG_FILE`, `ACS_LOG_TARGETS` (comma-separated target=level).
    /// `RUST_LOG`, when set, wins over all of them.
    pub fn from_env(default_level: &str) -> Self {
        let mut config = Self {
            level: std::env::var("ACS_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string()),
            ..Self::default()
        };
        if let Some(format) = std::env::var("ACS_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
        {
            config.format = format;
        }
        if let Ok(path) = std::env::var("ACS_LOG_FILE") {
            if !path.trim().is_empty() {
                config.file_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(targets) = std::env::var("ACS_LOG_TARGETS") {
            config.targets = parse_target_overrides(&targets);
        }
        config
    }

    fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        let mut directives = self.level.clone();
        for (target, level) in &self.targets {
            directives.push_str(&format!(",{target}={level}"));
        }
        EnvFilter::new(directives)
    }
}

/// Keeps the non-blocking file writer alive for the life of the process.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Initialize tracing for the current process.
///
/// Returns a guard that must be kept alive while file logging is enabled.
/// Double initialization (tests) is tolerated.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard> {
    let console = match config.format {
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(false)
            .json()
            .boxed(),
    };

    let (file_layer, file_guard) = match config.file_path.as_ref() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().unwrap_or_else(|| OsStr::new("acs.log"));
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .compact()
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let init = registry()
        .with(config.env_filter())
        .with(console)
        .with(file_layer)
        .try_init();

    if let Err(err) = init {
        if !err.to_string().contains("already") {
            return Err(err.into());
        }
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn parse_target_overrides(value: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in value.split(',') {
        let Some((target, level)) = entry.trim().split_once('=') else {
            continue;
        };
        let target = target.trim();
        let level = level.trim().to_lowercase();
        if target.is_empty() || !is_valid_level(&level) {
            continue;
        }
        map.insert(target.to_string(), level);
    }
    map
}

fn is_valid_level(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_targets_drops_invalid_entries() {
        let targets =
            parse_target_overrides("acs_common::pool=debug,hyper=warn,bogus,acs=loud");
        assert_eq!(targets.get("acs_common::pool"), Some(&"debug".to_string()));
        assert_eq!(targets.get("hyper"), Some(&"warn".to_string()));
        assert!(!targets.contains_key("bogus"));
        assert!(!targets.contains_key("acs"));
    }

    #[test]
    fn format_parse_accepts_aliases() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("verbose"), None);
    }
}
