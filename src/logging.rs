//! Logging setup for parun.
//!
//! Diagnostics go to stderr (and optionally a log file) through `tracing`;
//! stdout is reserved for per-item results and the run summary.
//!
//! # Environment Variables
//!
//! - `PARUN_LOG` - Log filter (overrides RUST_LOG)
//! - `PARUN_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `PARUN_LOG_FORMAT` - Output format: pretty, compact, json
//! - `PARUN_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human-readable format
    Pretty,
    /// Compact single-line format (default)
    #[default]
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    pub format: LogFormat,
    /// Path to log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// ANSI colors on stderr (default: true)
    pub ansi: bool,
    /// Show target module in logs (default: false)
    pub show_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            file_path: None,
            filter: None,
            ansi: true,
            show_target: false,
        }
    }
}

impl LogConfig {
    /// Level for a `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace.
    ///
    /// `quiet` lowers the level to errors only.
    pub fn for_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::WARN,
            (false, 1) => Level::INFO,
            (false, 2) => Level::DEBUG,
            (false, _) => Level::TRACE,
        };
        let mut config = Self::default().with_level(level);
        // An explicit -v wins over environment filters
        if verbose > 0 {
            config.filter = Some(level.to_string().to_lowercase());
        }
        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// Reads from:
    /// - `PARUN_LOG` or `RUST_LOG` for filter (only if filter not already set from CLI)
    /// - `PARUN_LOG_LEVEL` for level (only if filter not already set)
    /// - `PARUN_LOG_FORMAT` for format
    /// - `PARUN_LOG_FILE` for file path (only if not already set from CLI)
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none() {
            if let Ok(filter) = std::env::var("PARUN_LOG") {
                self.filter = Some(filter);
            } else if let Ok(filter) = std::env::var("RUST_LOG") {
                self.filter = Some(filter);
            }
        }

        if self.filter.is_none()
            && let Ok(level_str) = std::env::var("PARUN_LOG_LEVEL")
        {
            self.level = parse_level(&level_str).unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("PARUN_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        if self.file_path.is_none()
            && let Ok(path) = std::env::var("PARUN_LOG_FILE")
        {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    /// Build the EnvFilter for this configuration.
    fn build_filter(&self) -> EnvFilter {
        let default = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                default()
            }),
            None => default(),
        }
    }

    /// One formatted, filtered layer writing to `writer`.
    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_target(self.show_target)
            .with_ansi(ansi)
            .with_writer(writer);
        match self.format {
            LogFormat::Json => base.json().with_filter(self.build_filter()).boxed(),
            LogFormat::Compact => base.compact().with_filter(self.build_filter()).boxed(),
            LogFormat::Pretty => base
                .with_thread_names(true)
                .with_filter(self.build_filter())
                .boxed(),
        }
    }
}

/// Parse a log level string.
fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Non-rotating appender for `path`.
fn file_appender(path: &Path) -> RollingFileAppender {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("parun.log");
    RollingFileAppender::new(Rotation::NEVER, parent, file_name)
}

/// Initialize the global tracing subscriber.
///
/// Logs to stderr, and also to `config.file_path` when set. This should be
/// called once at program startup; subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let mut layers = vec![config.layer(std::io::stderr, config.ansi)];
    if let Some(path) = &config.file_path {
        layers.push(config.layer(file_appender(path), false));
    }

    // Silently ignore if already initialized (idempotent)
    let _ = tracing_subscriber::registry().with(layers).try_init();
}
