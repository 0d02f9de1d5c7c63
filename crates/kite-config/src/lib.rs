//! Kite configuration: TOML loading, workspace discovery and tracing setup.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Once, OnceLock};

use parking_lot::{Mutex, MutexGuard, ReentrantMutex};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` for TOML errors renders the offending source line; keep only the message.
        ConfigError::Toml(sanitize_toml_message(err.message()))
    }
}

/// Top-level configuration for a Kite workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KiteConfig {
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    pub completion: CompletionConfig,
}

impl KiteConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: KiteConfig = toml::from_str(text)?;
        config.sources.normalize();
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    pub level: String,
    pub json: bool,
    pub stderr: bool,
    /// Append-mode log file, written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            _ => trimmed.to_owned(),
        }
    }

    fn config_env_filter(&self) -> tracing_subscriber::EnvFilter {
        let directives = Self::normalize_level_directives(&self.level);
        tracing_subscriber::EnvFilter::try_new(directives).unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::default()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        })
    }

    /// The effective filter: the configured level with `RUST_LOG` merged on top.
    pub fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = std::env::var("RUST_LOG")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(env_directives))
                    .unwrap_or_else(|_| self.config_env_filter())
            }
            None => self.config_env_filter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Size of the read-only worker pool. `None` sizes it from the available parallelism.
    pub read_threads: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub extensions: Vec<String>,
    pub exclude_dirs: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["kt".to_owned(), "kts".to_owned()],
            exclude_dirs: ["build", ".git", ".gradle", "out", "node_modules"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl SourcesConfig {
    /// Accepts `.kt` as well as `kt` and drops duplicates.
    fn normalize(&mut self) {
        let mut extensions: Vec<String> = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_owned())
            .filter(|ext| !ext.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        self.extensions = extensions;

        self.exclude_dirs.retain(|dir| !dir.trim().is_empty());
        self.exclude_dirs.sort();
        self.exclude_dirs.dedup();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompletionConfig {
    /// Offer snippet completions when the client supports them.
    pub snippets: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self { snippets: true }
    }
}

fn quoted_string_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#).ok())
        .as_ref()
}

/// Strips user-controlled values (quoted strings, unknown keys, bad scalars) from a TOML
/// diagnostic. Schema names in the `expected ...` tail are kept.
fn sanitize_toml_message(message: &str) -> String {
    let mut out = match quoted_string_re() {
        Some(re) => re.replace_all(message, "\"<redacted>\"").into_owned(),
        None => message.to_owned(),
    };

    let boundary = out.find(", expected").unwrap_or(out.len());
    let redact_backticks = ["unknown field `", "unknown variant `", "invalid type:", "invalid value:"]
        .iter()
        .any(|pattern| out[..boundary].contains(pattern));
    if redact_backticks {
        if let Some(start) = out[..boundary].find('`') {
            if let Some(end_rel) = out[start + 1..boundary].rfind('`') {
                out.replace_range(start + 1..start + 1 + end_rel, "<redacted>");
            }
        }
    }
    out
}

pub const KITE_CONFIG_ENV_VAR: &str = "KITE_CONFIG_PATH";

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// [`KITE_CONFIG_ENV_VAR`] is process-global; tests that set it wrap the mutation and the
/// discovery in this helper so concurrent discovery never observes a temporary override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `KITE_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `kite.toml` in `workspace_root`
/// 3) `.kite.toml` in `workspace_root`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(KITE_CONFIG_ENV_VAR) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            workspace_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["kite.toml", ".kite.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`KiteConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(KiteConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((KiteConfig::default(), None));
    };

    let config = KiteConfig::load_from_path(&path)?;
    tracing::debug!(target: "kite.config", path = %path.display(), "loaded config");
    Ok((config, Some(path)))
}

/// Reload the configuration for a workspace root and report whether it changed.
pub fn reload_for_workspace(
    workspace_root: &Path,
    previous: &KiteConfig,
    previous_path: Option<&Path>,
) -> Result<(KiteConfig, Option<PathBuf>, bool), ConfigError> {
    let (config, path) = load_for_workspace(workspace_root)?;
    let changed = path.as_deref() != previous_path || &config != previous;
    Ok((config, path, changed))
}

struct MutexFileMakeWriter {
    file: Mutex<File>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            guard: self.file.lock(),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: MutexGuard<'a, File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Initializes structured `tracing` logging.
///
/// Safe to call multiple times; only the first call installs a global subscriber.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let mut file_error = None;
        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| file_error = Some((path.clone(), err)))
                .ok()
        });

        let mut writer: Option<BoxMakeWriter> = None;
        if logging.stderr {
            // Test output capture only sees `eprint!`; `TestWriter` keeps `cargo test` quiet.
            writer = Some(if cfg!(debug_assertions) {
                BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
            } else {
                BoxMakeWriter::new(std::io::stderr)
            });
        }
        if let Some(file) = file {
            let file_writer = MutexFileMakeWriter {
                file: Mutex::new(file),
            };
            writer = Some(match writer {
                Some(writer) => BoxMakeWriter::new(writer.and(file_writer)),
                None => BoxMakeWriter::new(file_writer),
            });
        }
        let writer = writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::sink));

        let layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        // Another subscriber may already be installed (tests, embedding hosts).
        let _ = tracing::subscriber::set_global_default(subscriber);

        if let Some((path, err)) = file_error {
            tracing::warn!(
                target: "kite.config",
                path = %path.display(),
                error = %err,
                "failed to open log file"
            );
        }
    });
}
