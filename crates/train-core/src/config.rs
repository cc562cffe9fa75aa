//! Configuration types for an Event Train instance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;
use train_proto::follows_convention;

/// Crate prefix applied to short logging target names.
const TARGET_PREFIX: &str = "train_core";

/// Top-level configuration, usually loaded from `train.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Names enlisted into the Public namespace at bootstrap.
    #[serde(default)]
    pub public_events: Vec<String>,

    /// Names enlisted into the Private namespace at bootstrap.
    #[serde(default)]
    pub private_events: Vec<String>,

    /// Selectors added to the default frame selectors.
    #[serde(default)]
    pub frame_selectors: Vec<String>,

    /// Whether an embedding context answers a frame's catalog with its own.
    #[serde(default = "default_true")]
    pub acknowledge_handshake: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Suppress all warnings (for CI environments).
    #[serde(default, rename = "_suppress_warnings")]
    pub suppress_warnings: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            public_events: Vec::new(),
            private_events: Vec::new(),
            frame_selectors: Vec::new(),
            acknowledge_handshake: true,
            logging: LoggingConfig::default(),
            suppress_warnings: false,
        }
    }
}

impl TrainConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        debug!(path = %path_ref.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path_ref)?;
        let config: Self = serde_yaml::from_str(&content)?;
        debug!(
            public = config.public_events.len(),
            private = config.private_events.len(),
            selectors = config.frame_selectors.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validates the configuration and returns warnings.
    ///
    /// Fails when a name is listed as both public and private.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let conflicting: Vec<String> = self
            .public_events
            .iter()
            .filter(|name| self.private_events.contains(name))
            .cloned()
            .collect();
        if !conflicting.is_empty() {
            return Err(ConfigError::NamespaceConflict { names: conflicting });
        }

        let mut warnings = Vec::new();
        if self.suppress_warnings {
            return Ok(warnings);
        }

        for (field, names) in [
            ("public_events", &self.public_events),
            ("private_events", &self.private_events),
        ] {
            for name in names.iter().filter(|name| !follows_convention(name)) {
                warnings.push(ConfigWarning::UnconventionalName {
                    field: field.to_string(),
                    name: name.clone(),
                });
            }
        }

        if self.frame_selectors.iter().any(|selector| selector.trim().is_empty()) {
            warnings.push(ConfigWarning::EmptySelector);
        }

        Ok(warnings)
    }
}

/// Verbosity levels a logging target can be given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Log,
    Warn,
    Error,
    All,
}

impl LogLevel {
    /// The `tracing` level this maps to.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace | LogLevel::All => "trace",
            LogLevel::Log => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    fn verbosity(self) -> u8 {
        match self {
            LogLevel::Error => 0,
            LogLevel::Warn => 1,
            LogLevel::Log => 2,
            LogLevel::Trace | LogLevel::All => 3,
        }
    }
}

/// Per-target logging verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level for everything without its own entry.
    #[serde(default = "default_level")]
    pub default_level: LogLevel,

    /// Short target name (`registry`, `subscribers`, `processors`,
    /// `forwarding`, `train`) or full module path, to enabled levels.
    #[serde(default)]
    pub targets: BTreeMap<String, Vec<LogLevel>>,
}

fn default_level() -> LogLevel {
    LogLevel::Warn
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_level: default_level(),
            targets: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Renders the levels as an `EnvFilter` directive string.
    ///
    /// The most verbose listed level wins; an empty list turns a target off.
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default_level.directive().to_string()];
        for (target, levels) in &self.targets {
            let level = levels
                .iter()
                .max_by_key(|level| level.verbosity())
                .map_or("off", |level| level.directive());
            let path = if target.contains("::") {
                target.clone()
            } else {
                format!("{TARGET_PREFIX}::{target}")
            };
            directives.push(format!("{path}={level}"));
        }
        directives.join(",")
    }
}

/// Configuration warnings emitted during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Name has fewer than two non-empty `/ - .` separated segments.
    UnconventionalName { field: String, name: String },
    /// A frame selector is blank.
    EmptySelector,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::UnconventionalName { field, name } => write!(
                f,
                "Warning [{}]: '{}' does not follow scope/app/section/action",
                field, name
            ),
            ConfigWarning::EmptySelector => {
                write!(f, "Warning [frame_selectors]: blank selector ignored")
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Events listed as both public and private: {}", names.join(", "))]
    NamespaceConflict { names: Vec<String> },
}
