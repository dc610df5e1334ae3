//! Environment configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use friendscript_types::parse_duration;

/// Environment variable overriding [`EnvironmentConfig::default_url_scheme`].
pub const URL_SCHEME_VAR: &str = "FRIENDSCRIPT_URL_SCHEME";

/// Environment variable overriding [`EnvironmentConfig::read_timeout`].
pub const READ_TIMEOUT_VAR: &str = "FRIENDSCRIPT_READ_TIMEOUT";

/// A configuration value from the process environment was unusable.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Configuration for [`crate::Environment`] construction.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Name of this environment (for logs).
    pub name: String,

    /// How long [`crate::Environment::evaluate_reader`] waits for source text.
    pub read_timeout: Duration,

    /// Scheme `url::parse` assumes when an address has none.
    pub default_url_scheme: String,

    /// Register the bundled modules (`core`, `assert`, `parse`, `url`, `file`).
    pub builtin_modules: bool,

    /// Directory relative paths are resolved against by the filesystem
    /// fallback. `None` uses the process working directory.
    pub working_dir: Option<PathBuf>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            read_timeout: Duration::from_secs(5),
            default_url_scheme: "https".to_string(),
            builtin_modules: true,
            working_dir: None,
        }
    }
}

impl EnvironmentConfig {
    /// A default config with the given name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// A config with no bundled modules; the host registers everything.
    pub fn isolated() -> Self {
        Self {
            name: "isolated".to_string(),
            builtin_modules: false,
            ..Self::default()
        }
    }

    /// Defaults overridden by `FRIENDSCRIPT_*` variables from the process
    /// environment. Intended for binaries; the library itself never reads
    /// the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// [`EnvironmentConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(scheme) = lookup(URL_SCHEME_VAR) {
            let scheme = scheme.trim().trim_end_matches("://").to_string();
            if scheme.is_empty() {
                return Err(ConfigError {
                    var: URL_SCHEME_VAR,
                    reason: "scheme is empty".into(),
                });
            }
            config.default_url_scheme = scheme;
        }
        if let Some(timeout) = lookup(READ_TIMEOUT_VAR) {
            config.read_timeout = parse_duration(&timeout).map_err(|e| ConfigError {
                var: READ_TIMEOUT_VAR,
                reason: e.to_string(),
            })?;
        }
        Ok(config)
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_default_url_scheme(mut self, scheme: &str) -> Self {
        self.default_url_scheme = scheme.to_string();
        self
    }

    pub fn with_builtin_modules(mut self, enabled: bool) -> Self {
        self.builtin_modules = enabled;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }
}
