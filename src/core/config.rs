//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::migration::extension::{builtin_extension_fields, ExtensionFieldSpec};
use crate::remote::http::{ConnectionSettings, ProxySettings};

/// Release used when a release reference cannot be resolved
pub const DEFAULT_RELEASE: &str = "1";

/// Test type used when a test lists none
pub const DEFAULT_TEST_TYPE: &str = "End to End";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Name of the per-directory config file
pub const LOCAL_CONFIG_FILE: &str = "stm.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid setting '{name}': {message}")]
    Invalid { name: &'static str, message: String },
}

/// Migration configuration with layered hierarchy
///
/// Every member is optional so that layers can be merged; required values
/// are checked by [`Config::into_settings`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the test-management server
    pub server: Option<String>,

    pub shared_space: Option<u64>,

    pub workspace: Option<u64>,

    /// Sign-in user (API key or login)
    pub user: Option<String>,

    pub password: Option<String>,

    pub proxy_host: Option<String>,

    pub proxy_port: Option<u16>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Email of the user that stands in for unknown owners
    pub default_user: Option<String>,

    pub default_release: Option<String>,

    pub default_test_type: Option<String>,

    /// Number of script-upload workers
    pub upload_workers: Option<usize>,

    /// Extension field name to kind
    pub extension_fields: Option<BTreeMap<String, ExtensionFieldSpec>>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    ///
    /// Global and local files that fail to parse are skipped with a warning;
    /// an explicit `--config` file must parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/stm/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            config.merge_file_lenient(&global_path);
        }

        // 3. Working directory config (./stm.yaml)
        config.merge_file_lenient(Path::new(LOCAL_CONFIG_FILE));

        // 4. Explicit config file
        if let Some(path) = explicit {
            config.merge(Self::from_file(path)?);
        }

        // 5. Environment variables
        config.merge(Self::from_env()?);

        Ok(config)
    }

    /// Read one config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(path, &contents)
    }

    fn from_yaml(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    fn merge_file_lenient(&mut self, path: &Path) {
        if !path.exists() {
            return;
        }
        match Self::from_file(path) {
            Ok(layer) => {
                debug!(path = %path.display(), "loaded config");
                self.merge(layer);
            }
            Err(e) => warn!("{}, skipping", e),
        }
    }

    /// Settings taken from `STM_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        fn parse<T: std::str::FromStr>(
            var: &'static str,
            value: Option<String>,
        ) -> Result<Option<T>, ConfigError> {
            value
                .map(|v| {
                    v.trim()
                        .parse::<T>()
                        .map_err(|_| ConfigError::InvalidEnv { var, value: v })
                })
                .transpose()
        }

        Ok(Config {
            server: lookup("STM_SERVER"),
            shared_space: parse("STM_SHARED_SPACE", lookup("STM_SHARED_SPACE"))?,
            workspace: parse("STM_WORKSPACE", lookup("STM_WORKSPACE"))?,
            user: lookup("STM_USER"),
            password: lookup("STM_PASSWORD"),
            proxy_host: lookup("STM_PROXY_HOST"),
            proxy_port: parse("STM_PROXY_PORT", lookup("STM_PROXY_PORT"))?,
            default_user: lookup("STM_DEFAULT_USER"),
            ..Config::default()
        })
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "stm")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field;
                    }
                )*
            };
        }
        take!(
            server,
            shared_space,
            workspace,
            user,
            password,
            proxy_host,
            proxy_port,
            timeout_secs,
            default_user,
            default_release,
            default_test_type,
            upload_workers,
            extension_fields,
        );
    }

    /// Migration defaults only; connection settings are not required
    pub fn migration_settings(&self) -> Result<MigrationSettings, ConfigError> {
        let default_user = required(&self.default_user, "default_user")?;

        let upload_workers = match self.upload_workers {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "upload_workers",
                    message: "must be at least 1".to_string(),
                })
            }
            Some(n) => n,
            None => default_upload_workers(),
        };

        Ok(MigrationSettings {
            default_user,
            default_release: non_blank(&self.default_release)
                .unwrap_or_else(|| DEFAULT_RELEASE.to_string()),
            default_test_type: non_blank(&self.default_test_type)
                .unwrap_or_else(|| DEFAULT_TEST_TYPE.to_string()),
            upload_workers,
            extension_fields: self
                .extension_fields
                .clone()
                .unwrap_or_else(builtin_extension_fields),
        })
    }

    /// Validate and freeze into [`Settings`]
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let migration = self.migration_settings()?;

        let server = required(&self.server, "server")?;
        let shared_space = self.shared_space.ok_or(ConfigError::Missing("shared_space"))?;
        let workspace = self.workspace.ok_or(ConfigError::Missing("workspace"))?;
        let user = required(&self.user, "user")?;
        let password = self.password.ok_or(ConfigError::Missing("password"))?;

        let proxy = match (non_blank(&self.proxy_host), self.proxy_port) {
            (Some(host), Some(port)) => Some(ProxySettings { host, port }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("proxy_port")),
            (None, Some(_)) => return Err(ConfigError::Missing("proxy_host")),
        };

        let timeout_secs = match self.timeout_secs {
            Some(0) => {
                return Err(ConfigError::Invalid {
                    name: "timeout_secs",
                    message: "must be at least 1".to_string(),
                })
            }
            Some(secs) => secs,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Settings {
            connection: ConnectionSettings {
                server,
                shared_space,
                workspace,
                user,
                password,
                proxy,
                timeout: Duration::from_secs(timeout_secs),
            },
            migration,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn required(value: &Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_blank(value).ok_or(ConfigError::Missing(name))
}

/// One less than the available parallelism, at least one
pub fn default_upload_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1))
        .unwrap_or(1)
        .max(1)
}

/// Validated settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub connection: ConnectionSettings,
    pub migration: MigrationSettings,
}

/// Defaults and tables the migration itself needs
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Email of the user substituted for unknown owners and designers
    pub default_user: String,
    pub default_release: String,
    pub default_test_type: String,
    pub upload_workers: usize,
    pub extension_fields: BTreeMap<String, ExtensionFieldSpec>,
}

impl MigrationSettings {
    /// Settings with every default but the default user
    pub fn new(default_user: impl Into<String>) -> Self {
        Self {
            default_user: default_user.into(),
            default_release: DEFAULT_RELEASE.to_string(),
            default_test_type: DEFAULT_TEST_TYPE.to_string(),
            upload_workers: default_upload_workers(),
            extension_fields: builtin_extension_fields(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::extension::{RefKind, ScalarKind};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn complete() -> Config {
        Config {
            server: Some("https://tm.example.com".to_string()),
            shared_space: Some(1001),
            workspace: Some(2002),
            user: Some("api-key".to_string()),
            password: Some("secret".to_string()),
            default_user: Some("qa@example.com".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_into_settings_defaults() {
        let settings = complete().into_settings().unwrap();
        assert_eq!(settings.migration.default_release, "1");
        assert_eq!(settings.migration.default_test_type, "End to End");
        assert!(settings.migration.upload_workers >= 1);
        assert_eq!(settings.migration.extension_fields.len(), 12);
        assert_eq!(settings.connection.timeout, Duration::from_secs(60));
        assert!(settings.connection.proxy.is_none());
    }

    #[test]
    fn test_into_settings_missing() {
        let mut config = complete();
        config.password = None;
        assert!(matches!(
            config.into_settings(),
            Err(ConfigError::Missing("password"))
        ));

        let mut config = complete();
        config.default_user = Some("  ".to_string());
        assert!(matches!(
            config.into_settings(),
            Err(ConfigError::Missing("default_user"))
        ));

        let mut config = complete();
        config.proxy_host = Some("proxy.local".to_string());
        assert!(matches!(
            config.into_settings(),
            Err(ConfigError::Missing("proxy_port"))
        ));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = complete();
        base.merge(Config {
            server: Some("https://other.example.com".to_string()),
            upload_workers: Some(3),
            ..Config::default()
        });

        assert_eq!(base.server.as_deref(), Some("https://other.example.com"));
        assert_eq!(base.workspace, Some(2002));
        assert_eq!(base.upload_workers, Some(3));
    }

    #[test]
    fn test_from_file_with_extension_fields() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stm.yaml");
        std::fs::write(
            &path,
            "server: https://tm.example.com\nshared_space: 1001\ndefault_release: R2\nextension_fields:\n  sev_udf: { kind: reference, target: list, list: Severity }\n  done_udf: { kind: boolean }\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.shared_space, Some(1001));

        let fields = config.extension_fields.unwrap();
        assert_eq!(
            fields["sev_udf"],
            ExtensionFieldSpec::Reference(RefKind::List("Severity".to_string()))
        );
        assert_eq!(fields["done_udf"], ExtensionFieldSpec::Scalar(ScalarKind::Boolean));
    }

    #[test]
    fn test_from_file_rejects_bad_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stm.yaml");
        std::fs::write(&path, "extension_fields:\n  x_udf: { kind: blob }\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STM_SERVER", "https://env.example.com"),
            ("STM_WORKSPACE", "7"),
            ("STM_PROXY_PORT", "8080"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|v| vars.get(v).map(|s| s.to_string())).unwrap();
        assert_eq!(config.server.as_deref(), Some("https://env.example.com"));
        assert_eq!(config.workspace, Some(7));
        assert_eq!(config.proxy_port, Some(8080));
        assert!(config.user.is_none());

        let bad = Config::from_lookup(|v| (v == "STM_SHARED_SPACE").then(|| "abc".to_string()));
        assert!(matches!(
            bad,
            Err(ConfigError::InvalidEnv { var: "STM_SHARED_SPACE", .. })
        ));
    }
}
