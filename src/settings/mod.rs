//! Feed configuration.
//!
//! Settings come from, in increasing precedence: built-in defaults, a JSON
//! config file, `PKGFEED_*` environment variables, and finally command-line
//! flags applied by the caller.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runtime::Runtime;

pub const ENV_ALLOW_OVERWRITE: &str = "PKGFEED_ALLOW_OVERWRITE";
pub const ENV_ENABLE_DELISTING: &str = "PKGFEED_ENABLE_DELISTING";
pub const ENV_ENABLE_FRAMEWORK_FILTERING: &str = "PKGFEED_ENABLE_FRAMEWORK_FILTERING";
pub const ENV_IGNORE_SYMBOLS_PACKAGES: &str = "PKGFEED_IGNORE_SYMBOLS_PACKAGES";
pub const ENV_POLL_INTERVAL: &str = "PKGFEED_POLL_INTERVAL_SECS";

const CONFIG_DIR_NAME: &str = "pkgfeed";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Storage root. `None` resolves to [`default_packages_root`].
    pub packages_path: Option<PathBuf>,
    /// Publishing an existing id and version replaces it.
    pub allow_overwrite: bool,
    /// Unpublish hides packages instead of deleting them.
    pub enable_delisting: bool,
    /// Honor target framework filters in search and updates.
    pub enable_framework_filtering: bool,
    /// Skip `*.symbols.pkg` files and refuse to publish them.
    pub ignore_symbols_packages: bool,
    pub poll_interval_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            packages_path: None,
            allow_overwrite: false,
            enable_delisting: false,
            enable_framework_filtering: true,
            ignore_symbols_packages: false,
            poll_interval_secs: 5,
        }
    }
}

impl FeedSettings {
    /// Load settings from the config file and environment.
    ///
    /// An explicit `config_path` must exist. Without one, the default config
    /// file is read when present.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(runtime).filter(|path| runtime.exists(path)),
        };

        let settings = match path {
            Some(path) => {
                let text = runtime
                    .read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {:?}", path))?;
                let settings: FeedSettings = serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse config file {:?}", path))?;
                info!("Loaded settings from {:?}", path);
                settings
            }
            None => FeedSettings::default(),
        };

        settings.with_env(runtime)
    }

    /// Apply `PKGFEED_*` environment overrides.
    pub fn with_env<R: Runtime>(mut self, runtime: &R) -> Result<Self> {
        let flag = |key: &str| -> Result<Option<bool>> {
            runtime
                .env_var(key)
                .ok()
                .map(|value| parse_flag(&value).with_context(|| format!("Invalid {}", key)))
                .transpose()
        };

        if let Some(value) = flag(ENV_ALLOW_OVERWRITE)? {
            self.allow_overwrite = value;
        }
        if let Some(value) = flag(ENV_ENABLE_DELISTING)? {
            self.enable_delisting = value;
        }
        if let Some(value) = flag(ENV_ENABLE_FRAMEWORK_FILTERING)? {
            self.enable_framework_filtering = value;
        }
        if let Some(value) = flag(ENV_IGNORE_SYMBOLS_PACKAGES)? {
            self.ignore_symbols_packages = value;
        }
        if let Ok(value) = runtime.env_var(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = value
                .trim()
                .parse()
                .with_context(|| format!("Invalid {}: '{}'", ENV_POLL_INTERVAL, value))?;
        }

        debug!("Effective settings: {:?}", self);
        Ok(self)
    }

    /// Resolved storage root.
    pub fn packages_root<R: Runtime>(&self, runtime: &R) -> Result<PathBuf> {
        match &self.packages_path {
            Some(path) => Ok(path.clone()),
            None => default_packages_root(runtime),
        }
    }

    /// Watcher polling interval, at least one second.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// `<config_dir>/pkgfeed/config.json`, when the platform has a config dir.
pub fn default_config_path<R: Runtime>(runtime: &R) -> Option<PathBuf> {
    runtime
        .config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Default storage root: a system location when privileged, otherwise
/// `~/.pkgfeed/packages`.
#[tracing::instrument(skip(runtime))]
pub fn default_packages_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if runtime.is_privileged() {
        Ok(system_packages_root())
    } else {
        let home_dir = runtime
            .home_dir()
            .context("Could not find home directory")?;
        Ok(home_dir.join(".pkgfeed").join("packages"))
    }
}

#[cfg(target_os = "macos")]
fn system_packages_root() -> PathBuf {
    PathBuf::from("/opt/pkgfeed/packages")
}

#[cfg(target_os = "windows")]
fn system_packages_root() -> PathBuf {
    PathBuf::from(r"C:\ProgramData\pkgfeed\packages")
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn system_packages_root() -> PathBuf {
    PathBuf::from("/var/lib/pkgfeed/packages")
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected a boolean, got '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::MockRuntime;
    use mockall::predicate::eq;
    use std::env::VarError;

    fn no_env(runtime: &mut MockRuntime) {
        runtime
            .expect_env_var()
            .returning(|_| Err(VarError::NotPresent));
    }

    #[test]
    fn test_defaults() {
        let settings = FeedSettings::default();
        assert!(!settings.allow_overwrite);
        assert!(!settings.enable_delisting);
        assert!(settings.enable_framework_filtering);
        assert!(!settings.ignore_symbols_packages);
        assert_eq!(settings.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_default_packages_root_user() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime
            .expect_home_dir()
            .returning(|| Some(PathBuf::from("/home/user")));

        let root = default_packages_root(&runtime).unwrap();
        assert_eq!(root, PathBuf::from("/home/user/.pkgfeed/packages"));
    }

    #[test]
    fn test_default_packages_root_privileged() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| true);

        let root = default_packages_root(&runtime).unwrap();
        assert_eq!(root, system_packages_root());
    }

    #[test]
    fn test_default_packages_root_without_home() {
        let mut runtime = MockRuntime::new();
        runtime.expect_is_privileged().returning(|| false);
        runtime.expect_home_dir().returning(|| None);

        assert!(default_packages_root(&runtime).is_err());
    }

    #[test]
    fn test_load_without_config_file() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_config_dir()
            .returning(|| Some(PathBuf::from("/home/user/.config")));
        runtime
            .expect_exists()
            .with(eq(PathBuf::from("/home/user/.config/pkgfeed/config.json")))
            .returning(|_| false);
        no_env(&mut runtime);

        let settings = FeedSettings::load(&runtime, None).unwrap();
        assert_eq!(settings, FeedSettings::default());
    }

    #[test]
    fn test_load_config_file_then_env() {
        let mut runtime = MockRuntime::new();
        let path = PathBuf::from("/etc/pkgfeed.json");

        runtime
            .expect_read_to_string()
            .with(eq(path.clone()))
            .returning(|_| {
                Ok(r#"{ "packages_path": "/srv/feed", "enable_delisting": true, "poll_interval_secs": 30 }"#
                    .to_string())
            });
        runtime
            .expect_env_var()
            .with(eq(ENV_ENABLE_DELISTING))
            .returning(|_| Ok("off".to_string()));
        runtime
            .expect_env_var()
            .with(eq(ENV_ALLOW_OVERWRITE))
            .returning(|_| Ok("1".to_string()));
        no_env(&mut runtime);

        let settings = FeedSettings::load(&runtime, Some(&path)).unwrap();
        assert_eq!(settings.packages_path, Some(PathBuf::from("/srv/feed")));
        assert_eq!(settings.poll_interval_secs, 30);
        assert!(settings.allow_overwrite);
        assert!(!settings.enable_delisting);
        assert!(settings.enable_framework_filtering);
        assert_eq!(
            settings.packages_root(&runtime).unwrap(),
            PathBuf::from("/srv/feed")
        );
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_read_to_string()
            .returning(|_| Ok("{ nope".to_string()));

        let result = FeedSettings::load(&runtime, Some(Path::new("/etc/pkgfeed.json")));
        assert!(result.is_err());
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let mut runtime = MockRuntime::new();
        runtime
            .expect_env_var()
            .with(eq(ENV_ALLOW_OVERWRITE))
            .returning(|_| Ok("maybe".to_string()));
        no_env(&mut runtime);

        let err = FeedSettings::default().with_env(&runtime).unwrap_err();
        assert!(format!("{:#}", err).contains(ENV_ALLOW_OVERWRITE));
    }
}
