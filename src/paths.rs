//! XDG Base Directory compliant path resolution.
//!
//! The config directory is resolved through a three-level fallback:
//! 1. STUDIOGEN_CONFIG_DIR
//! 2. XDG_CONFIG_HOME via `etcetera`
//! 3. Platform default (~/.config)
//!
//! STUDIOGEN_CONFIG points at an explicit config file and bypasses the
//! directory entirely. Relative paths from env vars are ignored.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "studiogen";

/// Resolved directory paths. Created once at startup, threaded through Config.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Explicit config file, when one was requested
    pub config_override: Option<PathBuf>,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "STUDIOGEN_CONFIG_DIR", || {
            strategy.config_dir().join(APP_DIR)
        });

        let config_override = env_fn("STUDIOGEN_CONFIG")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            config_dir,
            config_override,
        })
    }

    /// Use an explicit config file (the `--config` flag).
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_override = Some(path.into());
        self
    }

    /// Config file: the explicit override, else config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_override
            .clone()
            .unwrap_or_else(|| self.config_dir.join("config.toml"))
    }

    /// Create the config directory (or the override's parent).
    pub fn ensure_dirs(&self) -> Result<()> {
        match self.config_override.as_deref().and_then(Path::parent) {
            Some(parent) if !parent.as_os_str().is_empty() => create_dir_with_mode(parent),
            Some(_) => Ok(()),
            None => create_dir_with_mode(&self.config_dir),
        }
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join(APP_DIR),
                config_override: None,
            }
        })
    }
}

/// Resolve an env var with fallback. Ignores empty and relative paths.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700.
fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_paths_are_xdg_compliant() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();
        assert!(paths.config_dir.ends_with("studiogen"), "{:?}", paths.config_dir);
        assert!(paths.config_file().ends_with("studiogen/config.toml"));
    }

    #[test]
    fn config_dir_env_overrides_xdg() {
        let env = HashMap::from([("STUDIOGEN_CONFIG_DIR", "/custom/config")]);
        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.config_file(), PathBuf::from("/custom/config/config.toml"));
    }

    #[test]
    fn relative_and_empty_paths_are_ignored() {
        for value in ["relative/path", ""] {
            let env = HashMap::from([("STUDIOGEN_CONFIG_DIR", value)]);
            let paths = Paths::resolve_with_env(make_env(env)).unwrap();
            assert!(paths.config_dir.is_absolute());
            assert!(paths.config_dir.ends_with("studiogen"));
        }
    }

    #[test]
    fn explicit_config_file_wins() {
        let env = HashMap::from([("STUDIOGEN_CONFIG", "/etc/studiogen.toml")]);
        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_file(), PathBuf::from("/etc/studiogen.toml"));

        let paths = paths.with_config_file("/tmp/other.toml");
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/other.toml"));
    }

    #[test]
    fn ensure_dirs_creates_config_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("studiogen");
        let paths = Paths {
            config_dir: dir.clone(),
            config_override: None,
        };
        paths.ensure_dirs().unwrap();
        assert!(dir.is_dir());
    }
}
