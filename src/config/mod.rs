use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::generation::request::RequestSize;
use crate::paths::Paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size in megabytes (scene trees can be large)
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Per-provider HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Character cap for the scene summary embedded in the prompt
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Used when a request does not name a size
    #[serde(default)]
    pub default_request_size: RequestSize,

    #[serde(default = "default_summary_max_depth")]
    pub summary_max_depth: usize,

    #[serde(default = "default_summary_max_siblings")]
    pub summary_max_siblings: usize,

    #[serde(default = "default_script_preview_chars")]
    pub script_preview_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Sent to OpenRouter as HTTP-Referer (falls back to SITE_URL)
    #[serde(default)]
    pub site_url: Option<String>,

    /// Sent to OpenRouter as X-Title (falls back to SITE_NAME)
    #[serde(default)]
    pub site_name: Option<String>,

    #[serde(default)]
    pub openrouter: Option<ProviderSettings>,

    #[serde(default)]
    pub openai: Option<ProviderSettings>,

    #[serde(default)]
    pub anthropic: Option<ProviderSettings>,

    #[serde(default)]
    pub google: Option<ProviderSettings>,
}

/// Per-provider overrides. Every field is optional; unset fields fall back
/// to the provider's credential env var, default model and endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Literal key or a `${VAR}` reference, stored as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_body_limit_mb() -> usize {
    50
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_context_chars() -> usize {
    6000
}
fn default_summary_max_depth() -> usize {
    3
}
fn default_summary_max_siblings() -> usize {
    25
}
fn default_script_preview_chars() -> usize {
    200
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_context_chars: default_max_context_chars(),
            default_request_size: RequestSize::default(),
            summary_max_depth: default_summary_max_depth(),
            summary_max_siblings: default_summary_max_siblings(),
            script_preview_chars: default_script_preview_chars(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl ProvidersConfig {
    /// Settings table for a provider key (`openrouter`, `openai`, ...).
    pub fn settings(&self, key: &str) -> Option<&ProviderSettings> {
        match key {
            "openrouter" => self.openrouter.as_ref(),
            "openai" => self.openai.as_ref(),
            "anthropic" => self.anthropic.as_ref(),
            "google" => self.google.as_ref(),
            _ => None,
        }
    }

    fn settings_mut(&mut self, key: &str) -> Option<&mut ProviderSettings> {
        let slot = match key {
            "openrouter" => &mut self.openrouter,
            "openai" => &mut self.openai,
            "anthropic" => &mut self.anthropic,
            "google" => &mut self.google,
            _ => return None,
        };
        Some(slot.get_or_insert_with(ProviderSettings::default))
    }
}

impl Config {
    /// Load from the resolved config path, creating a template on first run.
    pub fn load() -> Result<Self> {
        Self::load_with(Paths::resolve()?)
    }

    /// Load from an explicit file (the `--config` flag).
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with(Paths::resolve()?.with_config_file(path))
    }

    pub fn load_with(paths: Paths) -> Result<Self> {
        let path = paths.config_file();

        if !path.exists() {
            paths.ensure_dirs()?;
            // Create default config file on first run
            let config = Config {
                paths,
                ..Config::default()
            };
            config.save_with_template()?;
            return Ok(config);
        }

        let content = fs::read_to_string(&path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.paths = paths;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;

        Ok(())
    }

    /// Save config with a helpful template (for first-time setup)
    pub fn save_with_template(&self) -> Result<()> {
        let path = self.paths.config_file();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.paths.config_file()
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "body_limit_mb"] => Ok(self.server.body_limit_mb.to_string()),
            ["generation", "timeout_secs"] => Ok(self.generation.timeout_secs.to_string()),
            ["generation", "max_context_chars"] => {
                Ok(self.generation.max_context_chars.to_string())
            }
            ["generation", "default_request_size"] => {
                Ok(format!("{:?}", self.generation.default_request_size).to_lowercase())
            }
            ["generation", "summary_max_depth"] => {
                Ok(self.generation.summary_max_depth.to_string())
            }
            ["generation", "summary_max_siblings"] => {
                Ok(self.generation.summary_max_siblings.to_string())
            }
            ["generation", "script_preview_chars"] => {
                Ok(self.generation.script_preview_chars.to_string())
            }
            ["providers", "site_url"] => Ok(self.providers.site_url.clone().unwrap_or_default()),
            ["providers", "site_name"] => Ok(self.providers.site_name.clone().unwrap_or_default()),
            ["providers", name, field @ ("model" | "base_url")] => {
                let settings = self.providers.settings(name);
                let value = match *field {
                    "model" => settings.and_then(|s| s.model.clone()),
                    _ => settings.and_then(|s| s.base_url.clone()),
                };
                Ok(value.unwrap_or_default())
            }
            ["logging", "level"] => Ok(self.logging.level.clone()),
            ["logging", "format"] => Ok(self.logging.format.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "body_limit_mb"] => self.server.body_limit_mb = value.parse()?,
            ["generation", "timeout_secs"] => self.generation.timeout_secs = value.parse()?,
            ["generation", "max_context_chars"] => {
                self.generation.max_context_chars = value.parse()?
            }
            ["generation", "default_request_size"] => {
                self.generation.default_request_size = RequestSize::parse(value)
                    .ok_or_else(|| anyhow::anyhow!("Invalid request size: {}", value))?
            }
            ["generation", "summary_max_depth"] => {
                self.generation.summary_max_depth = value.parse()?
            }
            ["generation", "summary_max_siblings"] => {
                self.generation.summary_max_siblings = value.parse()?
            }
            ["generation", "script_preview_chars"] => {
                self.generation.script_preview_chars = value.parse()?
            }
            ["providers", "site_url"] => self.providers.site_url = Some(value.to_string()),
            ["providers", "site_name"] => self.providers.site_name = Some(value.to_string()),
            ["providers", name, field @ ("api_key" | "model" | "base_url")] => {
                let settings = self
                    .providers
                    .settings_mut(name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown provider: {}", name))?;
                let slot = match *field {
                    "api_key" => &mut settings.api_key,
                    "model" => &mut settings.model,
                    _ => &mut settings.base_url,
                };
                *slot = Some(value.to_string());
            }
            ["logging", "level"] => self.logging.level = value.to_string(),
            ["logging", "format"] => match value {
                "pretty" | "json" => self.logging.format = value.to_string(),
                _ => anyhow::bail!("Invalid log format: {} (expected pretty or json)", value),
            },
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

/// Default config template with helpful comments (used for first-time setup)
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# studiogen configuration
# Auto-created on first run. Edit as needed.

[server]
bind = "127.0.0.1"
port = 3000
body_limit_mb = 50

[generation]
timeout_secs = 60              # per provider attempt
max_context_chars = 6000       # scene summary cap
default_request_size = "medium" # small | medium | large
summary_max_depth = 3
summary_max_siblings = 25
script_preview_chars = 200

[providers]
# Identity headers sent to OpenRouter (default: SITE_URL / SITE_NAME env vars)
# site_url = "https://your-app.com"
# site_name = "Roblox AI Assistant"

# Providers are tried in this order: openrouter, openai, anthropic, google.
# A provider is available when its key is set here or in its env var.
# [providers.openrouter]
# api_key = "${OPENROUTER_API_KEY}"
# model = "deepseek/deepseek-r1-0528:free"

# [providers.openai]
# api_key = "${OPENAI_API_KEY}"
# model = "gpt-4-turbo-preview"

# [providers.anthropic]
# api_key = "${ANTHROPIC_API_KEY}"
# model = "claude-3-sonnet-20240229"

# [providers.google]
# api_key = "${GOOGLE_API_KEY}"
# model = "gemini-pro"

[logging]
level = "info"
format = "pretty"              # pretty | json
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_in(dir: &Path) -> Paths {
        Paths {
            config_dir: dir.to_path_buf(),
            config_override: None,
        }
    }

    #[test]
    fn template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.body_limit_mb, 50);
        assert_eq!(config.generation.timeout_secs, 60);
        assert_eq!(config.generation.default_request_size, RequestSize::Medium);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.providers.openrouter.is_none());
    }

    #[test]
    fn first_load_writes_template() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_with(paths_in(tmp.path())).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1");

        let written = fs::read_to_string(tmp.path().join("config.toml")).unwrap();
        assert!(written.starts_with("# studiogen configuration"));
    }

    #[test]
    fn loads_provider_tables() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[generation]
default_request_size = "large"

[providers]
site_name = "My Game"

[providers.anthropic]
api_key = "sk-test"
model = "claude-3-haiku-20240307"
"#,
        )
        .unwrap();

        let config = Config::load_with(paths_in(tmp.path())).unwrap();
        assert_eq!(config.generation.default_request_size, RequestSize::Large);
        assert_eq!(config.providers.site_name.as_deref(), Some("My Game"));
        let anthropic = config.providers.settings("anthropic").unwrap();
        assert_eq!(anthropic.api_key.as_deref(), Some("sk-test"));
        assert_eq!(anthropic.model.as_deref(), Some("claude-3-haiku-20240307"));
        assert!(config.providers.settings("google").is_none());
    }

    #[test]
    fn set_and_save_keep_env_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config.toml");
        fs::write(
            &file,
            r#"
[providers.openai]
api_key = "${PATH}"
"#,
        )
        .unwrap();

        let mut config = Config::load_with(paths_in(tmp.path())).unwrap();
        assert_eq!(
            config.providers.settings("openai").unwrap().api_key.as_deref(),
            Some("${PATH}")
        );
        config.set_value("server.port", "8080").unwrap();
        config.save().unwrap();

        let written = fs::read_to_string(&file).unwrap();
        assert!(written.contains(r#"api_key = "${PATH}""#));
        let path_value = std::env::var("PATH").unwrap_or_default();
        if !path_value.is_empty() {
            assert!(!written.contains(&path_value));
        }
    }

    #[test]
    fn get_and_set_by_dotted_key() {
        let mut config = Config::default();
        config.set_value("server.port", "8080").unwrap();
        config.set_value("generation.default_request_size", "small").unwrap();
        config.set_value("providers.google.model", "gemini-1.5-pro").unwrap();

        assert_eq!(config.get_value("server.port").unwrap(), "8080");
        assert_eq!(
            config.get_value("generation.default_request_size").unwrap(),
            "small"
        );
        assert_eq!(
            config.get_value("providers.google.model").unwrap(),
            "gemini-1.5-pro"
        );

        assert!(config.set_value("server.port", "not-a-port").is_err());
        assert!(config.set_value("logging.format", "xml").is_err());
        assert!(config.set_value("providers.cohere.model", "x").is_err());
        assert!(config.get_value("nope.nope").is_err());
    }

    #[test]
    fn save_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config {
            paths: paths_in(tmp.path()),
            ..Config::default()
        };
        config.set_value("logging.level", "debug").unwrap();
        config.save().unwrap();

        let reloaded = Config::load_with(paths_in(tmp.path())).unwrap();
        assert_eq!(reloaded.logging.level, "debug");
    }
}
