//! AI completion backends.
//!
//! Each backend is a [`ProviderKind`] variant; wire formats live in
//! exhaustive matches over the kind. [`ProviderRegistry`] owns the detected
//! providers and the current lineup (primary first, then fallbacks), which
//! can be swapped at runtime without disturbing in-flight generations.

mod transport;

pub use transport::{HttpTransport, ProviderReply, ProviderRequest, Transport};
#[cfg(test)]
pub use transport::MockTransport;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tiktoken_rs::CoreBPE;
use tracing::{debug, info, warn};

use crate::config::ProvidersConfig;
use crate::error::{GenerationError, ProviderError};

pub const TEMPERATURE: f64 = 0.3;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_SITE_URL: &str = "https://your-app.com";
pub const DEFAULT_SITE_NAME: &str = "Roblox AI Assistant";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Known backends, declared in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenRouter,
    OpenAi,
    Anthropic,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::OpenRouter,
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Google,
    ];

    /// Config table / switch name.
    pub fn key(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenRouter => "OpenRouter",
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic Claude",
            Self::Google => "Google Gemini",
        }
    }

    pub fn credential_env(&self) -> &'static str {
        match self {
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenRouter => "deepseek/deepseek-r1-0528:free",
            Self::OpenAi => "gpt-4-turbo-preview",
            Self::Anthropic => "claude-3-sonnet-20240229",
            Self::Google => "gemini-pro",
        }
    }

    /// Model catalogue reported to clients.
    pub fn models(&self) -> &'static [&'static str] {
        match self {
            Self::OpenRouter => &[
                "deepseek/deepseek-r1-0528:free",
                "anthropic/claude-3.5-sonnet",
                "openai/gpt-4-turbo",
                "google/gemini-pro",
            ],
            Self::OpenAi => &["gpt-4-turbo-preview", "gpt-4", "gpt-3.5-turbo"],
            Self::Anthropic => &[
                "claude-3-opus-20240229",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            Self::Google => &["gemini-pro", "gemini-pro-vision"],
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    /// Accepts the key, the display name or a short alias, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| {
            lower == kind.key()
                || lower == kind.display_name().to_ascii_lowercase()
                || match kind {
                    Self::Anthropic => lower == "claude",
                    Self::Google => lower == "gemini",
                    _ => false,
                }
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// OpenRouter attribution headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteIdentity {
    pub url: String,
    pub name: String,
}

impl Default for SiteIdentity {
    fn default() -> Self {
        Self {
            url: DEFAULT_SITE_URL.to_string(),
            name: DEFAULT_SITE_NAME.to_string(),
        }
    }
}

/// Completion text plus the backend's reported token usage, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub tokens: Option<u64>,
}

/// A configured, credentialed backend.
#[derive(Clone)]
pub struct Provider {
    pub kind: ProviderKind,
    pub model: String,
    pub base_url: String,
    api_key: String,
    identity: SiteIdentity,
}

impl Provider {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            model: kind.default_model().to_string(),
            base_url: kind.default_base_url().to_string(),
            api_key: api_key.into(),
            identity: SiteIdentity::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_identity(mut self, identity: SiteIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => {
                format!("{}/chat/completions", self.base_url)
            }
            ProviderKind::Anthropic => format!("{}/v1/messages", self.base_url),
            ProviderKind::Google => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
        }
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        let bearer = || ("Authorization".to_string(), format!("Bearer {}", self.api_key));
        match self.kind {
            ProviderKind::OpenRouter => vec![
                bearer(),
                ("HTTP-Referer".to_string(), self.identity.url.clone()),
                ("X-Title".to_string(), self.identity.name.clone()),
            ],
            ProviderKind::OpenAi => vec![bearer()],
            ProviderKind::Anthropic => vec![
                ("x-api-key".to_string(), self.api_key.clone()),
                ("anthropic-version".to_string(), ANTHROPIC_VERSION.to_string()),
            ],
            ProviderKind::Google => vec![("x-goog-api-key".to_string(), self.api_key.clone())],
        }
    }

    pub fn build_body(&self, messages: &[Message], max_tokens: u32) -> Value {
        match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => json!({
                "model": self.model,
                "messages": messages
                    .iter()
                    .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
                    .collect::<Vec<_>>(),
                "max_tokens": max_tokens,
                "temperature": TEMPERATURE,
            }),
            ProviderKind::Anthropic => {
                let system = system_text(messages);
                let mut body = json!({
                    "model": self.model,
                    "max_tokens": max_tokens,
                    "temperature": TEMPERATURE,
                    "messages": messages
                        .iter()
                        .filter(|m| m.role != Role::System)
                        .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
                        .collect::<Vec<_>>(),
                });
                if let Some(system) = system {
                    body["system"] = json!(system);
                }
                body
            }
            ProviderKind::Google => {
                let system = system_text(messages);
                let mut body = json!({
                    "contents": messages
                        .iter()
                        .filter(|m| m.role != Role::System)
                        .map(|m| {
                            let role = if m.role == Role::Assistant { "model" } else { "user" };
                            json!({"role": role, "parts": [{"text": m.content}]})
                        })
                        .collect::<Vec<_>>(),
                    "generationConfig": {
                        "maxOutputTokens": max_tokens,
                        "temperature": TEMPERATURE,
                    },
                });
                if let Some(system) = system {
                    body["systemInstruction"] = json!({"parts": [{"text": system}]});
                }
                body
            }
        }
    }

    pub fn request(&self, messages: &[Message], max_tokens: u32, timeout: Duration) -> ProviderRequest {
        ProviderRequest {
            provider: self.name().to_string(),
            url: self.endpoint(),
            headers: self.headers(),
            body: self.build_body(messages, max_tokens),
            timeout,
        }
    }

    /// Extract completion text and token usage from a 2xx body.
    pub fn parse_response(&self, body: &Value) -> Result<Completion, ProviderError> {
        if let Some(error) = body.get("error") {
            return Err(self.malformed(format!("API error: {}", error_message(error))));
        }

        let (text, tokens) = match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => {
                let text = body["choices"]
                    .get(0)
                    .and_then(|c| c["message"]["content"].as_str())
                    .ok_or_else(|| self.malformed("no choices in response"))?
                    .to_string();
                (text, body["usage"]["total_tokens"].as_u64())
            }
            ProviderKind::Anthropic => {
                let content = body["content"]
                    .as_array()
                    .ok_or_else(|| self.malformed("no content in response"))?;
                let text = content
                    .iter()
                    .filter(|c| c["type"] == "text")
                    .filter_map(|c| c["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("");
                let usage = &body["usage"];
                let tokens = match (usage["input_tokens"].as_u64(), usage["output_tokens"].as_u64()) {
                    (None, None) => None,
                    (input, output) => Some(input.unwrap_or(0) + output.unwrap_or(0)),
                };
                (text, tokens)
            }
            ProviderKind::Google => {
                let parts = body["candidates"]
                    .get(0)
                    .and_then(|c| c["content"]["parts"].as_array())
                    .ok_or_else(|| self.malformed("no candidates in response"))?;
                let text = parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("");
                (text, body["usageMetadata"]["totalTokenCount"].as_u64())
            }
        };

        if text.trim().is_empty() {
            return Err(self.malformed("empty completion"));
        }
        Ok(Completion { text, tokens })
    }

    /// One bounded attempt against this provider.
    pub async fn complete(
        &self,
        transport: &dyn Transport,
        messages: &[Message],
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Completion, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingCredential {
                provider: self.name().to_string(),
                env_var: self.kind.credential_env().to_string(),
            });
        }
        let request = self.request(messages, max_tokens, timeout);
        debug!(
            "{} request: {}",
            self.name(),
            serde_json::to_string_pretty(&request.body).unwrap_or_default()
        );

        let reply = tokio::time::timeout(timeout, transport.post(request))
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.name().to_string(),
                ms: timeout.as_millis(),
            })??;

        if !reply.is_success() {
            return Err(ProviderError::Http {
                provider: self.name().to_string(),
                status: reply.status,
                message: error_message(reply.body.get("error").unwrap_or(&reply.body)),
            });
        }

        self.parse_response(&reply.body)
    }

    fn malformed(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::MalformedResponse {
            provider: self.name().to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

fn system_text(messages: &[Message]) -> Option<String> {
    let parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Human-readable message from an API error payload.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

static CL100K: Lazy<Option<CoreBPE>> = Lazy::new(|| tiktoken_rs::cl100k_base().ok());

/// Token count estimate for backends that omit usage.
pub fn estimate_tokens(text: &str) -> u64 {
    match CL100K.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
        // Rough fallback: four characters per token.
        None => text.chars().count().div_ceil(4) as u64,
    }
}

/// Primary first, then fallbacks in priority order.
#[derive(Debug, Clone)]
pub struct Lineup {
    providers: Vec<Provider>,
}

impl Lineup {
    fn with_primary(available: &[Provider], primary: ProviderKind) -> Self {
        let mut providers: Vec<Provider> = available
            .iter()
            .filter(|p| p.kind == primary)
            .cloned()
            .collect();
        providers.extend(available.iter().filter(|p| p.kind != primary).cloned());
        Self { providers }
    }

    pub fn primary(&self) -> &Provider {
        &self.providers[0]
    }

    pub fn fallbacks(&self) -> &[Provider] {
        &self.providers[1..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableProvider {
    pub key: &'static str,
    pub name: &'static str,
    pub model: String,
    pub models: Vec<&'static str>,
}

/// Snapshot reported by `GET /provider/info`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub model: String,
    pub fallbacks: Vec<&'static str>,
    pub available: Vec<AvailableProvider>,
}

/// Per-backend availability, for the `providers` command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub key: &'static str,
    pub name: &'static str,
    pub env_var: &'static str,
    pub available: bool,
    pub model: String,
}

/// Detected providers plus the swappable current lineup.
#[derive(Debug)]
pub struct ProviderRegistry {
    available: Vec<Provider>,
    lineup: RwLock<Arc<Lineup>>,
}

impl ProviderRegistry {
    /// Build from explicit providers; the first becomes primary.
    pub fn new(available: Vec<Provider>) -> Result<Self, GenerationError> {
        let Some(first) = available.first() else {
            return Err(no_providers());
        };
        let lineup = Lineup::with_primary(&available, first.kind);
        Ok(Self {
            available,
            lineup: RwLock::new(Arc::new(lineup)),
        })
    }

    /// Detect credentialed providers from config and process environment.
    pub fn from_env(config: &ProvidersConfig) -> Result<Self, GenerationError> {
        Self::detect(config, |key| std::env::var(key).ok())
    }

    /// Detect providers with a custom env lookup (for testing).
    pub fn detect<F>(config: &ProvidersConfig, lookup: F) -> Result<Self, GenerationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let identity = SiteIdentity {
            url: config
                .site_url
                .clone()
                .or_else(|| lookup("SITE_URL"))
                .unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            name: config
                .site_name
                .clone()
                .or_else(|| lookup("SITE_NAME"))
                .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
        };

        let available: Vec<Provider> = ProviderKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let settings = config.settings(kind.key());
                let api_key = credential(kind, settings.and_then(|s| s.api_key.as_deref()), &lookup)?;
                let mut provider = Provider::new(kind, api_key).with_identity(identity.clone());
                if let Some(model) = settings.and_then(|s| s.model.clone()) {
                    provider = provider.with_model(model);
                }
                if let Some(base_url) = settings.and_then(|s| s.base_url.clone()) {
                    provider = provider.with_base_url(base_url);
                }
                Some(provider)
            })
            .collect();

        let registry = Self::new(available)?;
        let lineup = registry.snapshot();
        info!(
            "AI providers available: {} (primary: {} / {})",
            lineup.iter().map(Provider::name).collect::<Vec<_>>().join(", "),
            lineup.primary().name(),
            lineup.primary().model
        );
        Ok(registry)
    }

    /// Current lineup. Later switches do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<Lineup> {
        self.lineup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make `name` the primary provider. Fallbacks become every other
    /// available provider in priority order.
    pub fn switch(&self, name: &str) -> Result<(), GenerationError> {
        let kind = self.resolve(name)?;
        let lineup = Arc::new(Lineup::with_primary(&self.available, kind));
        *self.lineup.write().unwrap_or_else(PoisonError::into_inner) = lineup;
        info!("Switched primary AI provider to {}", kind);
        Ok(())
    }

    /// A lineup holding only `name`, with no fallbacks.
    pub fn only(&self, name: &str) -> Result<Arc<Lineup>, GenerationError> {
        let kind = self.resolve(name)?;
        Ok(Arc::new(Lineup {
            providers: self
                .available
                .iter()
                .filter(|p| p.kind == kind)
                .cloned()
                .collect(),
        }))
    }

    fn resolve(&self, name: &str) -> Result<ProviderKind, GenerationError> {
        let kind = ProviderKind::parse(name)
            .ok_or_else(|| GenerationError::UnknownProvider(name.to_string()))?;

        if !self.available.iter().any(|p| p.kind == kind) {
            warn!("{} is not available: {} is not set", kind, kind.credential_env());
            return Err(GenerationError::ProviderUnavailable {
                provider: kind.display_name().to_string(),
                env_var: kind.credential_env().to_string(),
            });
        }
        Ok(kind)
    }

    pub fn available(&self) -> &[Provider] {
        &self.available
    }

    pub fn info(&self) -> ProviderInfo {
        let lineup = self.snapshot();
        ProviderInfo {
            name: lineup.primary().name(),
            model: lineup.primary().model.clone(),
            fallbacks: lineup.fallbacks().iter().map(Provider::name).collect(),
            available: self
                .available
                .iter()
                .map(|p| AvailableProvider {
                    key: p.kind.key(),
                    name: p.name(),
                    model: p.model.clone(),
                    models: p.kind.models().to_vec(),
                })
                .collect(),
        }
    }
}

/// Availability of every known backend, whether or not any is configured.
pub fn availability<F>(config: &ProvidersConfig, lookup: F) -> Vec<ProviderStatus>
where
    F: Fn(&str) -> Option<String>,
{
    ProviderKind::ALL
        .into_iter()
        .map(|kind| {
            let settings = config.settings(kind.key());
            ProviderStatus {
                key: kind.key(),
                name: kind.display_name(),
                env_var: kind.credential_env(),
                available: credential(kind, settings.and_then(|s| s.api_key.as_deref()), &lookup)
                    .is_some(),
                model: settings
                    .and_then(|s| s.model.clone())
                    .unwrap_or_else(|| kind.default_model().to_string()),
            }
        })
        .collect()
}

/// Config key first, then the provider's env var. A configured `${VAR}` or
/// `$VAR` is resolved through `lookup` here, so the stored config never
/// holds the secret itself.
fn credential<F>(kind: ProviderKind, configured: Option<&str>, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    configured
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .and_then(|k| match env_reference(k) {
            Some(var) => lookup(var),
            None => Some(k.to_string()),
        })
        .filter(|k| !k.trim().is_empty())
        .or_else(|| lookup(kind.credential_env()))
        .filter(|k| !k.trim().is_empty())
}

fn env_reference(value: &str) -> Option<&str> {
    value
        .strip_prefix("${")
        .and_then(|v| v.strip_suffix('}'))
        .or_else(|| value.strip_prefix('$'))
}

fn no_providers() -> GenerationError {
    GenerationError::NoProvidersConfigured {
        env_vars: ProviderKind::ALL
            .iter()
            .map(|k| k.credential_env().to_string())
            .collect(),
    }
}
