//! Generation pipeline: classify, summarize, call providers with fallback,
//! parse, validate.

pub mod classifier;
pub mod operations;
pub mod parser;
pub mod prompts;
pub mod request;
pub mod validator;

pub use classifier::{Classification, classify};
pub use operations::{EditAction, GenerationResult, Operation, PropertyEntry, ScriptEdit};
pub use request::{GenerateRequest, Mode, RequestSize, RequestedMode};
pub use validator::{ValidationReport, validate};

use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use crate::providers::{
    Completion, Lineup, Message, Provider, ProviderRegistry, Transport, estimate_tokens,
};
use crate::scene::summary::{SummaryLimits, summarize_with};
use crate::scene::{SceneNode, SceneTree, SelectedInstance};

/// Prompt sent by the connection test. Bypasses inbound validation.
pub const TEST_PROMPT: &str = "Return JSON: {\"test\": \"success\"}";

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// Per-provider attempt timeout
    pub timeout: Duration,
    pub max_context_chars: usize,
    pub limits: SummaryLimits,
    pub default_size: RequestSize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self::from(&GenerationConfig::default())
    }
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_context_chars: config.max_context_chars,
            limits: SummaryLimits {
                max_depth: config.summary_max_depth,
                max_siblings: config.summary_max_siblings,
                script_preview_chars: config.script_preview_chars,
            },
            default_size: config.default_request_size,
        }
    }
}

/// Drives one request through the pipeline. Cheap to share behind `Arc`.
pub struct Generator {
    registry: Arc<ProviderRegistry>,
    transport: Arc<dyn Transport>,
    settings: GenerationSettings,
}

impl Generator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        transport: Arc<dyn Transport>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            registry,
            transport,
            settings,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Validate the request, then run the full pipeline.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationResult, GenerationError> {
        request.validate()?;
        // Read the lineup once; a concurrent switch does not affect this call.
        let lineup = self.registry.snapshot();
        let span = info_span!("generate", request_id = %Uuid::new_v4());
        self.execute(request, &lineup).instrument(span).await
    }

    /// Classification only; no provider is called.
    pub fn analyze(
        &self,
        prompt: &str,
        tree: &SceneTree,
        selected: &[SelectedInstance],
        size: Option<RequestSize>,
    ) -> Result<Classification, GenerationError> {
        let mut errors = request::validate_prompt(prompt);
        errors.extend(request::validate_selection(selected));
        if !errors.is_empty() {
            return Err(GenerationError::Validation(errors));
        }
        Ok(classify(
            prompt,
            tree,
            selected,
            size.unwrap_or(self.settings.default_size),
        ))
    }

    /// Minimal direct-edit generation against a one-node scene. With a
    /// provider name only that backend is tried; otherwise the current lineup.
    pub async fn test_connection(
        &self,
        provider: Option<&str>,
    ) -> Result<GenerationResult, GenerationError> {
        let lineup = match provider {
            Some(name) => self.registry.only(name)?,
            None => self.registry.snapshot(),
        };
        let tree = SceneTree::new().with_service("Workspace", SceneNode::new("Workspace", "Workspace"));
        let request = GenerateRequest::new(TEST_PROMPT, tree)
            .with_mode(RequestedMode::DirectEdit)
            .with_size(RequestSize::Small);
        let span = info_span!("test_connection", request_id = %Uuid::new_v4());
        self.execute(&request, &lineup).instrument(span).await
    }

    async fn execute(
        &self,
        request: &GenerateRequest,
        lineup: &Lineup,
    ) -> Result<GenerationResult, GenerationError> {
        let size = request.request_size.unwrap_or(self.settings.default_size);
        let classification = classify(
            &request.prompt,
            &request.scene_tree,
            &request.selected_instances,
            size,
        );
        let mode = request.mode.resolve(classification.mode);
        info!(
            "Request classified: mode={} complexity={:.1} cost={} (requested {:?})",
            mode, classification.complexity_score, classification.estimated_cost, request.mode
        );

        let summary = summarize_with(
            &request.scene_tree,
            &request.prompt,
            self.settings.max_context_chars,
            &self.settings.limits,
        );
        let messages = prompts::build_messages(request, &summary, mode);

        let (provider, completion) = self.attempt(lineup, &messages, size.max_tokens()).await?;
        info!("{} response received, processing...", provider.name());

        let parsed = parser::parse(&completion.text, mode);
        let report = validate(&parsed.operations);
        let tokens_consumed = completion
            .tokens
            .unwrap_or_else(|| estimate_usage(&messages, &completion));

        info!(
            "Generation complete: {} operations accepted, {} rejected",
            report.accepted.len(),
            report.rejected.len()
        );

        Ok(GenerationResult {
            operations: report.accepted,
            summary: parsed.summary,
            provider_used: provider.name().to_string(),
            model: provider.model.clone(),
            mode,
            tokens_consumed,
            rejected: report.rejected,
            dropped_properties: report.dropped_properties,
        })
    }

    /// Try each provider in lineup order until one answers.
    async fn attempt<'a>(
        &self,
        lineup: &'a Lineup,
        messages: &[Message],
        max_tokens: u32,
    ) -> Result<(&'a Provider, Completion), GenerationError> {
        let total = lineup.len();
        let mut last_error = None;

        for (i, provider) in lineup.iter().enumerate() {
            info!(
                "Attempting generation with {} (attempt {}/{})",
                provider.name(),
                i + 1,
                total
            );
            match provider
                .complete(
                    self.transport.as_ref(),
                    messages,
                    max_tokens,
                    self.settings.timeout,
                )
                .await
            {
                Ok(completion) => {
                    if i > 0 {
                        warn!(
                            "Primary provider failed, successfully used fallback: {}",
                            provider.name()
                        );
                    }
                    return Ok((provider, completion));
                }
                Err(e) => {
                    error!("{} failed: {}", provider.name(), e);
                    last_error = Some(e);
                }
            }
        }

        let last_error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no providers attempted".to_string());
        error!("All AI providers failed. Last error: {}", last_error);
        Err(GenerationError::AllProvidersExhausted {
            attempts: total,
            last_error,
        })
    }
}

fn estimate_usage(messages: &[Message], completion: &Completion) -> u64 {
    messages
        .iter()
        .map(|m| estimate_tokens(&m.content))
        .sum::<u64>()
        + estimate_tokens(&completion.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::providers::{MockTransport, ProviderKind, ProviderReply, ProviderRequest};
    use crate::scene::PropertyValue;
    use async_trait::async_trait;
    use serde_json::json;

    const RED_PARTS: &str = r#"{"operations":[{"type":"modify_instance","path":["Root","Part1"],"properties":{"Color":{"type":"color3","value":"1,0,0"}}}],"summary":"Made the parts red"}"#;

    fn registry() -> Arc<ProviderRegistry> {
        Arc::new(
            ProviderRegistry::new(vec![
                Provider::new(ProviderKind::OpenRouter, "r"),
                Provider::new(ProviderKind::OpenAi, "o"),
                Provider::new(ProviderKind::Google, "g"),
            ])
            .unwrap(),
        )
    }

    fn scene_with_parts() -> SceneTree {
        let mut root = SceneNode::new("Workspace", "Root");
        for i in 1..=5 {
            root.children
                .push(SceneNode::new("Part", &format!("Part{i}")));
        }
        SceneTree::new().with_service("Root", root)
    }

    fn google_reply(text: &str) -> ProviderReply {
        ProviderReply::ok(json!({
            "candidates": [{"content": {"parts": [{"text": text}]}}],
            "usageMetadata": {"totalTokenCount": 321}
        }))
    }

    fn generator(transport: impl Transport + 'static) -> Generator {
        Generator::new(registry(), Arc::new(transport), GenerationSettings::default())
    }

    #[tokio::test]
    async fn falls_back_to_third_provider() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(3).returning(|req| {
            if req.provider == "Google Gemini" {
                Ok(google_reply(RED_PARTS))
            } else {
                Ok(ProviderReply {
                    status: 500,
                    body: json!({"error": {"message": "upstream exploded"}}),
                })
            }
        });

        let request = GenerateRequest::new("make all parts red", scene_with_parts());
        let result = generator(transport).generate(&request).await.unwrap();
        assert_eq!(result.provider_used, "Google Gemini");
        assert_eq!(result.model, "gemini-pro");
        assert_eq!(result.tokens_consumed, 321);
        assert_eq!(result.operations.len(), 1);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(3).returning(|req| {
            Ok(ProviderReply {
                status: 500,
                body: json!({"error": {"message": format!("{} is down", req.provider)}}),
            })
        });

        let request = GenerateRequest::new("make all parts red", scene_with_parts());
        let err = generator(transport).generate(&request).await.unwrap_err();
        match &err {
            GenerationError::AllProvidersExhausted { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(err.to_string().contains("Google Gemini is down"));
    }

    #[tokio::test]
    async fn red_parts_end_to_end() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|req| {
            assert_eq!(req.body["max_tokens"], 3000);
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": RED_PARTS}}]
            })))
        });

        let request = GenerateRequest::new("make all parts red", scene_with_parts());
        let result = generator(transport).generate(&request).await.unwrap();

        assert_eq!(result.mode, Mode::DirectEdit);
        assert_eq!(result.provider_used, "OpenRouter");
        assert_eq!(result.summary, "Made the parts red");
        assert!(result.rejected.is_empty());
        assert!(result.tokens_consumed > 0);
        match &result.operations[0] {
            Operation::ModifyInstance { path, properties } => {
                assert_eq!(path, &vec!["Root".to_string(), "Part1".to_string()]);
                assert_eq!(
                    properties["Color"],
                    PropertyEntry::Typed(PropertyValue::Color3([1.0, 0.0, 0.0]))
                );
            }
            other => panic!("expected modify_instance, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_providers() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(0);

        let request = GenerateRequest::new("x".repeat(2001), scene_with_parts());
        let err = generator(transport).generate(&request).await.unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    struct StallingPrimary;

    #[async_trait]
    impl Transport for StallingPrimary {
        async fn post(&self, request: ProviderRequest) -> Result<ProviderReply, ProviderError> {
            if request.provider == "OpenRouter" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": RED_PARTS}}]
            })))
        }
    }

    #[tokio::test]
    async fn timeout_advances_to_next_provider() {
        let settings = GenerationSettings {
            timeout: Duration::from_millis(50),
            ..GenerationSettings::default()
        };
        let generator = Generator::new(registry(), Arc::new(StallingPrimary), settings);
        let request = GenerateRequest::new("make all parts red", scene_with_parts());
        let result = generator.generate(&request).await.unwrap();
        assert_eq!(result.provider_used, "OpenAI");
    }

    #[tokio::test]
    async fn switch_changes_primary_for_later_calls() {
        let mut transport = MockTransport::new();
        transport
            .expect_post()
            .times(1)
            .withf(|req| req.provider == "Google Gemini")
            .returning(|_| Ok(google_reply(RED_PARTS)));

        let generator = generator(transport);
        generator.registry().switch("google").unwrap();
        let request = GenerateRequest::new("make all parts red", scene_with_parts());
        let result = generator.generate(&request).await.unwrap();
        assert_eq!(result.provider_used, "Google Gemini");
    }

    #[tokio::test]
    async fn explicit_mode_overrides_classifier() {
        let mut transport = MockTransport::new();
        transport.expect_post().returning(|req| {
            let system = req.body["messages"][0]["content"].as_str().unwrap_or_default();
            assert!(system.contains("\"scripts\""));
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": "{\"scripts\": [{\"type\": \"Script\", \"name\": \"Spin\", \"path\": [\"ServerScriptService\"], \"source\": \"print(1)\"}]}"}}]
            })))
        });

        let request = GenerateRequest::new("make all parts red", scene_with_parts())
            .with_mode(RequestedMode::Generate);
        let result = generator(transport).generate(&request).await.unwrap();
        assert_eq!(result.mode, Mode::Generate);
        assert_eq!(result.operations[0].kind(), "create_script");
    }

    #[test]
    fn analyze_validates_and_classifies() {
        let generator = generator(MockTransport::new());
        let classification = generator
            .analyze("delete every spawn", &scene_with_parts(), &[], None)
            .unwrap();
        assert!(classification.deletion_requested);
        assert!(generator.analyze("hi", &SceneTree::new(), &[], None).is_err());
    }

    #[tokio::test]
    async fn connection_test_uses_small_direct_edit_request() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|req| {
            assert_eq!(req.body["max_tokens"], 1500);
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": "{\"test\": \"success\"}"}}]
            })))
        });
        let result = generator(transport).test_connection(None).await.unwrap();
        assert_eq!(result.provider_used, "OpenRouter");
        assert!(result.operations.is_empty());
    }

    #[tokio::test]
    async fn connection_test_targets_named_provider_without_fallback() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|req| {
            assert_eq!(req.provider, "Google Gemini");
            Ok(ProviderReply {
                status: 500,
                body: json!({"error": {"message": "quota"}}),
            })
        });
        let generator = generator(transport);
        match generator.test_connection(Some("gemini")).await {
            Err(GenerationError::AllProvidersExhausted { attempts, last_error }) => {
                assert_eq!(attempts, 1);
                assert!(last_error.contains("quota"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(generator.registry().snapshot().primary().kind, ProviderKind::OpenRouter);
        assert!(matches!(
            generator.test_connection(Some("anthropic")).await,
            Err(GenerationError::ProviderUnavailable { .. })
        ));
    }
}
