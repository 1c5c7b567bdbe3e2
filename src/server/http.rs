//! HTTP server for studiogen
//!
//! Every route is mounted at the root and again under `/api/ai` for older
//! editor plugins. Failures use the envelope `{success: false, error, details?}`.

use anyhow::Result;
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRequest, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::error::GenerationError;
use crate::generation::{GenerateRequest, GenerationSettings, Generator, RequestSize};
use crate::providers::{HttpTransport, ProviderRegistry};
use crate::scene::{SceneTree, SelectedInstance};

const SERVICE_NAME: &str = "studiogen";

/// Prefix kept for plugin builds that still call the legacy routes.
const LEGACY_PREFIX: &str = "/api/ai";

pub struct Server {
    config: Config,
    generator: Arc<Generator>,
}

struct AppState {
    generator: Arc<Generator>,
}

impl Server {
    /// Detect providers from config and environment; fails when none is usable.
    pub fn new(config: &Config) -> Result<Self> {
        let registry = Arc::new(ProviderRegistry::from_env(&config.providers)?);
        let generator = Generator::new(
            registry,
            Arc::new(HttpTransport::new()),
            GenerationSettings::from(&config.generation),
        );
        Ok(Self::with_generator(config, Arc::new(generator)))
    }

    pub fn with_generator(config: &Config, generator: Arc<Generator>) -> Self {
        Self {
            config: config.clone(),
            generator,
        }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            generator: self.generator.clone(),
        });
        build_router(state, &self.config.server)
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.router();

        let addr: SocketAddr =
            format!("{}:{}", self.config.server.bind, self.config.server.port).parse()?;

        let info = self.generator.registry().info();
        info!(
            "Starting HTTP server on http://{} (provider: {} / {})",
            addr, info.name, info.model
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

fn build_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes())
        .nest(LEGACY_PREFIX, api_routes())
        .layer(DefaultBodyLimit::max(server.body_limit_mb * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/generate", post(generate))
        .route("/analyze", post(analyze))
        .route("/provider/info", get(provider_info))
        .route("/provider/switch", post(switch_provider))
        .route("/provider/test", get(test_provider))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// Error response type
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    error: String,
    details: Option<Value>,
}

impl AppError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({"success": false, "error": self.error});
        if let Some(details) = self.details {
            body["details"] = details;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        let message = err.to_string();
        match err {
            GenerationError::Validation(errors) => {
                AppError::new(StatusCode::BAD_REQUEST, message).with_details(json!(errors))
            }
            GenerationError::UnknownProvider(_) | GenerationError::ProviderUnavailable { .. } => {
                AppError::new(StatusCode::BAD_REQUEST, message)
            }
            GenerationError::AllProvidersExhausted { attempts, .. } => {
                AppError::new(StatusCode::BAD_GATEWAY, message)
                    .with_details(json!({"attempts": attempts}))
            }
            GenerationError::NoProvidersConfigured { .. } => {
                AppError::new(StatusCode::SERVICE_UNAVAILABLE, message)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, "Invalid request body")
            .with_details(json!([rejection.body_text()]))
    }
}

/// `Json` extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct ApiJson<T>(T);

#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

// Health endpoint
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    providers: usize,
    primary: &'static str,
    timestamp: String,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.generator.registry();
    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        providers: registry.available().len(),
        primary: registry.snapshot().primary().name(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn generate(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> Result<Response, AppError> {
    let result = state.generator.generate(&request).await?;
    Ok(ok(result).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest {
    prompt: String,
    #[serde(default, alias = "gameTree")]
    scene_tree: SceneTree,
    #[serde(default)]
    selected_instances: Vec<SelectedInstance>,
    #[serde(default)]
    request_size: Option<RequestSize>,
}

async fn analyze(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let classification = state.generator.analyze(
        &request.prompt,
        &request.scene_tree,
        &request.selected_instances,
        request.request_size,
    )?;
    Ok(ok(classification).into_response())
}

async fn provider_info(State(state): State<Arc<AppState>>) -> Response {
    ok(state.generator.registry().info()).into_response()
}

#[derive(Deserialize)]
struct SwitchRequest {
    provider: String,
}

async fn switch_provider(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SwitchRequest>,
) -> Result<Response, AppError> {
    let registry = state.generator.registry();
    registry.switch(&request.provider)?;
    Ok(ok(registry.info()).into_response())
}

#[derive(Serialize)]
struct ConnectionTest {
    provider: String,
    model: String,
    tokens: u64,
}

#[derive(Deserialize)]
struct TestQuery {
    provider: Option<String>,
}

async fn test_provider(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TestQuery>,
) -> Result<Response, AppError> {
    let result = state
        .generator
        .test_connection(query.provider.as_deref())
        .await?;
    Ok(ok(ConnectionTest {
        provider: result.provider_used,
        model: result.model,
        tokens: result.tokens_consumed,
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockTransport, Provider, ProviderKind, ProviderReply};
    use axum::body::Body;
    use axum::http::{Request, header};
    use tower::ServiceExt;

    const RED_PARTS: &str = r#"{"operations":[{"type":"modify_instance","path":["Workspace","Part1"],"properties":{"Color":{"type":"color3","value":"1,0,0"}}}],"summary":"Made the parts red"}"#;

    fn router_with(transport: MockTransport) -> Router {
        let registry = ProviderRegistry::new(vec![
            Provider::new(ProviderKind::OpenAi, "o"),
            Provider::new(ProviderKind::Anthropic, "a"),
        ])
        .unwrap();
        let generator = Generator::new(
            Arc::new(registry),
            Arc::new(transport),
            GenerationSettings::default(),
        );
        Server::with_generator(&Config::default(), Arc::new(generator)).router()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn scene() -> Value {
        json!({
            "Workspace": {
                "ClassName": "Workspace",
                "Name": "Workspace",
                "Children": [{"ClassName": "Part", "Name": "Part1"}]
            }
        })
    }

    #[tokio::test]
    async fn health_reports_providers() {
        let (status, body) = send(
            router_with(MockTransport::new()),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["providers"], 2);
        assert_eq!(body["primary"], "OpenAI");
    }

    #[tokio::test]
    async fn generate_returns_operations() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": RED_PARTS}}],
                "usage": {"total_tokens": 99}
            })))
        });

        let (status, body) = send(
            router_with(transport),
            post_json(
                "/generate",
                json!({"prompt": "make all parts red", "sceneTree": scene()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let data = &body["data"];
        assert_eq!(data["providerUsed"], "OpenAI");
        assert_eq!(data["tokensConsumed"], 99);
        assert_eq!(data["mode"], "direct_edit");
        assert_eq!(data["operations"][0]["type"], "modify_instance");
        assert_eq!(
            data["operations"][0]["properties"]["Color"],
            json!({"type": "Color3", "value": "1,0,0"})
        );
    }

    #[tokio::test]
    async fn legacy_prefix_and_game_tree_alias() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": RED_PARTS}}]
            })))
        });

        let (status, body) = send(
            router_with(transport),
            post_json(
                "/api/ai/generate",
                json!({"prompt": "make all parts red", "gameTree": scene()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["operations"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oversized_prompt_is_a_validation_error() {
        let (status, body) = send(
            router_with(MockTransport::new()),
            post_json(
                "/generate",
                json!({"prompt": "a".repeat(2001), "sceneTree": scene()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Validation failed");
        assert!(body["details"][0].as_str().unwrap().contains("2000"));
    }

    #[tokio::test]
    async fn malformed_json_uses_envelope() {
        let request = Request::post("/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(router_with(MockTransport::new()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid request body");
    }

    #[tokio::test]
    async fn exhausted_providers_map_to_bad_gateway() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(2).returning(|_| {
            Ok(ProviderReply {
                status: 503,
                body: json!("overloaded"),
            })
        });

        let (status, body) = send(
            router_with(transport),
            post_json(
                "/generate",
                json!({"prompt": "make all parts red", "sceneTree": scene()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(
            body["error"]
                .as_str()
                .unwrap()
                .starts_with("All AI providers failed. Last error: Anthropic Claude")
        );
        assert_eq!(body["details"]["attempts"], 2);
    }

    #[tokio::test]
    async fn analyze_does_not_call_providers() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(0);

        let (status, body) = send(
            router_with(transport),
            post_json(
                "/analyze",
                json!({"prompt": "remove the spawn locations", "gameTree": scene()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deletionRequested"], true);
        assert!(body["data"]["estimatedCost"].as_u64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn switch_and_info() {
        let router = router_with(MockTransport::new());

        let (status, body) = send(
            router.clone(),
            post_json("/provider/switch", json!({"provider": "anthropic"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "Anthropic Claude");

        let (_, body) = send(
            router.clone(),
            Request::get("/provider/info").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(body["data"]["name"], "Anthropic Claude");
        assert_eq!(body["data"]["fallbacks"], json!(["OpenAI"]));

        let (status, body) = send(
            router,
            post_json("/provider/switch", json!({"provider": "google"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("GOOGLE_API_KEY"));
    }

    #[tokio::test]
    async fn provider_test_reports_provider() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|_| {
            Ok(ProviderReply::ok(json!({
                "choices": [{"message": {"content": "{\"test\": \"success\"}"}}]
            })))
        });

        let (status, body) = send(
            router_with(transport),
            Request::get("/api/ai/provider/test").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["provider"], "OpenAI");
    }

    #[tokio::test]
    async fn provider_test_accepts_named_provider() {
        let mut transport = MockTransport::new();
        transport.expect_post().times(1).returning(|req| {
            assert_eq!(req.provider, "Anthropic Claude");
            Ok(ProviderReply::ok(json!({
                "content": [{"type": "text", "text": "{\"test\": \"success\"}"}]
            })))
        });
        let router = router_with(transport);

        let (status, body) = send(
            router.clone(),
            Request::get("/provider/test?provider=anthropic")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["provider"], "Anthropic Claude");

        let (status, body) = send(
            router,
            Request::get("/provider/test?provider=google")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }
}
