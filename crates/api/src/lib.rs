//! Friend Safety Monitor API Server
//!
//! REST API for telemetry ingestion, subject status, threshold preferences,
//! and escalation cases.

use alerting::{
    AlertEngine, EscalationConfig, EscalationCoordinator, Notifier, PreferenceResolver,
    ThresholdProfile, TokioTimer,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::{PreferenceStore, Repository, SqliteRepository, StorageError, TelemetryStore};
use telemetry::{SubjectId, Validator};
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod error;
pub mod rate_limit;
mod routes;

pub use config::{AppConfig, LoggingConfig, ServerConfig, StorageConfig};
pub use error::ApiError;

use rate_limit::create_governor_config;

/// Backing stores for telemetry and preferences
#[derive(Clone)]
pub struct Stores {
    pub telemetry: Arc<dyn TelemetryStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    /// Backend name reported by the health check
    pub backend: &'static str,
}

impl Stores {
    /// Process-local stores, lost on restart
    pub fn in_memory(retention_per_subject: usize) -> Self {
        let repo = Arc::new(Repository::with_retention(retention_per_subject));
        Self {
            telemetry: repo.clone(),
            preferences: repo,
            backend: "memory",
        }
    }

    /// Open the configured backend
    pub async fn open(config: &StorageConfig) -> Result<Self, StorageError> {
        match &config.database_url {
            Some(url) => {
                let repo = Arc::new(SqliteRepository::connect(url).await?);
                Ok(Self {
                    telemetry: repo.clone(),
                    preferences: repo,
                    backend: "sqlite",
                })
            }
            None => {
                warn!("No database_url configured; telemetry will not survive a restart");
                Ok(Self::in_memory(config.retention_per_subject))
            }
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub engine: AlertEngine,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub preferences: Arc<dyn PreferenceStore>,
    /// Prometheus render handle, present once a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    pub storage_backend: &'static str,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire the engine together and start the grace-period timer loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        stores: Stores,
        notifier: Arc<dyn Notifier>,
        defaults: ThresholdProfile,
        escalation: EscalationConfig,
    ) -> Self {
        let resolver = Arc::new(PreferenceResolver::new(stores.preferences.clone(), defaults));
        let (timer, fires) = TokioTimer::channel();
        let coordinator = Arc::new(EscalationCoordinator::new(
            resolver.clone(),
            stores.telemetry.clone(),
            notifier,
            Arc::new(timer),
            escalation,
        ));
        tokio::spawn(coordinator.clone().run(fires));

        let engine = AlertEngine::new(
            Validator::default(),
            stores.telemetry.clone(),
            resolver,
            coordinator,
        );

        Self {
            engine,
            telemetry: stores.telemetry,
            preferences: stores.preferences,
            metrics: None,
            storage_backend: stores.backend,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: ComponentStatus,
    pub metrics: SystemMetrics,
}

/// Component status
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub storage: ComponentHealth,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub backend: String,
}

/// System metrics
#[derive(Debug, Serialize)]
pub struct SystemMetrics {
    pub active_cases: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/telemetry", post(routes::telemetry::ingest))
        .route(
            "/api/v1/subjects/:id/status",
            get(routes::subjects::get_status),
        )
        .route(
            "/api/v1/subjects/:id/history",
            get(routes::subjects::get_history),
        )
        .route(
            "/api/v1/subjects/:id/preferences",
            get(routes::preferences::get_preferences).put(routes::preferences::put_preferences),
        )
        .route("/api/v1/escalations", get(routes::escalations::get_active))
        .route(
            "/api/v1/escalations/history",
            get(routes::escalations::get_history),
        )
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    // A lookup for a subject that never exists exercises the store round trip
    let storage_ok = state
        .telemetry
        .get_latest(&SubjectId::new("__health__"))
        .await
        .is_ok();
    let active_cases = state.engine.coordinator().active_cases().await.len();

    let response = HealthResponse {
        status: if storage_ok { "healthy" } else { "degraded" }.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: ComponentStatus {
            storage: ComponentHealth {
                status: if storage_ok { "ok" } else { "error" }.to_string(),
                backend: state.storage_backend.to_string(),
            },
        },
        metrics: SystemMetrics { active_cases },
    };

    Json(response)
}

/// Prometheus scrape endpoint
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Initialize logging.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new().install_recorder()?;
    let stores = Stores::open(&config.storage).await?;
    let notifier = notify::build(&config.notifier).await?;

    let state = AppState::new(
        stores,
        notifier,
        config.defaults.clone(),
        config.escalation.clone(),
    )
    .with_metrics(metrics);

    let governor = create_governor_config(&config.rate_limit)?;
    let limiter = governor.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });

    let app = create_router(Arc::new(state)).layer(GovernorLayer { config: governor });

    info!("Starting API server on {}", config.server.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use notify::LogNotifier;
    use serde_json::{json, Value};
    use telemetry::TelemetrySample;
    use tower::ServiceExt;

    struct ReadOnlyStore(Repository);

    #[async_trait]
    impl TelemetryStore for ReadOnlyStore {
        async fn put_latest(&self, _sample: &TelemetrySample) -> Result<(), StorageError> {
            Err(StorageError::DatabaseError("disk full".to_string()))
        }

        async fn get_latest(&self, subject: &SubjectId) -> Result<Option<TelemetrySample>, StorageError> {
            self.0.get_latest(subject).await
        }

        async fn history(&self, subject: &SubjectId, limit: usize) -> Result<Vec<TelemetrySample>, StorageError> {
            self.0.history(subject, limit).await
        }
    }

    fn app_with(stores: Stores) -> Router {
        let state = AppState::new(
            stores,
            Arc::new(LogNotifier::new()),
            ThresholdProfile::default(),
            EscalationConfig::default(),
        );
        create_router(Arc::new(state))
    }

    fn app() -> Router {
        app_with(Stores::in_memory(100))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post_telemetry(app: &Router, body: Value) -> (StatusCode, Value) {
        send(app, Method::POST, "/api/v1/telemetry", Some(body)).await
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = send(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["components"]["storage"]["backend"], "memory");
        assert_eq!(body["metrics"]["active_cases"], 0);
    }

    #[tokio::test]
    async fn test_normal_sample_is_idle() {
        let app = app();
        let (status, body) = post_telemetry(
            &app,
            json!({ "friendId": "alice", "heartRate": 72, "distanceFromFriends": 20 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transition"]["kind"], "idle");
        assert_eq!(body["conditions"], json!([]));
    }

    #[tokio::test]
    async fn test_abnormal_sample_opens_case() {
        let app = app();
        let (status, body) = post_telemetry(
            &app,
            json!({ "friendId": "alice", "heartRate": 160, "latitude": 1.5, "longitude": 2.5 }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transition"]["kind"], "warned");
        assert_eq!(body["conditions"], json!(["heart_rate_high"]));

        let (_, cases) = send(&app, Method::GET, "/api/v1/escalations", None).await;
        assert_eq!(cases.as_array().unwrap().len(), 1);
        assert_eq!(cases[0]["phase"], "warned");

        let (status, current) = send(&app, Method::GET, "/api/v1/subjects/alice/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(current["heartRate"], 160.0);
        assert_eq!(current["latitude"], 1.5);
        assert_eq!(current["escalation"]["phase"], "warned");
    }

    #[tokio::test]
    async fn test_sos_escalates_immediately() {
        let app = app();
        let (status, body) = post_telemetry(&app, json!({ "friendId": "alice", "sos": true })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transition"]["kind"], "escalated");
        assert_eq!(body["transition"]["cause"], "sos");

        let (_, history) = send(&app, Method::GET, "/api/v1/escalations/history", None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["subject"], "alice");
        assert_eq!(history[0]["phase"], "escalated");
    }

    #[tokio::test]
    async fn test_invalid_samples_rejected() {
        let app = app();

        let (status, body) = post_telemetry(&app, json!({ "friendId": "  ", "sos": true })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());

        let (status, _) = post_telemetry(&app, json!({ "friendId": "alice" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_telemetry(&app, json!({ "friendId": "alice", "latitude": 10.0 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_telemetry(
            &app,
            json!({ "friendId": "alice", "latitude": 120.0, "longitude": 0.0 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post_telemetry(
            &app,
            json!({ "friendId": "alice", "timestamp": "2099-01-01T00:00:00Z", "sos": true }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("future"));

        // Nothing was stored
        let (status, _) = send(&app, Method::GET, "/api/v1/subjects/alice/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_persist_failure_returns_transition() {
        let store = Arc::new(ReadOnlyStore(Repository::new()));
        let app = app_with(Stores {
            telemetry: store,
            preferences: Arc::new(Repository::new()),
            backend: "test",
        });

        let (status, body) = post_telemetry(&app, json!({ "friendId": "alice", "sos": true })).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["transition"]["kind"], "escalated");
        assert_eq!(body["conditions"], json!(["sos"]));
    }

    #[tokio::test]
    async fn test_preferences_round_trip() {
        let app = app();

        let (status, body) = send(&app, Method::GET, "/api/v1/subjects/alice/preferences", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], Value::Null);
        assert_eq!(body["effective"]["max_distance_apart"], 250.0);

        let (status, body) = send(
            &app,
            Method::PUT,
            "/api/v1/subjects/alice/preferences",
            Some(json!({ "maxDistanceApart": 400, "countdownBeforeNotify": 60 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["effective"]["max_distance_apart"], 400.0);
        assert_eq!(body["effective"]["grace_period_secs"], 60);
        assert_eq!(body["effective"]["max_heart_rate"], 150.0);

        // 300m is inside the subject's own limit
        let (_, report) = post_telemetry(
            &app,
            json!({ "friendId": "alice", "distanceFromFriends": 300 }),
        )
        .await;
        assert_eq!(report["transition"]["kind"], "idle");
    }

    #[tokio::test]
    async fn test_invalid_preferences_rejected() {
        let app = app();
        let (status, _) = send(
            &app,
            Method::PUT,
            "/api/v1/subjects/alice/preferences",
            Some(json!({ "minHeartRate": 90, "maxHeartRate": 80 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/api/v1/subjects/alice/preferences", None).await;
        assert_eq!(body["stored"], Value::Null);
    }

    #[tokio::test]
    async fn test_history_newest_first_with_limit() {
        let app = app();
        for (i, hr) in [70, 71, 72].iter().enumerate() {
            let ts = format!("2026-01-01T00:00:0{}Z", i);
            post_telemetry(&app, json!({ "friendId": "bob", "timestamp": ts, "heartRate": hr })).await;
        }

        let (status, body) = send(&app, Method::GET, "/api/v1/subjects/bob/history?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        let samples = body.as_array().unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0]["heartRate"], 72.0);
        assert_eq!(samples[1]["heartRate"], 71.0);
        assert_eq!(samples[0]["friendId"], "bob");
        assert!(samples[0].get("heart_rate").is_none());
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = app();
        let (status, _) = send(&app, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
