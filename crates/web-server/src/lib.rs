use axum::{
    Router,
    routing::get,
};
use configuration::Config;
use database::{MySqlPool, QueryLogger, RequestContext};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod session;

use session::Session;

/// The shared application state that all handlers can access.
#[derive(Debug, Clone)]
pub struct AppState {
    pub pool: MySqlPool,
    pub logger: Arc<QueryLogger>,
}

impl AppState {
    pub fn new(pool: MySqlPool, logger: Arc<QueryLogger>) -> Self {
        Self { pool, logger }
    }

    /// The per-request execution context for one session and caller label.
    pub fn context(&self, session: &Session, caller: &str) -> RequestContext {
        RequestContext::new(self.pool.clone(), self.logger.clone(), session.id(), caller)
    }
}

/// All API routes. Exposed separately from [`run_server`] so tests can drive it.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/stats", get(handlers::platform_statistics))
        .route("/api/reports", get(handlers::list_reports))
        .route("/api/reports/:name", get(handlers::run_report))
        .route(
            "/api/campaigns",
            get(handlers::list_campaigns).post(handlers::campaign_action),
        )
        .route("/api/campaigns/:id", get(handlers::get_campaign))
        .route("/api/campaigns/:id/rewards", get(handlers::campaign_rewards))
        .route(
            "/api/users",
            get(handlers::list_users).post(handlers::user_action),
        )
        .route(
            "/api/categories",
            get(handlers::list_categories).post(handlers::category_action),
        )
        .route(
            "/api/donations",
            get(handlers::list_donations).post(handlers::donation_action),
        )
        .route("/api/donors", get(handlers::active_donors))
        .route("/api/query-log", get(handlers::recent_queries))
        .route("/api/query-log/stats", get(handlers::query_stats))
        .route("/api/query-log/search", get(handlers::search_queries))
        .with_state(state)
        .layer(cors)
        // Logs every incoming request.
        .layer(TraceLayer::new_for_http())
}

/// Connects, applies migrations and serves the API until the process is stopped.
///
/// A connection failure is returned to the caller, which treats it as fatal.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = database::connect(&config.database).await?;
    database::run_migrations(&pool).await?;

    let logger = Arc::new(QueryLogger::mysql(pool.clone(), config.query_log.enabled));
    let app = router(Arc::new(AppState::new(pool, logger)));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, query_log = config.query_log.enabled, "Web server started and listening");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use configuration::DatabaseSettings;
    use database::MemoryLogSink;
    use serde_json::Value;
    use tower::ServiceExt;

    // Nothing listens on port 1, so any request that reaches the pool fails fast.
    fn offline_app() -> (Router, Arc<MemoryLogSink>) {
        let settings = DatabaseSettings {
            port: 1,
            acquire_timeout_secs: 1,
            ..Default::default()
        };
        let pool = database::connect_lazy(&settings).unwrap();
        let sink = Arc::new(MemoryLogSink::default());
        let logger = Arc::new(QueryLogger::new(sink.clone(), true));
        (router(Arc::new(AppState::new(pool, logger))), sink)
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn form(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn catalog_lists_every_report() {
        let (app, _) = offline_app();
        let response = app.oneshot(get("/api/reports")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["name"].as_str())
            .collect();
        assert!(names.contains(&"platform-statistics"));
        assert!(names.contains(&"category-status-rollup"));
        assert_eq!(names.len(), database::reports::REPORTS.len());
    }

    #[tokio::test]
    async fn unknown_report_is_not_found() {
        let (app, sink) = offline_app();
        let response = app.oneshot(get("/api/reports/drop-tables")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = json_body(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["data"], Value::Array(vec![]));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn invalid_report_parameters_are_rejected_before_execution() {
        let (app, sink) = offline_app();
        let response = app
            .oneshot(get("/api/reports/top-donors?limit=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json_body(response).await;
        assert!(body["message"].as_str().unwrap().contains("limit"));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn unknown_form_action_is_a_bad_request() {
        let (app, _) = offline_app();
        let response = app
            .oneshot(form("/api/users", "action=explode&user_id=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_without_changes_is_a_bad_request() {
        let (app, _) = offline_app();
        let response = app
            .oneshot(form("/api/campaigns", "action=update&campaign_id=4&campaign_title="))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_log_search_is_a_bad_request() {
        let (app, _) = offline_app();
        let response = app
            .oneshot(get("/api/query-log/search?q=%20"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unreachable_database_degrades_health_and_fails_reads() {
        let (app, _) = offline_app();

        let response = app.clone().oneshot(get("/api/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["database"], false);
        assert_eq!(body["query_log"]["enabled"], true);

        let response = app.oneshot(get("/api/stats")).await.unwrap();
        assert!(response.status().is_server_error());
    }
}
