use crate::db::SchemaCache;
use crate::service::{QueryRequest, QueryResponse, QueryService, ServiceUnavailable};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
}

#[derive(Serialize)]
struct ErrorDetail {
    detail: String,
}

impl IntoResponse for ServiceUnavailable {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorDetail {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthReport {
    database: &'static str,
    schema: SchemaStatus,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum SchemaStatus {
    Ready { tables: usize },
    Unavailable { reason: String },
}

pub fn create_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/api/query", post(process_query))
        .route("/api/health", get(health_check))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn process_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServiceUnavailable> {
    let response = state.service.answer(&request.query).await?;
    Ok(Json(response))
}

// 200 only when both the pool and the schema cache are usable
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let connected = state.service.is_connected();
    let schema = match state.service.schema() {
        SchemaCache::Ready(tables) => SchemaStatus::Ready {
            tables: tables.len(),
        },
        SchemaCache::Unavailable(reason) => SchemaStatus::Unavailable {
            reason: reason.clone(),
        },
    };
    let healthy = connected && matches!(schema, SchemaStatus::Ready { .. });

    let report = HealthReport {
        database: if connected { "connected" } else { "unavailable" },
        schema,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
