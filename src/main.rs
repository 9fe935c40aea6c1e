use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use walsrec::{init_tracing, AppState, Config, EmbeddingRequest, RawEmbeddingRequest, RecError};

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "walsrec-serving".to_string());
    status.insert("version".to_string(), "0.1.0".to_string());

    Json(ApiResponse::success(status))
}

async fn project_embedding(
    State(state): State<AppState>,
    Json(raw): Json<RawEmbeddingRequest>,
) -> Result<Json<ApiResponse<walsrec::EmbeddingResponse>>, StatusCode> {
    let request = EmbeddingRequest::try_from(raw).map_err(|e| {
        tracing::warn!("rejected embedding request: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    match state.serving_service.project_embedding(&request).await {
        Ok(response) => Ok(Json(ApiResponse::success(response))),
        Err(RecError::NotFound { kind, id }) => {
            tracing::warn!("unknown {} id: {}", kind, id);
            Err(StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("failed to project embedding: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<HashMap<String, u64>>> {
    Json(ApiResponse::success(
        state.serving_service.get_serving_stats(),
    ))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/embeddings", post(project_embedding))
        .route("/stats", get(get_stats))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().await;

    let config = match std::env::var("WALSREC_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::default(),
    };
    info!("starting walsrec serving on {:?}", config.server);

    let addr = config.server.socket_addr()?;
    let state = AppState::load(config)?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
