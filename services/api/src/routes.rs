use crate::infra::{blob_route, AppState, PlatformMarketplace};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use praevon::error::AppError;
use praevon::marketplace::marketplace_router;
use praevon::storage::{CapabilityGrant, ObjectStore, Permission};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Marketplace API plus operational endpoints and the blob emulator that honours the
/// capability URLs the marketplace hands out.
pub(crate) fn with_platform_routes(marketplace: Arc<PlatformMarketplace>) -> Router {
    let blobs = Router::new()
        .route(
            &blob_route(marketplace.storage().base_url().path()),
            put(put_object).get(get_object),
        )
        .with_state(marketplace.clone());

    marketplace_router(marketplace)
        .merge(blobs)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

async fn put_object(
    State(marketplace): State<Arc<PlatformMarketplace>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let grant = match capability(&marketplace, &uri, Permission::Write) {
        Ok(grant) => grant,
        Err(rejection) => return rejection,
    };

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(FALLBACK_CONTENT_TYPE);
    if !grant.permits_content_type(content_type) {
        return blob_error(
            StatusCode::FORBIDDEN,
            format!("content type '{content_type}' does not match the upload capability"),
        );
    }

    let size = body.len();
    match marketplace
        .storage()
        .store()
        .put(&grant.key, body.to_vec(), content_type)
    {
        Ok(()) => {
            info!(key = %grant.key, size, content_type, "blob stored");
            StatusCode::CREATED.into_response()
        }
        Err(error) => AppError::from(error).into_response(),
    }
}

async fn get_object(
    State(marketplace): State<Arc<PlatformMarketplace>>,
    uri: Uri,
) -> Response {
    let grant = match capability(&marketplace, &uri, Permission::Read) {
        Ok(grant) => grant,
        Err(rejection) => return rejection,
    };

    match marketplace.storage().store().get(&grant.key) {
        Ok(Some(object)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, object.content_type)],
            object.bytes,
        )
            .into_response(),
        Ok(None) => blob_error(StatusCode::NOT_FOUND, format!("blob '{}' not found", grant.key)),
        Err(error) => AppError::from(error).into_response(),
    }
}

fn capability(
    marketplace: &PlatformMarketplace,
    uri: &Uri,
    required: Permission,
) -> Result<CapabilityGrant, Response> {
    let mut url = marketplace.storage().base_url().clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    marketplace.storage().verify(&url, required).map_err(|error| {
        debug!(%error, path = uri.path(), "capability rejected");
        AppError::from(error).into_response()
    })
}

fn blob_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
