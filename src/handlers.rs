use bytes::Bytes;
use salvo::affix_state;
use salvo::http::StatusCode;
use salvo::prelude::*;
use serde::Serialize;
use serde::de::IgnoredAny;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::constants::{BODY_PREVIEW_LIMIT, CONTENT_TYPE_JSON, DEFAULT_SERVICE_NAME};
use crate::errors::ForwardError;
use crate::state::AppState;
use crate::upstream::{UpstreamReply, preview_bytes};
use crate::utils::now_timestamp_string;

pub fn router(state: AppState) -> Router {
    Router::new()
        .hoop(affix_state::inject(state))
        .push(Router::with_path("ping").get(ping))
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("users").post(create_user))
}

#[handler]
pub async fn ping(depot: &mut Depot, res: &mut Response) {
    res.render(Json(MessageResponse {
        message: format!("pong from {}", service_name(depot)),
    }));
}

#[handler]
pub async fn health_check(depot: &mut Depot, res: &mut Response) {
    res.render(Json(HealthCheckResponse {
        status: "ok".to_string(),
        timestamp: now_timestamp_string(),
        service: service_name(depot).to_string(),
    }));
}

/// Validates the body as JSON and relays it upstream unchanged.
#[handler]
pub async fn create_user(req: &mut Request, depot: &mut Depot, res: &mut Response) {
    let Ok(state) = depot.obtain::<AppState>() else {
        error!("application state missing from depot");
        res.status_code(StatusCode::INTERNAL_SERVER_ERROR);
        res.render(Json(ErrorResponse {
            error: "Internal server error",
        }));
        return;
    };

    let request_id = Uuid::new_v4().to_string();
    info!(
        phase = "downstream_request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
        "Received {} request to {}",
        req.method(),
        req.uri().path()
    );

    match forward_user(req, state, &request_id).await {
        Ok(reply) => relay_reply(res, reply, &request_id),
        Err(error) => render_error(res, &error, &request_id),
    }
}

async fn forward_user(
    req: &mut Request,
    state: &AppState,
    request_id: &str,
) -> Result<UpstreamReply, ForwardError> {
    let body = read_body(req, state.config.request_body_max_size, request_id).await?;

    trace!(
        phase = "downstream_request_body",
        request_id,
        body = %preview_bytes(&body, BODY_PREVIEW_LIMIT),
        "Request body"
    );

    if let Err(error) = validate_json(&body) {
        warn!(
            phase = "downstream_invalid_json",
            request_id,
            body_bytes = body.len(),
            "Error parsing JSON: {error}"
        );
        return Err(ForwardError::InvalidJson);
    }

    state.upstream.forward(body, request_id).await
}

async fn read_body(
    req: &mut Request,
    max_size: usize,
    request_id: &str,
) -> Result<Bytes, ForwardError> {
    match req.payload_with_max_size(max_size).await {
        Ok(payload) => {
            debug!(
                phase = "downstream_body_read_done",
                request_id,
                body_bytes = payload.len(),
                "Read request body"
            );
            Ok(payload.clone())
        }
        Err(error) => {
            warn!(
                phase = "downstream_body_read_failed",
                request_id,
                max_size,
                "Error reading request body: {error}"
            );
            Err(ForwardError::ReadBody)
        }
    }
}

/// Syntax-only check: the parsed value is discarded and no schema applies.
fn validate_json(body: &[u8]) -> Result<(), serde_json::Error> {
    serde_json::from_slice::<IgnoredAny>(body).map(|_| ())
}

fn relay_reply(res: &mut Response, reply: UpstreamReply, request_id: &str) {
    res.status_code(reply.status);
    let content_type = reply.content_type.as_deref().unwrap_or(CONTENT_TYPE_JSON);
    let _ = res.add_header("Content-Type", content_type, true);

    if let Err(error) = res.write_body(reply.body) {
        error!(
            phase = "downstream_write_failed",
            request_id,
            "Failed to write relayed response body: {error}"
        );
    }
}

fn render_error(res: &mut Response, error: &ForwardError, request_id: &str) {
    debug!(
        phase = "downstream_error_response",
        request_id,
        status = %error.status(),
        "Responding with error: {error}"
    );
    res.status_code(error.status());
    res.render(Json(ErrorResponse {
        error: error.message(),
    }));
}

fn service_name(depot: &Depot) -> &str {
    depot
        .obtain::<AppState>()
        .map(|state| state.config.service_name.as_str())
        .unwrap_or(DEFAULT_SERVICE_NAME)
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthCheckResponse {
    status: String,
    timestamp: String,
    service: String,
}
