use crate::{cli::globals::GlobalArgs, turnstile};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    token: String,
    #[serde(rename = "idempotencyKey")]
    idempotency_key: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/turnstile",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Upstream verification outcome, passed through verbatim"),
        (status = 400, description = "No token provided"),
        (status = 500, description = "Upstream verification call failed"),
    ),
    tag = "turnstile"
)]
// axum handler proxying challenge tokens to the remote siteverify endpoint
#[instrument(skip(globals, headers, payload))]
pub async fn turnstile(
    globals: Extension<GlobalArgs>,
    headers: HeaderMap,
    payload: Option<Json<VerifyRequest>>,
) -> impl IntoResponse {
    let request: VerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            error!("No token provided");

            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"success": false, "error": "No token provided"})),
            );
        }
    };

    if request.token.is_empty() {
        error!("No token provided");

        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "No token provided"})),
        );
    }

    // never log the token itself, only its length and a short prefix
    debug!(
        "Verification request: token length {}, prefix {}, idempotency key {:?}",
        request.token.len(),
        turnstile::token_prefix(&request.token),
        request.idempotency_key
    );

    let remoteip = headers
        .get("CF-Connecting-IP")
        .and_then(|ip| ip.to_str().ok());

    match turnstile::siteverify(
        &globals,
        &request.token,
        request.idempotency_key.as_deref(),
        remoteip,
    )
    .await
    {
        Ok(outcome) => {
            debug!(
                "Verification outcome: success {}, error codes {}, hostname {}, action {}",
                outcome["success"], outcome["error-codes"], outcome["hostname"], outcome["action"]
            );

            (StatusCode::OK, Json(outcome))
        }
        Err(e) => {
            error!("Verification failed: {:?}", e);

            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "Verification failed"})),
            )
        }
    }
}
