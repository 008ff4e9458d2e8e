use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Operator token claims. Tokens are minted outside this service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn require_role(claims: &Claims, role: &str) -> Result<(), Response> {
    if claims.role == role {
        return Ok(());
    }
    tracing::warn!("{} tried an operator action with role {}", claims.sub, claims.role);
    Err((
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "You don't have the required role to execute this command." })),
    )
        .into_response())
}
