use crate::errors::ApiError;
use crate::rest::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

pub const INGEST_KEY_HEADER: &str = "x-api-key";
pub const DASHBOARD_KEY_HEADER: &str = "x-dashboard-key";

/// Guards `/api/*`. Fails closed when no dashboard key is configured.
pub async fn require_dashboard_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(required) = state.keys.dashboard.as_deref() else {
        return Err(ApiError::NotConfigured("DASHBOARD_API_KEY"));
    };

    let authorized = matches!(dashboard_key(req.headers()), Some(provided) if provided == required);
    if !authorized {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(req).await)
}

/// Checks the device credential on `/ingest`.
pub fn check_ingest_key(headers: &HeaderMap, required: Option<&str>) -> Result<(), ApiError> {
    let provided = headers
        .get(INGEST_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    match (provided, required) {
        (Some(provided), Some(required)) if provided == required => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

/// `Authorization: Bearer <key>` wins over `x-dashboard-key: <key>`.
fn dashboard_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    bearer
        .or_else(|| {
            headers
                .get(DASHBOARD_KEY_HEADER)
                .and_then(|v| v.to_str().ok())
        })
        .filter(|key| !key.is_empty())
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, rest) = value.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim_start();
    (!token.is_empty()).then_some(token)
}
