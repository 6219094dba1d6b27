// ============================
// crates/backend-lib/src/handlers/api.rs
// ============================
//! `/api/*` handlers. Every failure leaves through [`AppError`] and so
//! ends up in the JSON error envelope.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Deserialize;
use vplan_common::{AuthRequest, AuthResponseBody, TokenResponseBody, VPlanResponse};

use crate::auth::{clear_session_cookie, parse_cookie, SESSION_COOKIE};
use crate::error::AppError;
use crate::metrics::{AUTH_FAILURE, AUTH_SUCCESS};
use crate::middleware::{bearer_token, Bucket, ClientAddr};
use crate::AppState;

/// POST /api/authenticate/{username}
///
/// Path and body rejections are taken as values so that they are
/// reported after the rate limiter, inside the error envelope.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    username: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    state.gate.admit(Bucket::Authenticate, &client)?;

    let Path(username) = username.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let body = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    if username.is_empty() {
        return Err(AppError::BadRequest(String::new()));
    }
    let req: AuthRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if req.password.is_empty() {
        return Err(AppError::BadRequest(String::new()));
    }

    let auth = match state.auth.authenticate(&username, &req.group, &req.password).await {
        Ok(auth) => auth,
        Err(_) => {
            counter!(AUTH_FAILURE).increment(1);
            tracing::warn!(%client, provider = state.auth.name(), "rejected login");
            return Err(AppError::Unauthorized);
        },
    };
    counter!(AUTH_SUCCESS).increment(1);

    let resp = AuthResponseBody {
        ident: auth.ident,
        ctx: auth.ctx,
    };

    if req.wants_session() {
        let session = state.sessions.create(&resp.ident, req.wants_remember()).await?;
        let cookie = state.sessions.cookie(&session)?;
        tracing::info!(ident = %resp.ident, remember = req.wants_remember(), "session login");
        return Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(resp)).into_response());
    }

    let (token, expire) = state.tokens.issue_or_renew(&resp.ident).await?;
    tracing::info!(ident = %resp.ident, %expire, "token login");
    Ok(Json(TokenResponseBody {
        auth: resp,
        token,
        expire,
    })
    .into_response())
}

/// POST /api/logout
///
/// Always succeeds unless rate limited. Cleanup failures are logged only.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    state.gate.admit(Bucket::Logout, &client)?;

    if let Some(sid) = parse_cookie(&headers, SESSION_COOKIE) {
        if let Err(e) = state.sessions.destroy(&sid).await {
            tracing::warn!(error = %e, "could not remove session");
        }
    }

    if let Some(token) = bearer_token(&headers) {
        match state.tokens.validate(&token).await {
            Ok(Some(ident)) => {
                if let Err(e) = state.tokens.revoke(&ident).await {
                    tracing::warn!(ident = %ident, error = %e, "could not revoke api token");
                }
            },
            Ok(None) => {},
            Err(e) => tracing::warn!(error = %e, "could not look up api token"),
        }
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::Value::Null),
    )
        .into_response())
}

/// Query of `GET /api/vplan`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VPlanQuery {
    pub class: String,
    pub time: String,
}

/// GET /api/vplan?class=&time=
///
/// The query string is only parsed once the caller passed the gate.
pub async fn get_vplan(
    State(state): State<Arc<AppState>>,
    ClientAddr(client): ClientAddr,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<VPlanResponse>, AppError> {
    let ident = state.gate.check(Bucket::GetVPlan, &client, &headers).await?;

    let Query(query) = Query::<VPlanQuery>::try_from_uri(&uri)
        .map_err(|e| AppError::BadRequest(e.body_text()))?;

    let since = if query.time.is_empty() {
        Utc::now()
    } else {
        DateTime::parse_from_rfc3339(&query.time)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| AppError::BadRequest("time format is not RFC3339".to_string()))?
    };

    let data = state.storage.get_vplans(&query.class, since).await?;
    tracing::debug!(ident = %ident, class = %query.class, plans = data.len(), "served vplans");
    Ok(Json(VPlanResponse { data }))
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
