use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;

use crate::error::AppError;
use crate::models::user::Identity;
use crate::AppState;

/// Require a valid session cookie belonging to an account that is still enabled.
///
/// On success the `Identity` is placed in the request extensions for
/// downstream handlers and guards.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(identity) = state.session_manager.identity_from(&jar) else {
        if request.method() == Method::GET {
            return Redirect::to("/login").into_response();
        }
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        )
            .into_response();
    };

    // Sessions are stateless, so the disabled flag is checked on every request
    match state.auth_service.is_user_disabled(&identity.email).await {
        Ok(false) => {}
        Ok(true) => {
            tracing::warn!(email = %identity.email, "Rejected session of disabled user");
            let jar = state.session_manager.clear(jar);
            return (
                StatusCode::UNAUTHORIZED,
                jar,
                Json(json!({ "error": "account revoked" })),
            )
                .into_response();
        }
        Err(e) => return AppError::from(e).into_response(),
    }

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Must run after `require_auth`.
pub async fn require_admin(
    Extension(identity): Extension<Identity>,
    request: Request,
    next: Next,
) -> Response {
    if !identity.is_admin() {
        tracing::warn!(email = %identity.email, path = %request.uri().path(), "Non-admin hit admin route");
        return AppError::Forbidden("admin only".to_string()).into_response();
    }

    next.run(request).await
}
