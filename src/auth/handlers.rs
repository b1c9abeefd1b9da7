use axum::{
    extract::{Form, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Json, Redirect, Response},
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::handlers::base_url::resolve_base_url;
use crate::models::user::Identity;
use crate::services::auth_service::AuthServiceError;
use crate::AppState;

/// Answer for every login request that did not fail outright, so the
/// response never reveals whether an address is invited.
pub const LOGIN_ACCEPTED_MESSAGE: &str = "if this email is invited, a magic link has been sent";

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    email: Option<String>,
    /// Accepted for password-manager style forms.
    username: Option<String>,
}

impl LoginForm {
    fn email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct MagicQuery {
    token: Option<String>,
}

fn login_accepted() -> Response {
    Json(json!({ "message": LOGIN_ACCEPTED_MESSAGE })).into_response()
}

/// POST /login
pub async fn request_magic_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let email = form
        .email()
        .ok_or_else(|| AppError::Validation("email is required".to_string()))?;
    let base_url = resolve_base_url(
        &headers,
        &state.config.app_base_url,
        state.config.trust_proxy_headers,
    );

    if state.config.is_admin_email(email) {
        let admin = state.auth_service.ensure_admin(email).await?;

        if state.config.admin_auto_login {
            tracing::info!(email = %admin.email, "Admin auto-login");
            let jar = state.session_manager.sign_in(jar, &admin.identity())?;
            return Ok((jar, Redirect::to("/admin")).into_response());
        }

        state
            .auth_service
            .create_magic_link_invite(&admin.email, &base_url)
            .await?;
        return Ok(login_accepted());
    }

    match state
        .auth_service
        .require_and_send_magic_link(email, &base_url)
        .await
    {
        Ok(()) => Ok(login_accepted()),
        Err(AuthServiceError::NotInvited) | Err(AuthServiceError::UserDisabled) => {
            Ok(login_accepted())
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /magic?token=
pub async fn redeem_magic_link(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<MagicQuery>,
) -> Result<Response> {
    let token = query
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("missing token".to_string()))?;

    let config = state.config.clone();
    let identity = state
        .auth_service
        .redeem_magic_token(token, |email| config.is_admin_email(email))
        .await
        .map_err(|e| {
            if e.is_token_rejection() {
                tracing::info!("Magic link rejected: {}", e);
            }
            AppError::from(e)
        })?;

    let jar = state.session_manager.sign_in(jar, &identity)?;
    let target = if identity.is_admin() { "/admin" } else { "/" };

    Ok((jar, Redirect::to(target)).into_response())
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (state.session_manager.clear(jar), Redirect::to("/login"))
}

/// GET /me
pub async fn me(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
