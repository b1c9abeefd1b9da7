use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::Result;
use crate::handlers::base_url::resolve_base_url;
use crate::models::invitation::{Invitation, InvitationView};
use crate::models::user::Identity;
use crate::AppState;

pub const DEFAULT_LIST_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EmailForm {
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitationForm {
    email: String,
    #[serde(default)]
    send: Option<String>,
}

impl CreateInvitationForm {
    fn wants_send(&self) -> bool {
        matches!(
            self.send.as_deref().map(str::trim),
            Some("true") | Some("1") | Some("on") | Some("yes")
        )
    }
}

fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    resolve_base_url(
        headers,
        &state.config.app_base_url,
        state.config.trust_proxy_headers,
    )
}

/// GET /admin/invitations
pub async fn list_invitations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InvitationView>>> {
    let invitations = state
        .auth_service
        .list_invitations(query.limit.unwrap_or(DEFAULT_LIST_LIMIT))
        .await?;
    let views = state
        .auth_service
        .annotate_invites_with_user_disabled(invitations)
        .await?;

    Ok(Json(views))
}

/// POST /admin/invitations
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    headers: HeaderMap,
    Form(form): Form<CreateInvitationForm>,
) -> Result<Response> {
    let invitation = state.auth_service.create_invitation(&form.email).await?;
    tracing::info!(admin = %admin.email, invitation_id = invitation.id, "Admin created invitation");

    let invitation = if form.wants_send() {
        state
            .auth_service
            .send_invitation_by_id(invitation.id, &base_url(&state, &headers))
            .await?
    } else {
        invitation
    };

    Ok((StatusCode::CREATED, Json(invitation)).into_response())
}

/// POST /admin/invitations/{id}/send
pub async fn send_invitation(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Invitation>> {
    let invitation = state
        .auth_service
        .send_invitation_by_id(id, &base_url(&state, &headers))
        .await?;
    tracing::info!(admin = %admin.email, invitation_id = id, "Admin sent invitation");

    Ok(Json(invitation))
}

/// POST /admin/invitations/{id}/revoke
pub async fn revoke_invitation(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Path(id): Path<i64>,
) -> Result<Json<Invitation>> {
    let invitation = state.auth_service.revoke_invitation_by_id(id).await?;
    tracing::info!(admin = %admin.email, invitation_id = id, "Admin revoked invitation");

    Ok(Json(invitation))
}

/// POST /admin/invitations/revoke-email
pub async fn revoke_email(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Form(form): Form<EmailForm>,
) -> Result<Json<serde_json::Value>> {
    let revoked = state.auth_service.revoke_all_for_email(&form.email).await?;
    tracing::info!(admin = %admin.email, revoked, "Admin revoked invitations by email");

    Ok(Json(json!({ "revoked": revoked })))
}

/// POST /admin/users/disable
pub async fn disable_user(
    State(state): State<AppState>,
    Extension(admin): Extension<Identity>,
    Form(form): Form<EmailForm>,
) -> Result<Json<serde_json::Value>> {
    let user = state.auth_service.disable_user(&form.email).await?;
    tracing::info!(admin = %admin.email, email = %user.email, "Admin disabled user");

    Ok(Json(json!({ "email": user.email, "disabled": user.disabled })))
}
