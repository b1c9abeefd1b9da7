use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::{auth, handlers, AppState};

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/admin/invitations",
            get(handlers::admin_handlers::list_invitations)
                .post(handlers::admin_handlers::create_invitation),
        )
        .route(
            "/admin/invitations/revoke-email",
            post(handlers::admin_handlers::revoke_email),
        )
        .route(
            "/admin/invitations/{id}/send",
            post(handlers::admin_handlers::send_invitation),
        )
        .route(
            "/admin/invitations/{id}/revoke",
            post(handlers::admin_handlers::revoke_invitation),
        )
        .route(
            "/admin/users/disable",
            post(handlers::admin_handlers::disable_user),
        )
        // Layers run bottom-up: authenticate first, then check the role
        .route_layer(middleware::from_fn(auth::middleware::require_admin))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let protected_routes = Router::new()
        .route("/me", get(auth::handlers::me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let login_routes = Router::new()
        .route("/login", post(auth::handlers::request_magic_link))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit_login,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/magic", get(auth::handlers::redeem_magic_link))
        .route("/logout", post(auth::handlers::logout))
        .merge(login_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
