pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<services::auth_service::AuthService>,
    pub session_manager: Arc<auth::session::SessionManager>,
    pub rate_limiter: Arc<middleware::rate_limit::IpRateLimiter>,
    pub config: Arc<config::AppConfig>,
}
