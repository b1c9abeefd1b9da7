pub mod admin_handlers;
pub mod base_url;

use axum::response::Json;
use serde_json::{json, Value};

pub use base_url::resolve_base_url;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
