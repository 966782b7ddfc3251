//! Liveness probe: /health, /healthz

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;

use super::{json_response, FullBody};
use crate::server::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub uptime: u64,
    pub store: &'static str,
    pub dev_mode: bool,
    pub images_enabled: bool,
    pub reseed_enabled: bool,
    pub timestamp: String,
}

pub fn health_check(state: Arc<AppState>) -> Response<FullBody> {
    let response = HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        store: state.people.store_kind(),
        dev_mode: state.args.dev_mode,
        images_enabled: state.people.images_enabled(),
        reseed_enabled: state.args.schedule_hour.is_some() && state.args.reseed_file.is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    json_response(StatusCode::OK, &response)
}
