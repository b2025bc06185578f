//! Liveness endpoint.
//!
//! `GET /healthz` answers `200 ok` before the pipeline runs: no CORS
//! evaluation, no routing, no upstream call.

use http::{Method, Response, StatusCode};

use crate::body::{text_response, ResponseBody};

/// Path of the liveness endpoint.
pub const HEALTH_PATH: &str = "/healthz";

/// Whether the request targets the liveness endpoint.
pub fn is_health_check(method: &Method, path: &str) -> bool {
    path == HEALTH_PATH && (method == Method::GET || method == Method::HEAD)
}

/// The liveness response.
pub fn liveness() -> Response<ResponseBody> {
    text_response(StatusCode::OK, "ok")
}
