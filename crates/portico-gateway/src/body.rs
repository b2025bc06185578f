//! Response body type and small response constructors.

use bytes::Bytes;
use http::{header, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use serde::Serialize;

use crate::error::ErrorResponse;

/// Body of every response the gateway produces.
///
/// Either a buffered local body or the upstream's byte stream. The upstream
/// stream is `Send` but not `Sync`, hence the unsync box.
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Wrap a full byte payload.
pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty body.
pub fn empty_body() -> ResponseBody {
    Empty::new().map_err(|never| match never {}).boxed_unsync()
}

/// A plain-text response.
pub fn text_response(status: StatusCode, text: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(full_body(text));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// A JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(full_body(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// `404 {"error":"Not found"}`.
pub fn not_found() -> Response<ResponseBody> {
    json_response(StatusCode::NOT_FOUND, &ErrorResponse::not_found())
}

/// `502 {"error":"Bad gateway"}`.
pub fn bad_gateway() -> Response<ResponseBody> {
    json_response(StatusCode::BAD_GATEWAY, &ErrorResponse::bad_gateway())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_string(response: Response<ResponseBody>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_not_found() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(body_string(response).await, r#"{"error":"Not found"}"#);
    }

    #[tokio::test]
    async fn test_bad_gateway() {
        let response = bad_gateway();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_string(response).await, r#"{"error":"Bad gateway"}"#);
    }

    #[tokio::test]
    async fn test_text_and_empty() {
        let response = text_response(StatusCode::OK, "ok");
        assert_eq!(body_string(response).await, "ok");

        let empty = Response::new(empty_body());
        assert_eq!(body_string(empty).await, "");
    }
}
