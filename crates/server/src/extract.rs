//! Request extractors that reject with JSON `AppError` bodies.
//!
//! axum's own `Json`, `Query` and `Path` reject with plain-text bodies; the
//! wrappers here route those rejections through [`AppError`] so every 4xx
//! the API emits has the same `{"error": …}` shape.

use axum::extract::FromRequest;
use axum::extract::FromRequestParts;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge("Request body is too large".to_string());
        }
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                Self::BadRequest("Expected a JSON request body".to_string())
            }
            JsonRejection::JsonSyntaxError(_) => {
                Self::BadRequest("Request body is not valid JSON".to_string())
            }
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Body1 {
        quantity: i32,
    }

    async fn extract(request: Request<Body>) -> Result<ApiJson<Body1>, AppError> {
        ApiJson::<Body1>::from_request(request, &()).await
    }

    #[tokio::test]
    async fn test_valid_json_extracts() {
        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"quantity": 3}"#))
            .unwrap();
        let ApiJson(body) = extract(request).await.unwrap();
        assert_eq!(body.quantity, 3);
    }

    #[tokio::test]
    async fn test_syntax_error_is_bad_request() {
        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from("{quantity"))
            .unwrap();
        let err = extract(request).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_bad_request() {
        let request = Request::post("/")
            .body(Body::from(r#"{"quantity": 3}"#))
            .unwrap();
        let err = extract(request).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_wrong_field_type_is_bad_request() {
        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"quantity": "three"}"#))
            .unwrap();
        let err = extract(request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
