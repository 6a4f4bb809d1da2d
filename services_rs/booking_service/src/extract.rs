use crate::error::{ApiError, FieldErrors, NON_FIELD_ERRORS};
use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;

/// `Json<T>` whose rejections use the service's `{"detail", "errors"}` body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                let mut errors = FieldErrors::new();
                errors.insert(NON_FIELD_ERRORS.to_string(), vec![e.body_text()]);
                ApiError::invalid_form("invalid request body", errors)
            }
            JsonRejection::JsonSyntaxError(_) => ApiError::bad_request("request body is not valid JSON"),
            other => ApiError::new(other.status(), other.body_text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, StatusCode};

    #[derive(Debug, serde::Deserialize)]
    struct Sample {
        #[allow(dead_code)]
        count: i32,
    }

    fn json_request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn wrong_types_become_form_errors() {
        let err = ApiJson::<Sample>::from_request(json_request(r#"{"count":"many"}"#), &())
            .await
            .expect_err("type mismatch");
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.errors.expect("errors").contains_key(NON_FIELD_ERRORS));
    }

    #[tokio::test]
    async fn broken_json_is_a_bad_request() {
        let err = ApiJson::<Sample>::from_request(json_request("{not json"), &())
            .await
            .expect_err("syntax");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.detail, "request body is not valid JSON");
    }

    #[tokio::test]
    async fn missing_content_type_keeps_its_status() {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from(r#"{"count":1}"#))
            .unwrap();
        let err = ApiJson::<Sample>::from_request(req, &())
            .await
            .expect_err("no content type");
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
