//! JSON extractor that reports rejections in the API error format

use axum::{
    extract::{rejection::JsonRejection as AxumRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::de::DeserializeOwned;

use super::error::ApiError;

/// Wrapper around `axum::Json` whose rejections are `400` API errors.
///
/// Malformed or missing action parameters are rejected here, before any
/// handler runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Body rejection rendered as an [`ApiError`]
#[derive(Debug)]
pub struct JsonRejection(ApiError);

impl IntoResponse for JsonRejection {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = JsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match AxumJson::<T>::from_request(req, state).await {
            Ok(AxumJson(value)) => Ok(Json(value)),
            Err(rejection) => Err(JsonRejection(rejection_error(&rejection))),
        }
    }
}

fn rejection_error(rejection: &AxumRejection) -> ApiError {
    let error = match rejection {
        AxumRejection::JsonDataError(err) => {
            ApiError::bad_request(format!("Invalid action parameters: {}", err.body_text()))
        }
        AxumRejection::JsonSyntaxError(err) => {
            ApiError::bad_request(format!("Invalid JSON syntax: {}", err.body_text()))
        }
        AxumRejection::MissingJsonContentType(_) => {
            let mut error =
                ApiError::bad_request("Missing Content-Type header. Expected 'application/json'.");
            error.status = StatusCode::UNSUPPORTED_MEDIA_TYPE;
            error
        }
        AxumRejection::BytesRejection(err) => {
            ApiError::bad_request(format!("Failed to read request body: {}", err.body_text()))
        }
        _ => ApiError::bad_request("Invalid JSON request"),
    };

    error.with_code("invalid_request")
}

impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}
