//! API error type, its [`axum::response::IntoResponse`] implementation, and
//! the JSON extractor that reports body rejections in the same envelope.

use axum::{
  Json,
  extract::{FromRequest, Request, rejection::JsonRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use vouch_core::Error;

/// Handler failure with its HTTP mapping.
///
/// Wraps [`vouch_core::Error`]; the response body carries the message plus
/// the stable error kind, never internals like stack traces or secrets.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
  fn from(e: Error) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      Error::Validation(_) | Error::MalformedPayload(_) => StatusCode::BAD_REQUEST,
      Error::Authentication(_) => StatusCode::UNAUTHORIZED,
      Error::NotFound(_) => StatusCode::NOT_FOUND,
      Error::Provider(_) | Error::Conflict(_) | Error::Store(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    };
    let body = json!({
      "error": self.0.to_string(),
      "kind":  self.0.kind(),
    });
    (status, Json(body)).into_response()
  }
}

/// [`axum::Json`] with rejections reported through [`ApiError`].
///
/// The stock extractor answers unparsable bodies with plain-text 400s; this
/// one keeps the `{error, kind}` body shape on every failure path.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
  Json<T>: FromRequest<S, Rejection = JsonRejection>,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(
    req: Request,
    state: &S,
  ) -> Result<Self, Self::Rejection> {
    match Json::<T>::from_request(req, state).await {
      Ok(Json(value)) => Ok(Self(value)),
      Err(rejection) => Err(Error::MalformedPayload(rejection.body_text()).into()),
    }
  }
}
