//! Extractors whose rejections answer with the same `{"error": ..}` body as
//! every handler failure.

use async_trait::async_trait;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::{request::Parts, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

type Rejection = (StatusCode, Json<Value>);

pub(super) struct ApiJson<T>(pub T);

pub(super) struct ApiQuery<T>(pub T);

pub(super) struct ApiPath<T>(pub T);

/// Malformed and mistyped bodies are 400. Other rejections keep axum's status.
pub(super) fn json_rejection(rejection: &JsonRejection) -> (StatusCode, Value) {
    let status = match rejection {
        JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
            StatusCode::BAD_REQUEST
        }
        other => other.status(),
    };
    (status, json!({ "error": rejection.body_text() }))
}

pub(super) fn query_rejection(rejection: &QueryRejection) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({ "error": rejection.body_text() }),
    )
}

pub(super) fn path_rejection(rejection: &PathRejection) -> (StatusCode, Value) {
    (rejection.status(), json!({ "error": rejection.body_text() }))
}

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let (status, body) = json_rejection(&rejection);
                Err((status, Json(body)))
            }
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => {
                let (status, body) = query_rejection(&rejection);
                Err((status, Json(body)))
            }
        }
    }
}

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => {
                let (status, body) = path_rejection(&rejection);
                Err((status, Json(body)))
            }
        }
    }
}
