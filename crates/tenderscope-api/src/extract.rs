//! Request extractors: caller identity and a lenient JSON body.

use std::convert::Infallible;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const ANONYMOUS: &str = "anon";

/// The caller's uid: `x-user-id` (or `x-userid`), else a bearer token
/// taken as an opaque uid, else [`ANONYMOUS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

pub fn uid_from_headers(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(uid) = header("x-user-id").or_else(|| header("x-userid")) {
        return uid.to_string();
    }
    if let Some(auth) = header("authorization")
        && auth.len() > 7
        && auth[..7].eq_ignore_ascii_case("bearer ")
    {
        let token = auth[7..].trim();
        if !token.is_empty() {
            return token.to_string();
        }
    }
    ANONYMOUS.to_string()
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(uid_from_headers(&parts.headers)))
    }
}

/// JSON body that tolerates a missing content type and treats an empty
/// body as `{}`. Malformed input is a 400 in the usual error shape.
#[derive(Debug)]
pub struct Body<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Body<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let raw: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &bytes
        };
        serde_json::from_slice(raw)
            .map(Body)
            .map_err(|e| ApiError::bad_request(format!("invalid JSON body: {e}")))
    }
}
