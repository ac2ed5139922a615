use super::state::AppState;
use crate::infrastructure::{IdentityError, User};
use axum::http::{header, header::HeaderMap, StatusCode};
use tracing::warn;

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// Resolves the bearer token to the signed-in user.
pub(super) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, (StatusCode, serde_json::Value)> {
    let Some(identity) = state.identity.as_ref() else {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Auth service is not configured" }),
        ));
    };
    let Some(token) = extract_bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "Authorization header required" }),
        ));
    };
    match identity.user_for_token(token).await {
        Ok(user) => Ok(user),
        Err(IdentityError::InvalidToken) | Err(IdentityError::UserNotFound(_)) => Err((
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": "Invalid authentication" }),
        )),
        Err(e) => {
            warn!(error = %e, "Token lookup failed");
            Err((
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": "Authentication service unavailable" }),
            ))
        }
    }
}

/// Who is asking, for endpoints that also serve signed-out visitors.
#[derive(Debug)]
pub(super) enum Session {
    SignedOut,
    SignedIn(User),
    /// A token was sent but the auth service could not check it.
    Unresolved,
}

impl Session {
    fn from_auth(result: Result<User, (StatusCode, serde_json::Value)>) -> Self {
        match result {
            Ok(user) => Session::SignedIn(user),
            Err((StatusCode::UNAUTHORIZED, _)) => Session::SignedOut,
            Err(_) => Session::Unresolved,
        }
    }
}

/// Like [`authenticate`], but a missing or rejected token reads as signed out.
pub(super) async fn session(state: &AppState, headers: &HeaderMap) -> Session {
    if extract_bearer_token(headers).is_none() {
        return Session::SignedOut;
    }
    Session::from_auth(authenticate(state, headers).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_bearer_token_happy_path() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn extract_bearer_token_rejects_missing_or_empty() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers), None);

        let mut headers2 = HeaderMap::new();
        headers2.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers2), None);
    }

    fn user() -> User {
        User {
            id: uuid::Uuid::new_v4(),
            email: Some("owner@example.com".to_string()),
        }
    }

    #[test]
    fn rejected_tokens_read_as_signed_out() {
        let rejected = Err((StatusCode::UNAUTHORIZED, serde_json::json!({ "error": "x" })));
        assert!(matches!(Session::from_auth(rejected), Session::SignedOut));
        assert!(matches!(Session::from_auth(Ok(user())), Session::SignedIn(_)));
    }

    #[test]
    fn auth_outages_leave_the_session_unresolved() {
        for status in [StatusCode::BAD_GATEWAY, StatusCode::INTERNAL_SERVER_ERROR] {
            let failed = Err((status, serde_json::json!({ "error": "x" })));
            assert!(matches!(Session::from_auth(failed), Session::Unresolved));
        }
    }

    #[test]
    fn extract_bearer_token_rejects_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);
    }
}
