//! Client for the hosted auth service (GoTrue-compatible API).

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Invalid authentication")]
    InvalidToken,
    #[error("User not found: {0}")]
    UserNotFound(Uuid),
    #[error("Auth request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves a session access token to its user.
    async fn user_for_token(&self, access_token: &str) -> Result<User, IdentityError>;
    /// Admin lookup by id.
    async fn user_by_id(&self, user_id: Uuid) -> Result<User, IdentityError>;
}

pub struct AuthClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self, IdentityError> {
        let mut headers = header::HeaderMap::new();
        let apikey = header::HeaderValue::from_str(service_key)
            .map_err(|e| IdentityError::InvalidConfig(format!("Invalid service key: {}", e)))?;
        headers.insert("apikey", apikey);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                IdentityError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct AdminUserEnvelope {
    user: Option<User>,
    #[serde(default)]
    id: Option<Uuid>,
    #[serde(default)]
    email: Option<String>,
}

#[async_trait]
impl IdentityProvider for AuthClient {
    async fn user_for_token(&self, access_token: &str) -> Result<User, IdentityError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        match resp.status() {
            s if s.is_success() => resp
                .json::<User>()
                .await
                .map_err(|e| IdentityError::RequestFailed(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IdentityError::InvalidToken),
            s => Err(IdentityError::RequestFailed(format!("auth service returned {}", s))),
        }
    }

    async fn user_by_id(&self, user_id: Uuid) -> Result<User, IdentityError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/admin/users/{}", self.base_url, user_id))
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(IdentityError::UserNotFound(user_id));
        }
        if !resp.status().is_success() {
            return Err(IdentityError::RequestFailed(format!(
                "auth service returned {}",
                resp.status()
            )));
        }

        // Some deployments wrap the record in `{ "user": ... }`.
        let envelope: AdminUserEnvelope = resp
            .json()
            .await
            .map_err(|e| IdentityError::RequestFailed(e.to_string()))?;
        match envelope {
            AdminUserEnvelope { user: Some(user), .. } => Ok(user),
            AdminUserEnvelope {
                id: Some(id), email, ..
            } => Ok(User { id, email }),
            _ => Err(IdentityError::UserNotFound(user_id)),
        }
    }
}
