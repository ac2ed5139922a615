use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Resend API error: {0}")]
    Rejected(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A rendered message ready to hand to the email provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), EmailError>;
}

pub struct ResendClient {
    client: Client,
    from: String,
}

impl ResendClient {
    pub fn new(api_key: &str, from: impl Into<String>) -> Result<Self, EmailError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| EmailError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EmailError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            from: from.into(),
        })
    }
}

#[async_trait]
impl Mailer for ResendClient {
    async fn send(&self, email: &Email) -> Result<(), EmailError> {
        let body = json!({
            "from": self.from,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
            "text": email.text,
        });

        let resp = self
            .client
            .post(RESEND_API_URL)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EmailError::Rejected(error_text));
        }

        Ok(())
    }
}
