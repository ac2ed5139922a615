use crate::domain::{SubscriptionStatus, SubscriptionSync};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum StripeError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Stripe returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const API_BASE: &str = "https://api.stripe.com/v1";

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503)
}

/// Only reads are retried. Writes go out once.
fn max_attempts(method: &Method) -> u32 {
    if *method == Method::GET {
        MAX_RETRIES
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    Payment,
    Subscription,
}

impl CheckoutMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionParams {
    pub customer_id: String,
    pub price_id: String,
    pub mode: CheckoutMode,
    pub client_reference_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// `Some(days)` only for a first subscription checkout.
    pub trial_period_days: Option<u32>,
}

impl CheckoutSessionParams {
    /// Form body for `POST /v1/checkout/sessions`.
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("customer".to_string(), self.customer_id.clone()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("line_items[0][price]".to_string(), self.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("mode".to_string(), self.mode.as_str().to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("allow_promotion_codes".to_string(), "true".to_string()),
            ("billing_address_collection".to_string(), "auto".to_string()),
        ];
        if let Some(reference) = &self.client_reference_id {
            form.push(("client_reference_id".to_string(), reference.clone()));
        }
        if self.mode == CheckoutMode::Subscription {
            form.push((
                "payment_method_collection".to_string(),
                "if_required".to_string(),
            ));
            if let Some(days) = self.trial_period_days {
                form.push((
                    "subscription_data[trial_period_days]".to_string(),
                    days.to_string(),
                ));
            }
        }
        form
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Hosted billing operations this service needs from the billing provider.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_customer(&self, email: &str) -> Result<String, StripeError>;
    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError>;
    /// Returns the portal URL.
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeError>;
    /// Most recent subscription for the customer in any status, or `None` if it has none.
    async fn latest_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionSync>, StripeError>;
}

pub struct StripeClient {
    client: Client,
    base_url: String,
    portal_configuration_id: Option<String>,
}

impl StripeClient {
    pub fn new(
        secret_key: &str,
        portal_configuration_id: Option<String>,
    ) -> Result<Self, StripeError> {
        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", secret_key))
            .map_err(|e| StripeError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                StripeError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            portal_configuration_id: portal_configuration_id.filter(|id| !id.is_empty()),
        })
    }

    async fn send_with_retry<F>(
        &self,
        method: Method,
        path: &str,
        configure: F,
    ) -> Result<Value, StripeError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let url = format!("{}{}", self.base_url, path);
        let attempts = max_attempts(&method);
        let mut last_error: Option<String> = None;

        for attempt in 0..attempts {
            let request = configure(self.client.request(method.clone(), &url));
            match request.send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 {
                        return Err(StripeError::RateLimited);
                    }

                    if is_retryable_status(status) && attempt < attempts - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }

                    if !resp.status().is_success() {
                        let body: Value = resp.json().await.unwrap_or(Value::Null);
                        let message = body
                            .pointer("/error/message")
                            .and_then(Value::as_str)
                            .unwrap_or("Unknown error")
                            .to_string();
                        return Err(StripeError::Api { status, message });
                    }

                    return resp
                        .json()
                        .await
                        .map_err(|e| StripeError::InvalidResponse(e.to_string()));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < attempts - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(StripeError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }
}

fn required_str(value: &Value, pointer: &str) -> Result<String, StripeError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StripeError::InvalidResponse(format!("Missing {}", pointer)))
}

fn timestamp(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    value
        .pointer(pointer)
        .and_then(Value::as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

/// Reads the first entry of a `GET /v1/subscriptions` list.
///
/// `current_period_*` moved onto subscription items in newer API versions; both places
/// are checked. Card details are present only when `default_payment_method` was expanded.
pub fn parse_subscription_list(
    customer_id: &str,
    list: &Value,
) -> Result<Option<SubscriptionSync>, StripeError> {
    let Some(sub) = list.pointer("/data/0") else {
        return Ok(None);
    };

    let status = required_str(sub, "/status")?;
    let card = sub.pointer("/default_payment_method/card");

    Ok(Some(SubscriptionSync {
        customer_id: customer_id.to_string(),
        subscription_id: required_str(sub, "/id")?,
        price_id: required_str(sub, "/items/data/0/price/id")?,
        status: SubscriptionStatus::parse(&status),
        current_period_start: timestamp(sub, "/current_period_start")
            .or_else(|| timestamp(sub, "/items/data/0/current_period_start")),
        current_period_end: timestamp(sub, "/current_period_end")
            .or_else(|| timestamp(sub, "/items/data/0/current_period_end")),
        cancel_at_period_end: sub
            .get("cancel_at_period_end")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        payment_method_brand: card
            .and_then(|c| c.get("brand"))
            .and_then(Value::as_str)
            .map(str::to_string),
        payment_method_last4: card
            .and_then(|c| c.get("last4"))
            .and_then(Value::as_str)
            .map(str::to_string),
    }))
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn create_customer(&self, email: &str) -> Result<String, StripeError> {
        let form = [("email", email)];
        let body = self
            .send_with_retry(Method::POST, "/customers", |req| req.form(&form))
            .await?;

        required_str(&body, "/id")
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams,
    ) -> Result<CheckoutSession, StripeError> {
        let form = params.to_form();
        let body = self
            .send_with_retry(Method::POST, "/checkout/sessions", |req| req.form(&form))
            .await?;

        Ok(CheckoutSession {
            id: required_str(&body, "/id")?,
            url: body.get("url").and_then(Value::as_str).map(str::to_string),
        })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<String, StripeError> {
        let mut form = vec![("customer", customer_id), ("return_url", return_url)];
        if let Some(config_id) = self.portal_configuration_id.as_deref() {
            form.push(("configuration", config_id));
        }
        let body = self
            .send_with_retry(Method::POST, "/billing_portal/sessions", |req| {
                req.form(&form)
            })
            .await?;

        required_str(&body, "/url")
    }

    async fn latest_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<SubscriptionSync>, StripeError> {
        let query = [
            ("customer", customer_id),
            ("limit", "1"),
            ("status", "all"),
            ("expand[]", "data.default_payment_method"),
        ];
        let body = self
            .send_with_retry(Method::GET, "/subscriptions", |req| req.query(&query))
            .await?;

        parse_subscription_list(customer_id, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(mode: CheckoutMode, trial: Option<u32>) -> CheckoutSessionParams {
        CheckoutSessionParams {
            customer_id: "cus_1".into(),
            price_id: "price_std".into(),
            mode,
            client_reference_id: Some("user-1".into()),
            success_url: "https://testiflow.com/success".into(),
            cancel_url: "https://testiflow.com/pricing".into(),
            trial_period_days: trial,
        }
    }

    fn value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn subscription_checkout_carries_trial() {
        let form = params(CheckoutMode::Subscription, Some(7)).to_form();
        assert_eq!(value(&form, "subscription_data[trial_period_days]"), Some("7"));
        assert_eq!(value(&form, "payment_method_collection"), Some("if_required"));
        assert_eq!(value(&form, "line_items[0][quantity]"), Some("1"));
        assert_eq!(value(&form, "client_reference_id"), Some("user-1"));
    }

    #[test]
    fn payment_checkout_has_no_subscription_fields() {
        let form = params(CheckoutMode::Payment, Some(7)).to_form();
        assert_eq!(value(&form, "subscription_data[trial_period_days]"), None);
        assert_eq!(value(&form, "payment_method_collection"), None);
        assert_eq!(value(&form, "mode"), Some("payment"));
    }

    #[test]
    fn parses_expanded_subscription() {
        let list = json!({
            "data": [{
                "id": "sub_1",
                "status": "past_due",
                "cancel_at_period_end": true,
                "current_period_start": 1_700_000_000,
                "current_period_end": 1_702_592_000,
                "items": { "data": [{ "price": { "id": "price_prem" } }] },
                "default_payment_method": { "card": { "brand": "visa", "last4": "4242" } }
            }]
        });
        let sync = parse_subscription_list("cus_1", &list).unwrap().unwrap();
        assert_eq!(sync.subscription_id, "sub_1");
        assert_eq!(sync.price_id, "price_prem");
        assert_eq!(sync.status, SubscriptionStatus::PastDue);
        assert!(sync.cancel_at_period_end);
        assert_eq!(sync.payment_method_last4.as_deref(), Some("4242"));
        assert_eq!(
            sync.current_period_start.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn only_reads_are_retried() {
        assert_eq!(max_attempts(&Method::GET), MAX_RETRIES);
        assert_eq!(max_attempts(&Method::POST), 1);
    }

    #[test]
    fn empty_list_is_none() {
        assert_eq!(parse_subscription_list("cus_1", &json!({ "data": [] })).unwrap(), None);
    }

    #[test]
    fn missing_price_is_invalid() {
        let list = json!({ "data": [{ "id": "sub_1", "status": "active", "items": { "data": [] } }] });
        assert!(parse_subscription_list("cus_1", &list).is_err());
    }
}
