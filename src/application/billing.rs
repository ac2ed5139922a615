//! Billing glue: checkout and portal sessions plus the webhook receiver that
//! keeps the local customer, subscription and order rows in step with Stripe.

use super::subscription::RefreshSignal;
use crate::domain::{Order, SubscriptionStatus, TRIAL_PERIOD_DAYS};
use crate::infrastructure::{
    verify_webhook_signature, BillingProvider, BillingRepository, CheckoutMode,
    CheckoutSessionParams, RepositoryError, SignatureError, StripeError,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BillingError {
    #[error("{0}")]
    NotConfigured(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("No customer found")]
    CustomerNotFound,
    #[error("No signature found")]
    MissingSignature,
    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub mode: CheckoutMode,
    pub customer_email: String,
    pub client_reference_id: Option<String>,
    pub is_plan_change: bool,
}

impl CheckoutRequest {
    /// Validates a raw checkout body. Parameters are checked in a fixed order and
    /// the first problem is reported.
    pub fn from_json(body: &Value) -> Result<Self, BillingError> {
        let price_id = required_string(body, "price_id")?;
        let success_url = required_string(body, "success_url")?;
        let cancel_url = required_string(body, "cancel_url")?;
        let mode = match body.get("mode").and_then(Value::as_str) {
            Some("payment") => CheckoutMode::Payment,
            Some("subscription") => CheckoutMode::Subscription,
            _ => {
                return Err(BillingError::Validation(
                    "Expected parameter mode to be one of payment, subscription".to_string(),
                ))
            }
        };
        let customer_email = required_string(body, "customer_email")?;

        Ok(Self {
            price_id,
            success_url,
            cancel_url,
            mode,
            customer_email,
            client_reference_id: body
                .get("client_reference_id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            is_plan_change: body
                .get("is_plan_change")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// First-time subscriptions get the trial; plan changes and one-off payments do not.
    pub fn trial_period_days(&self) -> Option<u32> {
        (self.mode == CheckoutMode::Subscription && !self.is_plan_change)
            .then_some(TRIAL_PERIOD_DAYS)
    }
}

fn required_string(body: &Value, name: &str) -> Result<String, BillingError> {
    match body.get(name) {
        None | Some(Value::Null) => Err(BillingError::Validation(format!(
            "Missing required parameter {}",
            name
        ))),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(BillingError::Validation(format!(
            "Expected parameter {} to be a string got {}",
            name, other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed(String),
    Ignored(String),
}

pub struct BillingService<B: BillingRepository> {
    billing_repo: Arc<B>,
    stripe: Option<Arc<dyn BillingProvider>>,
    webhook_secret: Option<String>,
    tolerance_secs: u64,
    refresh: RefreshSignal,
}

impl<B: BillingRepository> BillingService<B> {
    pub fn new(
        billing_repo: Arc<B>,
        stripe: Option<Arc<dyn BillingProvider>>,
        webhook_secret: Option<String>,
        tolerance_secs: u64,
        refresh: RefreshSignal,
    ) -> Self {
        Self {
            billing_repo,
            stripe,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            tolerance_secs,
            refresh,
        }
    }

    fn stripe(&self) -> Result<&Arc<dyn BillingProvider>, BillingError> {
        self.stripe
            .as_ref()
            .ok_or(BillingError::NotConfigured("Stripe is not configured"))
    }

    pub async fn checkout(&self, body: &Value) -> Result<CheckoutResponse, BillingError> {
        let stripe = self.stripe()?;
        let request = CheckoutRequest::from_json(body)?;

        let customer_id = match self.existing_customer(request.client_reference_id.as_deref()).await? {
            Some(customer_id) => customer_id,
            None => {
                let customer_id = stripe.create_customer(&request.customer_email).await?;
                info!(customer_id = %customer_id, "Created Stripe customer");
                customer_id
            }
        };

        let params = CheckoutSessionParams {
            customer_id: customer_id.clone(),
            price_id: request.price_id.clone(),
            mode: request.mode,
            client_reference_id: request.client_reference_id.clone(),
            success_url: request.success_url.clone(),
            cancel_url: request.cancel_url.clone(),
            trial_period_days: request.trial_period_days(),
        };
        let session = stripe.create_checkout_session(&params).await?;
        info!(
            customer_id = %customer_id,
            session_id = %session.id,
            mode = request.mode.as_str(),
            "Created checkout session"
        );

        Ok(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })
    }

    async fn existing_customer(&self, reference: Option<&str>) -> Result<Option<String>, BillingError> {
        let Some(user_id) = reference.and_then(|r| Uuid::parse_str(r).ok()) else {
            return Ok(None);
        };
        Ok(self
            .billing_repo
            .get_customer_by_user(user_id)
            .await?
            .map(|c| c.customer_id))
    }

    /// Opens a billing portal session for the signed-in user.
    pub async fn portal(&self, user_id: Uuid, return_url: Option<&str>) -> Result<String, BillingError> {
        let stripe = self.stripe()?;
        let return_url = return_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| BillingError::Validation("return_url is required".to_string()))?;

        let customer = self
            .billing_repo
            .get_customer_by_user(user_id)
            .await?
            .ok_or(BillingError::CustomerNotFound)?;

        let url = stripe
            .create_portal_session(&customer.customer_id, return_url)
            .await?;
        info!(user_id = %user_id, customer_id = %customer.customer_id, "Created portal session");
        Ok(url)
    }

    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, BillingError> {
        self.handle_webhook_at(payload, signature, Utc::now().timestamp())
            .await
    }

    /// Verifies and applies one webhook event. Billing state that changed is
    /// announced through the refresh signal.
    pub async fn handle_webhook_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now: i64,
    ) -> Result<WebhookOutcome, BillingError> {
        let (Some(_), Some(secret)) = (self.stripe.as_ref(), self.webhook_secret.as_deref()) else {
            return Err(BillingError::NotConfigured("Stripe is not configured properly"));
        };
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or(BillingError::MissingSignature)?;
        verify_webhook_signature(payload, signature, secret, self.tolerance_secs, now)?;

        let event: Value = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;
        let event_type = event
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let object = event.pointer("/data/object").cloned().unwrap_or(Value::Null);

        let Some(customer_id) = object.get("customer").and_then(Value::as_str) else {
            if object.get("customer").is_some() {
                error!(event_type = %event_type, "No valid customer ID in event");
            }
            return Ok(WebhookOutcome::Ignored(event_type));
        };

        let changed = match event_type.as_str() {
            "checkout.session.completed" => {
                self.checkout_completed(&object, customer_id).await?
            }
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.sync_customer(customer_id).await?
            }
            "customer.subscription.deleted" => {
                self.billing_repo
                    .set_subscription_status(customer_id, &SubscriptionStatus::Canceled)
                    .await?;
                info!(customer_id = %customer_id, "Subscription canceled");
                true
            }
            "invoice.payment_failed" => {
                self.billing_repo
                    .set_subscription_status(customer_id, &SubscriptionStatus::PastDue)
                    .await?;
                warn!(customer_id = %customer_id, "Invoice payment failed");
                true
            }
            _ => {
                info!(event_type = %event_type, "Unhandled webhook event");
                return Ok(WebhookOutcome::Ignored(event_type));
            }
        };

        if changed {
            self.refresh.invalidate();
        }
        Ok(WebhookOutcome::Processed(event_type))
    }

    async fn checkout_completed(&self, session: &Value, customer_id: &str) -> Result<bool, BillingError> {
        let mode = session.get("mode").and_then(Value::as_str);
        let payment_status = session.get("payment_status").and_then(Value::as_str);

        match (mode, payment_status) {
            (Some("subscription"), _) => {
                if let Some(reference) = session.get("client_reference_id").and_then(Value::as_str) {
                    match Uuid::parse_str(reference) {
                        Ok(user_id) => {
                            self.billing_repo.upsert_customer(customer_id, user_id).await?;
                            info!(customer_id = %customer_id, user_id = %user_id, "Linked customer to user");
                        }
                        Err(_) => {
                            warn!(customer_id = %customer_id, "client_reference_id is not a user id");
                        }
                    }
                }
                self.sync_customer(customer_id).await?;
                Ok(true)
            }
            (Some("payment"), Some("paid")) => {
                let order = Order {
                    checkout_session_id: session
                        .get("id")
                        .and_then(Value::as_str)
                        .ok_or_else(|| BillingError::InvalidPayload("checkout session without id".into()))?
                        .to_string(),
                    payment_intent_id: session
                        .get("payment_intent")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    customer_id: customer_id.to_string(),
                    amount_subtotal: session.get("amount_subtotal").and_then(Value::as_i64).unwrap_or(0),
                    amount_total: session.get("amount_total").and_then(Value::as_i64).unwrap_or(0),
                    currency: session
                        .get("currency")
                        .and_then(Value::as_str)
                        .unwrap_or("usd")
                        .to_string(),
                    payment_status: "paid".to_string(),
                    status: "completed".to_string(),
                };
                self.billing_repo.insert_order(&order).await?;
                info!(customer_id = %customer_id, session_id = %order.checkout_session_id, "Recorded one-time payment");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Copies the customer's latest Stripe subscription into storage.
    async fn sync_customer(&self, customer_id: &str) -> Result<bool, BillingError> {
        let stripe = self.stripe()?;
        match stripe.latest_subscription(customer_id).await? {
            Some(sync) => {
                self.billing_repo.upsert_subscription(&sync).await?;
                info!(customer_id = %customer_id, status = %sync.status, "Synced subscription");
                Ok(true)
            }
            None => {
                info!(customer_id = %customer_id, "No active subscriptions found");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid() -> Value {
        json!({
            "price_id": "price_123",
            "success_url": "https://app/success",
            "cancel_url": "https://app/cancel",
            "mode": "subscription",
            "customer_email": "a@example.com",
        })
    }

    #[test]
    fn reports_first_missing_parameter() {
        let mut body = valid();
        body.as_object_mut().unwrap().remove("success_url");
        body.as_object_mut().unwrap().remove("customer_email");
        let err = CheckoutRequest::from_json(&body).unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameter success_url");
    }

    #[test]
    fn rejects_non_string_parameter() {
        let mut body = valid();
        body["price_id"] = json!(42);
        let err = CheckoutRequest::from_json(&body).unwrap_err();
        assert_eq!(err.to_string(), "Expected parameter price_id to be a string got 42");
    }

    #[test]
    fn rejects_unknown_mode() {
        let mut body = valid();
        body["mode"] = json!("setup");
        let err = CheckoutRequest::from_json(&body).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected parameter mode to be one of payment, subscription"
        );
    }

    #[test]
    fn trial_only_for_first_subscription() {
        let request = CheckoutRequest::from_json(&valid()).unwrap();
        assert_eq!(request.trial_period_days(), Some(7));

        let mut body = valid();
        body["is_plan_change"] = json!(true);
        assert_eq!(CheckoutRequest::from_json(&body).unwrap().trial_period_days(), None);

        let mut body = valid();
        body["mode"] = json!("payment");
        assert_eq!(CheckoutRequest::from_json(&body).unwrap().trial_period_days(), None);
    }
}
