use super::plan::{effective_limits, PlanLimits, PlanTier};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use strum::EnumString;
use uuid::Uuid;

/// Days a `past_due` subscription keeps full access.
pub const GRACE_PERIOD_DAYS: i64 = 30;

/// Trial granted on first subscription checkout.
pub const TRIAL_PERIOD_DAYS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    NotStarted,
    Trialing,
    Active,
    PastDue,
    Canceled,
    /// Anything the billing provider reports that this app does not model
    /// (`incomplete`, `unpaid`, `paused`, ...).
    #[strum(default)]
    Other(String),
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        raw.parse().unwrap_or_else(|_| SubscriptionStatus::Other(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::NotStarted => "not_started",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Other(raw) => raw,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SubscriptionStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SubscriptionStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SubscriptionStatus::parse(&raw))
    }
}

/// Billing identity linking an app user to the provider's customer id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub price_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub payment_method_brand: Option<String>,
    pub payment_method_last4: Option<String>,
    /// Set when the row first entered `past_due`, cleared when it leaves.
    pub past_due_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// When the current payment issue began, if the subscription is `past_due`.
    ///
    /// Rows written before `past_due_since` existed fall back to `updated_at`.
    pub fn payment_issue_since(&self) -> Option<DateTime<Utc>> {
        if self.status == SubscriptionStatus::PastDue {
            Some(self.past_due_since.unwrap_or(self.updated_at))
        } else {
            None
        }
    }
}

/// Subscription state pulled from the billing provider, ready to upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSync {
    pub customer_id: String,
    pub subscription_id: String,
    pub price_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub payment_method_brand: Option<String>,
    pub payment_method_last4: Option<String>,
}

/// One-time payment recorded from a completed checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub checkout_session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_id: String,
    pub amount_subtotal: i64,
    pub amount_total: i64,
    pub currency: String,
    pub payment_status: String,
    pub status: String,
}

/// True while a payment issue that began at `issue_since` is inside the grace window.
///
/// Counts whole elapsed days: exactly 30 days is still in grace, 31 is not.
pub fn is_in_grace_period(issue_since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now - issue_since).num_days() <= GRACE_PERIOD_DAYS
}

/// Last day of the grace window, used in payment-failure notices.
pub fn grace_period_end(issue_since: DateTime<Utc>) -> DateTime<Utc> {
    issue_since + Duration::days(GRACE_PERIOD_DAYS)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub testimonial_count: u64,
    pub form_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub plan: Option<PlanTier>,
    pub status: SubscriptionStatus,
    pub is_active: bool,
    pub is_trialing: bool,
    pub limits: PlanLimits,
    pub current_usage: Usage,
}

impl SubscriptionInfo {
    /// The fail-closed value: no subscription, standard limits, zero usage.
    pub fn not_started() -> Self {
        Self {
            plan: None,
            status: SubscriptionStatus::NotStarted,
            is_active: false,
            is_trialing: false,
            limits: *effective_limits(None),
            current_usage: Usage::default(),
        }
    }

    pub fn from_parts(plan: Option<PlanTier>, status: SubscriptionStatus, usage: Usage) -> Self {
        Self {
            plan,
            is_active: status.is_active(),
            is_trialing: status == SubscriptionStatus::Trialing,
            status,
            limits: *effective_limits(plan),
            current_usage: usage,
        }
    }

    /// Form creation needs a live subscription and headroom under the form quota.
    pub fn can_create_form(&self) -> bool {
        self.is_active && self.limits.max_forms.allows_another(self.current_usage.form_count)
    }

    pub fn can_create_testimonial(&self) -> bool {
        self.limits
            .max_testimonials
            .allows_another(self.current_usage.testimonial_count)
    }
}
