use crate::domain::{transition, AccountStanding, GuardEvent, GuardState, Redirect};
use crate::infrastructure::BillingRepository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    pub state: GuardState,
    pub redirect: Option<Redirect>,
}

impl GuardDecision {
    /// Decision for an already-known standing, for callers that could not
    /// consult billing storage themselves.
    pub fn for_standing(standing: AccountStanding, path: &str, now: DateTime<Utc>) -> Self {
        let (state, redirect) = transition(
            GuardState::Unauthenticated,
            GuardEvent::StandingChanged { standing, path },
            now,
        );
        Self { state, redirect }
    }
}

pub struct RouteGuardService<B: BillingRepository> {
    billing_repo: Arc<B>,
}

impl<B: BillingRepository> RouteGuardService<B> {
    pub fn new(billing_repo: Arc<B>) -> Self {
        Self { billing_repo }
    }

    /// Reads the account's billing standing. Lookup errors become `LookupFailed`.
    pub async fn standing(&self, user_id: Option<Uuid>) -> AccountStanding {
        let Some(user_id) = user_id else {
            return AccountStanding::SignedOut;
        };
        let customer = match self.billing_repo.get_customer_by_user(user_id).await {
            Ok(Some(customer)) => customer,
            Ok(None) => return AccountStanding::NoCustomer,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Customer lookup failed");
                return AccountStanding::LookupFailed;
            }
        };
        match self.billing_repo.get_subscription(&customer.customer_id).await {
            Ok(Some(subscription)) => AccountStanding::Subscribed {
                payment_issue_since: subscription.payment_issue_since(),
                status: subscription.status,
            },
            Ok(None) => AccountStanding::NoSubscription,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Subscription lookup failed");
                AccountStanding::LookupFailed
            }
        }
    }

    pub async fn evaluate(&self, user_id: Option<Uuid>, path: &str) -> GuardDecision {
        self.evaluate_at(user_id, path, Utc::now()).await
    }

    pub async fn evaluate_at(
        &self,
        user_id: Option<Uuid>,
        path: &str,
        now: DateTime<Utc>,
    ) -> GuardDecision {
        let standing = self.standing(user_id).await;
        GuardDecision::for_standing(standing, path, now)
    }
}
