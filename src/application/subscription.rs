use crate::domain::{
    Capabilities, PlanTier, PriceCatalog, SubscriptionInfo, SubscriptionStatus, Usage,
};
use crate::infrastructure::{
    BillingRepository, FormRepository, RepositoryError, TestimonialRepository,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Plan lookups used by the feature services.
///
/// Both methods fail closed: any lookup error yields the not-started view,
/// which carries standard limits and `is_active = false`.
#[async_trait]
pub trait SubscriptionLookup: Send + Sync {
    /// Plan and status may be served from cache until the next refresh
    /// signal. Usage is always counted on the spot.
    async fn current(&self, user_id: Uuid) -> SubscriptionInfo;
    /// Always re-reads storage. Used right before quota-gated writes.
    async fn fresh(&self, user_id: Uuid) -> SubscriptionInfo;

    async fn capabilities(&self, user_id: Uuid) -> Capabilities {
        Capabilities::from_limits(&self.current(user_id).await.limits)
    }
}

/// Process-wide "billing data changed" signal.
///
/// Each `invalidate` bumps a generation counter. Readers compare the
/// generation their cached value was computed at, so any number of
/// invalidations between two reads costs a single re-fetch.
#[derive(Clone)]
pub struct RefreshSignal {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for RefreshSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn invalidate(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

pub struct SubscriptionResolver<B, F, T>
where
    B: BillingRepository,
    F: FormRepository,
    T: TestimonialRepository,
{
    billing_repo: Arc<B>,
    form_repo: Arc<F>,
    testimonial_repo: Arc<T>,
    catalog: PriceCatalog,
    refresh: RefreshSignal,
    cache: Mutex<HashMap<Uuid, (u64, Standing)>>,
}

/// The billing half of a subscription view, keyed by refresh generation.
#[derive(Debug, Clone)]
struct Standing {
    plan: Option<PlanTier>,
    status: SubscriptionStatus,
}

impl<B, F, T> SubscriptionResolver<B, F, T>
where
    B: BillingRepository,
    F: FormRepository,
    T: TestimonialRepository,
{
    pub fn new(
        billing_repo: Arc<B>,
        form_repo: Arc<F>,
        testimonial_repo: Arc<T>,
        catalog: PriceCatalog,
        refresh: RefreshSignal,
    ) -> Self {
        Self {
            billing_repo,
            form_repo,
            testimonial_repo,
            catalog,
            refresh,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn refresh_signal(&self) -> &RefreshSignal {
        &self.refresh
    }

    /// Computes the user's plan, status, limits and usage from storage.
    pub async fn resolve(&self, user_id: Uuid) -> Result<SubscriptionInfo, ResolveError> {
        let standing = self.standing(user_id).await?;
        let usage = self.usage(user_id).await?;
        Ok(SubscriptionInfo::from_parts(standing.plan, standing.status, usage))
    }

    async fn standing(&self, user_id: Uuid) -> Result<Standing, ResolveError> {
        let Some(customer) = self.billing_repo.get_customer_by_user(user_id).await? else {
            return Ok(Standing {
                plan: None,
                status: SubscriptionStatus::NotStarted,
            });
        };

        let standing = match self
            .billing_repo
            .get_subscription(&customer.customer_id)
            .await?
        {
            Some(subscription) => {
                let plan = subscription.price_id.as_deref().and_then(|price_id| {
                    let plan = self.catalog.plan_for(price_id);
                    if plan.is_none() {
                        warn!(
                            user_id = %user_id,
                            price_id = %price_id,
                            "Subscription price is not in the catalog"
                        );
                    }
                    plan
                });
                Standing {
                    plan,
                    status: subscription.status,
                }
            }
            None => Standing {
                plan: None,
                status: SubscriptionStatus::NotStarted,
            },
        };
        Ok(standing)
    }

    pub async fn usage(&self, user_id: Uuid) -> Result<Usage, ResolveError> {
        let form_ids = self.form_repo.ids_by_user(user_id).await?;
        let testimonial_count = if form_ids.is_empty() {
            0
        } else {
            self.testimonial_repo.count_by_forms(&form_ids).await?
        };
        Ok(Usage {
            testimonial_count,
            form_count: form_ids.len() as u64,
        })
    }

    async fn resolve_with(
        &self,
        user_id: Uuid,
        generation: u64,
        cached: Option<Standing>,
    ) -> Result<SubscriptionInfo, ResolveError> {
        let standing = match cached {
            Some(standing) => standing,
            None => {
                debug!(user_id = %user_id, generation, "Resolving subscription");
                let standing = self.standing(user_id).await?;
                self.store(user_id, generation, &standing);
                standing
            }
        };
        let usage = self.usage(user_id).await?;
        Ok(SubscriptionInfo::from_parts(standing.plan, standing.status, usage))
    }

    fn or_not_started(
        user_id: Uuid,
        result: Result<SubscriptionInfo, ResolveError>,
    ) -> SubscriptionInfo {
        match result {
            Ok(info) => info,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Subscription lookup failed, using standard limits");
                SubscriptionInfo::not_started()
            }
        }
    }

    fn cached(&self, user_id: Uuid, generation: u64) -> Option<Standing> {
        let cache = self.cache.lock().ok()?;
        match cache.get(&user_id) {
            Some((cached_at, standing)) if *cached_at == generation => Some(standing.clone()),
            _ => None,
        }
    }

    /// Entries from earlier generations are dropped on every write.
    fn store(&self, user_id: Uuid, generation: u64, standing: &Standing) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.retain(|_, (cached_at, _)| *cached_at == generation);
            cache.insert(user_id, (generation, standing.clone()));
        }
    }
}

#[async_trait]
impl<B, F, T> SubscriptionLookup for SubscriptionResolver<B, F, T>
where
    B: BillingRepository,
    F: FormRepository,
    T: TestimonialRepository,
{
    async fn current(&self, user_id: Uuid) -> SubscriptionInfo {
        let generation = self.refresh.generation();
        let cached = self.cached(user_id, generation);
        Self::or_not_started(user_id, self.resolve_with(user_id, generation, cached).await)
    }

    async fn fresh(&self, user_id: Uuid) -> SubscriptionInfo {
        let generation = self.refresh.generation();
        Self::or_not_started(user_id, self.resolve_with(user_id, generation, None).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidations_bump_the_generation() {
        let signal = RefreshSignal::new();
        let before = signal.generation();
        signal.invalidate();
        signal.invalidate();
        assert_eq!(signal.generation(), before + 2);
    }

    #[tokio::test]
    async fn subscribers_observe_invalidation() {
        let signal = RefreshSignal::new();
        let mut rx = signal.subscribe();
        signal.clone().invalidate();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
