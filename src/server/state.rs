use crate::application::{
    BillingService, BrandingService, FormService, NotificationService, RefreshSignal,
    RouteGuardService, SubmissionService, SubscriptionLookup, SubscriptionResolver, TagService,
    TestimonialService,
};
use crate::infrastructure::{
    AppConfig, AuthClient, BillingProvider, IdentityProvider, Mailer, PostgresBillingRepository,
    PostgresBrandingRepository, PostgresFormRepository, PostgresTagRepository,
    PostgresTestimonialRepository, ResendClient, StripeClient,
};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

pub type SubscriptionResolverType = SubscriptionResolver<
    PostgresBillingRepository,
    PostgresFormRepository,
    PostgresTestimonialRepository,
>;

pub type RouteGuardServiceType = RouteGuardService<PostgresBillingRepository>;

pub type FormServiceType = FormService<PostgresFormRepository>;

pub type TestimonialServiceType = TestimonialService<
    PostgresFormRepository,
    PostgresTestimonialRepository,
    PostgresTagRepository,
    PostgresBrandingRepository,
>;

pub type TagServiceType = TagService<PostgresTagRepository>;

pub type BrandingServiceType = BrandingService<PostgresBrandingRepository>;

pub type SubmissionServiceType = SubmissionService<
    PostgresFormRepository,
    PostgresTestimonialRepository,
    PostgresBrandingRepository,
>;

pub type BillingServiceType = BillingService<PostgresBillingRepository>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cors_allowed_origin: Option<String>,
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub refresh: RefreshSignal,
    pub resolver: Arc<SubscriptionResolverType>,
    pub guard: Arc<RouteGuardServiceType>,
    pub forms: Arc<FormServiceType>,
    pub testimonials: Arc<TestimonialServiceType>,
    pub tags: Arc<TagServiceType>,
    pub branding: Arc<BrandingServiceType>,
    pub submissions: Arc<SubmissionServiceType>,
    pub billing: Arc<BillingServiceType>,
    pub notifications: Option<Arc<NotificationService>>,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
/// Provider clients are built only for the credentials that are present.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let stripe: Option<Arc<dyn BillingProvider>> = match config.stripe_secret_key.as_deref() {
        Some(key) if !key.is_empty() => Some(Arc::new(
            StripeClient::new(key, config.stripe_portal_configuration_id.clone())
                .context("init Stripe client")?,
        )),
        _ => {
            warn!("Stripe secret key not set; billing endpoints are disabled");
            None
        }
    };

    let mailer: Option<Arc<dyn Mailer>> = match config.resend_api_key.as_deref() {
        Some(key) if !key.is_empty() => Some(Arc::new(
            ResendClient::new(key, config.email_from.clone()).context("init Resend client")?,
        )),
        _ => {
            warn!("Resend API key not set; notification emails are disabled");
            None
        }
    };

    let identity: Option<Arc<dyn IdentityProvider>> =
        match (config.auth_url.as_deref(), config.auth_service_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => Some(Arc::new(
                AuthClient::new(url, key).context("init auth client")?,
            )),
            _ => {
                warn!("Auth service not configured; owner endpoints will answer 500");
                None
            }
        };

    let billing_repo = Arc::new(PostgresBillingRepository::new(pool.clone()));
    let form_repo = Arc::new(PostgresFormRepository::new(pool.clone()));
    let testimonial_repo = Arc::new(PostgresTestimonialRepository::new(pool.clone()));
    let tag_repo = Arc::new(PostgresTagRepository::new(pool.clone()));
    let branding_repo = Arc::new(PostgresBrandingRepository::new(pool.clone()));

    let refresh = RefreshSignal::new();
    let resolver = Arc::new(SubscriptionResolver::new(
        billing_repo.clone(),
        form_repo.clone(),
        testimonial_repo.clone(),
        config.price_catalog(),
        refresh.clone(),
    ));
    let plans: Arc<dyn SubscriptionLookup> = resolver.clone();

    let notifications = mailer.map(|mailer| {
        Arc::new(NotificationService::new(
            mailer,
            identity.clone(),
            config.app_origin(),
        ))
    });

    let guard = Arc::new(RouteGuardService::new(billing_repo.clone()));
    let forms = Arc::new(FormService::new(
        form_repo.clone(),
        plans.clone(),
        config.app_origin().to_string(),
    ));
    let testimonials = Arc::new(TestimonialService::new(
        form_repo.clone(),
        testimonial_repo.clone(),
        tag_repo.clone(),
        branding_repo.clone(),
        plans.clone(),
    ));
    let tags = Arc::new(TagService::new(tag_repo, plans.clone()));
    let branding = Arc::new(BrandingService::new(branding_repo.clone(), plans.clone()));
    let submissions = Arc::new(SubmissionService::new(
        form_repo,
        testimonial_repo,
        branding_repo,
        plans,
        notifications.clone(),
    ));
    let billing = Arc::new(BillingService::new(
        billing_repo,
        stripe,
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance_secs,
        refresh.clone(),
    ));

    Ok(AppState {
        pool,
        cors_allowed_origin: config.cors_allowed_origin,
        identity,
        refresh,
        resolver,
        guard,
        forms,
        testimonials,
        tags,
        branding,
        submissions,
        billing,
        notifications,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
