use super::notifications::NotificationService;
use super::subscription::SubscriptionLookup;
use crate::domain::{
    validate_submission, Branding, FailureKind, Feature, FieldError, Form, FormField,
    FormResponse, PhaseError, Quota, SubmissionFlow, SubmissionRequest, Testimonial,
};
use crate::infrastructure::{
    BrandingRepository, FormRepository, RepositoryError, TestimonialRepository,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Form not found")]
    NotFound,
    #[error("This form is no longer accepting testimonials")]
    Inactive,
    #[error(transparent)]
    Validation(#[from] FieldError),
    #[error("This form has reached its testimonial limit")]
    QuotaExceeded,
    #[error("A submission for this email is already in progress")]
    InFlight,
    #[error("Upload failed: {0}")]
    Upload(String),
    #[error("Failed to submit testimonial: {0}")]
    Upstream(String),
    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl SubmissionError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            SubmissionError::NotFound => FailureKind::NotFound,
            SubmissionError::Inactive => FailureKind::Inactive,
            SubmissionError::Validation(_) => FailureKind::Validation,
            SubmissionError::QuotaExceeded => FailureKind::QuotaExceeded,
            SubmissionError::Upload(_) => FailureKind::Upload,
            SubmissionError::InFlight | SubmissionError::Upstream(_) | SubmissionError::Phase(_) => {
                FailureKind::Upstream
            }
        }
    }
}

impl From<RepositoryError> for SubmissionError {
    fn from(e: RepositoryError) -> Self {
        SubmissionError::Upstream(e.to_string())
    }
}

/// What the public submission page renders.
#[derive(Debug, Clone, Serialize)]
pub struct PublicForm {
    pub form: Form,
    pub fields: Vec<FormField>,
    pub branding: Option<Branding>,
    pub allow_image_uploads: bool,
    pub allow_video_uploads: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub testimonial_id: Uuid,
    pub thank_you_message: String,
}

/// Removes the in-flight key when the submission finishes either way.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<(Uuid, String)>>,
    key: (Uuid, String),
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

pub struct SubmissionService<F, T, R>
where
    F: FormRepository,
    T: TestimonialRepository,
    R: BrandingRepository,
{
    form_repo: Arc<F>,
    testimonial_repo: Arc<T>,
    branding_repo: Arc<R>,
    plans: Arc<dyn SubscriptionLookup>,
    notifier: Option<Arc<NotificationService>>,
    in_flight: Mutex<HashSet<(Uuid, String)>>,
}

impl<F, T, R> SubmissionService<F, T, R>
where
    F: FormRepository,
    T: TestimonialRepository,
    R: BrandingRepository,
{
    pub fn new(
        form_repo: Arc<F>,
        testimonial_repo: Arc<T>,
        branding_repo: Arc<R>,
        plans: Arc<dyn SubscriptionLookup>,
        notifier: Option<Arc<NotificationService>>,
    ) -> Self {
        Self {
            form_repo,
            testimonial_repo,
            branding_repo,
            plans,
            notifier,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Loads an active form with its fields.
    ///
    /// Fails with `Inactive` for a switched-off form and `NotFound` for an unknown id.
    pub async fn load(&self, form_id: Uuid) -> Result<PublicForm, SubmissionError> {
        let form = self.active_form(form_id).await?;
        let mut fields = self.form_repo.list_fields(form.id).await?;
        fields.sort_by_key(|f| f.sort_order);

        let caps = self.plans.capabilities(form.user_id).await;
        let branding = if caps.allows(Feature::Branding) {
            match self.branding_repo.get_by_user(form.user_id).await {
                Ok(branding) => branding,
                Err(e) => {
                    warn!(form_id = %form.id, error = %e, "Failed to load branding");
                    None
                }
            }
        } else {
            None
        };

        Ok(PublicForm {
            allow_image_uploads: form.media.allow_image_uploads && caps.allows(Feature::ImageUploads),
            allow_video_uploads: form.media.allow_video_uploads && caps.allows(Feature::VideoUploads),
            form,
            fields,
            branding,
        })
    }

    pub async fn submit(
        &self,
        form_id: Uuid,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let mut flow = SubmissionFlow::new();
        match self.run(&mut flow, form_id, request).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                flow.fail(e.failure_kind());
                warn!(form_id = %form_id, phase = ?flow.phase(), error = %e, "Submission failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        flow: &mut SubmissionFlow,
        form_id: Uuid,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let public = self.load(form_id).await?;
        flow.loaded()?;

        let mut policy = public.form.media;
        policy.allow_image_uploads = public.allow_image_uploads;
        policy.allow_video_uploads = public.allow_video_uploads;
        validate_submission(&request, &public.fields, &policy)?;

        let _guard = self.claim(form_id, &request.email)?;
        flow.begin_submit()?;

        let owner_id = public.form.user_id;
        self.check_quota(owner_id).await?;

        let mut testimonial = Testimonial::submitted(
            form_id,
            request.name.trim().to_string(),
            request.email.trim().to_string(),
            request.company.clone(),
            request.message.trim().to_string(),
            request.rating,
        );
        testimonial.image_url = request.image.clone().filter(|v| !v.is_empty());
        testimonial.video_url = request.video.clone().filter(|v| !v.is_empty());

        self.testimonial_repo.create(&testimonial).await.map_err(|e| {
            if testimonial.image_url.is_some() || testimonial.video_url.is_some() {
                SubmissionError::Upload(e.to_string())
            } else {
                SubmissionError::Upstream(e.to_string())
            }
        })?;
        info!(form_id = %form_id, testimonial_id = %testimonial.id, "Testimonial submitted");

        let known: HashSet<Uuid> = public.fields.iter().map(|f| f.id).collect();
        let responses: Vec<FormResponse> = request
            .custom_responses
            .iter()
            .filter(|(field_id, value)| known.contains(field_id) && !value.trim().is_empty())
            .map(|(field_id, value)| FormResponse::new(testimonial.id, *field_id, value.clone()))
            .collect();
        if !responses.is_empty() {
            if let Err(e) = self.testimonial_repo.insert_responses(&responses).await {
                warn!(testimonial_id = %testimonial.id, error = %e, "Failed to save custom field responses");
            }
        }

        flow.complete()?;

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier
                .new_testimonial(owner_id, &testimonial, &public.form.title)
                .await
            {
                warn!(testimonial_id = %testimonial.id, error = %e, "Failed to send new testimonial email");
            }
        }

        Ok(SubmissionReceipt {
            testimonial_id: testimonial.id,
            thank_you_message: public.form.thank_you_message,
        })
    }

    async fn active_form(&self, form_id: Uuid) -> Result<Form, SubmissionError> {
        match self.form_repo.get_by_id(form_id).await {
            Ok(form) if form.is_active => Ok(form),
            Ok(_) => Err(SubmissionError::Inactive),
            Err(RepositoryError::NotFound(_)) => Err(SubmissionError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Owner's testimonial quota. Plan lookups fail closed to standard limits;
    /// a failed count is an upstream error.
    async fn check_quota(&self, owner_id: Uuid) -> Result<(), SubmissionError> {
        let limits = self.plans.fresh(owner_id).await.limits;
        let Quota::Limited(max) = limits.max_testimonials else {
            return Ok(());
        };
        let form_ids = self.form_repo.ids_by_user(owner_id).await?;
        let count = self.testimonial_repo.count_by_forms(&form_ids).await?;
        if count >= max {
            return Err(SubmissionError::QuotaExceeded);
        }
        Ok(())
    }

    fn claim(&self, form_id: Uuid, email: &str) -> Result<InFlightGuard<'_>, SubmissionError> {
        let key = (form_id, email.trim().to_lowercase());
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| SubmissionError::Upstream("submission lock poisoned".to_string()))?;
        if !set.insert(key.clone()) {
            return Err(SubmissionError::InFlight);
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            key,
        })
    }
}
