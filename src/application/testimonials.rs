use super::subscription::SubscriptionLookup;
use crate::domain::{
    social_post, to_csv, to_json, widget, ExportFormat, ExportTestimonial, Feature, Locked, Tag,
    Testimonial, TestimonialStatus, WidgetTheme, SOCIAL_POST_SEPARATOR,
};
use crate::infrastructure::{
    BrandingRepository, FormRepository, RepositoryError, TagRepository, TestimonialRepository,
};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum TestimonialError {
    #[error("Testimonial not found")]
    NotFound,
    #[error("Tag not found")]
    TagNotFound,
    #[error(transparent)]
    Locked(#[from] Locked),
    #[error("Export failed: {0}")]
    Export(String),
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for TestimonialError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(_) => TestimonialError::NotFound,
            other => TestimonialError::Repository(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub format: Option<ExportFormat>,
    /// Restricts the export to these testimonials.
    pub testimonial_ids: Option<Vec<Uuid>>,
    pub status: Option<TestimonialStatus>,
    /// Overrides the owner's saved branding for widget exports.
    pub theme: Option<WidgetTheme>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutput {
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

pub struct TestimonialService<F, T, G, R>
where
    F: FormRepository,
    T: TestimonialRepository,
    G: TagRepository,
    R: BrandingRepository,
{
    form_repo: Arc<F>,
    testimonial_repo: Arc<T>,
    tag_repo: Arc<G>,
    branding_repo: Arc<R>,
    plans: Arc<dyn SubscriptionLookup>,
}

impl<F, T, G, R> TestimonialService<F, T, G, R>
where
    F: FormRepository,
    T: TestimonialRepository,
    G: TagRepository,
    R: BrandingRepository,
{
    pub fn new(
        form_repo: Arc<F>,
        testimonial_repo: Arc<T>,
        tag_repo: Arc<G>,
        branding_repo: Arc<R>,
        plans: Arc<dyn SubscriptionLookup>,
    ) -> Self {
        Self {
            form_repo,
            testimonial_repo,
            tag_repo,
            branding_repo,
            plans,
        }
    }

    /// Testimonials across all of the owner's forms, newest first.
    pub async fn list(
        &self,
        user_id: Uuid,
        status: Option<TestimonialStatus>,
    ) -> Result<Vec<Testimonial>, TestimonialError> {
        let form_ids = self.form_repo.ids_by_user(user_id).await?;
        if form_ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.testimonial_repo.list_by_forms(&form_ids, status).await?)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Testimonial, TestimonialError> {
        let testimonial = self.testimonial_repo.get_by_id(id).await?;
        let form_ids = self.form_repo.ids_by_user(user_id).await?;
        if !form_ids.contains(&testimonial.form_id) {
            return Err(TestimonialError::NotFound);
        }
        Ok(testimonial)
    }

    pub async fn set_status(
        &self,
        user_id: Uuid,
        id: Uuid,
        status: TestimonialStatus,
    ) -> Result<Testimonial, TestimonialError> {
        let mut testimonial = self.get(user_id, id).await?;
        self.testimonial_repo.update_status(id, status).await?;
        testimonial.status = status;
        info!(testimonial_id = %id, status = %status, "Moderated testimonial");
        Ok(testimonial)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), TestimonialError> {
        let testimonial = self.get(user_id, id).await?;
        self.testimonial_repo.delete(testimonial.id).await?;
        Ok(())
    }

    pub async fn tags(&self, user_id: Uuid, id: Uuid) -> Result<Vec<Tag>, TestimonialError> {
        self.require(user_id, Feature::Tags).await?;
        let testimonial = self.get(user_id, id).await?;
        Ok(self.tag_repo.tags_for_testimonial(testimonial.id).await?)
    }

    pub async fn assign_tag(
        &self,
        user_id: Uuid,
        id: Uuid,
        tag_id: Uuid,
    ) -> Result<Vec<Tag>, TestimonialError> {
        self.require(user_id, Feature::Tags).await?;
        let testimonial = self.get(user_id, id).await?;
        self.owned_tag(user_id, tag_id).await?;
        self.tag_repo.assign(testimonial.id, tag_id).await?;
        Ok(self.tag_repo.tags_for_testimonial(testimonial.id).await?)
    }

    pub async fn unassign_tag(
        &self,
        user_id: Uuid,
        id: Uuid,
        tag_id: Uuid,
    ) -> Result<Vec<Tag>, TestimonialError> {
        self.require(user_id, Feature::Tags).await?;
        let testimonial = self.get(user_id, id).await?;
        self.owned_tag(user_id, tag_id).await?;
        self.tag_repo.unassign(testimonial.id, tag_id).await?;
        Ok(self.tag_repo.tags_for_testimonial(testimonial.id).await?)
    }

    /// Renders the owner's testimonials in the requested format.
    ///
    /// JSON and widget exports need the advanced-exports feature. Custom
    /// field answers are keyed by the field label.
    pub async fn export(
        &self,
        user_id: Uuid,
        request: ExportRequest,
    ) -> Result<ExportOutput, TestimonialError> {
        let format = request.format.unwrap_or(ExportFormat::Csv);
        if format.is_advanced() {
            self.require(user_id, Feature::AdvancedExports).await?;
        }

        let rows = self
            .export_rows(user_id, request.status, request.testimonial_ids.as_deref())
            .await?;

        let body = match format {
            ExportFormat::Csv => to_csv(&rows),
            ExportFormat::Json => {
                to_json(&rows).map_err(|e| TestimonialError::Export(e.to_string()))?
            }
            ExportFormat::Widget => {
                let theme = match request.theme {
                    Some(theme) => theme,
                    None => self.saved_theme(user_id).await?,
                };
                widget(&rows, &theme)
            }
            ExportFormat::Social => rows
                .iter()
                .map(social_post)
                .collect::<Vec<_>>()
                .join(SOCIAL_POST_SEPARATOR),
        };

        info!(user_id = %user_id, format = %format, count = rows.len(), "Exported testimonials");
        Ok(ExportOutput {
            content_type: format.content_type(),
            filename: format!(
                "testimonials_{}.{}",
                Utc::now().format("%Y-%m-%d"),
                format.file_extension()
            ),
            body,
        })
    }

    async fn export_rows(
        &self,
        user_id: Uuid,
        status: Option<TestimonialStatus>,
        only: Option<&[Uuid]>,
    ) -> Result<Vec<ExportTestimonial>, TestimonialError> {
        let forms = self.form_repo.list_by_user(user_id).await?;
        if forms.is_empty() {
            return Ok(Vec::new());
        }
        let form_ids: Vec<Uuid> = forms.iter().map(|f| f.id).collect();
        let titles: HashMap<Uuid, String> =
            forms.into_iter().map(|f| (f.id, f.title)).collect();

        let mut testimonials = self.testimonial_repo.list_by_forms(&form_ids, status).await?;
        if let Some(only) = only {
            testimonials.retain(|t| only.contains(&t.id));
        }

        let mut labels: HashMap<Uuid, String> = HashMap::new();
        for form_id in &form_ids {
            for field in self.form_repo.list_fields(*form_id).await? {
                labels.insert(field.id, field.label);
            }
        }

        let testimonial_ids: Vec<Uuid> = testimonials.iter().map(|t| t.id).collect();
        let mut answers: HashMap<Uuid, BTreeMap<String, String>> = HashMap::new();
        if !testimonial_ids.is_empty() {
            for response in self.testimonial_repo.responses_for(&testimonial_ids).await? {
                let label = labels
                    .get(&response.field_id)
                    .cloned()
                    .unwrap_or_else(|| response.field_id.to_string());
                answers
                    .entry(response.testimonial_id)
                    .or_default()
                    .insert(label, response.value);
            }
        }

        Ok(testimonials
            .into_iter()
            .map(|t| {
                let title = titles.get(&t.form_id).cloned().unwrap_or_default();
                let custom = answers.remove(&t.id).unwrap_or_default();
                ExportTestimonial::from_testimonial(t, title, custom)
            })
            .collect())
    }

    async fn saved_theme(&self, user_id: Uuid) -> Result<WidgetTheme, TestimonialError> {
        if !self.plans.capabilities(user_id).await.allows(Feature::Branding) {
            return Ok(WidgetTheme::default());
        }
        Ok(self
            .branding_repo
            .get_by_user(user_id)
            .await?
            .map(|b| b.theme())
            .unwrap_or_default())
    }

    async fn owned_tag(&self, user_id: Uuid, tag_id: Uuid) -> Result<Tag, TestimonialError> {
        match self.tag_repo.get_by_id(tag_id).await {
            Ok(tag) if tag.user_id == user_id => Ok(tag),
            Ok(_) | Err(RepositoryError::NotFound(_)) => Err(TestimonialError::TagNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn require(&self, user_id: Uuid, feature: Feature) -> Result<(), TestimonialError> {
        self.plans.capabilities(user_id).await.require(feature)?;
        Ok(())
    }
}
