use super::subscription::SubscriptionLookup;
use crate::domain::{
    move_field, next_sort_order, normalize_order, remove_field, Feature, FieldType, Form,
    FormField, Locked, MediaPolicy, OrderError, Quota,
};
use crate::infrastructure::{FormRepository, RepositoryError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_THANK_YOU_MESSAGE: &str = "Thank you for your testimonial!";

#[derive(Error, Debug)]
pub enum FormError {
    #[error("Form not found")]
    NotFound,
    #[error("Field not found")]
    FieldNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("An active subscription is required to create forms")]
    SubscriptionInactive,
    #[error("Form limit reached: your plan allows {0} form(s)")]
    QuotaExceeded(u64),
    #[error(transparent)]
    Locked(#[from] Locked),
    #[error("Invalid field order: {0}")]
    Order(#[from] OrderError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Default)]
pub struct FormDraft {
    pub title: String,
    pub description: Option<String>,
    pub thank_you_message: Option<String>,
    pub media: Option<MediaPolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct FormChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thank_you_message: Option<String>,
    pub is_active: Option<bool>,
    pub media: Option<MediaPolicy>,
}

#[derive(Debug, Clone)]
pub struct FieldDraft {
    pub field_type: FieldType,
    pub label: String,
    pub placeholder: Option<String>,
    pub options: Vec<String>,
    pub is_required: bool,
}

pub struct FormService<F: FormRepository> {
    form_repo: Arc<F>,
    plans: Arc<dyn SubscriptionLookup>,
    app_origin: String,
}

impl<F: FormRepository> FormService<F> {
    pub fn new(form_repo: Arc<F>, plans: Arc<dyn SubscriptionLookup>, app_origin: String) -> Self {
        Self {
            form_repo,
            plans,
            app_origin,
        }
    }

    pub fn share_url(&self, form: &Form) -> String {
        form.share_url(&self.app_origin)
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Form>, FormError> {
        Ok(self.form_repo.list_by_user(user_id).await?)
    }

    pub async fn get(&self, user_id: Uuid, form_id: Uuid) -> Result<Form, FormError> {
        match self.form_repo.get_by_id(form_id).await {
            Ok(form) if form.user_id == user_id => Ok(form),
            Ok(_) | Err(RepositoryError::NotFound(_)) => Err(FormError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Creates a form after re-checking the subscription against fresh usage.
    pub async fn create(&self, user_id: Uuid, draft: FormDraft) -> Result<Form, FormError> {
        let title = required_title(&draft.title)?;

        let info = self.plans.fresh(user_id).await;
        if !info.is_active {
            return Err(FormError::SubscriptionInactive);
        }
        if let Quota::Limited(max) = info.limits.max_forms {
            if info.current_usage.form_count >= max {
                return Err(FormError::QuotaExceeded(max));
            }
        }

        let mut form = Form::new(
            user_id,
            title,
            draft.description.unwrap_or_default(),
            thank_you_or_default(draft.thank_you_message),
        );
        if let Some(media) = draft.media {
            check_media_policy(&media)?;
            if media.allow_video_uploads {
                self.plans.capabilities(user_id).await.require(Feature::VideoUploads)?;
            }
            form.media = media;
        }

        self.form_repo.create(&form).await?;
        info!(user_id = %user_id, form_id = %form.id, "Created form");
        Ok(form)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        form_id: Uuid,
        changes: FormChanges,
    ) -> Result<Form, FormError> {
        let mut form = self.get(user_id, form_id).await?;

        if let Some(title) = changes.title {
            form.title = required_title(&title)?;
        }
        if let Some(description) = changes.description {
            form.description = description;
        }
        if let Some(thank_you) = changes.thank_you_message {
            form.thank_you_message = thank_you_or_default(Some(thank_you));
        }
        if let Some(is_active) = changes.is_active {
            form.is_active = is_active;
        }
        if let Some(media) = changes.media {
            check_media_policy(&media)?;
            if media.allow_video_uploads && !form.media.allow_video_uploads {
                self.plans.capabilities(user_id).await.require(Feature::VideoUploads)?;
            }
            form.media = media;
        }
        form.updated_at = Utc::now();

        self.form_repo.update(&form).await?;
        Ok(form)
    }

    pub async fn delete(&self, user_id: Uuid, form_id: Uuid) -> Result<(), FormError> {
        let form = self.get(user_id, form_id).await?;
        self.form_repo.delete(form.id).await?;
        info!(user_id = %user_id, form_id = %form.id, "Deleted form");
        Ok(())
    }

    pub async fn fields(&self, user_id: Uuid, form_id: Uuid) -> Result<Vec<FormField>, FormError> {
        let form = self.get(user_id, form_id).await?;
        self.ordered_fields(form.id).await
    }

    pub async fn add_field(
        &self,
        user_id: Uuid,
        form_id: Uuid,
        draft: FieldDraft,
    ) -> Result<FormField, FormError> {
        self.require_custom_fields(user_id).await?;
        let form = self.get(user_id, form_id).await?;
        let label = required_label(&draft.label)?;
        let options = checked_options(draft.field_type, draft.options)?;

        let existing = self.ordered_fields(form.id).await?;
        let field = FormField::new(
            form.id,
            draft.field_type,
            label,
            draft.placeholder.unwrap_or_default(),
            options,
            draft.is_required,
            next_sort_order(&existing),
        );
        self.form_repo.create_field(&field).await?;
        Ok(field)
    }

    pub async fn update_field(
        &self,
        user_id: Uuid,
        form_id: Uuid,
        field_id: Uuid,
        draft: FieldDraft,
    ) -> Result<FormField, FormError> {
        self.require_custom_fields(user_id).await?;
        let form = self.get(user_id, form_id).await?;
        let mut field = self
            .ordered_fields(form.id)
            .await?
            .into_iter()
            .find(|f| f.id == field_id)
            .ok_or(FormError::FieldNotFound)?;

        field.label = required_label(&draft.label)?;
        field.options = checked_options(draft.field_type, draft.options)?;
        field.field_type = draft.field_type;
        field.placeholder = draft.placeholder.unwrap_or_default();
        field.is_required = draft.is_required;

        self.form_repo.update_field(&field).await?;
        Ok(field)
    }

    /// Deletion stays available after a downgrade so owners can clean up.
    pub async fn delete_field(
        &self,
        user_id: Uuid,
        form_id: Uuid,
        field_id: Uuid,
    ) -> Result<Vec<FormField>, FormError> {
        let form = self.get(user_id, form_id).await?;
        let mut fields = self.ordered_fields(form.id).await?;
        remove_field(&mut fields, field_id).map_err(|_| FormError::FieldNotFound)?;

        self.form_repo
            .delete_field_and_reorder(form.id, field_id, &fields)
            .await?;
        Ok(fields)
    }

    /// Moves one field and persists the dense 0..N-1 order.
    pub async fn move_field(
        &self,
        user_id: Uuid,
        form_id: Uuid,
        field_id: Uuid,
        to_index: usize,
    ) -> Result<Vec<FormField>, FormError> {
        self.require_custom_fields(user_id).await?;
        let form = self.get(user_id, form_id).await?;
        let mut fields = self.ordered_fields(form.id).await?;
        move_field(&mut fields, field_id, to_index)?;

        self.form_repo.save_field_order(form.id, &fields).await?;
        Ok(fields)
    }

    async fn ordered_fields(&self, form_id: Uuid) -> Result<Vec<FormField>, FormError> {
        let mut fields = self.form_repo.list_fields(form_id).await?;
        normalize_order(&mut fields);
        Ok(fields)
    }

    async fn require_custom_fields(&self, user_id: Uuid) -> Result<(), FormError> {
        self.plans
            .capabilities(user_id)
            .await
            .require(Feature::CustomFields)?;
        Ok(())
    }
}

fn required_title(title: &str) -> Result<String, FormError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(FormError::Validation("Form title is required".to_string()));
    }
    Ok(title.to_string())
}

fn required_label(label: &str) -> Result<String, FormError> {
    let label = label.trim();
    if label.is_empty() {
        return Err(FormError::Validation("Field label is required".to_string()));
    }
    Ok(label.to_string())
}

fn thank_you_or_default(message: Option<String>) -> String {
    message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_THANK_YOU_MESSAGE.to_string())
}

fn checked_options(field_type: FieldType, options: Vec<String>) -> Result<Vec<String>, FormError> {
    let options: Vec<String> = options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if !field_type.takes_options() {
        return Ok(Vec::new());
    }
    if options.is_empty() {
        return Err(FormError::Validation(format!(
            "A {} field needs at least one option",
            field_type
        )));
    }
    Ok(options)
}

fn check_media_policy(media: &MediaPolicy) -> Result<(), FormError> {
    if media.max_image_size_mb <= 0 || media.max_video_size_mb <= 0 {
        return Err(FormError::Validation(
            "Upload size limits must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_dropped_for_free_text_fields() {
        let options = checked_options(FieldType::Text, vec!["a".into()]).unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn choice_fields_need_options() {
        let err = checked_options(FieldType::Select, vec!["  ".into()]).unwrap_err();
        assert!(matches!(err, FormError::Validation(msg) if msg.contains("select")));
    }

    #[test]
    fn blank_thank_you_falls_back() {
        assert_eq!(
            thank_you_or_default(Some("  ".into())),
            DEFAULT_THANK_YOU_MESSAGE
        );
    }
}
