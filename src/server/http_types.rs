use crate::application::{BrandingChanges, FieldDraft, FormChanges, FormDraft};
use crate::domain::{FieldType, Form, MediaPolicy, SubscriptionInfo, WidgetTheme};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct GuardQuery {
    /// Path the client is about to render.
    #[param(example = "/dashboard")]
    pub(super) path: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub(super) struct StatusQuery {
    #[param(example = "approved")]
    pub(super) status: Option<String>,
}

#[derive(Serialize)]
pub(super) struct SubscriptionResponse {
    #[serde(flatten)]
    pub(super) info: SubscriptionInfo,
    pub(super) features: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize, ToSchema, Clone, Copy)]
pub(super) struct MediaPolicyRequest {
    #[serde(default = "default_true")]
    pub(super) allow_image_uploads: bool,
    #[serde(default)]
    pub(super) allow_video_uploads: bool,
    #[schema(example = 10)]
    pub(super) max_image_size_mb: Option<i32>,
    #[schema(example = 100)]
    pub(super) max_video_size_mb: Option<i32>,
}

fn default_true() -> bool {
    true
}

impl From<MediaPolicyRequest> for MediaPolicy {
    fn from(req: MediaPolicyRequest) -> Self {
        let defaults = MediaPolicy::default();
        MediaPolicy {
            allow_image_uploads: req.allow_image_uploads,
            allow_video_uploads: req.allow_video_uploads,
            max_image_size_mb: req.max_image_size_mb.unwrap_or(defaults.max_image_size_mb),
            max_video_size_mb: req.max_video_size_mb.unwrap_or(defaults.max_video_size_mb),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreateFormRequest {
    #[schema(example = "Customer feedback")]
    pub(super) title: String,
    pub(super) description: Option<String>,
    pub(super) thank_you_message: Option<String>,
    pub(super) media: Option<MediaPolicyRequest>,
}

impl From<CreateFormRequest> for FormDraft {
    fn from(req: CreateFormRequest) -> Self {
        FormDraft {
            title: req.title,
            description: req.description,
            thank_you_message: req.thank_you_message,
            media: req.media.map(Into::into),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct UpdateFormRequest {
    pub(super) title: Option<String>,
    pub(super) description: Option<String>,
    pub(super) thank_you_message: Option<String>,
    pub(super) is_active: Option<bool>,
    pub(super) media: Option<MediaPolicyRequest>,
}

impl From<UpdateFormRequest> for FormChanges {
    fn from(req: UpdateFormRequest) -> Self {
        FormChanges {
            title: req.title,
            description: req.description,
            thank_you_message: req.thank_you_message,
            is_active: req.is_active,
            media: req.media.map(Into::into),
        }
    }
}

#[derive(Serialize)]
pub(super) struct FormResponse {
    #[serde(flatten)]
    pub(super) form: Form,
    pub(super) share_url: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct FieldRequest {
    #[schema(example = "select")]
    pub(super) field_type: String,
    #[schema(example = "How did you hear about us?")]
    pub(super) label: String,
    pub(super) placeholder: Option<String>,
    #[serde(default)]
    pub(super) options: Vec<String>,
    #[serde(default)]
    pub(super) is_required: bool,
}

impl FieldRequest {
    pub(super) fn into_draft(self, field_type: FieldType) -> FieldDraft {
        FieldDraft {
            field_type,
            label: self.label,
            placeholder: self.placeholder,
            options: self.options,
            is_required: self.is_required,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct MoveFieldRequest {
    pub(super) field_id: Uuid,
    #[schema(example = 0)]
    pub(super) to_index: usize,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ModerateRequest {
    #[schema(example = "approved")]
    pub(super) status: String,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ThemeRequest {
    pub(super) primary_color: Option<String>,
    pub(super) secondary_color: Option<String>,
    pub(super) font_family: Option<String>,
}

impl From<ThemeRequest> for WidgetTheme {
    fn from(req: ThemeRequest) -> Self {
        let defaults = WidgetTheme::default();
        WidgetTheme {
            primary_color: req.primary_color.unwrap_or(defaults.primary_color),
            secondary_color: req.secondary_color.unwrap_or(defaults.secondary_color),
            font_family: req.font_family.unwrap_or(defaults.font_family),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct ExportRequestBody {
    #[schema(example = "csv")]
    pub(super) format: Option<String>,
    pub(super) testimonial_ids: Option<Vec<Uuid>>,
    pub(super) status: Option<String>,
    pub(super) theme: Option<ThemeRequest>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct TagRequest {
    #[schema(example = "Featured")]
    pub(super) name: String,
    #[schema(example = "#3B82F6")]
    pub(super) color: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct UpdateTagRequest {
    pub(super) name: Option<String>,
    pub(super) color: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct BrandingRequest {
    pub(super) logo_url: Option<String>,
    #[schema(example = "#01004d")]
    pub(super) primary_color: Option<String>,
    #[schema(example = "#01b79e")]
    pub(super) secondary_color: Option<String>,
    #[schema(example = "Montserrat")]
    pub(super) font_family: Option<String>,
}

impl From<BrandingRequest> for BrandingChanges {
    fn from(req: BrandingRequest) -> Self {
        BrandingChanges {
            logo_url: req.logo_url,
            primary_color: req.primary_color,
            secondary_color: req.secondary_color,
            font_family: req.font_family,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct PortalRequest {
    pub(super) return_url: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct NotificationRequest {
    #[serde(rename = "type")]
    #[schema(example = "new_testimonial")]
    pub(super) kind: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub(super) data: serde_json::Value,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct AssignTagRequest {
    pub(super) tag_id: Uuid,
}
