//! Public testimonial submission: request shape, validation and flow phases.

use super::form::{FormField, MediaPolicy};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmissionRequest {
    #[validate(length(min = 1, max = 200, message = "Please enter your name"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(min = 1, max = 10000, message = "Please enter your testimonial"))]
    pub message: String,
    /// No default: a missing rating deserializes as 0 and is rejected.
    #[serde(default)]
    pub rating: i16,
    #[serde(default)]
    pub custom_responses: HashMap<Uuid, String>,
    /// `data:<mime>;base64,<payload>`
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

/// A field-level problem with a submission, shown inline to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn mime_prefix(&self) -> &'static str {
        match self {
            MediaKind::Image => "image/",
            MediaKind::Video => "video/",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Decoded size and declared type of an inline media payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime: String,
    pub size_bytes: u64,
}

pub fn parse_data_url(kind: MediaKind, data_url: &str) -> Result<MediaPayload, FieldError> {
    let malformed = || FieldError::new(kind.field(), format!("Please select a {} file", kind.field()));

    let rest = data_url.strip_prefix("data:").ok_or_else(malformed)?;
    let (header, payload) = rest.split_once(',').ok_or_else(malformed)?;
    let mime = header.strip_suffix(";base64").ok_or_else(malformed)?;
    if !mime.starts_with(kind.mime_prefix()) {
        return Err(malformed());
    }
    let bytes = BASE64.decode(payload.trim()).map_err(|_| malformed())?;
    Ok(MediaPayload {
        mime: mime.to_string(),
        size_bytes: bytes.len() as u64,
    })
}

fn check_media(kind: MediaKind, data_url: &str, policy: &MediaPolicy) -> Result<(), FieldError> {
    let (allowed, max_bytes, max_mb) = match kind {
        MediaKind::Image => (
            policy.allow_image_uploads,
            policy.max_image_bytes(),
            policy.max_image_bytes() / (1024 * 1024),
        ),
        MediaKind::Video => (
            policy.allow_video_uploads,
            policy.max_video_bytes(),
            policy.max_video_bytes() / (1024 * 1024),
        ),
    };
    if !allowed {
        return Err(FieldError::new(
            kind.field(),
            format!("This form does not accept {} uploads", kind.field()),
        ));
    }
    let payload = parse_data_url(kind, data_url)?;
    if payload.size_bytes > max_bytes {
        let label = match kind {
            MediaKind::Image => "Image",
            MediaKind::Video => "Video",
        };
        return Err(FieldError::new(
            kind.field(),
            format!("{label} must be smaller than {max_mb}MB"),
        ));
    }
    Ok(())
}

/// Checks a submission against the form's fields and media policy.
///
/// Runs before any write. The first problem found is returned.
pub fn validate_submission(
    request: &SubmissionRequest,
    fields: &[FormField],
    policy: &MediaPolicy,
) -> Result<(), FieldError> {
    if !(MIN_RATING..=MAX_RATING).contains(&request.rating) {
        return Err(FieldError::new(
            "rating",
            "Please provide a rating before submitting",
        ));
    }

    if let Err(errors) = request.validate() {
        let field_errors = errors.field_errors();
        let mut names: Vec<&&str> = field_errors.keys().collect();
        names.sort();
        if let Some(name) = names.first() {
            let message = field_errors
                .get(**name)
                .and_then(|errs| errs.first())
                .and_then(|e| e.message.as_ref())
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid {}", name));
            return Err(FieldError::new(**name, message));
        }
    }
    if request.name.trim().is_empty() {
        return Err(FieldError::new("name", "Please enter your name"));
    }
    if request.message.trim().is_empty() {
        return Err(FieldError::new("message", "Please enter your testimonial"));
    }

    for field in fields.iter().filter(|f| f.is_required) {
        let filled = request
            .custom_responses
            .get(&field.id)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        if !filled {
            return Err(FieldError::new(
                field.id.to_string(),
                format!("Please fill in the required field: {}", field.label),
            ));
        }
    }

    if let Some(image) = request.image.as_deref() {
        check_media(MediaKind::Image, image, policy)?;
    }
    if let Some(video) = request.video.as_deref() {
        check_media(MediaKind::Video, video, policy)?;
    }
    Ok(())
}

/// Why a submission ended in the error phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    NotFound,
    Inactive,
    Validation,
    QuotaExceeded,
    Upload,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionPhase {
    Loading,
    Ready,
    Submitting,
    Submitted,
    Failed(FailureKind),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while {phase:?}")]
pub struct PhaseError {
    pub action: &'static str,
    pub phase: SubmissionPhase,
}

/// `loading → ready → submitting → submitted`, with `failed` reachable from any
/// non-terminal phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFlow {
    phase: SubmissionPhase,
}

impl Default for SubmissionFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionFlow {
    pub fn new() -> Self {
        Self {
            phase: SubmissionPhase::Loading,
        }
    }

    pub fn phase(&self) -> &SubmissionPhase {
        &self.phase
    }

    fn advance(
        &mut self,
        action: &'static str,
        from: SubmissionPhase,
        to: SubmissionPhase,
    ) -> Result<(), PhaseError> {
        if self.phase != from {
            return Err(PhaseError {
                action,
                phase: self.phase.clone(),
            });
        }
        self.phase = to;
        Ok(())
    }

    pub fn loaded(&mut self) -> Result<(), PhaseError> {
        self.advance("load", SubmissionPhase::Loading, SubmissionPhase::Ready)
    }

    /// Only a ready form can be submitted; a second submit is refused.
    pub fn begin_submit(&mut self) -> Result<(), PhaseError> {
        self.advance("submit", SubmissionPhase::Ready, SubmissionPhase::Submitting)
    }

    pub fn complete(&mut self) -> Result<(), PhaseError> {
        self.advance("complete", SubmissionPhase::Submitting, SubmissionPhase::Submitted)
    }

    pub fn fail(&mut self, kind: FailureKind) {
        if !matches!(self.phase, SubmissionPhase::Submitted | SubmissionPhase::Failed(_)) {
            self.phase = SubmissionPhase::Failed(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::form::FieldType;

    fn request() -> SubmissionRequest {
        SubmissionRequest {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            company: None,
            message: "Great service".into(),
            rating: 4,
            custom_responses: HashMap::new(),
            image: None,
            video: None,
        }
    }

    fn data_url(mime: &str, bytes: usize) -> String {
        format!("data:{};base64,{}", mime, BASE64.encode(vec![7u8; bytes]))
    }

    #[test]
    fn zero_and_out_of_range_ratings_are_rejected() {
        for rating in [0, 6, -1] {
            let mut req = request();
            req.rating = rating;
            let err = validate_submission(&req, &[], &MediaPolicy::default()).unwrap_err();
            assert_eq!(err.field, "rating");
        }
        assert!(validate_submission(&request(), &[], &MediaPolicy::default()).is_ok());
    }

    #[test]
    fn required_custom_fields_must_be_filled() {
        let field = FormField::new(
            Uuid::new_v4(),
            FieldType::Text,
            "Role".into(),
            String::new(),
            vec![],
            true,
            0,
        );
        let mut req = request();
        req.custom_responses.insert(field.id, "   ".into());
        let err = validate_submission(&req, &[field.clone()], &MediaPolicy::default()).unwrap_err();
        assert_eq!(err.message, "Please fill in the required field: Role");

        req.custom_responses.insert(field.id, "CTO".into());
        assert!(validate_submission(&req, &[field], &MediaPolicy::default()).is_ok());
    }

    #[test]
    fn invalid_email_is_reported_on_email_field() {
        let mut req = request();
        req.email = "not-an-email".into();
        let err = validate_submission(&req, &[], &MediaPolicy::default()).unwrap_err();
        assert_eq!(err.field, "email");
    }

    #[test]
    fn media_type_and_size_are_enforced() {
        let mut policy = MediaPolicy::default();
        policy.max_image_size_mb = 1;

        let mut req = request();
        req.image = Some(data_url("video/mp4", 10));
        assert_eq!(
            validate_submission(&req, &[], &policy).unwrap_err().field,
            "image"
        );

        req.image = Some(data_url("image/png", 1024 * 1024 + 1));
        let err = validate_submission(&req, &[], &policy).unwrap_err();
        assert_eq!(err.message, "Image must be smaller than 1MB");

        req.image = Some(data_url("image/png", 1024 * 1024));
        assert!(validate_submission(&req, &[], &policy).is_ok());
    }

    #[test]
    fn video_needs_form_permission() {
        let mut req = request();
        req.video = Some(data_url("video/mp4", 10));
        let err = validate_submission(&req, &[], &MediaPolicy::default()).unwrap_err();
        assert_eq!(err.field, "video");

        let policy = MediaPolicy {
            allow_video_uploads: true,
            ..MediaPolicy::default()
        };
        assert!(validate_submission(&req, &[], &policy).is_ok());
    }

    #[test]
    fn flow_refuses_double_submit() {
        let mut flow = SubmissionFlow::new();
        flow.loaded().unwrap();
        flow.begin_submit().unwrap();
        assert!(flow.begin_submit().is_err());
        flow.complete().unwrap();
        assert_eq!(flow.phase(), &SubmissionPhase::Submitted);
        flow.fail(FailureKind::Upstream);
        assert_eq!(flow.phase(), &SubmissionPhase::Submitted);
    }

    #[test]
    fn failure_is_reachable_from_loading() {
        let mut flow = SubmissionFlow::new();
        flow.fail(FailureKind::NotFound);
        assert_eq!(flow.phase(), &SubmissionPhase::Failed(FailureKind::NotFound));
        assert!(flow.loaded().is_err());
    }
}
