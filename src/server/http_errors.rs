use crate::application::{
    BillingError, BrandingError, FormError, NotificationError, SubmissionError, TagError,
    TestimonialError,
};
use crate::domain::Locked;
use crate::infrastructure::{EmailError, IdentityError, RepositoryError, StripeError};
use axum::http::StatusCode;
use tracing::error;

fn locked(err: &Locked) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::FORBIDDEN,
        serde_json::json!({
            "error": err.to_string(),
            "upgrade": true,
            "feature": err.0,
        }),
    )
}

fn store_failure(err: &RepositoryError, msg: &str) -> (StatusCode, serde_json::Value) {
    error!(error = %err, "{}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({ "error": msg }),
    )
}

fn provider_failure(err: &StripeError) -> (StatusCode, serde_json::Value) {
    error!(error = %err, "Stripe request failed");
    match err {
        StripeError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({ "error": "Rate limited by Stripe, please retry" }),
        ),
        StripeError::InvalidConfig(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Stripe is not configured" }),
        ),
        _ => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": "Billing provider request failed" }),
        ),
    }
}

pub(super) fn map_form_error(err: &FormError) -> (StatusCode, serde_json::Value) {
    match err {
        FormError::NotFound | FormError::FieldNotFound => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": err.to_string() }))
        }
        FormError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        FormError::Order(e) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": e.to_string() }))
        }
        FormError::SubscriptionInactive | FormError::QuotaExceeded(_) => (
            StatusCode::FORBIDDEN,
            serde_json::json!({ "error": err.to_string(), "upgrade": true }),
        ),
        FormError::Locked(e) => locked(e),
        FormError::Repository(e) => store_failure(e, "Failed to update forms"),
    }
}

pub(super) fn map_testimonial_error(err: &TestimonialError) -> (StatusCode, serde_json::Value) {
    match err {
        TestimonialError::NotFound | TestimonialError::TagNotFound => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": err.to_string() }))
        }
        TestimonialError::Locked(e) => locked(e),
        TestimonialError::Export(msg) => {
            error!(error = %msg, "Export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Export failed" }),
            )
        }
        TestimonialError::Repository(e) => store_failure(e, "Failed to update testimonials"),
    }
}

pub(super) fn map_tag_error(err: &TagError) -> (StatusCode, serde_json::Value) {
    match err {
        TagError::NotFound => (StatusCode::NOT_FOUND, serde_json::json!({ "error": "Tag not found" })),
        TagError::Duplicate => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string() }),
        ),
        TagError::Invalid(e) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": e.to_string() }),
        ),
        TagError::Locked(e) => locked(e),
        TagError::Repository(e) => store_failure(e, "Failed to update tags"),
    }
}

pub(super) fn map_branding_error(err: &BrandingError) -> (StatusCode, serde_json::Value) {
    match err {
        BrandingError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        BrandingError::Locked(e) => locked(e),
        BrandingError::Repository(e) => store_failure(e, "Failed to update branding"),
    }
}

pub(super) fn map_submission_error(err: &SubmissionError) -> (StatusCode, serde_json::Value) {
    match err {
        SubmissionError::NotFound | SubmissionError::Inactive => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "This form is not available" }),
        ),
        SubmissionError::Validation(e) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": e.message, "field": e.field }),
        ),
        SubmissionError::QuotaExceeded => (
            StatusCode::FORBIDDEN,
            serde_json::json!({
                "error": "This form is not accepting new testimonials right now",
                "upgrade": true,
            }),
        ),
        SubmissionError::InFlight => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string() }),
        ),
        SubmissionError::Upload(_) => (
            StatusCode::BAD_GATEWAY,
            serde_json::json!({ "error": "Failed to upload media, please try again" }),
        ),
        SubmissionError::Upstream(_) | SubmissionError::Phase(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to submit testimonial, please try again" }),
        ),
    }
}

pub(super) fn map_billing_error(err: &BillingError) -> (StatusCode, serde_json::Value) {
    match err {
        BillingError::NotConfigured(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": msg }),
        ),
        BillingError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        BillingError::CustomerNotFound => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": err.to_string() }),
        ),
        BillingError::MissingSignature
        | BillingError::Signature(_)
        | BillingError::InvalidPayload(_) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": err.to_string() }),
        ),
        BillingError::Stripe(e) => provider_failure(e),
        BillingError::Repository(e) => store_failure(e, "Failed to process billing event"),
    }
}

pub(super) fn map_notification_error(err: &NotificationError) -> (StatusCode, serde_json::Value) {
    match err {
        NotificationError::InvalidPayload(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        NotificationError::Identity(IdentityError::UserNotFound(_))
        | NotificationError::Recipient(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": err.to_string() }),
        ),
        NotificationError::Email(EmailError::Rejected(_))
        | NotificationError::Email(EmailError::RequestFailed(_)) => {
            error!(error = %err, "Email provider request failed");
            (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": "Email provider request failed" }),
            )
        }
        _ => {
            error!(error = %err, "Notification failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": err.to_string() }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Feature, FieldError};

    #[test]
    fn locked_features_carry_upgrade_hint() {
        let (status, body) = map_tag_error(&TagError::Locked(Locked(Feature::Tags)));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["upgrade"], true);
        assert_eq!(body["feature"], "tags");
        assert_eq!(
            body["error"],
            "Tags is available with Premium. Upgrade to unlock this feature."
        );
    }

    #[test]
    fn duplicate_tag_is_conflict() {
        let (status, body) = map_tag_error(&TagError::Duplicate);
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "A tag with this name already exists");
    }

    #[test]
    fn validation_names_the_field() {
        let err = SubmissionError::Validation(FieldError::new(
            "rating",
            "Please provide a rating before submitting",
        ));
        let (status, body) = map_submission_error(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "rating");
    }

    #[test]
    fn inactive_forms_read_as_missing() {
        let (status, _) = map_submission_error(&SubmissionError::Inactive);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn unknown_email_type_is_server_error() {
        let (status, body) =
            map_notification_error(&NotificationError::UnknownType("digest".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Unknown email type: digest");
    }

    #[test]
    fn missing_stripe_config_is_server_error() {
        let (status, body) =
            map_billing_error(&BillingError::NotConfigured("Stripe is not configured"));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Stripe is not configured");
    }
}
