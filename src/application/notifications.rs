//! Transactional email: typed notification payloads and their templates.
//!
//! Every interpolated value is HTML-escaped before it lands in a template.

use crate::domain::{escape_html, Testimonial};
use crate::infrastructure::{Email, EmailError, IdentityError, IdentityProvider, Mailer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const BRAND: &str = "TestiFlow by Freedom Lab";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Unknown email type: {0}")]
    UnknownType(String),
    #[error("Invalid notification payload: {0}")]
    InvalidPayload(String),
    #[error("Failed to get user email: {0}")]
    Recipient(String),
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
    #[error("Email error: {0}")]
    Email(#[from] EmailError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonialSummary {
    pub name: String,
    #[serde(default)]
    pub company: Option<String>,
    pub rating: i16,
    pub message: String,
}

impl From<&Testimonial> for TestimonialSummary {
    fn from(t: &Testimonial) -> Self {
        Self {
            name: t.name.clone(),
            company: t.company.clone(),
            rating: t.rating,
            message: t.message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTestimonialData {
    pub testimonial: TestimonialSummary,
    pub form_title: String,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpData {
    pub customer_email: String,
    pub customer_name: String,
    pub form_url: String,
    pub form_title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialEndingData {
    pub user_email: String,
    pub days_left: i64,
    pub charge_date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailureData {
    pub user_email: String,
    pub grace_period_end: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    NewTestimonial(NewTestimonialData),
    FollowUp(FollowUpData),
    TrialEnding(TrialEndingData),
    PaymentFailure(PaymentFailureData),
}

impl Notification {
    /// Parses `{ "type": ..., "data": {...} }`.
    pub fn from_request(type_: &str, data: Value) -> Result<Self, NotificationError> {
        fn payload<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, NotificationError> {
            serde_json::from_value(data).map_err(|e| NotificationError::InvalidPayload(e.to_string()))
        }
        match type_ {
            "new_testimonial" => Ok(Notification::NewTestimonial(payload(data)?)),
            "follow_up" => Ok(Notification::FollowUp(payload(data)?)),
            "trial_ending" => Ok(Notification::TrialEnding(payload(data)?)),
            "payment_failure" => Ok(Notification::PaymentFailure(payload(data)?)),
            other => Err(NotificationError::UnknownType(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::NewTestimonial(_) => "new_testimonial",
            Notification::FollowUp(_) => "follow_up",
            Notification::TrialEnding(_) => "trial_ending",
            Notification::PaymentFailure(_) => "payment_failure",
        }
    }
}

pub struct NotificationService {
    mailer: Arc<dyn Mailer>,
    identity: Option<Arc<dyn IdentityProvider>>,
    app_url: String,
}

impl NotificationService {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        identity: Option<Arc<dyn IdentityProvider>>,
        app_url: &str,
    ) -> Self {
        Self {
            mailer,
            identity,
            app_url: app_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let email = match notification {
            Notification::NewTestimonial(data) => {
                let to = self.owner_email(data.user_id).await?;
                new_testimonial_email(&to, data, &self.app_url)
            }
            Notification::FollowUp(data) => follow_up_email(data)?,
            Notification::TrialEnding(data) => trial_ending_email(data, &self.app_url),
            Notification::PaymentFailure(data) => payment_failure_email(data, &self.app_url),
        };
        self.mailer.send(&email).await?;
        info!(kind = notification.kind(), "Sent notification email");
        Ok(())
    }

    /// Tells a form owner about a new submission.
    pub async fn new_testimonial(
        &self,
        owner_id: Uuid,
        testimonial: &Testimonial,
        form_title: &str,
    ) -> Result<(), NotificationError> {
        self.send(&Notification::NewTestimonial(NewTestimonialData {
            testimonial: testimonial.into(),
            form_title: form_title.to_string(),
            user_id: owner_id,
        }))
        .await
    }

    async fn owner_email(&self, user_id: Uuid) -> Result<String, NotificationError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| NotificationError::Recipient("auth service is not configured".into()))?;
        identity
            .user_by_id(user_id)
            .await?
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| NotificationError::Recipient("User not found".into()))
    }
}

fn layout(subtitle: Option<&str>, body: &str) -> String {
    let subtitle = subtitle
        .map(|s| format!(r#"<p style="color: #666; margin: 5px 0 0 0;">{}</p>"#, s))
        .unwrap_or_default();
    format!(
        r#"<div style="font-family: 'Montserrat', Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
  <div style="text-align: center; margin-bottom: 30px;">
    <h1 style="color: #01004d; margin: 0; font-size: 24px;">{BRAND}</h1>
    {subtitle}
  </div>
  {body}
  <div style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #eee; text-align: center; color: #999; font-size: 12px;">
    <p>This email was sent by {BRAND}</p>
  </div>
</div>"#
    )
}

fn button(href: &str, label: &str, color: &str) -> String {
    format!(
        r#"<div style="text-align: center;"><a href="{}" style="background: {}; color: white; padding: 12px 24px; border-radius: 8px; text-decoration: none; display: inline-block; font-weight: 600;">{}</a></div>"#,
        escape_html(href),
        color,
        label
    )
}

fn plural_days(days: i64) -> String {
    format!("{} day{}", days, if days == 1 { "" } else { "s" })
}

pub fn new_testimonial_email(to: &str, data: &NewTestimonialData, app_url: &str) -> Email {
    let t = &data.testimonial;
    let rating = t.rating.clamp(0, 5) as usize;
    let company_html = t
        .company
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| format!(r#"<p style="margin: 0; color: #666; font-size: 14px;">{}</p>"#, escape_html(c)))
        .unwrap_or_default();
    let company_text = t
        .company
        .as_deref()
        .filter(|c| !c.is_empty())
        .map(|c| format!(" ({})", c))
        .unwrap_or_default();
    let dashboard = format!("{}/testimonials", app_url);

    let body = format!(
        r#"<div style="background: #f8f9fa; border-radius: 12px; padding: 24px; margin-bottom: 20px;">
    <h3 style="margin: 0; color: #01004d; font-size: 18px;">{name}</h3>
    {company_html}
    <div style="margin: 16px 0;">Rating: {stars} ({rating}/5)</div>
    <div style="background: white; padding: 16px; border-radius: 8px; border-left: 4px solid #01b79e;"><em>"{message}"</em></div>
    <div style="color: #666; font-size: 14px; margin-top: 16px;"><strong>Form:</strong> {form}</div>
  </div>
  {button}"#,
        name = escape_html(&t.name),
        stars = "⭐".repeat(rating),
        rating = t.rating,
        message = escape_html(&t.message),
        form = escape_html(&data.form_title),
        button = button(&dashboard, "Review in Dashboard", "#01004d"),
    );

    Email {
        to: to.to_string(),
        subject: format!("New testimonial received from {}", t.name),
        html: layout(Some("New Testimonial Received"), &body),
        text: format!(
            "New testimonial received from {}{}\n\nRating: {}/5 stars\nTestimonial: \"{}\"\nForm: {}\n\nReview in your dashboard: {}\n\nThis email was sent by {}",
            t.name, company_text, t.rating, t.message, data.form_title, dashboard, BRAND
        ),
    }
}

pub fn follow_up_email(data: &FollowUpData) -> Result<Email, NotificationError> {
    if !(data.form_url.starts_with("https://") || data.form_url.starts_with("http://")) {
        return Err(NotificationError::InvalidPayload(
            "form_url must be an http(s) URL".to_string(),
        ));
    }
    let body = format!(
        r#"<div style="background: #f8f9fa; border-radius: 12px; padding: 24px; margin-bottom: 20px;">
    <h2 style="color: #01004d; margin: 0 0 16px 0;">Hi {name},</h2>
    <p style="color: #333; line-height: 1.6;">We hope you've had a great experience with us! We'd love to hear about it.</p>
    <p style="color: #333; line-height: 1.6;">Your feedback helps us improve and helps other customers learn about our services. It only takes 2 minutes to share your thoughts.</p>
    {button}
  </div>"#,
        name = escape_html(&data.customer_name),
        button = button(&data.form_url, "Share Your Experience", "#01b79e"),
    );

    Ok(Email {
        to: data.customer_email.clone(),
        subject: format!("We'd love your feedback - {}", data.form_title),
        html: layout(None, &body),
        text: format!(
            "Hi {},\n\nWe hope you've had a great experience with us! We'd love to hear about it.\n\nYour feedback helps us improve and helps other customers learn about our services. It only takes 2 minutes to share your thoughts.\n\nShare your experience: {}\n\nThis email was sent by {}",
            data.customer_name, data.form_url, BRAND
        ),
    })
}

pub fn trial_ending_email(data: &TrialEndingData, app_url: &str) -> Email {
    let days = plural_days(data.days_left);
    let settings = format!("{}/settings", app_url);
    let body = format!(
        r#"<div style="background: #f8f9fa; border-radius: 12px; padding: 24px; margin-bottom: 20px;">
    <h2 style="color: #01004d; margin: 0 0 16px 0;">Your trial ends in {days}</h2>
    <p style="color: #333; line-height: 1.6;">Your TestiFlow trial will end on <strong>{date}</strong>. After that, your card will be charged and you'll continue with full access to all features.</p>
    <p style="color: #333; line-height: 1.6;">No action needed - your subscription will continue automatically. You can manage your billing or cancel anytime in your settings.</p>
  </div>
  {button}"#,
        days = days,
        date = escape_html(&data.charge_date),
        button = button(&settings, "Manage Subscription", "#01004d"),
    );

    Email {
        to: data.user_email.clone(),
        subject: format!("Your TestiFlow trial ends in {}", days),
        html: layout(Some("Trial Ending Soon"), &body),
        text: format!(
            "Your TestiFlow trial ends in {}\n\nYour trial will end on {}. After that, your card will be charged and you'll continue with full access to all features.\n\nNo action needed - your subscription will continue automatically. You can manage your billing or cancel anytime in your settings.\n\nManage subscription: {}\n\nThis email was sent by {}",
            days, data.charge_date, settings, BRAND
        ),
    }
}

pub fn payment_failure_email(data: &PaymentFailureData, app_url: &str) -> Email {
    let settings = format!("{}/settings", app_url);
    let until = escape_html(&data.grace_period_end);
    let body = format!(
        r#"<div style="background: #fef2f2; border: 1px solid #fecaca; border-radius: 12px; padding: 24px; margin-bottom: 20px;">
    <h2 style="color: #dc2626; margin: 0 0 16px 0;">Payment Method Needs Attention</h2>
    <p style="color: #333; line-height: 1.6;">We were unable to process your payment for TestiFlow. This could be due to an expired card, insufficient funds, or your bank declining the charge.</p>
    <p style="color: #333; line-height: 1.6;"><strong>Don't worry!</strong> Your account remains active until <strong>{until}</strong>. Please update your payment method to continue using TestiFlow without interruption.</p>
    <p style="margin: 0; color: #991b1b; font-size: 14px;"><strong>Grace Period:</strong> You have until {until} to update your payment method before your account is suspended.</p>
  </div>
  {button}"#,
        until = until,
        button = button(&settings, "Update Payment Method", "#dc2626"),
    );

    Email {
        to: data.user_email.clone(),
        subject: "Action Required: Update your payment method - TestiFlow".to_string(),
        html: layout(Some("Payment Issue"), &body),
        text: format!(
            "Payment Method Needs Attention - TestiFlow\n\nWe were unable to process your payment for TestiFlow. This could be due to an expired card, insufficient funds, or your bank declining the charge.\n\nDon't worry! Your account remains active until {}. Please update your payment method to continue using TestiFlow without interruption.\n\nUpdate your payment method: {}\n\nThis email was sent by {}",
            data.grace_period_end, settings, BRAND
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MockMailer;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    const APP: &str = "https://app.testiflow.test";

    #[test]
    fn unknown_type_is_rejected() {
        let err = Notification::from_request("weekly_digest", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown email type: weekly_digest");
    }

    #[test]
    fn new_testimonial_escapes_submitter_input() {
        let data = NewTestimonialData {
            testimonial: TestimonialSummary {
                name: "<b>Ann</b>".into(),
                company: Some("Acme & Co".into()),
                rating: 4,
                message: "<script>x</script>".into(),
            },
            form_title: "Launch".into(),
            user_id: Uuid::new_v4(),
        };
        let email = new_testimonial_email("owner@example.com", &data, APP);
        assert_eq!(email.subject, "New testimonial received from <b>Ann</b>");
        assert!(email.html.contains("&lt;b&gt;Ann&lt;/b&gt;"));
        assert!(email.html.contains("Acme &amp; Co"));
        assert!(!email.html.contains("<script>"));
        assert!(email.html.contains("https://app.testiflow.test/testimonials"));
        assert!(email.text.contains("Rating: 4/5 stars"));
    }

    #[test]
    fn trial_subject_pluralizes() {
        let data = |days| TrialEndingData {
            user_email: "u@example.com".into(),
            days_left: days,
            charge_date: "2026-01-01".into(),
        };
        assert_eq!(
            trial_ending_email(&data(1), APP).subject,
            "Your TestiFlow trial ends in 1 day"
        );
        assert_eq!(
            trial_ending_email(&data(3), APP).subject,
            "Your TestiFlow trial ends in 3 days"
        );
    }

    #[test]
    fn follow_up_requires_http_link() {
        let data = FollowUpData {
            customer_email: "c@example.com".into(),
            customer_name: "Cat".into(),
            form_url: "javascript:alert(1)".into(),
            form_title: "Launch".into(),
        };
        assert_err!(follow_up_email(&data));
    }

    #[tokio::test]
    async fn payment_failure_is_mailed_to_the_user() {
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|email| {
                email.to == "u@example.com"
                    && email.subject == "Action Required: Update your payment method - TestiFlow"
                    && email.text.contains("2026-02-01")
            })
            .times(1)
            .returning(|_| Ok(()));

        let service = NotificationService::new(Arc::new(mailer), None, APP);
        let notification = Notification::from_request(
            "payment_failure",
            json!({ "user_email": "u@example.com", "grace_period_end": "2026-02-01" }),
        )
        .unwrap();
        assert_ok!(service.send(&notification).await);
    }

    #[tokio::test]
    async fn new_testimonial_needs_identity_lookup() {
        let mut mailer = MockMailer::new();
        mailer.expect_send().times(0);
        let service = NotificationService::new(Arc::new(mailer), None, APP);
        let data = NewTestimonialData {
            testimonial: TestimonialSummary {
                name: "Ann".into(),
                company: None,
                rating: 5,
                message: "Great".into(),
            },
            form_title: "Launch".into(),
            user_id: Uuid::new_v4(),
        };
        let err = service
            .send(&Notification::NewTestimonial(data))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Recipient(_)));
    }
}
