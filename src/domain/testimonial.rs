use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TestimonialStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Testimonial {
    pub id: Uuid,
    pub form_id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub message: String,
    pub rating: i16,
    pub status: TestimonialStatus,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Testimonial {
    /// A freshly submitted testimonial always starts out `pending`.
    pub fn submitted(
        form_id: Uuid,
        name: String,
        email: String,
        company: Option<String>,
        message: String,
        rating: i16,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            form_id,
            name,
            email,
            company: company.filter(|c| !c.trim().is_empty()),
            message,
            rating,
            status: TestimonialStatus::Pending,
            image_url: None,
            video_url: None,
            submitted_at: Utc::now(),
        }
    }
}

/// Value a submitter entered for one custom field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormResponse {
    pub id: Uuid,
    pub testimonial_id: Uuid,
    pub field_id: Uuid,
    pub value: String,
}

impl FormResponse {
    pub fn new(testimonial_id: Uuid, field_id: Uuid, value: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            testimonial_id,
            field_id,
            value,
        }
    }
}

/// Flattened testimonial used by every export format.
///
/// Field names are part of the JSON export contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTestimonial {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub company: Option<String>,
    pub message: String,
    pub rating: i16,
    pub status: TestimonialStatus,
    pub submitted_at: DateTime<Utc>,
    pub form_title: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_responses: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl ExportTestimonial {
    pub fn from_testimonial(
        testimonial: Testimonial,
        form_title: String,
        custom_responses: BTreeMap<String, String>,
    ) -> Self {
        Self {
            id: testimonial.id,
            name: testimonial.name,
            email: testimonial.email,
            company: testimonial.company,
            message: testimonial.message,
            rating: testimonial.rating,
            status: testimonial.status,
            submitted_at: testimonial.submitted_at,
            form_title,
            custom_responses,
            image_url: testimonial.image_url,
            video_url: testimonial.video_url,
        }
    }
}
