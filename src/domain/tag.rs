use super::branding::is_hex_color;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TAG_COLOR: &str = "#3B82F6";
pub const MAX_TAG_NAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagInputError {
    #[error("Tag name is required")]
    EmptyName,
    #[error("Tag name must be at most {MAX_TAG_NAME_LEN} characters")]
    NameTooLong,
    #[error("Tag color must be a hex color like #3B82F6")]
    BadColor,
}

impl Tag {
    /// Builds a tag from user input. Names are trimmed; a missing color gets the default.
    pub fn new(user_id: Uuid, name: &str, color: Option<&str>) -> Result<Self, TagInputError> {
        let name = check_name(name)?;
        let color = check_color(color)?;
        Ok(Self {
            id: Uuid::new_v4(),
            user_id,
            name,
            color,
            created_at: Utc::now(),
        })
    }
}

pub fn check_name(name: &str) -> Result<String, TagInputError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagInputError::EmptyName);
    }
    if name.chars().count() > MAX_TAG_NAME_LEN {
        return Err(TagInputError::NameTooLong);
    }
    Ok(name.to_string())
}

pub fn check_color(color: Option<&str>) -> Result<String, TagInputError> {
    match color.map(str::trim) {
        None | Some("") => Ok(DEFAULT_TAG_COLOR.to_string()),
        Some(c) if is_hex_color(c) => Ok(c.to_string()),
        Some(_) => Err(TagInputError::BadColor),
    }
}

/// Link between a testimonial and one of its owner's tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAssignment {
    pub testimonial_id: Uuid,
    pub tag_id: Uuid,
    pub created_at: DateTime<Utc>,
}
