use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

pub const DEFAULT_MAX_IMAGE_SIZE_MB: i32 = 10;
pub const DEFAULT_MAX_VIDEO_SIZE_MB: i32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub thank_you_message: String,
    pub is_active: bool,
    pub media: MediaPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPolicy {
    pub allow_image_uploads: bool,
    pub allow_video_uploads: bool,
    pub max_image_size_mb: i32,
    pub max_video_size_mb: i32,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self {
            allow_image_uploads: true,
            allow_video_uploads: false,
            max_image_size_mb: DEFAULT_MAX_IMAGE_SIZE_MB,
            max_video_size_mb: DEFAULT_MAX_VIDEO_SIZE_MB,
        }
    }
}

impl MediaPolicy {
    pub fn max_image_bytes(&self) -> u64 {
        megabytes(self.max_image_size_mb, DEFAULT_MAX_IMAGE_SIZE_MB)
    }

    pub fn max_video_bytes(&self) -> u64 {
        megabytes(self.max_video_size_mb, DEFAULT_MAX_VIDEO_SIZE_MB)
    }
}

fn megabytes(configured: i32, fallback: i32) -> u64 {
    let mb = if configured > 0 { configured } else { fallback };
    mb as u64 * 1024 * 1024
}

impl Form {
    pub fn new(user_id: Uuid, title: String, description: String, thank_you_message: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            description,
            thank_you_message,
            is_active: true,
            media: MediaPolicy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn share_url(&self, origin: &str) -> String {
        format!("{}/submit/{}", origin.trim_end_matches('/'), self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Select,
    Radio,
    Checkbox,
    Rating,
    Email,
    Url,
}

impl FieldType {
    pub fn takes_options(&self) -> bool {
        matches!(self, FieldType::Select | FieldType::Radio | FieldType::Checkbox)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: Uuid,
    pub form_id: Uuid,
    pub field_type: FieldType,
    pub label: String,
    pub placeholder: String,
    pub options: Vec<String>,
    pub is_required: bool,
    pub sort_order: i32,
}

impl FormField {
    pub fn new(
        form_id: Uuid,
        field_type: FieldType,
        label: String,
        placeholder: String,
        options: Vec<String>,
        is_required: bool,
        sort_order: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            form_id,
            field_type,
            label,
            placeholder,
            options,
            is_required,
            sort_order,
        }
    }
}

/// Errors from field ordering operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("field {0} does not belong to this form")]
    UnknownField(Uuid),
    #[error("position {index} is outside 0..{len}")]
    OutOfRange { index: usize, len: usize },
}

/// Sorts fields by their stored order and renumbers them 0..N-1.
///
/// Ties keep their incoming relative order.
pub fn normalize_order(fields: &mut Vec<FormField>) {
    fields.sort_by_key(|f| f.sort_order);
    for (index, field) in fields.iter_mut().enumerate() {
        field.sort_order = index as i32;
    }
}

/// Moves `field_id` to position `to_index` and renumbers every field densely.
pub fn move_field(
    fields: &mut Vec<FormField>,
    field_id: Uuid,
    to_index: usize,
) -> Result<(), OrderError> {
    normalize_order(fields);
    let from = fields
        .iter()
        .position(|f| f.id == field_id)
        .ok_or(OrderError::UnknownField(field_id))?;
    if to_index >= fields.len() {
        return Err(OrderError::OutOfRange {
            index: to_index,
            len: fields.len(),
        });
    }
    let field = fields.remove(from);
    fields.insert(to_index, field);
    for (index, field) in fields.iter_mut().enumerate() {
        field.sort_order = index as i32;
    }
    Ok(())
}

/// Removes `field_id` and closes the gap it leaves.
pub fn remove_field(fields: &mut Vec<FormField>, field_id: Uuid) -> Result<FormField, OrderError> {
    normalize_order(fields);
    let index = fields
        .iter()
        .position(|f| f.id == field_id)
        .ok_or(OrderError::UnknownField(field_id))?;
    let removed = fields.remove(index);
    normalize_order(fields);
    Ok(removed)
}

/// Order value for a field appended after `fields`.
pub fn next_sort_order(fields: &[FormField]) -> i32 {
    fields.len() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(n: usize, form_id: Uuid) -> Vec<FormField> {
        (0..n)
            .map(|i| {
                FormField::new(
                    form_id,
                    FieldType::Text,
                    format!("Field {i}"),
                    String::new(),
                    vec![],
                    false,
                    i as i32,
                )
            })
            .collect()
    }

    fn assert_dense(fields: &[FormField]) {
        let orders: Vec<i32> = fields.iter().map(|f| f.sort_order).collect();
        let expected: Vec<i32> = (0..fields.len() as i32).collect();
        assert_eq!(orders, expected);
    }

    #[test]
    fn every_move_yields_dense_order() {
        let form_id = Uuid::new_v4();
        for n in 1..6 {
            for from in 0..n {
                for to in 0..n {
                    let mut list = fields(n, form_id);
                    let moved = list[from].id;
                    move_field(&mut list, moved, to).unwrap();
                    assert_dense(&list);
                    assert_eq!(list[to].id, moved);
                }
            }
        }
    }

    #[test]
    fn gaps_and_duplicates_are_repaired() {
        let form_id = Uuid::new_v4();
        let mut list = fields(4, form_id);
        list[0].sort_order = 7;
        list[1].sort_order = 3;
        list[2].sort_order = 3;
        list[3].sort_order = 10;
        let first = list[1].id;
        normalize_order(&mut list);
        assert_dense(&list);
        assert_eq!(list[0].id, first);
    }

    #[test]
    fn removal_closes_the_gap() {
        let form_id = Uuid::new_v4();
        let mut list = fields(4, form_id);
        let middle = list[1].id;
        let removed = remove_field(&mut list, middle).unwrap();
        assert_eq!(removed.id, middle);
        assert_eq!(list.len(), 3);
        assert_dense(&list);
    }

    #[test]
    fn bad_moves_are_rejected() {
        let form_id = Uuid::new_v4();
        let mut list = fields(2, form_id);
        assert_eq!(
            move_field(&mut list, Uuid::nil(), 0),
            Err(OrderError::UnknownField(Uuid::nil()))
        );
        let id = list[0].id;
        assert_eq!(
            move_field(&mut list, id, 2),
            Err(OrderError::OutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn share_url_trims_trailing_slash() {
        let form = Form::new(Uuid::new_v4(), "T".into(), String::new(), String::new());
        assert_eq!(
            form.share_url("https://testiflow.com/"),
            format!("https://testiflow.com/submit/{}", form.id)
        );
    }
}
