use crate::domain::{FieldType, Form, FormField, MediaPolicy};
use crate::infrastructure::{FormRepository, RepositoryError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresFormRepository {
    pool: PgPool,
}

impl PostgresFormRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FormRepository for PostgresFormRepository {
    async fn create(&self, form: &Form) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO testimonial_forms (id, user_id, title, description, thank_you_message, is_active,
                                           allow_image_uploads, allow_video_uploads,
                                           max_image_size_mb, max_video_size_mb, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(form.id)
        .bind(form.user_id)
        .bind(&form.title)
        .bind(&form.description)
        .bind(&form.thank_you_message)
        .bind(form.is_active)
        .bind(form.media.allow_image_uploads)
        .bind(form.media.allow_video_uploads)
        .bind(form.media.max_image_size_mb)
        .bind(form.media.max_video_size_mb)
        .bind(form.created_at)
        .bind(form.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Form, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, description, thank_you_message, is_active,
                   allow_image_uploads, allow_video_uploads, max_image_size_mb, max_video_size_mb,
                   created_at, updated_at
            FROM testimonial_forms
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, format!("Form {}", id)))?;

        row_to_form(&row)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Form>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, description, thank_you_message, is_active,
                   allow_image_uploads, allow_video_uploads, max_image_size_mb, max_video_size_mb,
                   created_at, updated_at
            FROM testimonial_forms
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_form).collect()
    }

    async fn update(&self, form: &Form) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE testimonial_forms
            SET title = $1, description = $2, thank_you_message = $3, is_active = $4,
                allow_image_uploads = $5, allow_video_uploads = $6,
                max_image_size_mb = $7, max_video_size_mb = $8, updated_at = $9
            WHERE id = $10
            "#,
        )
        .bind(&form.title)
        .bind(&form.description)
        .bind(&form.thank_you_message)
        .bind(form.is_active)
        .bind(form.media.allow_image_uploads)
        .bind(form.media.allow_video_uploads)
        .bind(form.media.max_image_size_mb)
        .bind(form.media.max_video_size_mb)
        .bind(Utc::now())
        .bind(form.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Form {}", form.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM testimonial_forms WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn count_by_user(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM testimonial_forms WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }

    async fn ids_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM testimonial_forms WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn list_fields(&self, form_id: Uuid) -> Result<Vec<FormField>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, form_id, field_type, label, placeholder, options, is_required, sort_order
            FROM form_fields
            WHERE form_id = $1
            ORDER BY sort_order ASC
            "#,
        )
        .bind(form_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_field).collect()
    }

    async fn create_field(&self, field: &FormField) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO form_fields (id, form_id, field_type, label, placeholder, options, is_required, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(field.id)
        .bind(field.form_id)
        .bind(field.field_type.to_string())
        .bind(&field.label)
        .bind(&field.placeholder)
        .bind(options_json(&field.options))
        .bind(field.is_required)
        .bind(field.sort_order)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_field(&self, field: &FormField) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE form_fields
            SET field_type = $1, label = $2, placeholder = $3, options = $4, is_required = $5
            WHERE id = $6
            "#,
        )
        .bind(field.field_type.to_string())
        .bind(&field.label)
        .bind(&field.placeholder)
        .bind(options_json(&field.options))
        .bind(field.is_required)
        .bind(field.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_field_and_reorder(
        &self,
        form_id: Uuid,
        field_id: Uuid,
        remaining: &[FormField],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM form_fields WHERE id = $1 AND form_id = $2")
            .bind(field_id)
            .bind(form_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Field {}", field_id)));
        }
        for field in remaining {
            sqlx::query("UPDATE form_fields SET sort_order = $1 WHERE id = $2 AND form_id = $3")
                .bind(field.sort_order)
                .bind(field.id)
                .bind(form_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn save_field_order(
        &self,
        form_id: Uuid,
        fields: &[FormField],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for field in fields {
            sqlx::query("UPDATE form_fields SET sort_order = $1 WHERE id = $2 AND form_id = $3")
                .bind(field.sort_order)
                .bind(field.id)
                .bind(form_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }
}

fn options_json(options: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        options
            .iter()
            .map(|o| serde_json::Value::String(o.clone()))
            .collect(),
    )
}

fn row_to_form(row: &sqlx::postgres::PgRow) -> Result<Form, RepositoryError> {
    Ok(Form {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        thank_you_message: row.try_get("thank_you_message")?,
        is_active: row.try_get("is_active")?,
        media: MediaPolicy {
            allow_image_uploads: row.try_get("allow_image_uploads")?,
            allow_video_uploads: row.try_get("allow_video_uploads")?,
            max_image_size_mb: row.try_get("max_image_size_mb")?,
            max_video_size_mb: row.try_get("max_video_size_mb")?,
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_field(row: &sqlx::postgres::PgRow) -> Result<FormField, RepositoryError> {
    let field_type: String = row.try_get("field_type")?;
    let options_json: serde_json::Value = row.try_get("options")?;
    let options: Vec<String> = serde_json::from_value(options_json).map_err(|e| {
        RepositoryError::InvalidData(format!("Failed to deserialize field options: {}", e))
    })?;

    Ok(FormField {
        id: row.try_get("id")?,
        form_id: row.try_get("form_id")?,
        field_type: FieldType::from_str(&field_type).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown field type: {}", field_type))
        })?,
        label: row.try_get("label")?,
        placeholder: row.try_get("placeholder")?,
        options,
        is_required: row.try_get("is_required")?,
        sort_order: row.try_get("sort_order")?,
    })
}
