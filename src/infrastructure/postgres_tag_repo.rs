use crate::domain::{Branding, Tag};
use crate::infrastructure::{BrandingRepository, RepositoryError, TagRepository};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresTagRepository {
    pool: PgPool,
}

impl PostgresTagRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TagRepository for PostgresTagRepository {
    async fn create(&self, tag: &Tag) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO testimonial_tags (id, user_id, name, color, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(tag.id)
        .bind(tag.user_id)
        .bind(&tag.name)
        .bind(&tag.color)
        .bind(tag.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, format!("Tag {}", tag.name)))?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Tag, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, name, color, created_at
            FROM testimonial_tags
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, format!("Tag {}", id)))?;

        row_to_tag(&row)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Tag>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, name, color, created_at
            FROM testimonial_tags
            WHERE user_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_tag).collect()
    }

    async fn update(&self, tag: &Tag) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE testimonial_tags SET name = $1, color = $2 WHERE id = $3")
            .bind(&tag.name)
            .bind(&tag.color)
            .bind(tag.id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::from_sqlx(e, format!("Tag {}", tag.name)))?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM testimonial_tags WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn assign(&self, testimonial_id: Uuid, tag_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO testimonial_tag_assignments (testimonial_id, tag_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (testimonial_id, tag_id) DO NOTHING
            "#,
        )
        .bind(testimonial_id)
        .bind(tag_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn unassign(&self, testimonial_id: Uuid, tag_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            "DELETE FROM testimonial_tag_assignments WHERE testimonial_id = $1 AND tag_id = $2",
        )
        .bind(testimonial_id)
        .bind(tag_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn tags_for_testimonial(
        &self,
        testimonial_id: Uuid,
    ) -> Result<Vec<Tag>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.user_id, t.name, t.color, t.created_at
            FROM testimonial_tags t
            JOIN testimonial_tag_assignments a ON a.tag_id = t.id
            WHERE a.testimonial_id = $1
            ORDER BY t.name ASC
            "#,
        )
        .bind(testimonial_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_tag).collect()
    }
}

fn row_to_tag(row: &sqlx::postgres::PgRow) -> Result<Tag, RepositoryError> {
    Ok(Tag {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        color: row.try_get("color")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresBrandingRepository {
    pool: PgPool,
}

impl PostgresBrandingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BrandingRepository for PostgresBrandingRepository {
    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Branding>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, logo_url, primary_color, secondary_color, font_family, updated_at
            FROM form_branding
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(Branding {
                user_id: r.try_get("user_id")?,
                logo_url: r.try_get("logo_url")?,
                primary_color: r.try_get("primary_color")?,
                secondary_color: r.try_get("secondary_color")?,
                font_family: r.try_get("font_family")?,
                updated_at: r.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn upsert(&self, branding: &Branding) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO form_branding (user_id, logo_url, primary_color, secondary_color, font_family, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE SET
                logo_url = EXCLUDED.logo_url,
                primary_color = EXCLUDED.primary_color,
                secondary_color = EXCLUDED.secondary_color,
                font_family = EXCLUDED.font_family,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(branding.user_id)
        .bind(&branding.logo_url)
        .bind(&branding.primary_color)
        .bind(&branding.secondary_color)
        .bind(&branding.font_family)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
