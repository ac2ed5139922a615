use crate::domain::{FormResponse, Testimonial, TestimonialStatus};
use crate::infrastructure::{RepositoryError, TestimonialRepository};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

pub struct PostgresTestimonialRepository {
    pool: PgPool,
}

impl PostgresTestimonialRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestimonialRepository for PostgresTestimonialRepository {
    async fn create(&self, testimonial: &Testimonial) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO testimonials (id, form_id, name, email, company, message, rating, status,
                                      image_url, video_url, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(testimonial.id)
        .bind(testimonial.form_id)
        .bind(&testimonial.name)
        .bind(&testimonial.email)
        .bind(&testimonial.company)
        .bind(&testimonial.message)
        .bind(testimonial.rating)
        .bind(testimonial.status.to_string())
        .bind(&testimonial.image_url)
        .bind(&testimonial.video_url)
        .bind(testimonial.submitted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Testimonial, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, form_id, name, email, company, message, rating, status,
                   image_url, video_url, submitted_at
            FROM testimonials
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_sqlx(e, format!("Testimonial {}", id)))?;

        row_to_testimonial(&row)
    }

    async fn list_by_forms(
        &self,
        form_ids: &[Uuid],
        status: Option<TestimonialStatus>,
    ) -> Result<Vec<Testimonial>, RepositoryError> {
        if form_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, form_id, name, email, company, message, rating, status,
                   image_url, video_url, submitted_at
            FROM testimonials
            WHERE form_id = ANY($1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY submitted_at DESC
            "#,
        )
        .bind(form_ids)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_testimonial).collect()
    }

    async fn count_by_forms(&self, form_ids: &[Uuid]) -> Result<u64, RepositoryError> {
        if form_ids.is_empty() {
            return Ok(0);
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM testimonials WHERE form_id = ANY($1)")
            .bind(form_ids)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TestimonialStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE testimonials SET status = $1 WHERE id = $2")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Testimonial {}", id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM testimonials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn insert_responses(&self, responses: &[FormResponse]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for response in responses {
            sqlx::query(
                r#"
                INSERT INTO form_responses (id, testimonial_id, field_id, value)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(response.id)
            .bind(response.testimonial_id)
            .bind(response.field_id)
            .bind(&response.value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn responses_for(
        &self,
        testimonial_ids: &[Uuid],
    ) -> Result<Vec<FormResponse>, RepositoryError> {
        if testimonial_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, testimonial_id, field_id, value
            FROM form_responses
            WHERE testimonial_id = ANY($1)
            "#,
        )
        .bind(testimonial_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(FormResponse {
                    id: row.try_get("id")?,
                    testimonial_id: row.try_get("testimonial_id")?,
                    field_id: row.try_get("field_id")?,
                    value: row.try_get("value")?,
                })
            })
            .collect()
    }
}

fn row_to_testimonial(row: &sqlx::postgres::PgRow) -> Result<Testimonial, RepositoryError> {
    let status: String = row.try_get("status")?;

    Ok(Testimonial {
        id: row.try_get("id")?,
        form_id: row.try_get("form_id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        company: row.try_get("company")?,
        message: row.try_get("message")?,
        rating: row.try_get("rating")?,
        status: TestimonialStatus::from_str(&status)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown status: {}", status)))?,
        image_url: row.try_get("image_url")?,
        video_url: row.try_get("video_url")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}
