use crate::domain::{
    Branding, Customer, Form, FormField, FormResponse, Order, Subscription, SubscriptionStatus,
    SubscriptionSync, Tag, Testimonial, TestimonialStatus,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl RepositoryError {
    /// Maps `RowNotFound` to `NotFound(what)` and unique violations to `Conflict(what)`.
    pub fn from_sqlx(e: sqlx::Error, what: impl Into<String>) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(what.into()),
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepositoryError::Conflict(what.into())
            }
            _ => RepositoryError::DatabaseError(e),
        }
    }
}

/// Customer, subscription and order rows written by the billing webhook.
#[async_trait]
pub trait BillingRepository: Send + Sync {
    #[must_use]
    async fn get_customer_by_user(&self, user_id: Uuid)
        -> Result<Option<Customer>, RepositoryError>;
    #[must_use]
    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, RepositoryError>;
    /// Links `customer_id` to `user_id`; an existing link for the customer is overwritten.
    #[must_use]
    async fn upsert_customer(&self, customer_id: &str, user_id: Uuid)
        -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError>;
    /// Full sync keyed by customer id.
    #[must_use]
    async fn upsert_subscription(&self, sync: &SubscriptionSync) -> Result<(), RepositoryError>;
    /// Changes only the status, creating a bare row if the customer has none.
    #[must_use]
    async fn set_subscription_status(
        &self,
        customer_id: &str,
        status: &SubscriptionStatus,
    ) -> Result<(), RepositoryError>;
    #[must_use]
    async fn insert_order(&self, order: &Order) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait FormRepository: Send + Sync {
    #[must_use]
    async fn create(&self, form: &Form) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Form, RepositoryError>;
    #[must_use]
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Form>, RepositoryError>;
    #[must_use]
    async fn update(&self, form: &Form) -> Result<(), RepositoryError>;
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Uses `COUNT(*)` rather than loading rows.
    #[must_use]
    async fn count_by_user(&self, user_id: Uuid) -> Result<u64, RepositoryError>;
    #[must_use]
    async fn ids_by_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, RepositoryError>;

    /// Fields ordered by `sort_order`.
    #[must_use]
    async fn list_fields(&self, form_id: Uuid) -> Result<Vec<FormField>, RepositoryError>;
    #[must_use]
    async fn create_field(&self, field: &FormField) -> Result<(), RepositoryError>;
    #[must_use]
    async fn update_field(&self, field: &FormField) -> Result<(), RepositoryError>;
    /// Deletes one field and rewrites the `sort_order` of `remaining` in the
    /// same transaction.
    #[must_use]
    async fn delete_field_and_reorder(
        &self,
        form_id: Uuid,
        field_id: Uuid,
        remaining: &[FormField],
    ) -> Result<(), RepositoryError>;
    /// Writes every field's `sort_order` in one transaction.
    #[must_use]
    async fn save_field_order(
        &self,
        form_id: Uuid,
        fields: &[FormField],
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TestimonialRepository: Send + Sync {
    #[must_use]
    async fn create(&self, testimonial: &Testimonial) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Testimonial, RepositoryError>;
    /// Newest first.
    #[must_use]
    async fn list_by_forms(
        &self,
        form_ids: &[Uuid],
        status: Option<TestimonialStatus>,
    ) -> Result<Vec<Testimonial>, RepositoryError>;
    #[must_use]
    async fn count_by_forms(&self, form_ids: &[Uuid]) -> Result<u64, RepositoryError>;
    #[must_use]
    async fn update_status(
        &self,
        id: Uuid,
        status: TestimonialStatus,
    ) -> Result<(), RepositoryError>;
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
    #[must_use]
    async fn insert_responses(&self, responses: &[FormResponse]) -> Result<(), RepositoryError>;
    #[must_use]
    async fn responses_for(
        &self,
        testimonial_ids: &[Uuid],
    ) -> Result<Vec<FormResponse>, RepositoryError>;
}

#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Fails with `Conflict` when the user already has a tag with that name.
    #[must_use]
    async fn create(&self, tag: &Tag) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Tag, RepositoryError>;
    #[must_use]
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Tag>, RepositoryError>;
    #[must_use]
    async fn update(&self, tag: &Tag) -> Result<(), RepositoryError>;
    #[must_use]
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// Assigning an already assigned tag is a no-op.
    #[must_use]
    async fn assign(&self, testimonial_id: Uuid, tag_id: Uuid) -> Result<(), RepositoryError>;
    #[must_use]
    async fn unassign(&self, testimonial_id: Uuid, tag_id: Uuid) -> Result<(), RepositoryError>;
    #[must_use]
    async fn tags_for_testimonial(&self, testimonial_id: Uuid)
        -> Result<Vec<Tag>, RepositoryError>;
}

#[async_trait]
pub trait BrandingRepository: Send + Sync {
    #[must_use]
    async fn get_by_user(&self, user_id: Uuid) -> Result<Option<Branding>, RepositoryError>;
    #[must_use]
    async fn upsert(&self, branding: &Branding) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = RepositoryError::from_sqlx(sqlx::Error::RowNotFound, "Form 1");
        assert!(matches!(err, RepositoryError::NotFound(ref what) if what == "Form 1"));
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let err = RepositoryError::from_sqlx(sqlx::Error::PoolTimedOut, "Form 1");
        assert!(matches!(err, RepositoryError::DatabaseError(_)));
    }
}
