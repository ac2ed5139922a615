use crate::domain::{Customer, Order, Subscription, SubscriptionStatus, SubscriptionSync};
use crate::infrastructure::{BillingRepository, RepositoryError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresBillingRepository {
    pool: PgPool,
}

impl PostgresBillingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn get_customer_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, user_id, created_at
            FROM stripe_customers
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_customer(&r)?)),
            None => Ok(None),
        }
    }

    async fn get_customer(&self, customer_id: &str) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, user_id, created_at
            FROM stripe_customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_customer(&r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_customer(
        &self,
        customer_id: &str,
        user_id: Uuid,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO stripe_customers (customer_id, user_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE SET user_id = EXCLUDED.user_id
            "#,
        )
        .bind(customer_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_subscription(
        &self,
        customer_id: &str,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT customer_id, subscription_id, price_id, status,
                   current_period_start, current_period_end, cancel_at_period_end,
                   payment_method_brand, payment_method_last4, past_due_since, updated_at
            FROM stripe_subscriptions
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_subscription(&r)?)),
            None => Ok(None),
        }
    }

    async fn upsert_subscription(&self, sync: &SubscriptionSync) -> Result<(), RepositoryError> {
        // past_due_since keeps the first time the row entered past_due.
        sqlx::query(
            r#"
            INSERT INTO stripe_subscriptions (
                customer_id, subscription_id, price_id, status,
                current_period_start, current_period_end, cancel_at_period_end,
                payment_method_brand, payment_method_last4, past_due_since, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                    CASE WHEN $4 = 'past_due' THEN $10 ELSE NULL END, $10)
            ON CONFLICT (customer_id) DO UPDATE SET
                subscription_id = EXCLUDED.subscription_id,
                price_id = EXCLUDED.price_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                payment_method_brand = EXCLUDED.payment_method_brand,
                payment_method_last4 = EXCLUDED.payment_method_last4,
                past_due_since = CASE
                    WHEN EXCLUDED.status = 'past_due'
                        THEN COALESCE(stripe_subscriptions.past_due_since, EXCLUDED.updated_at)
                    ELSE NULL
                END,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&sync.customer_id)
        .bind(&sync.subscription_id)
        .bind(&sync.price_id)
        .bind(sync.status.as_str())
        .bind(sync.current_period_start)
        .bind(sync.current_period_end)
        .bind(sync.cancel_at_period_end)
        .bind(&sync.payment_method_brand)
        .bind(&sync.payment_method_last4)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_subscription_status(
        &self,
        customer_id: &str,
        status: &SubscriptionStatus,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO stripe_subscriptions (customer_id, status, past_due_since, updated_at)
            VALUES ($1, $2, CASE WHEN $2 = 'past_due' THEN $3 ELSE NULL END, $3)
            ON CONFLICT (customer_id) DO UPDATE SET
                status = EXCLUDED.status,
                past_due_since = CASE
                    WHEN EXCLUDED.status = 'past_due'
                        THEN COALESCE(stripe_subscriptions.past_due_since, EXCLUDED.updated_at)
                    ELSE NULL
                END,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(customer_id)
        .bind(status.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO stripe_orders (
                checkout_session_id, payment_intent_id, customer_id,
                amount_subtotal, amount_total, currency, payment_status, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (checkout_session_id) DO NOTHING
            "#,
        )
        .bind(&order.checkout_session_id)
        .bind(&order.payment_intent_id)
        .bind(&order.customer_id)
        .bind(order.amount_subtotal)
        .bind(order.amount_total)
        .bind(&order.currency)
        .bind(&order.payment_status)
        .bind(&order.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_customer(row: &sqlx::postgres::PgRow) -> Result<Customer, RepositoryError> {
    Ok(Customer {
        customer_id: row.try_get("customer_id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Result<Subscription, RepositoryError> {
    let status: String = row.try_get("status")?;

    Ok(Subscription {
        customer_id: row.try_get("customer_id")?,
        subscription_id: row.try_get("subscription_id")?,
        price_id: row.try_get("price_id")?,
        status: SubscriptionStatus::parse(&status),
        current_period_start: row.try_get("current_period_start")?,
        current_period_end: row.try_get("current_period_end")?,
        cancel_at_period_end: row.try_get("cancel_at_period_end")?,
        payment_method_brand: row.try_get("payment_method_brand")?,
        payment_method_last4: row.try_get("payment_method_last4")?,
        past_due_since: row.try_get("past_due_since")?,
        updated_at: row.try_get("updated_at")?,
    })
}
