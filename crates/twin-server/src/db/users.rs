//! Local user rows keyed by the identity provider's subject

use async_trait::async_trait;
use sqlx::PgPool;

use super::DbResult;
use crate::auth::Identity;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Return the local id for `identity`, creating the row on first sight.
    async fn find_or_create(&self, identity: &Identity) -> DbResult<i64>;
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[tracing::instrument(skip(self, identity), fields(subject = %identity.subject))]
    async fn find_or_create(&self, identity: &Identity) -> DbResult<i64> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (subject, roles)
            VALUES ($1, $2)
            ON CONFLICT (subject) DO UPDATE SET roles = EXCLUDED.roles, updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&identity.subject)
        .bind(&identity.roles)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }
}
