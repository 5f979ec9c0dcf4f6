/// PostgreSQL datastore
///
/// Thin adapter from the [`Datastore`] port onto the model queries. All
/// atomicity comes from the SQL itself: the guarded `UPDATE ... WHERE status
/// = 'pending'` and the primary key / unique constraints.

use super::{Datastore, StoreResult};
use crate::db::pool::health_check;
use crate::models::{Course, Enrollment, EnrollmentKey, Order, OrderStatus, User};
use crate::models::user::CreateUser;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Datastore backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Datastore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        health_check(&self.pool).await?;
        Ok(())
    }

    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(Course::find_by_id(&self.pool, id).await?)
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let data = CreateUser {
            id: user.id,
            email: user.email,
            name: user.name,
        };
        Ok(User::create(&self.pool, data).await?)
    }

    async fn insert_order(&self, order: Order) -> StoreResult<Order> {
        Ok(Order::insert(&self.pool, &order).await?)
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(Order::find_by_id(&self.pool, id).await?)
    }

    async fn attach_gateway_reference(&self, id: Uuid, reference: &str) -> StoreResult<Option<Order>> {
        Ok(Order::attach_gateway_reference(&self.pool, id, reference).await?)
    }

    async fn transition_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_reference: &str,
    ) -> StoreResult<Option<Order>> {
        Ok(Order::transition_from_pending(&self.pool, id, status, payment_reference).await?)
    }

    async fn find_enrollment(&self, key: &EnrollmentKey) -> StoreResult<Option<Enrollment>> {
        Ok(Enrollment::find_by_key(&self.pool, key).await?)
    }

    async fn insert_enrollment(&self, enrollment: Enrollment) -> StoreResult<Enrollment> {
        Ok(Enrollment::insert(&self.pool, &enrollment).await?)
    }

    async fn list_approved_without_enrollment(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Ok(Order::list_approved_without_enrollment(&self.pool, limit).await?)
    }
}
