/// Datastore port
///
/// The services talk to persistence through the [`Datastore`] trait. Every
/// operation is a single-row atomic read or write; correctness under
/// concurrent, multi-process webhook handling rests on two datastore
/// guarantees rather than in-process locks:
///
/// - the order status write is a compare-and-set on `status = pending`
/// - duplicate users and enrollments are rejected with
///   [`StoreError::UniqueViolation`], reported distinctly from other failures
///
/// # Implementations
///
/// - [`postgres::PgStore`]: production store over a sqlx `PgPool`
/// - [`memory::InMemoryStore`]: same constraint semantics, for tests and demos

pub mod memory;
pub mod postgres;

use crate::models::{Course, Enrollment, EnrollmentKey, Order, OrderStatus, User};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// PostgreSQL SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Datastore errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with a primary key or unique constraint
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Any other storage failure (connection, timeout, constraint, ...)
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::UniqueViolation(constraint);
            }
        }
        StoreError::Database(err.to_string())
    }
}

/// Datastore result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations consumed by the checkout pipeline
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Verifies the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Loads a course by id
    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>>;

    /// Loads a user by id
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;

    /// Inserts a user; a duplicate id is a [`StoreError::UniqueViolation`]
    async fn insert_user(&self, user: User) -> StoreResult<User>;

    /// Inserts a new order
    async fn insert_order(&self, order: Order) -> StoreResult<Order>;

    /// Loads an order by id
    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>>;

    /// Stores the gateway intent reference if none is recorded yet
    async fn attach_gateway_reference(&self, id: Uuid, reference: &str) -> StoreResult<Option<Order>>;

    /// Sets `status` and the payment reference only if the order is pending
    ///
    /// Returns the updated order, or `None` when the guard did not match
    /// (order missing or already terminal).
    async fn transition_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_reference: &str,
    ) -> StoreResult<Option<Order>>;

    /// Loads an enrollment by its deduplication key
    async fn find_enrollment(&self, key: &EnrollmentKey) -> StoreResult<Option<Enrollment>>;

    /// Inserts an enrollment; a duplicate key is a [`StoreError::UniqueViolation`]
    async fn insert_enrollment(&self, enrollment: Enrollment) -> StoreResult<Enrollment>;

    /// Approved orders that have no enrollment yet, oldest first
    async fn list_approved_without_enrollment(&self, limit: usize) -> StoreResult<Vec<Order>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::UniqueViolation("users_pkey".to_string());
        assert_eq!(err.to_string(), "Unique constraint violated: users_pkey");

        let err = StoreError::Database("connection reset".to_string());
        assert_eq!(err.to_string(), "Database error: connection reset");
    }

    #[test]
    fn test_row_not_found_is_database_error() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
