/// Enrollment model and database operations
///
/// An enrollment grants a buyer access to a course. It is created once per
/// approved order; the `(user_id, course_id, order_id)` unique constraint is
/// what actually guarantees "once", the existence lookup is only a fast path.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE enrollment_status AS ENUM ('active', 'inactive', 'completed');
///
/// CREATE TABLE enrollments (
///     id UUID PRIMARY KEY,
///     user_id TEXT NOT NULL REFERENCES users(id),
///     course_id TEXT NOT NULL REFERENCES courses(id),
///     order_id UUID NOT NULL REFERENCES orders(id),
///     status enrollment_status NOT NULL DEFAULT 'active',
///     progress SMALLINT NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
///     enrolled_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     completed_at TIMESTAMPTZ,
///     CONSTRAINT enrollments_user_course_order_key UNIQUE (user_id, course_id, order_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// Access granted
    Active,

    /// Access suspended
    Inactive,

    /// Course finished
    Completed,
}

/// Identity of an enrollment, the deduplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnrollmentKey {
    /// Buyer id
    pub user_id: String,

    /// Course id
    pub course_id: String,

    /// Order that paid for the access
    pub order_id: Uuid,
}

/// Enrollment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    /// Enrollment id
    pub id: Uuid,

    /// Buyer id
    pub user_id: String,

    /// Course id
    pub course_id: String,

    /// Paying order
    pub order_id: Uuid,

    /// Access status
    pub status: EnrollmentStatus,

    /// Progress percentage, 0 to 100
    pub progress: i16,

    /// When access was granted
    pub enrolled_at: DateTime<Utc>,

    /// When the course was completed
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Builds a fresh active enrollment at zero progress
    pub fn new(key: EnrollmentKey) -> Self {
        Enrollment {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            course_id: key.course_id,
            order_id: key.order_id,
            status: EnrollmentStatus::Active,
            progress: 0,
            enrolled_at: Utc::now(),
            completed_at: None,
        }
    }

    /// The deduplication key of this enrollment
    pub fn key(&self) -> EnrollmentKey {
        EnrollmentKey {
            user_id: self.user_id.clone(),
            course_id: self.course_id.clone(),
            order_id: self.order_id,
        }
    }

    /// Inserts an enrollment
    ///
    /// # Errors
    ///
    /// A duplicate `(user_id, course_id, order_id)` surfaces as a database
    /// error carrying the `enrollments_user_course_order_key` constraint.
    pub async fn insert(pool: &PgPool, enrollment: &Enrollment) -> Result<Self, sqlx::Error> {
        let row = sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (id, user_id, course_id, order_id, status, progress, enrolled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, course_id, order_id, status, progress, enrolled_at, completed_at
            "#,
        )
        .bind(enrollment.id)
        .bind(&enrollment.user_id)
        .bind(&enrollment.course_id)
        .bind(enrollment.order_id)
        .bind(enrollment.status)
        .bind(enrollment.progress)
        .bind(enrollment.enrolled_at)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }

    /// Finds an enrollment by its deduplication key
    pub async fn find_by_key(pool: &PgPool, key: &EnrollmentKey) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT id, user_id, course_id, order_id, status, progress, enrolled_at, completed_at
            FROM enrollments
            WHERE user_id = $1 AND course_id = $2 AND order_id = $3
            "#,
        )
        .bind(&key.user_id)
        .bind(&key.course_id)
        .bind(key.order_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Counts enrollments created for an order
    pub async fn count_by_order(pool: &PgPool, order_id: Uuid) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }
}
