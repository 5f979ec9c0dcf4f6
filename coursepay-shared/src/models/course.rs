/// Course model (read-only catalog entry)
///
/// The checkout pipeline never writes courses. The `price` here is the
/// catalog price; orders snapshot their own `amount` at creation and never
/// look back at this value.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE courses (
///     id TEXT PRIMARY KEY,
///     title VARCHAR(255) NOT NULL,
///     instructor VARCHAR(255) NOT NULL,
///     price BIGINT NOT NULL CHECK (price >= 0),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Sellable course
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    /// Course id
    pub id: String,

    /// Course title, used as the payment line item title
    pub title: String,

    /// Instructor name
    pub instructor: String,

    /// Catalog price in cents
    pub price: i64,

    /// When the course was created
    pub created_at: DateTime<Utc>,

    /// When the course was last updated
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Builds a course value (used by seeding and tests)
    pub fn new(id: impl Into<String>, title: impl Into<String>, instructor: impl Into<String>, price: i64) -> Self {
        let now = Utc::now();
        Course {
            id: id.into(),
            title: title.into(),
            instructor: instructor.into(),
            price,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a catalog course
    pub async fn insert(pool: &PgPool, course: &Course) -> Result<Self, sqlx::Error> {
        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, title, instructor, price, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, title, instructor, price, created_at, updated_at
            "#,
        )
        .bind(&course.id)
        .bind(&course.title)
        .bind(&course.instructor)
        .bind(course.price)
        .bind(course.created_at)
        .bind(course.updated_at)
        .fetch_one(pool)
        .await?;

        Ok(course)
    }

    /// Finds a course by id
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let course = sqlx::query_as::<_, Course>(
            r#"
            SELECT id, title, instructor, price, created_at, updated_at
            FROM courses
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(course)
    }
}
