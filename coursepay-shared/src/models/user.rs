/// Buyer model and database operations
///
/// A user is the buyer behind an order. Its `id` is the stable identity issued
/// by the external auth provider, so rows are created on the first purchase
/// rather than at sign-up and are never deleted by the checkout pipeline.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id TEXT PRIMARY KEY,
///     email VARCHAR(320) NOT NULL,
///     name VARCHAR(255) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use coursepay_shared::models::user::{CreateUser, User};
/// use coursepay_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     id: "auth0|42".to_string(),
///     email: "buyer@example.com".to_string(),
///     name: "Ana".to_string(),
/// }).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Buyer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// External identity (primary key)
    pub id: String,

    /// Contact address used for order notifications
    pub email: String,

    /// Display name
    pub name: String,

    /// When the row was created
    pub created_at: DateTime<Utc>,

    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a buyer on first purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// External identity
    pub id: String,

    /// Email address
    pub email: String,

    /// Display name
    pub name: String,
}

impl User {
    /// Builds an unsaved user with fresh timestamps
    pub fn new(data: CreateUser) -> Self {
        let now = Utc::now();
        User {
            id: data.id,
            email: data.email,
            name: data.name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Inserts a user
    ///
    /// # Errors
    ///
    /// Returns a database error with a unique-violation code if a user with
    /// the same id already exists. Callers performing upsert-on-miss treat
    /// that as "already exists" and re-read.
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            RETURNING id, email, name, created_at, updated_at
            "#,
        )
        .bind(data.id)
        .bind(data.email)
        .bind(data.name)
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by id
    pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
