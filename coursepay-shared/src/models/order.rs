/// Order model and database operations
///
/// An order is the transactional record of one checkout attempt and the
/// aggregate root of the payment pipeline.
///
/// # State Machine
///
/// ```text
/// pending → approved
/// pending → rejected
/// pending → cancelled
/// ```
///
/// Terminal states never move again. The only status write that touches the
/// database is a compare-and-set guarded by `status = 'pending'`, so two
/// concurrent webhook deliveries cannot both move the same order.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE payment_method AS ENUM ('pix', 'credit_card', 'boleto');
/// CREATE TYPE order_status AS ENUM ('pending', 'approved', 'rejected', 'cancelled');
///
/// CREATE TABLE orders (
///     id UUID PRIMARY KEY,
///     user_id TEXT NOT NULL REFERENCES users(id),
///     course_id TEXT NOT NULL REFERENCES courses(id),
///     amount BIGINT NOT NULL CHECK (amount > 0),
///     payment_method payment_method NOT NULL,
///     status order_status NOT NULL DEFAULT 'pending',
///     gateway_payment_reference VARCHAR(255),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use coursepay_shared::models::order::{CreateOrder, Order, OrderStatus, PaymentMethod};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool) -> Result<(), sqlx::Error> {
/// let order = Order::create(&pool, CreateOrder {
///     user_id: "u1".to_string(),
///     course_id: "c1".to_string(),
///     amount: 19990,
///     payment_method: PaymentMethod::Pix,
/// }).await?;
///
/// // Only succeeds while the order is still pending
/// let moved = Order::transition_from_pending(&pool, order.id, OrderStatus::Approved, "123").await?;
/// assert!(moved.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

/// Payment method chosen at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Instant bank transfer
    Pix,

    /// Credit card, installments allowed
    CreditCard,

    /// Bank slip
    Boleto,
}

impl PaymentMethod {
    /// Converts to the stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::Boleto => "boleto",
        }
    }

    /// Maximum installment count offered on the hosted checkout
    pub fn max_installments(&self) -> u8 {
        match self {
            PaymentMethod::CreditCard => 12,
            PaymentMethod::Pix | PaymentMethod::Boleto => 1,
        }
    }

    /// Buyer-facing label used in emails
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "PIX",
            PaymentMethod::CreditCard => "Cartão de Crédito",
            PaymentMethod::Boleto => "Boleto Bancário",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Waiting for the gateway to settle
    Pending,

    /// Payment confirmed, enrollment granted
    Approved,

    /// Payment refused or cancelled at the gateway
    Rejected,

    /// Cancelled by an explicit cancel path
    Cancelled,
}

impl OrderStatus {
    /// Converts status to string for storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Checks if status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }

    /// Whether an order in this status still takes status writes
    ///
    /// A pending order accepts any status (including pending, which only
    /// refreshes the gateway reference). Terminal orders accept nothing.
    pub fn accepts_status_write(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    /// Order id, also used as the gateway correlation reference
    pub id: Uuid,

    /// Buyer
    pub user_id: String,

    /// Purchased course
    pub course_id: String,

    /// Amount in cents, snapshotted at creation
    pub amount: i64,

    /// Payment method chosen by the buyer
    pub payment_method: PaymentMethod,

    /// Current status
    pub status: OrderStatus,

    /// Gateway preference id after checkout, payment id after reconciliation
    pub gateway_payment_reference: Option<String>,

    /// When the order was created
    pub created_at: DateTime<Utc>,

    /// When the order was last updated
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    /// Buyer id
    pub user_id: String,

    /// Course id
    pub course_id: String,

    /// Amount in cents, taken from the checkout request as-is
    pub amount: i64,

    /// Payment method
    pub payment_method: PaymentMethod,
}

const ORDER_COLUMNS: &str = "id, user_id, course_id, amount, payment_method, status, \
                             gateway_payment_reference, created_at, updated_at";

impl Order {
    /// Builds a new pending order with a freshly generated id
    pub fn new(data: CreateOrder) -> Self {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            course_id: data.course_id,
            amount: data.amount,
            payment_method: data.payment_method,
            status: OrderStatus::Pending,
            gateway_payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Short buyer-facing order number (last 8 id characters, upper-cased)
    pub fn display_number(&self) -> String {
        let simple = self.id.simple().to_string();
        simple[simple.len() - 8..].to_uppercase()
    }

    /// Inserts a new order in pending state
    pub async fn create(pool: &PgPool, data: CreateOrder) -> Result<Self, sqlx::Error> {
        Self::insert(pool, &Order::new(data)).await
    }

    /// Inserts a fully built order row
    pub async fn insert(pool: &PgPool, order: &Order) -> Result<Self, sqlx::Error> {
        let query = format!(
            r#"
            INSERT INTO orders (id, user_id, course_id, amount, payment_method, status,
                                gateway_payment_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let order = sqlx::query_as::<_, Order>(&query)
            .bind(order.id)
            .bind(&order.user_id)
            .bind(&order.course_id)
            .bind(order.amount)
            .bind(order.payment_method)
            .bind(order.status)
            .bind(&order.gateway_payment_reference)
            .bind(order.created_at)
            .bind(order.updated_at)
            .fetch_one(pool)
            .await?;

        Ok(order)
    }

    /// Finds an order by id
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");

        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(order)
    }

    /// Records the gateway intent reference after checkout
    ///
    /// Does nothing if a reference is already present, so a webhook that
    /// raced ahead of checkout keeps its payment id.
    pub async fn attach_gateway_reference(
        pool: &PgPool,
        id: Uuid,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE orders
            SET gateway_payment_reference = $2,
                updated_at = NOW()
            WHERE id = $1 AND gateway_payment_reference IS NULL
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .bind(reference)
            .fetch_optional(pool)
            .await?;

        Ok(order)
    }

    /// Compare-and-set status write guarded by `status = 'pending'`
    ///
    /// Returns the updated row, or `None` if the order does not exist or has
    /// already left pending.
    pub async fn transition_from_pending(
        pool: &PgPool,
        id: Uuid,
        status: OrderStatus,
        payment_reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            r#"
            UPDATE orders
            SET status = $2,
                gateway_payment_reference = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ORDER_COLUMNS}
            "#
        );

        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .bind(status)
            .bind(payment_reference)
            .fetch_optional(pool)
            .await?;

        Ok(order)
    }

    /// Lists approved orders that have no enrollment, oldest first
    pub async fn list_approved_without_enrollment(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM orders o
            WHERE o.status = 'approved'
              AND NOT EXISTS (
                  SELECT 1 FROM enrollments e
                  WHERE e.order_id = o.id
                    AND e.user_id = o.user_id
                    AND e.course_id = o.course_id
              )
            ORDER BY o.updated_at ASC
            LIMIT $1
            "#
        );

        let orders = sqlx::query_as::<_, Order>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await?;

        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new(CreateOrder {
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            amount: 19990,
            payment_method: PaymentMethod::Pix,
        })
    }

    #[test]
    fn test_order_status_as_str() {
        assert_eq!(OrderStatus::Pending.as_str(), "pending");
        assert_eq!(OrderStatus::Approved.as_str(), "approved");
        assert_eq!(OrderStatus::Rejected.as_str(), "rejected");
        assert_eq!(OrderStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn test_order_status_is_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Approved.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_only_pending_accepts_status_writes() {
        assert!(OrderStatus::Pending.accepts_status_write());

        assert!(!OrderStatus::Approved.accepts_status_write());
        assert!(!OrderStatus::Rejected.accepts_status_write());
        assert!(!OrderStatus::Cancelled.accepts_status_write());
    }

    #[test]
    fn test_payment_method_installments() {
        assert_eq!(PaymentMethod::CreditCard.max_installments(), 12);
        assert_eq!(PaymentMethod::Pix.max_installments(), 1);
        assert_eq!(PaymentMethod::Boleto.max_installments(), 1);
    }

    #[test]
    fn test_payment_method_serde() {
        let method: PaymentMethod = serde_json::from_str("\"credit_card\"").unwrap();
        assert_eq!(method, PaymentMethod::CreditCard);
        assert!(serde_json::from_str::<PaymentMethod>("\"cash\"").is_err());
    }

    #[test]
    fn test_new_order_is_pending_without_reference() {
        let order = sample_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.amount, 19990);
        assert!(order.gateway_payment_reference.is_none());
    }

    #[test]
    fn test_display_number() {
        let mut order = sample_order();
        order.id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440abc").unwrap();
        assert_eq!(order.display_number(), "55440ABC");
    }
}
