/// In-memory datastore
///
/// Mirrors the PostgreSQL constraint semantics the services depend on:
///
/// - users are keyed by id; a second insert is a unique violation
/// - enrollments are unique per `(user_id, course_id, order_id)`
/// - the order status write is a compare-and-set performed under the
///   orders write lock
///
/// Also exposes fault switches so tests can simulate datastore outages.
///
/// # Example
///
/// ```
/// use coursepay_shared::models::Course;
/// use coursepay_shared::store::{Datastore, InMemoryStore};
///
/// # async fn example() {
/// let store = InMemoryStore::new();
/// store.put_course(Course::new("c1", "Rust", "Ferris", 19990)).await;
/// assert!(store.find_course("c1").await.unwrap().is_some());
/// # }
/// ```

use super::{Datastore, StoreError, StoreResult};
use crate::models::{Course, Enrollment, EnrollmentKey, Order, OrderStatus, User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Faults {
    writes: AtomicBool,
    enrollment_inserts: AtomicBool,
    enrollment_users: RwLock<HashSet<String>>,
}

/// Thread-safe in-memory store, cheap to clone
#[derive(Default, Clone)]
pub struct InMemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    courses: Arc<RwLock<HashMap<String, Course>>>,
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    enrollments: Arc<RwLock<HashMap<EnrollmentKey, Enrollment>>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog course
    pub async fn put_course(&self, course: Course) {
        self.courses.write().await.insert(course.id.clone(), course);
    }

    /// Changes a course's catalog price
    pub async fn set_course_price(&self, id: &str, price: i64) {
        if let Some(course) = self.courses.write().await.get_mut(id) {
            course.price = price;
            course.updated_at = Utc::now();
        }
    }

    /// Adds or replaces an order row as-is
    pub async fn put_order(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }

    /// Snapshot of all orders
    pub async fn orders(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }

    /// Snapshot of all users
    pub async fn users(&self) -> Vec<User> {
        self.users.read().await.values().cloned().collect()
    }

    /// Snapshot of all enrollments
    pub async fn enrollments(&self) -> Vec<Enrollment> {
        self.enrollments.read().await.values().cloned().collect()
    }

    /// Makes every write fail with a database error while set
    pub fn fail_writes(&self, fail: bool) {
        self.faults.writes.store(fail, Ordering::SeqCst);
    }

    /// Makes enrollment inserts fail with a database error while set
    pub fn fail_enrollment_inserts(&self, fail: bool) {
        self.faults.enrollment_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes enrollment inserts for one user fail from now on
    pub async fn fail_enrollment_inserts_for(&self, user_id: &str) {
        self.faults
            .enrollment_users
            .write()
            .await
            .insert(user_id.to_string());
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.faults.writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Datastore for InMemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_course(&self, id: &str) -> StoreResult<Option<Course>> {
        Ok(self.courses.read().await.get(id).cloned())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn insert_user(&self, user: User) -> StoreResult<User> {
        self.check_writable()?;
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Err(StoreError::UniqueViolation("users_pkey".to_string()));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn insert_order(&self, order: Order) -> StoreResult<Order> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::UniqueViolation("orders_pkey".to_string()));
        }
        orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn attach_gateway_reference(&self, id: Uuid, reference: &str) -> StoreResult<Option<Order>> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.gateway_payment_reference.is_none() => {
                order.gateway_payment_reference = Some(reference.to_string());
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition_order(
        &self,
        id: Uuid,
        status: OrderStatus,
        payment_reference: &str,
    ) -> StoreResult<Option<Order>> {
        self.check_writable()?;
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order) if order.status.accepts_status_write() => {
                order.status = status;
                order.gateway_payment_reference = Some(payment_reference.to_string());
                order.updated_at = Utc::now();
                Ok(Some(order.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_enrollment(&self, key: &EnrollmentKey) -> StoreResult<Option<Enrollment>> {
        Ok(self.enrollments.read().await.get(key).cloned())
    }

    async fn insert_enrollment(&self, enrollment: Enrollment) -> StoreResult<Enrollment> {
        self.check_writable()?;
        if self.faults.enrollment_inserts.load(Ordering::SeqCst)
            || self
                .faults
                .enrollment_users
                .read()
                .await
                .contains(&enrollment.user_id)
        {
            return Err(StoreError::Database("simulated enrollment insert failure".to_string()));
        }
        let mut enrollments = self.enrollments.write().await;
        let key = enrollment.key();
        if enrollments.contains_key(&key) {
            return Err(StoreError::UniqueViolation(
                "enrollments_user_course_order_key".to_string(),
            ));
        }
        enrollments.insert(key, enrollment.clone());
        Ok(enrollment)
    }

    async fn list_approved_without_enrollment(&self, limit: usize) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read().await;
        let enrollments = self.enrollments.read().await;

        let mut missing: Vec<Order> = orders
            .values()
            .filter(|order| order.status == OrderStatus::Approved)
            .filter(|order| {
                !enrollments.contains_key(&EnrollmentKey {
                    user_id: order.user_id.clone(),
                    course_id: order.course_id.clone(),
                    order_id: order.id,
                })
            })
            .cloned()
            .collect();

        missing.sort_by_key(|order| order.updated_at);
        missing.truncate(limit);
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateOrder, CreateUser, PaymentMethod};

    fn user(id: &str) -> User {
        User::new(CreateUser {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
        })
    }

    fn order() -> Order {
        Order::new(CreateOrder {
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            amount: 1000,
            payment_method: PaymentMethod::Boleto,
        })
    }

    #[tokio::test]
    async fn test_duplicate_user_is_unique_violation() {
        let store = InMemoryStore::new();
        store.insert_user(user("u1")).await.unwrap();

        let err = store.insert_user(user("u1")).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_only_from_pending() {
        let store = InMemoryStore::new();
        let order = store.insert_order(order()).await.unwrap();

        let moved = store
            .transition_order(order.id, OrderStatus::Approved, "pay-1")
            .await
            .unwrap();
        assert_eq!(moved.unwrap().status, OrderStatus::Approved);

        let again = store
            .transition_order(order.id, OrderStatus::Rejected, "pay-2")
            .await
            .unwrap();
        assert!(again.is_none());

        let stored = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Approved);
        assert_eq!(stored.gateway_payment_reference.as_deref(), Some("pay-1"));
    }

    #[tokio::test]
    async fn test_attach_reference_keeps_existing() {
        let store = InMemoryStore::new();
        let order = store.insert_order(order()).await.unwrap();

        assert!(store.attach_gateway_reference(order.id, "pref-1").await.unwrap().is_some());
        assert!(store.attach_gateway_reference(order.id, "pref-2").await.unwrap().is_none());

        let stored = store.find_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.gateway_payment_reference.as_deref(), Some("pref-1"));
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_is_unique_violation() {
        let store = InMemoryStore::new();
        let key = EnrollmentKey {
            user_id: "u1".to_string(),
            course_id: "c1".to_string(),
            order_id: Uuid::new_v4(),
        };

        store.insert_enrollment(Enrollment::new(key.clone())).await.unwrap();
        let err = store.insert_enrollment(Enrollment::new(key)).await.unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.enrollments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = InMemoryStore::new();
        store.fail_writes(true);
        assert!(matches!(
            store.insert_order(order()).await,
            Err(StoreError::Database(_))
        ));

        store.fail_writes(false);
        assert!(store.insert_order(order()).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_approved_without_enrollment() {
        let store = InMemoryStore::new();
        let covered = store.insert_order(order()).await.unwrap();
        let missing = store.insert_order(order()).await.unwrap();
        let pending = store.insert_order(order()).await.unwrap();

        store.transition_order(covered.id, OrderStatus::Approved, "p1").await.unwrap();
        store.transition_order(missing.id, OrderStatus::Approved, "p2").await.unwrap();
        store
            .insert_enrollment(Enrollment::new(EnrollmentKey {
                user_id: covered.user_id.clone(),
                course_id: covered.course_id.clone(),
                order_id: covered.id,
            }))
            .await
            .unwrap();

        let listed = store.list_approved_without_enrollment(10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, missing.id);
        assert_ne!(listed[0].id, pending.id);
    }
}
