/// Enrollment provisioning
///
/// Grants course access for an approved order, at most once per
/// `(user_id, course_id, order_id)`.
///
/// The existence lookup only saves an insert on the common duplicate path.
/// Two concurrent callers can both miss it; the datastore's uniqueness
/// constraint then rejects the loser's insert, which is reported here as
/// [`ProvisionOutcome::AlreadyExists`] rather than as an error.
///
/// # Example
///
/// ```no_run
/// use coursepay_shared::provision::EnrollmentProvisioner;
/// use coursepay_shared::store::InMemoryStore;
/// use std::sync::Arc;
///
/// # async fn example(order: coursepay_shared::models::Order) {
/// let provisioner = EnrollmentProvisioner::new(Arc::new(InMemoryStore::new()));
/// let outcome = provisioner.provision(&order).await;
/// # }
/// ```

use crate::models::{Enrollment, EnrollmentKey, Order, OrderStatus};
use crate::store::{Datastore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Provisioning errors
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Only approved orders grant access
    #[error("Order {order_id} is {status}, not approved")]
    NotApproved {
        /// Order id
        order_id: Uuid,
        /// Current status
        status: OrderStatus,
    },

    /// Datastore failure (retryable)
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// A new enrollment was inserted
    Created(Enrollment),

    /// The enrollment already existed (lookup hit or constraint conflict)
    AlreadyExists,
}

/// Creates enrollments for approved orders
#[derive(Clone)]
pub struct EnrollmentProvisioner {
    store: Arc<dyn Datastore>,
}

impl EnrollmentProvisioner {
    /// Creates a provisioner over a datastore
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Ensures the order's enrollment exists
    ///
    /// # Errors
    ///
    /// - [`ProvisionError::NotApproved`] if the order is not approved
    /// - [`ProvisionError::Store`] on any datastore failure other than the
    ///   uniqueness conflict
    pub async fn provision(&self, order: &Order) -> Result<ProvisionOutcome, ProvisionError> {
        if order.status != OrderStatus::Approved {
            return Err(ProvisionError::NotApproved {
                order_id: order.id,
                status: order.status,
            });
        }

        let key = EnrollmentKey {
            user_id: order.user_id.clone(),
            course_id: order.course_id.clone(),
            order_id: order.id,
        };

        if self.store.find_enrollment(&key).await?.is_some() {
            tracing::debug!(order_id = %order.id, "Enrollment already present");
            return Ok(ProvisionOutcome::AlreadyExists);
        }

        match self.store.insert_enrollment(Enrollment::new(key)).await {
            Ok(enrollment) => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    course_id = %order.course_id,
                    enrollment_id = %enrollment.id,
                    "Enrollment created"
                );
                Ok(ProvisionOutcome::Created(enrollment))
            }
            Err(StoreError::UniqueViolation(constraint)) => {
                tracing::debug!(
                    order_id = %order.id,
                    constraint = %constraint,
                    "Concurrent enrollment insert lost the race"
                );
                Ok(ProvisionOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }
}
