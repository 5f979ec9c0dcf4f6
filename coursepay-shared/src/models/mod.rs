/// Database models for the checkout pipeline
///
/// Each model carries its row type plus the SQL operations against PostgreSQL.
/// Services never call these directly; they go through the
/// [`Datastore`](crate::store::Datastore) port so the same logic runs against
/// the in-memory store in tests.
///
/// # Models
///
/// - `user`: buyers, created on first purchase
/// - `course`: read-only catalog entries
/// - `order`: one per checkout, the aggregate root
/// - `enrollment`: course access granted by an approved order

pub mod course;
pub mod enrollment;
pub mod order;
pub mod user;

pub use course::Course;
pub use enrollment::{Enrollment, EnrollmentKey, EnrollmentStatus};
pub use order::{CreateOrder, Order, OrderStatus, PaymentMethod};
pub use user::{CreateUser, User};
