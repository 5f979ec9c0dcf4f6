//! # CoursePay Shared Library
//!
//! Domain types, collaborator ports and the order-to-enrollment pipeline
//! shared by the CoursePay API server and the repair worker.
//!
//! ## Module Organization
//!
//! - `models`: database rows and their queries
//! - `db`: connection pool and migrations
//! - `store`: the `Datastore` port (PostgreSQL and in-memory)
//! - `gateway`: the `PaymentGateway` port (Mercado Pago and mock)
//! - `notify`: the `Notifier` port, email templates
//! - `checkout`: order creation and payment intent
//! - `reconcile`: webhook reconciliation
//! - `provision`: enrollment provisioning
//! - `signature`: webhook signature verification

pub mod checkout;
pub mod db;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod provision;
pub mod reconcile;
pub mod signature;
pub mod store;

/// Current version of the CoursePay shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
