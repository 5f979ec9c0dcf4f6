//! # CoursePay Worker Library
//!
//! Background repair for the payment pipeline.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `sweeper`: provisions enrollments for approved orders that lack one

pub mod config;
pub mod sweeper;
