//! Core types and trait definitions for the Tether identity engine.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod entitlement;
pub mod error;
pub mod identity;
pub mod provider;
pub mod record;
pub mod store;

pub use error::{Error, Result};
