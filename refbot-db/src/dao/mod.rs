//! Generic data-access layer
//!
//! # Design Principles
//!
//! - Entity binding is a type parameter, never shared mutable state
//! - Every filter and write is validated against the entity schema first
//! - Writes run in their own scope and roll back explicitly on failure
//! - Upserts rely on DB constraints (ON CONFLICT), no check-then-insert
//! - No retries: storage errors go back to the caller unchanged

mod base;
mod query;
mod session;

pub use base::Dao;
pub use session::Session;
