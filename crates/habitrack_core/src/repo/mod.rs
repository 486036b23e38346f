//! Repository layer for the user record store.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Keep SQLite query details out of the services.
//!
//! # Invariants
//! - Writes validate before persistence.
//! - `NotFound` and `AlreadyExists` are reported as semantic errors, separate
//!   from transport failures.

pub mod user_repo;
