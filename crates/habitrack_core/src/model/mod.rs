//! Domain model for the per-user tracking document.
//!
//! # Responsibility
//! - Define the user document, its parts and the badge catalog.
//! - Keep validation next to the data it guards.
//!
//! # Invariants
//! - Every user is identified by a unique `username`.
//! - Users are never deleted by core.

pub mod badge;
pub mod mood;
pub mod user;
