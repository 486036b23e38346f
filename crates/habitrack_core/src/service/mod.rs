//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into store-side use-cases.
//! - Keep the client session decoupled from SQL details.

pub mod account_service;
pub mod journal_service;
pub mod suggestion_service;
