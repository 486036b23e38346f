//! Core domain logic for habitrack.
//! This crate is the single source of truth for tracking and badge invariants.

pub mod achievement;
pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use achievement::{AchievementEngine, AchievementNotification, BadgeView, EvaluationResult};
pub use client::{
    BadgeBoard, LocalRecordStore, RecordStore, RevertOutcome, Session, SessionError,
    SessionEvent, SessionOptions, StoreError,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::badge::{BadgeDefinition, BADGES};
pub use model::mood::Mood;
pub use model::user::{ItemKind, UserRecord};
pub use repo::user_repo::{RepoError, RepoResult, SqliteUserRepository, UserRepository};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
