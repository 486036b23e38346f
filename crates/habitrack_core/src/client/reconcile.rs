//! Reconciliation between the local cache and the record store.
//!
//! # Responsibility
//! - Queue fire-and-forget persistence of optimistic local mutations.
//! - After the last queued write of a user succeeds, re-read the document and
//!   replace the cache.
//!
//! # Invariants
//! - Enqueuing never touches the store; only `drain` does.
//! - Jobs run in FIFO order.
//! - Persist patches never carry reflections.
//! - A failed job is logged and dropped; the cache keeps its optimistic state.
//! - An older snapshot never overwrites the cache while a newer job for the
//!   same user is still queued.

use crate::client::cache::LocalCache;
use crate::client::store::{RecordStore, StoreError};
use crate::model::user::{UserPatch, UserRecord};
use log::{debug, warn};
use std::collections::VecDeque;

/// One pending write of a user's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistJob {
    pub username: String,
    pub patch: UserPatch,
}

/// Counts from one `drain` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub persisted: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    queue: VecDeque<PersistJob>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the patchable fields of `user` for a later write.
    pub fn persist(&mut self, user: &UserRecord) {
        self.queue.push_back(PersistJob {
            username: user.username.clone(),
            patch: UserPatch::from_record(user),
        });
        debug!(
            "event=persist_enqueue module=reconcile status=ok pending={}",
            self.queue.len()
        );
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_jobs(&self) -> impl Iterator<Item = &PersistJob> {
        self.queue.iter()
    }

    /// Runs every queued job against `store`.
    ///
    /// On success the cache is replaced by the re-read document, as long as it
    /// still belongs to the same user and no later job for that user waits.
    pub fn drain<S: RecordStore + ?Sized>(
        &mut self,
        store: &S,
        cache: &mut LocalCache,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(job) = self.queue.pop_front() {
            match store.put_user(&job.username, &job.patch) {
                Ok(_) => {
                    report.persisted += 1;
                    if self.queue.iter().any(|later| later.username == job.username) {
                        debug!("event=refresh module=reconcile status=skipped reason=newer_job_queued");
                        continue;
                    }
                    if let Some(fresh) = refresh(store, &job.username) {
                        if cache.username() == Some(job.username.as_str()) {
                            cache.replace(fresh);
                        }
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        "event=persist module=reconcile status=error error_code={} error={}",
                        error_code(&err),
                        err
                    );
                }
            }
        }
        report
    }
}

/// Reads the authoritative document; `None` when absent or unreachable.
pub fn refresh<S: RecordStore + ?Sized>(store: &S, username: &str) -> Option<UserRecord> {
    match store.get_user(username) {
        Ok(user) => Some(user),
        Err(err) => {
            warn!(
                "event=refresh module=reconcile status=error error_code={} error={}",
                error_code(&err),
                err
            );
            None
        }
    }
}

fn error_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::NotFound(_) => "not_found",
        StoreError::Validation(_) => "validation",
        StoreError::Unauthorized => "unauthorized",
        StoreError::Persistence(_) => "persistence",
    }
}
