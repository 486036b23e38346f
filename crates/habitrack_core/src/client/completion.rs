//! Completion with a time-boxed undo.
//!
//! Item lifecycle: `Active -> PendingRemoval -> Committed | Reverted`.
//!
//! # Invariants
//! - Completing removes exactly one matching item and adds exactly one to the
//!   matching counter.
//! - At most one undo is pending; a newer completion supersedes it.
//! - A revert is honored only strictly before the undo deadline.
//! - Reverting puts back the exact removed entry at its old position.
//! - Reverting never touches `unlocked_badges`.

use crate::model::user::{ItemEntry, ItemKind, UserRecord};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use uuid::Uuid;

/// Default undo window.
pub const UNDO_WINDOW: Duration = Duration::from_secs(5);

/// Undo handle for the most recent completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUndo {
    pub token: Uuid,
    pub kind: ItemKind,
    /// The removed entry, id and timestamps included.
    pub item: ItemEntry,
    /// Index the entry held in its list before removal.
    pub position: usize,
    pub expires_at_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted,
    /// The window elapsed; the completion is final.
    Expired,
    /// A newer completion replaced this undo.
    Superseded,
    NothingPending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    ItemNotFound { kind: ItemKind, text: String },
}

impl Display for CompletionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound { kind, text } => {
                write!(f, "{} not found: `{text}`", kind.label())
            }
        }
    }
}

impl Error for CompletionError {}

#[derive(Debug)]
pub struct CompletionWorkflow {
    window_ms: i64,
    pending: Option<PendingUndo>,
}

impl Default for CompletionWorkflow {
    fn default() -> Self {
        Self::new(UNDO_WINDOW)
    }
}

impl CompletionWorkflow {
    pub fn new(window: Duration) -> Self {
        Self {
            window_ms: crate::clock::duration_ms(window),
            pending: None,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub fn pending(&self) -> Option<&PendingUndo> {
        self.pending.as_ref()
    }

    /// Applies the optimistic completion to `user` and opens an undo window.
    pub fn complete(
        &mut self,
        user: &mut UserRecord,
        kind: ItemKind,
        text: &str,
        now_ms: i64,
    ) -> Result<PendingUndo, CompletionError> {
        let items = user.items_mut(kind);
        let position = items
            .iter()
            .position(|item| item.text == text)
            .ok_or_else(|| CompletionError::ItemNotFound {
                kind,
                text: text.to_string(),
            })?;
        let removed = items.remove(position);
        user.stats.increment(kind);

        let undo = PendingUndo {
            token: Uuid::new_v4(),
            kind,
            item: removed,
            position,
            expires_at_ms: now_ms.saturating_add(self.window_ms),
        };
        if let Some(previous) = self.pending.replace(undo.clone()) {
            info!(
                "event=undo_supersede module=completion status=ok kind={}",
                previous.kind.label()
            );
        }
        Ok(undo)
    }

    /// Reverses the completion identified by `token` if still inside its window.
    pub fn revert(&mut self, user: &mut UserRecord, token: Uuid, now_ms: i64) -> RevertOutcome {
        let Some(pending) = self.pending.as_ref() else {
            return RevertOutcome::NothingPending;
        };
        if pending.token != token {
            return RevertOutcome::Superseded;
        }
        if now_ms >= pending.expires_at_ms {
            self.pending = None;
            return RevertOutcome::Expired;
        }

        let Some(pending) = self.pending.take() else {
            return RevertOutcome::NothingPending;
        };
        let items = user.items_mut(pending.kind);
        let position = pending.position.min(items.len());
        items.insert(position, pending.item);
        user.stats.decrement(pending.kind);
        RevertOutcome::Reverted
    }

    /// Drops the pending undo without reverting it.
    pub fn discard(&mut self) -> Option<PendingUndo> {
        self.pending.take()
    }

    /// Commits the completion behind `token` once its window has elapsed.
    ///
    /// Returns `false` for superseded tokens or when called early.
    pub fn expire(&mut self, token: Uuid, now_ms: i64) -> bool {
        match &self.pending {
            Some(pending) if pending.token == token && now_ms >= pending.expires_at_ms => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }
}
