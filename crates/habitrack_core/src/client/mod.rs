//! Client-side state: optimistic cache, reconciliation with the record
//! store, completion with undo, and the session event loop tying them
//! together.

pub mod cache;
pub mod completion;
pub mod reconcile;
pub mod session;
pub mod store;
pub mod timers;

pub use cache::LocalCache;
pub use completion::{CompletionError, CompletionWorkflow, PendingUndo, RevertOutcome};
pub use reconcile::{refresh, DrainReport, PersistJob, Reconciler};
pub use session::{
    BadgeBoard, ReminderNotice, Session, SessionError, SessionEvent, SessionOptions,
    SessionResult,
};
pub use store::{LocalRecordStore, RecordStore, StoreError, StoreResult};
pub use timers::{TimerId, TimerQueue};
