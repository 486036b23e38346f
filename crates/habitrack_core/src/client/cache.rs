//! Client-side mirror of the signed-in user's document.
//!
//! # Invariants
//! - Holds at most one user at a time.
//! - Mutations are synchronous; nothing here talks to the store.
//! - The journal list is kept newest first.

use crate::model::user::{sort_reflections_desc, Reflection, UserRecord};

#[derive(Debug, Default)]
pub struct LocalCache {
    user: Option<UserRecord>,
    journal: Vec<Reflection>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut UserRecord> {
        self.user.as_mut()
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.username.as_str())
    }

    /// Replaces the cached document wholesale with `user`.
    pub fn replace(&mut self, user: UserRecord) {
        self.user = Some(user);
    }

    pub fn clear(&mut self) {
        self.user = None;
        self.journal.clear();
    }

    pub fn journal(&self) -> &[Reflection] {
        &self.journal
    }

    /// Inserts an unconfirmed entry ahead of the existing ones.
    pub fn push_journal(&mut self, entry: Reflection) {
        self.journal.insert(0, entry);
        sort_reflections_desc(&mut self.journal);
    }

    /// Replaces the journal with the authoritative list.
    pub fn replace_journal(&mut self, mut entries: Vec<Reflection>) {
        sort_reflections_desc(&mut entries);
        self.journal = entries;
    }
}

#[cfg(test)]
mod tests {
    use super::LocalCache;
    use crate::model::user::Reflection;

    #[test]
    fn journal_stays_newest_first() {
        let mut cache = LocalCache::new();
        cache.replace_journal(vec![
            Reflection::new("old", None, 10),
            Reflection::new("new", None, 30),
        ]);
        cache.push_journal(Reflection::new("middle", None, 20));
        let texts: Vec<_> = cache.journal().iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "middle", "old"]);
    }
}
