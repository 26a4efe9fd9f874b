use std::collections::HashMap;

use anyhow::{Context, Result};
use redb::{ReadableTable, TableDefinition};
use tracing::debug;

use super::db::{decode, encode, Store};
use super::model::{FeedEntry, NoteRecord, UserRecord};
use super::users::USERS;

pub(crate) const NOTES: TableDefinition<u64, &[u8]> = TableDefinition::new("notes");
const NOTE_SEQ_KEY: &str = "note_seq";

impl Store {
    /// Insert a note owned by `user_id`. Fails if the owner does not exist or
    /// has been soft-deleted.
    pub fn create_note(&self, user_id: u64, content: &str) -> Result<NoteRecord> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let record = {
            let users = write_txn.open_table(USERS)?;
            let owner_live = match users.get(user_id)? {
                Some(guard) => !decode::<UserRecord>(guard.value())?.is_deleted(),
                None => false,
            };
            if !owner_live {
                anyhow::bail!("note owner {user_id} does not exist");
            }

            let id = Self::next_id(&write_txn, NOTE_SEQ_KEY)?;
            let record = NoteRecord {
                id,
                user_id,
                content: content.to_owned(),
                created_at: now,
                updated_at: None,
                deleted_at: None,
            };
            let bytes = encode(&record)?;
            let mut notes = write_txn.open_table(NOTES)?;
            notes.insert(id, bytes.as_slice())?;
            record
        };
        write_txn.commit().context("commit new note")?;

        debug!(note_id = record.id, user_id, "stored note");
        Ok(record)
    }

    /// Fetch a note by id, including soft-deleted ones.
    pub fn get_note(&self, id: u64) -> Result<Option<NoteRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NOTES)?;
        let raw: Option<Vec<u8>> = table.get(id)?.map(|g| g.value().to_vec());
        raw.map(|bytes| decode(&bytes)).transpose()
    }

    /// Collect notes matching `pred`, most recent first.
    pub fn notes_where<F>(&self, pred: F) -> Result<Vec<NoteRecord>>
    where
        F: Fn(&NoteRecord) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NOTES)?;

        let mut notes = Vec::new();
        // Ids are monotonic, so reverse key order is newest first.
        for item in table.iter()?.rev() {
            let (_k, v) = item?;
            let note: NoteRecord = decode(v.value()).context("decode note")?;
            if pred(&note) {
                notes.push(note);
            }
        }
        Ok(notes)
    }

    /// The shared feed: every live note whose author is live, most recent
    /// first, with the author's name attached.
    pub fn feed(&self) -> Result<Vec<FeedEntry>> {
        let authors: HashMap<u64, String> = self
            .list_users()?
            .into_iter()
            .map(|u| (u.id, u.name))
            .collect();

        let entries = self
            .notes_where(|n| !n.is_deleted())?
            .into_iter()
            .filter_map(|note| {
                let author_name = authors.get(&note.user_id)?.clone();
                Some(FeedEntry { note, author_name })
            })
            .collect();
        Ok(entries)
    }

    /// Soft-delete a note. Returns true if a live note was marked deleted.
    /// Ownership is checked by the caller.
    pub fn delete_note(&self, id: u64) -> Result<bool> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(NOTES)?;
            let raw: Option<Vec<u8>> = table.get(id)?.map(|g| g.value().to_vec());
            match raw {
                Some(bytes) => {
                    let mut note: NoteRecord = decode(&bytes)?;
                    if note.is_deleted() {
                        false
                    } else {
                        note.deleted_at = Some(now);
                        note.updated_at = Some(now);
                        let updated = encode(&note)?;
                        table.insert(id, updated.as_slice())?;
                        true
                    }
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::tests::make_store;
    use crate::store::model::{NewUser, Role};

    fn user(s: &Store, email: &str, name: &str) -> UserRecord {
        s.create_user(NewUser {
            name: name.into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
        })
        .unwrap()
    }

    #[test]
    fn create_requires_live_owner() {
        let (s, _dir) = make_store();
        assert!(s.create_note(42, "thanks").is_err());

        let u = user(&s, "ada@example.com", "Ada");
        s.delete_user(u.id).unwrap();
        assert!(s.create_note(u.id, "thanks").is_err());
    }

    #[test]
    fn feed_is_newest_first_with_authors() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com", "Ada");
        let bob = user(&s, "bob@example.com", "Bob");
        s.create_note(ada.id, "coffee").unwrap();
        s.create_note(bob.id, "sunshine").unwrap();
        s.create_note(ada.id, "friends").unwrap();

        let feed = s.feed().unwrap();
        let contents: Vec<_> = feed.iter().map(|e| e.note.content.as_str()).collect();
        assert_eq!(contents, ["friends", "sunshine", "coffee"]);
        assert_eq!(feed[1].author_name, "Bob");
    }

    #[test]
    fn deleted_notes_and_authors_leave_the_feed() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com", "Ada");
        let bob = user(&s, "bob@example.com", "Bob");
        let n1 = s.create_note(ada.id, "coffee").unwrap();
        s.create_note(bob.id, "sunshine").unwrap();

        assert!(s.delete_note(n1.id).unwrap());
        assert!(!s.delete_note(n1.id).unwrap());
        assert!(s.get_note(n1.id).unwrap().unwrap().is_deleted());

        s.delete_user(bob.id).unwrap();
        assert!(s.feed().unwrap().is_empty());
    }

    #[test]
    fn notes_where_filters_by_owner_and_liveness() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com", "Ada");
        let bob = user(&s, "bob@example.com", "Bob");
        s.create_note(ada.id, "one").unwrap();
        let gone = s.create_note(ada.id, "two").unwrap();
        s.create_note(bob.id, "three").unwrap();
        s.delete_note(gone.id).unwrap();

        let mine = s
            .notes_where(|n| n.user_id == ada.id && !n.is_deleted())
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].content, "one");
    }

    #[test]
    fn delete_missing_note_is_false() {
        let (s, _dir) = make_store();
        assert!(!s.delete_note(7).unwrap());
        assert!(s.get_note(7).unwrap().is_none());
    }
}
