use anyhow::{Context, Result};
use redb::{ReadableTable, TableDefinition};
use tracing::debug;

use super::db::{decode, encode, Store};
use super::model::{NewUser, UserRecord};

pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
/// Normalized email → user id.
pub(crate) const USERS_BY_EMAIL: TableDefinition<&str, u64> =
    TableDefinition::new("users_by_email");
const USER_SEQ_KEY: &str = "user_seq";

impl Store {
    /// Insert a new user.
    ///
    /// The email index is checked again inside the write transaction; a live
    /// user already holding the address makes the insert fail. Callers are
    /// expected to have run [`Store::user_exists`] first and should treat this
    /// failure as a generic storage error.
    pub fn create_user(&self, new: NewUser) -> Result<UserRecord> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let record = {
            let mut by_email = write_txn.open_table(USERS_BY_EMAIL)?;
            let mut users = write_txn.open_table(USERS)?;

            let holder = by_email.get(new.email.as_str())?.map(|g| g.value());
            if let Some(holder_id) = holder {
                let live = match users.get(holder_id)? {
                    Some(guard) => !decode::<UserRecord>(guard.value())?.is_deleted(),
                    None => false,
                };
                if live {
                    anyhow::bail!("email index already holds user {holder_id}");
                }
            }

            let id = Self::next_id(&write_txn, USER_SEQ_KEY)?;
            let record = UserRecord {
                id,
                name: new.name,
                email: new.email,
                password_hash: new.password_hash,
                role: new.role,
                created_at: now,
                updated_at: None,
                deleted_at: None,
            };
            let bytes = encode(&record)?;
            users.insert(id, bytes.as_slice())?;
            by_email.insert(record.email.as_str(), id)?;
            record
        };
        write_txn.commit().context("commit new user")?;

        debug!(user_id = record.id, role = %record.role, "stored user");
        Ok(record)
    }

    /// Fetch a user by id, including soft-deleted ones.
    pub fn get_user(&self, id: u64) -> Result<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let raw: Option<Vec<u8>> = table.get(id)?.map(|g| g.value().to_vec());
        raw.map(|bytes| decode(&bytes)).transpose()
    }

    /// Look up a live (not soft-deleted) user by normalized email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let read_txn = self.db.begin_read()?;
        let by_email = read_txn.open_table(USERS_BY_EMAIL)?;
        let Some(id) = by_email.get(email)?.map(|g| g.value()) else {
            return Ok(None);
        };
        let users = read_txn.open_table(USERS)?;
        let raw: Option<Vec<u8>> = users.get(id)?.map(|g| g.value().to_vec());
        match raw {
            Some(bytes) => {
                let user: UserRecord = decode(&bytes)?;
                Ok((!user.is_deleted()).then_some(user))
            }
            None => Ok(None),
        }
    }

    /// True if a live user holds `email`.
    pub fn user_exists(&self, email: &str) -> Result<bool> {
        Ok(self.find_user_by_email(email)?.is_some())
    }

    /// Number of users ever registered, soft-deleted ones included.
    pub fn count_users(&self) -> Result<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let mut count = 0u64;
        for item in table.iter()? {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// List all live users ordered by id.
    pub fn list_users(&self) -> Result<Vec<UserRecord>> {
        self.users_where(|u| !u.is_deleted())
    }

    /// Collect every user (deleted ones included) matching `pred`, ordered by id.
    pub fn users_where<F>(&self, pred: F) -> Result<Vec<UserRecord>>
    where
        F: Fn(&UserRecord) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        let mut users = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            let user: UserRecord = decode(v.value()).context("decode user")?;
            if pred(&user) {
                users.push(user);
            }
        }
        Ok(users)
    }

    /// Soft-delete a user. Returns true if a live user was marked deleted.
    /// The role of the remaining users is left untouched.
    pub fn delete_user(&self, id: u64) -> Result<bool> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(USERS)?;
            let raw: Option<Vec<u8>> = table.get(id)?.map(|g| g.value().to_vec());
            match raw {
                Some(bytes) => {
                    let mut user: UserRecord = decode(&bytes)?;
                    if user.is_deleted() {
                        false
                    } else {
                        user.deleted_at = Some(now);
                        user.updated_at = Some(now);
                        let updated = encode(&user)?;
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
