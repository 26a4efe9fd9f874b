use std::collections::HashMap;

use anyhow::{Context, Result};
use redb::{ReadableTable, TableDefinition};
use tracing::debug;

use super::db::{decode, encode, Store};
use super::model::{NewSubscription, PushSubscriptionRecord, UserRecord, UserWithSubscriptions};
use super::users::USERS;

pub(crate) const PUSH_SUBSCRIPTIONS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("push_subscriptions");
const SUBSCRIPTION_SEQ_KEY: &str = "push_subscription_seq";

impl Store {
    /// Register a push endpoint for `user_id`.
    ///
    /// A browser re-subscribing with an endpoint it already registered replaces
    /// the earlier record instead of adding a second one, so each device is
    /// notified once.
    pub fn save_subscription(
        &self,
        user_id: u64,
        sub: NewSubscription,
    ) -> Result<PushSubscriptionRecord> {
        let now = Self::now();
        let write_txn = self.db.begin_write()?;
        let record = {
            let users = write_txn.open_table(USERS)?;
            let owner_live = match users.get(user_id)? {
                Some(guard) => !decode::<UserRecord>(guard.value())?.is_deleted(),
                None => false,
            };
            if !owner_live {
                anyhow::bail!("subscription owner {user_id} does not exist");
            }

            let mut table = write_txn.open_table(PUSH_SUBSCRIPTIONS)?;
            let mut existing = None;
            for item in table.iter()? {
                let (k, v) = item?;
                let rec: PushSubscriptionRecord = decode(v.value())?;
                if rec.user_id == user_id && rec.endpoint == sub.endpoint {
                    existing = Some(k.value());
                    break;
                }
            }

            let id = match existing {
                Some(id) => id,
                None => Self::next_id(&write_txn, SUBSCRIPTION_SEQ_KEY)?,
            };
            let record = PushSubscriptionRecord {
                id,
                user_id,
                endpoint: sub.endpoint,
                p256dh: sub.p256dh,
                auth: sub.auth,
                keys: sub.keys,
                created_at: now,
            };
            let bytes = encode(&record)?;
            table.insert(id, bytes.as_slice())?;
            record
        };
        write_txn.commit().context("commit push subscription")?;

        debug!(subscription_id = record.id, user_id, "stored push subscription");
        Ok(record)
    }

    /// Collect subscriptions matching `pred`, ordered by id.
    pub fn subscriptions_where<F>(&self, pred: F) -> Result<Vec<PushSubscriptionRecord>>
    where
        F: Fn(&PushSubscriptionRecord) -> bool,
    {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PUSH_SUBSCRIPTIONS)?;

        let mut subs = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            let sub: PushSubscriptionRecord = decode(v.value()).context("decode subscription")?;
            if pred(&sub) {
                subs.push(sub);
            }
        }
        Ok(subs)
    }

    pub fn subscriptions_for_user(&self, user_id: u64) -> Result<Vec<PushSubscriptionRecord>> {
        self.subscriptions_where(|s| s.user_id == user_id)
    }

    /// Every live user with the push endpoints they registered. Users without
    /// subscriptions are included with an empty list.
    pub fn users_with_subscriptions(&self) -> Result<Vec<UserWithSubscriptions>> {
        let mut by_user: HashMap<u64, Vec<PushSubscriptionRecord>> = HashMap::new();
        for sub in self.subscriptions_where(|_| true)? {
            by_user.entry(sub.user_id).or_default().push(sub);
        }

        Ok(self
            .list_users()?
            .into_iter()
            .map(|user| {
                let subscriptions = by_user.remove(&user.id).unwrap_or_default();
                UserWithSubscriptions {
                    user,
                    subscriptions,
                }
            })
            .collect())
    }

    /// Delete every subscription matching `pred`. Returns how many were removed.
    pub fn delete_subscriptions_where<F>(&self, pred: F) -> Result<usize>
    where
        F: Fn(&PushSubscriptionRecord) -> bool,
    {
        let ids: Vec<u64> = self.subscriptions_where(pred)?.iter().map(|s| s.id).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PUSH_SUBSCRIPTIONS)?;
            for id in &ids {
                table.remove(*id)?;
            }
        }
        write_txn.commit()?;
        Ok(ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::db::tests::make_store;
    use crate::store::model::{NewUser, Role};

    fn user(s: &Store, email: &str) -> UserRecord {
        s.create_user(NewUser {
            name: "N".into(),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
        })
        .unwrap()
    }

    fn sub(endpoint: &str) -> NewSubscription {
        NewSubscription {
            endpoint: endpoint.into(),
            p256dh: "p256".into(),
            auth: "auth".into(),
            keys: r#"{"p256dh":"p256","auth":"auth"}"#.into(),
        }
    }

    #[test]
    fn save_and_group_by_user() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com");
        let bob = user(&s, "bob@example.com");
        let carl = user(&s, "carl@example.com");
        s.save_subscription(ada.id, sub("https://push.example/a1")).unwrap();
        s.save_subscription(ada.id, sub("https://push.example/a2")).unwrap();
        s.save_subscription(bob.id, sub("https://push.example/b1")).unwrap();

        let all = s.users_with_subscriptions().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].subscriptions.len(), 2);
        assert_eq!(all[1].subscriptions.len(), 1);
        assert_eq!(all[2].user.id, carl.id);
        assert!(all[2].subscriptions.is_empty());
    }

    #[test]
    fn resubscribing_same_endpoint_replaces() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com");
        let first = s.save_subscription(ada.id, sub("https://push.example/a")).unwrap();
        let mut again = sub("https://push.example/a");
        again.auth = "rotated".into();
        let second = s.save_subscription(ada.id, again).unwrap();

        assert_eq!(first.id, second.id);
        let subs = s.subscriptions_for_user(ada.id).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].auth, "rotated");
    }

    #[test]
    fn unknown_owner_rejected() {
        let (s, _dir) = make_store();
        assert!(s.save_subscription(9, sub("https://push.example/x")).is_err());
    }

    #[test]
    fn deleted_users_are_not_listed_for_push() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com");
        s.save_subscription(ada.id, sub("https://push.example/a")).unwrap();
        s.delete_user(ada.id).unwrap();
        assert!(s.users_with_subscriptions().unwrap().is_empty());
    }

    #[test]
    fn delete_by_predicate() {
        let (s, _dir) = make_store();
        let ada = user(&s, "ada@example.com");
        s.save_subscription(ada.id, sub("https://push.example/a")).unwrap();
        s.save_subscription(ada.id, sub("https://push.example/b")).unwrap();

        let removed = s
            .delete_subscriptions_where(|r| r.endpoint.ends_with("/a"))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(s.delete_subscriptions_where(|_| false).unwrap(), 0);
        let left = s.subscriptions_for_user(ada.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].endpoint, "https://push.example/b");
    }
}
