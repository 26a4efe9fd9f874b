use serde::{Deserialize, Serialize};

/// Account role. The first account ever registered is the admin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored in redb as bincode-encoded bytes, keyed by `id`.
/// All timestamps are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: u64,
    pub name: String,
    /// Normalized (parsed, lowercased) address. Unique among live users.
    pub email: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl UserRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Input for [`crate::store::Store::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteRecord {
    pub id: u64,
    pub user_id: u64,
    pub content: String,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl NoteRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A live note joined with its author's display name.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub note: NoteRecord,
    pub author_name: String,
}

/// A browser push endpoint registered by a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushSubscriptionRecord {
    pub id: u64,
    pub user_id: u64,
    pub endpoint: String,
    /// Base64url P-256 public key of the user agent.
    pub p256dh: String,
    /// Base64url authentication secret.
    pub auth: String,
    /// The key bundle exactly as the browser sent it, serialized as JSON.
    pub keys: String,
    pub created_at: i64,
}

/// Input for [`crate::store::Store::save_subscription`].
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub keys: String,
}

/// A live user together with every push endpoint they registered.
#[derive(Debug, Clone)]
pub struct UserWithSubscriptions {
    pub user: UserRecord,
    pub subscriptions: Vec<PushSubscriptionRecord>,
}
