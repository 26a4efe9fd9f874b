pub mod db;
pub mod model;
pub mod notes;
pub mod subscriptions;
pub mod users;

pub use db::Store;
pub use model::{
    FeedEntry, NewSubscription, NewUser, NoteRecord, PushSubscriptionRecord, Role, UserRecord,
    UserWithSubscriptions,
};
