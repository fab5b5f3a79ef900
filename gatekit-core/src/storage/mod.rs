//! Durable storage primitives: subscription table, paths, locking.

pub mod error;
pub mod lock;
pub mod paths;
pub mod subscriptions;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use lock::{AccessLock, AccessLockGuard};
pub use paths::StoragePaths;
pub use subscriptions::{SubscriptionIter, SubscriptionStore};
pub use types::{label_for, SubscriptionRecord, SubscriptionStatus};
