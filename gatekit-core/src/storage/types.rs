//! Public types for the subscription store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle status of a subscription.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SubscriptionStatus {
    /// The subscriber is entitled to live access.
    Active,
    /// Access has been withdrawn.
    Revoked,
}

/// One durable row per subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    /// The subscriber's account id on the messaging platform.
    pub external_id: i64,
    /// UUID-v4 credential mirrored into the access document.
    pub client_id: String,
    /// Deterministic label, `tg_<external_id>`.
    pub label: String,
    /// Human-facing reference, `<external_id>-<first 8 chars of client_id>`.
    pub access_key: String,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Set at (re-)provisioning.
    pub created_at: DateTime<Utc>,
    /// `None` means no expiry policy is enforced here.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    /// Builds a fresh `Active` record for `external_id` around `client_id`.
    #[must_use]
    pub fn active(
        external_id: i64,
        client_id: String,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let short: String = client_id.chars().take(8).collect();
        Self {
            external_id,
            label: label_for(external_id),
            access_key: format!("{external_id}-{short}"),
            client_id,
            status: SubscriptionStatus::Active,
            created_at,
            expires_at,
        }
    }
}

/// Returns the deterministic client label for an external account id.
#[must_use]
pub fn label_for(external_id: i64) -> String {
    format!("tg_{external_id}")
}
