use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{SubscriptionRecord, SubscriptionStatus};

/// Result of `provision`, `describe`, `list` and `lookup_client`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    /// Subscriber account id.
    pub external_id: i64,
    /// Credential mirrored into the access document.
    pub client_id: String,
    /// Deterministic `tg_<external_id>` label.
    pub label: String,
    /// Human-facing reference.
    pub access_key: String,
    /// Current status.
    pub status: SubscriptionStatus,
    /// When the subscription was (re-)provisioned.
    pub created_at: DateTime<Utc>,
    /// Expiry, or the revocation time for revoked subscriptions.
    pub expires_at: Option<DateTime<Utc>>,
    /// Shareable `vless://` URI.
    pub connection_uri: String,
}

impl SubscriptionResponse {
    pub(crate) fn from_record(record: SubscriptionRecord, connection_uri: String) -> Self {
        Self {
            external_id: record.external_id,
            client_id: record.client_id,
            label: record.label,
            access_key: record.access_key,
            status: record.status,
            created_at: record.created_at,
            expires_at: record.expires_at,
            connection_uri,
        }
    }
}

/// Result of `revoke`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    /// Subscriber account id.
    pub external_id: i64,
    /// Always [`SubscriptionStatus::Revoked`].
    pub status: SubscriptionStatus,
    /// Time the revocation was committed.
    pub revoked_at: DateTime<Utc>,
}

/// Result of `get_config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
    /// Subscriber account id.
    pub external_id: i64,
    /// Shareable `vless://` URI.
    pub connection_uri: String,
    /// Output of the configured [`ConnectionRenderer`](super::ConnectionRenderer).
    pub rendered_qr: String,
    /// Expiry of the subscription.
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a reconciliation pass changed and what it left for an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// External ids of active subscriptions whose credential was re-added.
    pub granted: Vec<i64>,
    /// External ids of revoked subscriptions whose credential was removed.
    pub withdrawn: Vec<i64>,
    /// Client ids present in the access document but matching no record.
    /// They are reported, never removed.
    pub orphaned: Vec<String>,
    /// Client ids shared by more than one record. Left untouched.
    pub conflicts: Vec<String>,
}

impl ReconcileReport {
    /// Whether the pass found nothing to change or report.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.granted.is_empty()
            && self.withdrawn.is_empty()
            && self.orphaned.is_empty()
            && self.conflicts.is_empty()
    }
}
