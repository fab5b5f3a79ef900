//! Provision, revoke and describe subscriptions across both stores.
//!
//! Ordering is the same for every mutation: the subscription record commits
//! first, then the access document is updated under the access lock. A
//! failure between the two leaves a record that [`ProvisioningEngine::reconcile`]
//! can bring back in line; both document mutations are idempotent, so the
//! caller may also simply retry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::access::AccessConfigRegistry;
use crate::config::DeploymentConfig;
use crate::error::{GateKitError, GateKitResult};
use crate::storage::{StorageResult, SubscriptionRecord, SubscriptionStatus, SubscriptionStore};

mod reconcile;
mod render;
mod responses;
mod uri;

pub use render::{ConnectionRenderer, PlainUriRenderer};
pub use responses::{ConfigResponse, ReconcileReport, RevokeResponse, SubscriptionResponse};
pub use uri::connection_uri;

/// Plan length used when a caller does not choose one.
pub const DEFAULT_PLAN_DAYS: i64 = 30;

/// Orchestrates the subscription store and the access document.
pub struct ProvisioningEngine {
    config: Arc<DeploymentConfig>,
    store: SubscriptionStore,
    registry: AccessConfigRegistry,
    renderer: Arc<dyn ConnectionRenderer>,
}

impl std::fmt::Debug for ProvisioningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningEngine")
            .field("store", &self.store.path())
            .field("access_document", &self.registry.path())
            .finish_non_exhaustive()
    }
}

impl ProvisioningEngine {
    /// Opens both stores described by `config` and migrates the schema.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Config`] for invalid settings and a storage
    /// error if the database or the lock file cannot be opened.
    pub fn open(
        config: Arc<DeploymentConfig>,
        renderer: Arc<dyn ConnectionRenderer>,
    ) -> GateKitResult<Self> {
        config.validate()?;
        let store = SubscriptionStore::open(&config.storage.subscriptions_db_path())?;
        store.ensure_schema()?;
        let registry = AccessConfigRegistry::new(&config)?;
        log::debug!(
            "engine opened: db={} access={}",
            store.path().display(),
            registry.path().display()
        );
        Ok(Self {
            config,
            store,
            registry,
            renderer,
        })
    }

    /// Returns the deployment settings.
    #[must_use]
    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Returns the subscription store.
    #[must_use]
    pub const fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Returns the access document registry.
    #[must_use]
    pub const fn registry(&self) -> &AccessConfigRegistry {
        &self.registry
    }

    /// Grants access to `external_id` for `plan_days` days from `now`.
    ///
    /// A fresh credential is generated every time. Re-provisioning replaces
    /// the stored record; the previous credential stays in the access
    /// document and shows up as orphaned in [`reconcile`](Self::reconcile).
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::Validation`] if `plan_days < 1` (nothing is
    /// written), a storage error if the record cannot be committed, or the
    /// registry's error if the access document cannot be updated. In the
    /// last case the record is already committed.
    pub fn provision(
        &self,
        external_id: i64,
        plan_days: i64,
        now: DateTime<Utc>,
    ) -> GateKitResult<SubscriptionResponse> {
        let expires_at = expiry_after(now, plan_days)?;
        let record = SubscriptionRecord::active(
            external_id,
            Uuid::new_v4().to_string(),
            now,
            Some(expires_at),
        );
        self.store.upsert(&record)?;
        log::info!(
            "subscription {external_id} committed as {} until {expires_at}",
            record.access_key
        );

        self.registry.grant(&record.client_id, &record.label)?;
        log::info!("access granted to {}", record.label);

        Ok(self.respond(record))
    }

    /// Withdraws access for `external_id`. The record is kept as `Revoked`
    /// with `now` as its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::NotFound`] if the subscriber was never
    /// provisioned, otherwise storage or registry errors as for
    /// [`provision`](Self::provision).
    pub fn revoke(&self, external_id: i64, now: DateTime<Utc>) -> GateKitResult<RevokeResponse> {
        let record = self.require(external_id)?;
        self.store
            .update_status(external_id, SubscriptionStatus::Revoked, now)?;
        log::info!("subscription {external_id} revoked");

        self.registry.withdraw(&record.client_id)?;
        log::info!("access withdrawn from {}", record.label);

        Ok(RevokeResponse {
            external_id,
            status: SubscriptionStatus::Revoked,
            revoked_at: now,
        })
    }

    /// Reads the stored subscription. Does not touch the access document.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::NotFound`] if there is no record.
    pub fn describe(&self, external_id: i64) -> GateKitResult<SubscriptionResponse> {
        let record = self.require(external_id)?;
        Ok(self.respond(record))
    }

    /// Like [`describe`](Self::describe), plus the rendered URI payload.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::NotFound`] if there is no record, or the
    /// renderer's error.
    pub fn get_config(&self, external_id: i64) -> GateKitResult<ConfigResponse> {
        let record = self.require(external_id)?;
        let uri = connection_uri(&self.config, &record.client_id, &record.label);
        let rendered_qr = self.renderer.render(&uri)?;
        Ok(ConfigResponse {
            external_id,
            connection_uri: uri,
            rendered_qr,
            expires_at: record.expires_at,
        })
    }

    /// Returns every stored subscription, ordered by external id.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a page cannot be read or a row is corrupt.
    pub fn list(&self) -> GateKitResult<Vec<SubscriptionResponse>> {
        let records = self.store.list_all().collect::<StorageResult<Vec<_>>>()?;
        Ok(records
            .into_iter()
            .map(|record| self.respond(record))
            .collect())
    }

    /// Resolves a client credential back to its subscription.
    ///
    /// # Errors
    ///
    /// Returns [`GateKitError::NotFound`] when no record holds `client_id`
    /// and [`GateKitError::Conflict`] when several do.
    pub fn lookup_client(&self, client_id: &str) -> GateKitResult<SubscriptionResponse> {
        let mut records = self.store.find_by_client_id(client_id)?;
        match records.len() {
            0 => Err(GateKitError::NotFound(format!(
                "no subscription holds client id {client_id}"
            ))),
            1 => Ok(self.respond(records.remove(0))),
            _ => {
                let owners = records
                    .iter()
                    .map(|record| record.external_id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(GateKitError::Conflict(format!(
                    "client id {client_id} is shared by subscriptions {owners}"
                )))
            }
        }
    }

    fn require(&self, external_id: i64) -> GateKitResult<SubscriptionRecord> {
        self.store.get(external_id)?.ok_or_else(|| {
            GateKitError::NotFound(format!("no subscription for external id {external_id}"))
        })
    }

    fn respond(&self, record: SubscriptionRecord) -> SubscriptionResponse {
        let uri = connection_uri(&self.config, &record.client_id, &record.label);
        SubscriptionResponse::from_record(record, uri)
    }
}

fn expiry_after(now: DateTime<Utc>, plan_days: i64) -> GateKitResult<DateTime<Utc>> {
    if plan_days < 1 {
        return Err(GateKitError::Validation(format!(
            "plan_days must be at least 1, got {plan_days}"
        )));
    }
    Duration::try_days(plan_days)
        .and_then(|plan| now.checked_add_signed(plan))
        .ok_or_else(|| GateKitError::Validation(format!("plan_days {plan_days} is out of range")))
}
