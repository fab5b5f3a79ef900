use std::collections::{HashMap, HashSet};

use super::{ProvisioningEngine, ReconcileReport};
use crate::error::GateKitResult;
use crate::storage::{StorageResult, SubscriptionStatus};

impl ProvisioningEngine {
    /// Brings the access document in line with the stored subscriptions.
    ///
    /// Under the access lock, every `Active` credential missing from the
    /// managed client list is added and every `Revoked` credential present
    /// in it is removed. Document entries that match no record are reported
    /// as orphans and kept, since hand-configured clients look the same.
    /// Credentials shared by several records are reported and skipped.
    ///
    /// Records are read while the lock is held, so a revoke that withdrew
    /// its credential before the lock was granted is never undone.
    ///
    /// # Errors
    ///
    /// Returns storage errors from reading the records and registry errors
    /// from the locked update. The document is left unchanged on error.
    pub fn reconcile(&self) -> GateKitResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        self.registry.update(|registry, document| {
            let records = self.store.list_all().collect::<StorageResult<Vec<_>>>()?;

            let mut holders: HashMap<&str, usize> = HashMap::new();
            for record in &records {
                *holders.entry(record.client_id.as_str()).or_default() += 1;
            }
            for record in &records {
                if holders.get(record.client_id.as_str()).copied().unwrap_or(0) > 1
                    && !report.conflicts.contains(&record.client_id)
                {
                    log::warn!(
                        "client id {} is shared by several subscriptions, skipping",
                        record.client_id
                    );
                    report.conflicts.push(record.client_id.clone());
                }
            }

            let present: HashSet<String> = registry
                .locate_managed_clients(document)?
                .into_iter()
                .map(|client| client.id)
                .collect();

            let mut next = document.clone();
            for record in &records {
                if report.conflicts.contains(&record.client_id) {
                    continue;
                }
                let listed = present.contains(&record.client_id);
                match record.status {
                    SubscriptionStatus::Active if !listed => {
                        next = registry.add_client(&next, &record.client_id, &record.label)?;
                        log::info!("reconcile: granted missing access to {}", record.label);
                        report.granted.push(record.external_id);
                    }
                    SubscriptionStatus::Revoked if listed => {
                        next = registry.remove_client(&next, &record.client_id)?;
                        log::info!("reconcile: withdrew stale access from {}", record.label);
                        report.withdrawn.push(record.external_id);
                    }
                    _ => {}
                }
            }

            for id in present {
                if !holders.contains_key(id.as_str()) {
                    log::warn!("reconcile: access entry {id} matches no subscription");
                    report.orphaned.push(id);
                }
            }
            report.orphaned.sort();
            Ok(next)
        })?;

        Ok(report)
    }
}
