//! In-process implementation of the RSC API
//!
//! Keeps accounts and SLA assignments in memory. The store can be saved and
//! loaded as JSON, which is how the CLI simulates a remote between runs.
//! Every mutating call is recorded so tests can assert on the exact sequence
//! the reconciler issued.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{
    Account, AccountSpec, ApiError, ApiResult, CloudAccountApi, FeatureStatus, RemoteFeature,
    SlaApi, SlaAssignment,
};
use crate::feature::{Cloud, Feature};
use crate::feature_config::FeatureConfig;

/// Mutating call received by [`MemoryApi`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    AddFeature {
        feature: Feature,
        resource_group: Option<String>,
    },
    RemoveFeature {
        feature: Feature,
        delete_snapshots: bool,
    },
    RetireFeature {
        feature: Feature,
    },
    UpdateFeature {
        feature: Feature,
    },
    PermissionsUpdated {
        feature: Feature,
    },
    RenameAccount {
        name: String,
    },
    AssignSla {
        domain_id: Option<Uuid>,
        objects: usize,
    },
}

/// Serializable content of a [`MemoryApi`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub accounts: BTreeMap<Uuid, Account>,
    /// Protected object -> SLA domain
    #[serde(default)]
    pub sla_assignments: BTreeMap<Uuid, Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    store: MemoryStore,
    calls: Vec<ApiCall>,
    failing: HashSet<Feature>,
    pending_sla: Vec<SlaAssignment>,
    /// Listings left before pending assignments apply; `None` never applies
    sla_delay: Option<u32>,
    polls_left: u32,
}

/// In-memory RSC API
#[derive(Debug)]
pub struct MemoryApi {
    inner: Mutex<Inner>,
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        Self::from_store(MemoryStore::default())
    }

    pub fn from_store(store: MemoryStore) -> Self {
        Self {
            inner: Mutex::new(Inner {
                store,
                sla_delay: Some(0),
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the store usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the store
    pub fn store(&self) -> MemoryStore {
        self.lock().store.clone()
    }

    /// Mutating calls received so far
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make every mutating call for `feature` fail
    pub fn fail_feature(&self, feature: Feature) {
        self.lock().failing.insert(feature);
    }

    /// Apply SLA assignments only after `polls` listings, or never with `None`
    pub fn delay_sla_assignments(&self, polls: Option<u32>) {
        self.lock().sla_delay = polls;
    }

    /// Override the status RSC reports for a feature
    pub fn set_status(&self, account_id: Uuid, feature: Feature, status: FeatureStatus) {
        let mut inner = self.lock();
        if let Some(remote) = inner
            .store
            .accounts
            .get_mut(&account_id)
            .and_then(|a| a.features.get_mut(&feature))
        {
            remote.status = status;
        }
    }

    /// Insert an account directly, bypassing onboarding
    pub fn insert_account(&self, account: Account) {
        self.lock().store.accounts.insert(account.id, account);
    }
}

impl Inner {
    fn check_failure(&self, feature: Feature, call: &str) -> ApiResult<()> {
        if self.failing.contains(&feature) {
            Err(ApiError::Remote(format!(
                "{} failed for feature {}",
                call, feature
            )))
        } else {
            Ok(())
        }
    }

    fn account_mut(&mut self, account_id: Uuid) -> ApiResult<&mut Account> {
        self.store
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| ApiError::NotFound(format!("account {}", account_id)))
    }

    fn apply_sla(&mut self, assignment: &SlaAssignment) {
        for object in &assignment.object_ids {
            match assignment.domain_id {
                Some(domain) => {
                    self.store.sla_assignments.insert(*object, domain);
                }
                None => {
                    self.store.sla_assignments.remove(object);
                }
            }
        }
    }
}

#[async_trait]
impl CloudAccountApi for MemoryApi {
    async fn add_feature(
        &self,
        account: &AccountSpec,
        feature: Feature,
        config: &FeatureConfig,
    ) -> ApiResult<Uuid> {
        let mut inner = self.lock();
        inner.check_failure(feature, "add feature")?;
        inner.calls.push(ApiCall::AddFeature {
            feature,
            resource_group: config.resource_group.as_ref().map(|rg| rg.name.clone()),
        });

        let existing = inner
            .store
            .accounts
            .values()
            .find(|a| a.cloud == account.cloud && a.native_id == account.native_id)
            .map(|a| a.id);
        let id = existing.unwrap_or_else(Uuid::new_v4);

        let entry = inner.store.accounts.entry(id).or_insert_with(|| Account {
            id,
            cloud: account.cloud,
            native_id: account.native_id.clone(),
            name: account.name.clone(),
            tenant_domain: account.tenant_domain.clone(),
            features: BTreeMap::new(),
        });
        entry.features.insert(
            feature,
            RemoteFeature {
                status: FeatureStatus::Connected,
                regions: config.regions.clone(),
                permission_groups: config.permission_groups.clone(),
                resource_group: config.resource_group.clone(),
                managed_identity: config.managed_identity.clone(),
            },
        );

        Ok(id)
    }

    async fn remove_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        delete_snapshots: bool,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.check_failure(feature, "remove feature")?;
        inner.calls.push(ApiCall::RemoveFeature {
            feature,
            delete_snapshots,
        });

        let account = inner.account_mut(account_id)?;
        if account.features.remove(&feature).is_none() {
            return Err(ApiError::NotFound(format!(
                "feature {} on account {}",
                feature, account_id
            )));
        }
        if account.features.is_empty() {
            inner.store.accounts.remove(&account_id);
        }
        Ok(())
    }

    async fn retire_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        retired: &FeatureConfig,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.check_failure(feature, "retire feature")?;
        inner.calls.push(ApiCall::RetireFeature { feature });

        let account = inner.account_mut(account_id)?;
        let remote = account.features.get(&feature).ok_or_else(|| {
            ApiError::NotFound(format!("feature {} on account {}", feature, account_id))
        })?;
        if !remote.config().structural_change(retired) {
            return Err(ApiError::Remote(format!(
                "feature {} is still onboarded with the retired configuration",
                feature
            )));
        }
        Ok(())
    }

    async fn update_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        config: &FeatureConfig,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.check_failure(feature, "update feature")?;
        inner.calls.push(ApiCall::UpdateFeature { feature });

        let account = inner.account_mut(account_id)?;
        let remote = account.features.get_mut(&feature).ok_or_else(|| {
            ApiError::NotFound(format!("feature {} on account {}", feature, account_id))
        })?;
        remote.regions = config.regions.clone();
        remote.permission_groups = config.permission_groups.clone();
        Ok(())
    }

    async fn permissions_updated(&self, account_id: Uuid, feature: Feature) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.check_failure(feature, "permissions updated")?;
        inner.calls.push(ApiCall::PermissionsUpdated { feature });

        let account = inner.account_mut(account_id)?;
        let remote = account.features.get_mut(&feature).ok_or_else(|| {
            ApiError::NotFound(format!("feature {} on account {}", feature, account_id))
        })?;
        remote.status = FeatureStatus::Connected;
        Ok(())
    }

    async fn rename_account(&self, account_id: Uuid, name: &str) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::RenameAccount {
            name: name.to_string(),
        });
        inner.account_mut(account_id)?.name = name.to_string();
        Ok(())
    }

    async fn account(&self, account_id: Uuid) -> ApiResult<Account> {
        self.lock()
            .store
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account {}", account_id)))
    }

    async fn account_by_native_id(
        &self,
        cloud: Cloud,
        native_id: &str,
    ) -> ApiResult<Option<Account>> {
        Ok(self
            .lock()
            .store
            .accounts
            .values()
            .find(|a| a.cloud == cloud && a.native_id == native_id)
            .cloned())
    }
}

#[async_trait]
impl SlaApi for MemoryApi {
    async fn assign_sla_domain(&self, assignment: &SlaAssignment) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::AssignSla {
            domain_id: assignment.domain_id,
            objects: assignment.object_ids.len(),
        });

        match inner.sla_delay {
            Some(0) => inner.apply_sla(assignment),
            Some(polls) => {
                inner.polls_left = polls;
                inner.pending_sla.push(assignment.clone());
            }
            None => inner.pending_sla.push(assignment.clone()),
        }
        Ok(())
    }

    async fn protected_objects(&self, domain_id: Uuid) -> ApiResult<BTreeSet<Uuid>> {
        let mut inner = self.lock();

        if !inner.pending_sla.is_empty() && inner.sla_delay.is_some() {
            inner.polls_left = inner.polls_left.saturating_sub(1);
            if inner.polls_left == 0 {
                for assignment in std::mem::take(&mut inner.pending_sla) {
                    inner.apply_sla(&assignment);
                }
            }
        }

        Ok(inner
            .store
            .sla_assignments
            .iter()
            .filter(|(_, domain)| **domain == domain_id)
            .map(|(object, _)| *object)
            .collect())
    }
}
