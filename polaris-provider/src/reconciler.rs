//! Reconciler - Bring a cloud account's features to the desired state
//!
//! A pass has three steps:
//!
//! 1. classify every registry feature by comparing the previous and desired
//!    configuration, and sort the resulting operations by execution order
//! 2. execute the operations one at a time, stopping at the first failure
//! 3. re-read the account so the caller can rebuild local state from it
//!
//! The orders come from the [`FeatureRegistry`]: all adds (plain and
//! re-onboard) run before any removal, so an account that should keep at
//! least one feature is never left without one.

use std::collections::BTreeMap;

use polaris_core::differ::merge_ordered;
use uuid::Uuid;

use crate::api::{Account, AccountSpec, ApiError, CloudAccountApi, FeatureStatus};
use crate::feature::{Feature, FeatureRegistry};
use crate::feature_config::{FeatureConfig, FeatureConfigs};
use crate::plan::{Operation, OperationKind, ReconcilePlan};
use crate::validation::ValidationError;

/// Permissions signal stored for features RSC reports as missing permissions
pub const PERMISSIONS_UPDATE_REQUIRED: &str = "update-required";

/// Error raised by a reconciliation pass
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("invalid configuration: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationError>),

    #[error("failed to {operation}: {source}")]
    Operation {
        operation: Operation,
        #[source]
        source: ApiError,
    },

    #[error("failed to read account {account_id}: {source}")]
    ReadAccount {
        account_id: Uuid,
        #[source]
        source: ApiError,
    },

    #[error("{feature} was added to account {actual}, expected account {expected}")]
    AccountMismatch {
        feature: Feature,
        expected: Uuid,
        actual: Uuid,
    },

    #[error("cannot {operation}: the account has not been onboarded")]
    NotOnboarded { operation: Operation },

    #[error("account {account_id} still has features enabled after offboarding: {}", .features.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", "))]
    StillOnboarded {
        account_id: Uuid,
        features: Vec<Feature>,
    },
}

impl ReconcileError {
    fn validation(path: &str, message: &str) -> Self {
        ReconcileError::Validation(vec![ValidationError::new(path, message)])
    }
}

/// Outcome of a successful pass
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// Account as re-read after the last operation, `None` once offboarded
    pub account: Option<Account>,
    /// Operations that were executed, in order
    pub plan: ReconcilePlan,
}

/// Feature as rebuilt from the remote account
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshedFeature {
    pub config: FeatureConfig,
    pub status: FeatureStatus,
}

/// Compute the ordered operations turning `previous` into `desired`
pub fn plan(
    registry: &FeatureRegistry,
    previous: &FeatureConfigs,
    desired: &FeatureConfigs,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::new();

    for entry in registry.entries() {
        let feature = entry.feature;
        let order = entry.order;

        match (previous.get(&feature), desired.get(&feature)) {
            (None, None) => {}
            (None, Some(new)) => {
                plan.add(Operation::new(
                    OperationKind::AddFeature,
                    feature,
                    order.add,
                    new.clone(),
                ));
            }
            (Some(old), None) => {
                plan.add(Operation::new(
                    OperationKind::RemoveFeature,
                    feature,
                    order.remove,
                    old.clone(),
                ));
            }
            (Some(old), Some(new)) if new.structural_change(old) => {
                plan.add(Operation::new(
                    OperationKind::AddFeature,
                    feature,
                    order.split_add,
                    new.clone(),
                ));
                plan.add(Operation::new(
                    OperationKind::TemporaryRemoveFeature,
                    feature,
                    order.split_remove,
                    old.clone(),
                ));
            }
            (Some(old), Some(new)) => {
                if new.in_place_change(old) {
                    plan.add(Operation::new(
                        OperationKind::UpdateInPlace,
                        feature,
                        order.add,
                        new.clone(),
                    ));
                }
                if new.permissions_change(old) {
                    plan.add(Operation::new(
                        OperationKind::AcknowledgePermissions,
                        feature,
                        order.add,
                        new.clone(),
                    ));
                }
            }
        }
    }

    plan.sort();
    plan
}

/// Rebuild local feature configurations from the remote account
///
/// Region ordering follows `local` so a remote permutation is not reported
/// as a change. The permissions signal is kept from `local`, except for
/// features missing permissions.
pub fn refresh_features(
    account: &Account,
    local: &FeatureConfigs,
) -> BTreeMap<Feature, RefreshedFeature> {
    account
        .features
        .iter()
        .map(|(feature, remote)| {
            let local = local.get(feature);
            let existing: &[String] = local.map(|c| c.regions.as_slice()).unwrap_or(&[]);

            let permissions = if remote.status == FeatureStatus::MissingPermissions {
                Some(PERMISSIONS_UPDATE_REQUIRED.to_string())
            } else {
                local.and_then(|c| c.permissions.clone())
            };

            let config = FeatureConfig {
                regions: merge_ordered(existing, &remote.regions),
                permissions,
                ..remote.config()
            };
            (
                *feature,
                RefreshedFeature {
                    config,
                    status: remote.status,
                },
            )
        })
        .collect()
}

/// Executes reconciliation passes against one cloud's registry
pub struct Reconciler<'a, A: CloudAccountApi + ?Sized> {
    api: &'a A,
    registry: &'a FeatureRegistry,
}

impl<'a, A: CloudAccountApi + ?Sized> Reconciler<'a, A> {
    pub fn new(api: &'a A, registry: &'a FeatureRegistry) -> Self {
        Self { api, registry }
    }

    /// Previous configuration as seen by the remote account
    ///
    /// Features enabled locally but gone remotely count as absent; features
    /// enabled remotely but unknown locally count as present with their
    /// remote configuration. Returns `None` for the account when it no
    /// longer exists.
    pub async fn effective_previous(
        &self,
        account_id: Option<Uuid>,
        local: &FeatureConfigs,
    ) -> Result<(FeatureConfigs, Option<Account>), ReconcileError> {
        let Some(account_id) = account_id else {
            return Ok((FeatureConfigs::new(), None));
        };

        let account = match self.api.account(account_id).await {
            Ok(account) => account,
            Err(e) if e.is_not_found() => {
                log::warn!("account {} no longer exists", account_id);
                return Ok((FeatureConfigs::new(), None));
            }
            Err(source) => {
                return Err(ReconcileError::ReadAccount { account_id, source });
            }
        };

        let previous = self
            .registry
            .entries()
            .iter()
            .filter_map(|entry| {
                let remote = account.features.get(&entry.feature)?;
                let config = local
                    .get(&entry.feature)
                    .cloned()
                    .unwrap_or_else(|| remote.config());
                Some((entry.feature, config))
            })
            .collect();

        Ok((previous, Some(account)))
    }

    /// Compute the plan of a pass without executing it
    pub async fn plan(
        &self,
        account_id: Option<Uuid>,
        local: &FeatureConfigs,
        desired: &FeatureConfigs,
    ) -> Result<ReconcilePlan, ReconcileError> {
        let (previous, _) = self.effective_previous(account_id, local).await?;
        Ok(plan(self.registry, &previous, desired))
    }

    /// Reconcile an account towards `desired`, which must not be empty
    ///
    /// `account_id` is `None` for an account that has not been onboarded.
    pub async fn reconcile(
        &self,
        spec: &AccountSpec,
        account_id: Option<Uuid>,
        local: &FeatureConfigs,
        desired: &FeatureConfigs,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if desired.is_empty() {
            return Err(ReconcileError::validation(
                "features",
                "at least one feature must be enabled",
            ));
        }
        self.run(spec, account_id, local, desired, false).await
    }

    /// Remove every feature, which removes the account
    ///
    /// `delete_snapshots` is forwarded to each removal. Fails when the
    /// account is still there once the removals have run.
    pub async fn offboard(
        &self,
        spec: &AccountSpec,
        account_id: Uuid,
        local: &FeatureConfigs,
        delete_snapshots: bool,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = self
            .run(
                spec,
                Some(account_id),
                local,
                &FeatureConfigs::new(),
                delete_snapshots,
            )
            .await?;

        match &outcome.account {
            Some(account) => Err(ReconcileError::StillOnboarded {
                account_id: account.id,
                features: account.features.keys().copied().collect(),
            }),
            None => Ok(outcome),
        }
    }

    async fn run(
        &self,
        spec: &AccountSpec,
        account_id: Option<Uuid>,
        local: &FeatureConfigs,
        desired: &FeatureConfigs,
        delete_snapshots: bool,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let (previous, account) = self.effective_previous(account_id, local).await?;
        let mut account_id = account.map(|a| a.id);

        let plan = plan(self.registry, &previous, desired);
        log::debug!(
            "{} {}: {}",
            spec.cloud,
            spec.native_id,
            plan.summary()
        );

        for operation in plan.operations() {
            self.execute(spec, &mut account_id, operation, delete_snapshots)
                .await?;
        }

        let account = match account_id {
            Some(id) => match self.api.account(id).await {
                Ok(account) => Some(account),
                Err(e) if e.is_not_found() => None,
                Err(source) => {
                    return Err(ReconcileError::ReadAccount {
                        account_id: id,
                        source,
                    });
                }
            },
            None => None,
        };

        Ok(ReconcileOutcome { account, plan })
    }

    async fn execute(
        &self,
        spec: &AccountSpec,
        account_id: &mut Option<Uuid>,
        operation: &Operation,
        delete_snapshots: bool,
    ) -> Result<(), ReconcileError> {
        log::info!(
            "{} {}: {} (order {})",
            spec.cloud,
            spec.native_id,
            operation,
            operation.order
        );

        let fail = |source: ApiError| ReconcileError::Operation {
            operation: operation.clone(),
            source,
        };

        let result = match operation.kind {
            OperationKind::AddFeature => {
                let id = self
                    .api
                    .add_feature(spec, operation.feature, &operation.config)
                    .await
                    .map_err(fail)?;
                return match *account_id {
                    Some(expected) if expected != id => Err(ReconcileError::AccountMismatch {
                        feature: operation.feature,
                        expected,
                        actual: id,
                    }),
                    _ => {
                        *account_id = Some(id);
                        Ok(())
                    }
                };
            }
            OperationKind::RemoveFeature => {
                let id = onboarded(*account_id, operation)?;
                self.api
                    .remove_feature(id, operation.feature, delete_snapshots)
                    .await
            }
            OperationKind::TemporaryRemoveFeature => {
                let id = onboarded(*account_id, operation)?;
                self.api
                    .retire_feature(id, operation.feature, &operation.config)
                    .await
            }
            OperationKind::UpdateInPlace => {
                let id = onboarded(*account_id, operation)?;
                self.api
                    .update_feature(id, operation.feature, &operation.config)
                    .await
            }
            OperationKind::AcknowledgePermissions => {
                let id = onboarded(*account_id, operation)?;
                self.api.permissions_updated(id, operation.feature).await
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() && operation.kind.is_destructive() => {
                log::debug!("{} already removed", operation.feature);
                Ok(())
            }
            Err(source) => Err(fail(source)),
        }
    }
}

fn onboarded(account_id: Option<Uuid>, operation: &Operation) -> Result<Uuid, ReconcileError> {
    account_id.ok_or_else(|| ReconcileError::NotOnboarded {
        operation: operation.clone(),
    })
}
