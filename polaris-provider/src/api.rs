//! RSC API seam
//!
//! The vendor SDK is consumed through these traits. Implementations talk to
//! the RSC GraphQL API; [`crate::memory::MemoryApi`] keeps everything in
//! process for tests and local simulation.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::feature::{Cloud, Feature};
use crate::feature_config::{FeatureConfig, ManagedIdentity, ResourceGroup};

/// Error returned by the RSC API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The object does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Any other failure, reported verbatim
    #[error("{0}")]
    Remote(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Status of a feature on a cloud account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureStatus {
    Connected,
    Connecting,
    Disconnected,
    MissingPermissions,
    Refreshing,
}

impl FeatureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStatus::Connected => "CONNECTED",
            FeatureStatus::Connecting => "CONNECTING",
            FeatureStatus::Disconnected => "DISCONNECTED",
            FeatureStatus::MissingPermissions => "MISSING_PERMISSIONS",
            FeatureStatus::Refreshing => "REFRESHING",
        }
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature as last reported by RSC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFeature {
    pub status: FeatureStatus,
    pub regions: Vec<String>,
    #[serde(default)]
    pub permission_groups: BTreeSet<String>,
    #[serde(default)]
    pub resource_group: Option<ResourceGroup>,
    #[serde(default)]
    pub managed_identity: Option<ManagedIdentity>,
}

impl RemoteFeature {
    /// Configuration equivalent to the remote state, without a permissions
    /// signal
    pub fn config(&self) -> FeatureConfig {
        FeatureConfig {
            permission_groups: self.permission_groups.clone(),
            regions: self.regions.clone(),
            resource_group: self.resource_group.clone(),
            managed_identity: self.managed_identity.clone(),
            permissions: None,
        }
    }
}

/// RSC cloud account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub cloud: Cloud,
    /// Azure subscription id or AWS account number
    pub native_id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_domain: Option<String>,
    pub features: BTreeMap<Feature, RemoteFeature>,
}

/// Identity of the cloud account a feature is onboarded for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSpec {
    pub cloud: Cloud,
    pub native_id: String,
    pub name: String,
    pub tenant_domain: Option<String>,
}

/// Retention of existing snapshots when objects lose their SLA domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotRetention {
    #[default]
    RetainSnapshots,
    KeepForever,
    ExpireImmediately,
}

impl SnapshotRetention {
    pub const ALL: [SnapshotRetention; 3] = [
        SnapshotRetention::RetainSnapshots,
        SnapshotRetention::KeepForever,
        SnapshotRetention::ExpireImmediately,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotRetention::RetainSnapshots => "RETAIN_SNAPSHOTS",
            SnapshotRetention::KeepForever => "KEEP_FOREVER",
            SnapshotRetention::ExpireImmediately => "EXPIRE_IMMEDIATELY",
        }
    }
}

/// SLA domain assignment request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaAssignment {
    /// Domain to assign, `None` to stop protecting the objects
    pub domain_id: Option<Uuid>,
    pub object_ids: BTreeSet<Uuid>,
    /// Only used when `domain_id` is `None`
    pub retention: SnapshotRetention,
}

/// Cloud account endpoints
#[async_trait]
pub trait CloudAccountApi: Send + Sync {
    /// Onboard a feature, creating the account when it does not exist yet
    ///
    /// Returns the id of the account the feature was added to.
    async fn add_feature(
        &self,
        account: &AccountSpec,
        feature: Feature,
        config: &FeatureConfig,
    ) -> ApiResult<Uuid>;

    /// Remove a feature from the account
    ///
    /// Removing the last feature removes the account.
    async fn remove_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        delete_snapshots: bool,
    ) -> ApiResult<()>;

    /// Retire the artifacts of `retired` after the feature was re-onboarded
    /// with a new configuration
    ///
    /// The feature stays enabled and snapshots are always kept.
    async fn retire_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        retired: &FeatureConfig,
    ) -> ApiResult<()>;

    /// Additively update regions and permission groups
    async fn update_feature(
        &self,
        account_id: Uuid,
        feature: Feature,
        config: &FeatureConfig,
    ) -> ApiResult<()>;

    /// Tell RSC the permissions of a feature were updated out of band
    async fn permissions_updated(&self, account_id: Uuid, feature: Feature) -> ApiResult<()>;

    /// Rename an account
    async fn rename_account(&self, account_id: Uuid, name: &str) -> ApiResult<()>;

    /// Look up an account by id
    async fn account(&self, account_id: Uuid) -> ApiResult<Account>;

    /// Look up an account by its native id
    async fn account_by_native_id(
        &self,
        cloud: Cloud,
        native_id: &str,
    ) -> ApiResult<Option<Account>>;
}

/// SLA domain endpoints
#[async_trait]
pub trait SlaApi: Send + Sync {
    /// Request an assignment; RSC applies it asynchronously
    async fn assign_sla_domain(&self, assignment: &SlaAssignment) -> ApiResult<()>;

    /// Objects currently protected by a domain
    async fn protected_objects(&self, domain_id: Uuid) -> ApiResult<BTreeSet<Uuid>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_distinguished() {
        assert!(ApiError::NotFound("account".to_string()).is_not_found());
        assert!(!ApiError::Remote("boom".to_string()).is_not_found());
        assert_eq!(
            ApiError::NotFound("account 1".to_string()).to_string(),
            "account 1 not found"
        );
    }

    #[test]
    fn remote_feature_config_has_no_signal() {
        let remote = RemoteFeature {
            status: FeatureStatus::Connected,
            regions: vec!["eastus".to_string()],
            permission_groups: BTreeSet::from(["BASIC".to_string()]),
            resource_group: None,
            managed_identity: None,
        };
        let config = remote.config();
        assert_eq!(config.regions, vec!["eastus"]);
        assert!(config.permissions.is_none());
    }

    #[test]
    fn status_serializes_in_api_form() {
        let json = serde_json::to_string(&FeatureStatus::MissingPermissions).unwrap();
        assert_eq!(json, "\"MISSING_PERMISSIONS\"");
    }
}
