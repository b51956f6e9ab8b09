//! Feature registry
//!
//! Every cloud has a fixed set of features that can be enabled on an RSC
//! cloud account. The registry records, per feature, the resource block key
//! and the execution orders the reconciler sorts operations by.
//!
//! Order bands, lowest first:
//!
//! | band          | Azure / AWS |
//! |---------------|-------------|
//! | add, update   | 1 - 9       |
//! | split add     | 11 - 19     |
//! | split remove  | 21 - 29     |
//! | remove        | 31 - 39     |
//!
//! Archival encryption depends on archival: it is added after archival and
//! removed before it, in every band.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Cloud vendor of an RSC cloud account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Azure,
    Aws,
}

impl Cloud {
    /// Resource type name managing accounts of this cloud
    pub fn resource_type(self) -> &'static str {
        match self {
            Cloud::Azure => "azure_subscription",
            Cloud::Aws => "aws_account",
        }
    }

    /// Look up the cloud managed by a resource type
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        match resource_type {
            "azure_subscription" => Some(Cloud::Azure),
            "aws_account" => Some(Cloud::Aws),
            _ => None,
        }
    }
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cloud::Azure => write!(f, "azure"),
            Cloud::Aws => write!(f, "aws"),
        }
    }
}

/// Capability that can be enabled on a cloud account
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Feature {
    #[serde(rename = "CLOUD_NATIVE_PROTECTION")]
    CloudNativeProtection,
    #[serde(rename = "CLOUD_NATIVE_ARCHIVAL")]
    CloudNativeArchival,
    #[serde(rename = "CLOUD_NATIVE_ARCHIVAL_ENCRYPTION")]
    CloudNativeArchivalEncryption,
    #[serde(rename = "CLOUD_NATIVE_BLOB_PROTECTION")]
    CloudNativeBlobProtection,
    #[serde(rename = "CLOUD_NATIVE_S3_PROTECTION")]
    CloudNativeS3Protection,
    #[serde(rename = "CLOUD_NATIVE_DYNAMODB_PROTECTION")]
    CloudNativeDynamoDbProtection,
    #[serde(rename = "AZURE_SQL_DB_PROTECTION")]
    AzureSqlDbProtection,
    #[serde(rename = "AZURE_SQL_MI_PROTECTION")]
    AzureSqlMiProtection,
    #[serde(rename = "EXOCOMPUTE")]
    Exocompute,
    #[serde(rename = "RDS_PROTECTION")]
    RdsProtection,
    #[serde(rename = "SERVERS_AND_APPS")]
    ServersAndApps,
}

impl Feature {
    pub const ALL: [Feature; 11] = [
        Feature::CloudNativeProtection,
        Feature::CloudNativeArchival,
        Feature::CloudNativeArchivalEncryption,
        Feature::CloudNativeBlobProtection,
        Feature::CloudNativeS3Protection,
        Feature::CloudNativeDynamoDbProtection,
        Feature::AzureSqlDbProtection,
        Feature::AzureSqlMiProtection,
        Feature::Exocompute,
        Feature::RdsProtection,
        Feature::ServersAndApps,
    ];

    /// API name of the feature
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::CloudNativeProtection => "CLOUD_NATIVE_PROTECTION",
            Feature::CloudNativeArchival => "CLOUD_NATIVE_ARCHIVAL",
            Feature::CloudNativeArchivalEncryption => "CLOUD_NATIVE_ARCHIVAL_ENCRYPTION",
            Feature::CloudNativeBlobProtection => "CLOUD_NATIVE_BLOB_PROTECTION",
            Feature::CloudNativeS3Protection => "CLOUD_NATIVE_S3_PROTECTION",
            Feature::CloudNativeDynamoDbProtection => "CLOUD_NATIVE_DYNAMODB_PROTECTION",
            Feature::AzureSqlDbProtection => "AZURE_SQL_DB_PROTECTION",
            Feature::AzureSqlMiProtection => "AZURE_SQL_MI_PROTECTION",
            Feature::Exocompute => "EXOCOMPUTE",
            Feature::RdsProtection => "RDS_PROTECTION",
            Feature::ServersAndApps => "SERVERS_AND_APPS",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown feature '{}'", s))
    }
}

/// Execution orders of one feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureOrder {
    /// Enabling the feature, and in-place updates
    pub add: u32,
    /// Re-onboarding with a new resource group or managed identity
    pub split_add: u32,
    /// Retiring the previous configuration after a re-onboard
    pub split_remove: u32,
    /// Disabling the feature
    pub remove: u32,
}

impl FeatureOrder {
    const fn new(add: u32, split_add: u32, split_remove: u32, remove: u32) -> Self {
        Self {
            add,
            split_add,
            split_remove,
            remove,
        }
    }
}

/// Registry entry of a feature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureEntry {
    pub feature: Feature,
    /// Resource block name (e.g., "cloud_native_protection")
    pub key: &'static str,
    pub order: FeatureOrder,
    /// Feature takes a resource group and managed identity (Azure only)
    pub supports_resource_group: bool,
    /// Feature cannot be onboarded without a managed identity
    pub requires_managed_identity: bool,
}

const fn azure(feature: Feature, key: &'static str, order: FeatureOrder) -> FeatureEntry {
    FeatureEntry {
        feature,
        key,
        order,
        supports_resource_group: true,
        requires_managed_identity: false,
    }
}

const fn aws(feature: Feature, key: &'static str, order: FeatureOrder) -> FeatureEntry {
    FeatureEntry {
        feature,
        key,
        order,
        supports_resource_group: false,
        requires_managed_identity: false,
    }
}

/// Immutable table of the features of one cloud, in declaration order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRegistry {
    cloud: Cloud,
    entries: Vec<FeatureEntry>,
}

impl FeatureRegistry {
    /// Features of Azure subscriptions
    pub fn azure() -> Self {
        let mut encryption = azure(
            Feature::CloudNativeArchivalEncryption,
            "cloud_native_archival_encryption",
            FeatureOrder::new(3, 13, 22, 35),
        );
        encryption.requires_managed_identity = true;

        Self::new(
            Cloud::Azure,
            vec![
                azure(
                    Feature::CloudNativeProtection,
                    "cloud_native_protection",
                    FeatureOrder::new(1, 11, 21, 37),
                ),
                azure(
                    Feature::CloudNativeArchival,
                    "cloud_native_archival",
                    FeatureOrder::new(2, 12, 23, 36),
                ),
                encryption,
                azure(
                    Feature::CloudNativeBlobProtection,
                    "cloud_native_blob_protection",
                    FeatureOrder::new(4, 14, 24, 34),
                ),
                azure(
                    Feature::AzureSqlDbProtection,
                    "sql_db_protection",
                    FeatureOrder::new(5, 15, 25, 33),
                ),
                azure(
                    Feature::AzureSqlMiProtection,
                    "sql_mi_protection",
                    FeatureOrder::new(6, 16, 26, 32),
                ),
                azure(
                    Feature::Exocompute,
                    "exocompute",
                    FeatureOrder::new(7, 17, 27, 31),
                ),
            ],
        )
    }

    /// Features of AWS accounts
    pub fn aws() -> Self {
        Self::new(
            Cloud::Aws,
            vec![
                aws(
                    Feature::CloudNativeProtection,
                    "cloud_native_protection",
                    FeatureOrder::new(1, 11, 21, 37),
                ),
                aws(
                    Feature::CloudNativeArchival,
                    "cloud_native_archival",
                    FeatureOrder::new(2, 12, 22, 36),
                ),
                aws(
                    Feature::CloudNativeDynamoDbProtection,
                    "cloud_native_dynamodb_protection",
                    FeatureOrder::new(3, 13, 23, 35),
                ),
                aws(
                    Feature::CloudNativeS3Protection,
                    "cloud_native_s3_protection",
                    FeatureOrder::new(4, 14, 24, 34),
                ),
                aws(
                    Feature::Exocompute,
                    "exocompute",
                    FeatureOrder::new(5, 15, 25, 33),
                ),
                aws(
                    Feature::RdsProtection,
                    "rds_protection",
                    FeatureOrder::new(6, 16, 26, 32),
                ),
                aws(
                    Feature::ServersAndApps,
                    "servers_and_apps",
                    FeatureOrder::new(7, 17, 27, 31),
                ),
            ],
        )
    }

    fn new(cloud: Cloud, entries: Vec<FeatureEntry>) -> Self {
        let registry = Self { cloud, entries };
        debug_assert_eq!(registry.check_orders(), Ok(()));
        registry
    }

    pub fn for_cloud(cloud: Cloud) -> Self {
        match cloud {
            Cloud::Azure => Self::azure(),
            Cloud::Aws => Self::aws(),
        }
    }

    pub fn cloud(&self) -> Cloud {
        self.cloud
    }

    pub fn entries(&self) -> &[FeatureEntry] {
        &self.entries
    }

    pub fn get(&self, feature: Feature) -> Option<&FeatureEntry> {
        self.entries.iter().find(|e| e.feature == feature)
    }

    pub fn by_key(&self, key: &str) -> Option<&FeatureEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Check the ordering guarantees the reconciler relies on
    ///
    /// Every add order sits below every split-add order, every split-add
    /// order below every remove order, and each feature's split-add runs
    /// before its split-remove.
    pub fn check_orders(&self) -> Result<(), String> {
        let max_add = self.entries.iter().map(|e| e.order.add).max();
        let min_split_add = self.entries.iter().map(|e| e.order.split_add).min();
        let max_split_add = self.entries.iter().map(|e| e.order.split_add).max();
        let min_remove = self.entries.iter().map(|e| e.order.remove).min();

        if let (Some(max_add), Some(min_split_add)) = (max_add, min_split_add)
            && max_add >= min_split_add
        {
            return Err(format!(
                "{}: add order {} overlaps split-add order {}",
                self.cloud, max_add, min_split_add
            ));
        }
        if let (Some(max_split_add), Some(min_remove)) = (max_split_add, min_remove)
            && max_split_add >= min_remove
        {
            return Err(format!(
                "{}: split-add order {} overlaps remove order {}",
                self.cloud, max_split_add, min_remove
            ));
        }
        for entry in &self.entries {
            if entry.order.split_add >= entry.order.split_remove {
                return Err(format!(
                    "{}: split-add of {} does not run before its split-remove",
                    self.cloud, entry.feature
                ));
            }
            if entry.order.add >= entry.order.remove {
                return Err(format!(
                    "{}: add of {} does not run before its remove",
                    self.cloud, entry.feature
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registries() -> [FeatureRegistry; 2] {
        [FeatureRegistry::azure(), FeatureRegistry::aws()]
    }

    #[test]
    fn orders_are_consistent() {
        for registry in registries() {
            assert_eq!(registry.check_orders(), Ok(()));
        }
    }

    #[test]
    fn add_precedes_remove_for_every_feature() {
        for registry in registries() {
            for entry in registry.entries() {
                assert!(entry.order.add < entry.order.remove, "{}", entry.feature);
            }
        }
    }

    #[test]
    fn split_add_precedes_every_plain_remove() {
        for registry in registries() {
            for f in registry.entries() {
                for g in registry.entries() {
                    assert!(
                        f.order.split_add < g.order.remove,
                        "{} split-add vs {} remove",
                        f.feature,
                        g.feature
                    );
                    assert!(g.order.add < f.order.split_add);
                }
            }
        }
    }

    #[test]
    fn archival_encryption_follows_archival() {
        let registry = FeatureRegistry::azure();
        let archival = registry.get(Feature::CloudNativeArchival).unwrap().order;
        let encryption = registry
            .get(Feature::CloudNativeArchivalEncryption)
            .unwrap()
            .order;

        assert!(archival.add < encryption.add);
        assert!(archival.split_add < encryption.split_add);
        assert!(encryption.split_remove < archival.split_remove);
        assert!(encryption.remove < archival.remove);
    }

    #[test]
    fn overlapping_orders_are_reported() {
        let mut registry = FeatureRegistry::aws();
        registry.entries[0].order.add = 12;
        assert!(registry.check_orders().is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "overlaps")]
    fn inconsistent_tables_are_rejected_on_construction() {
        let mut entries = FeatureRegistry::aws().entries;
        entries[0].order.add = 12;
        FeatureRegistry::new(Cloud::Aws, entries);
    }

    #[test]
    fn keys_and_features_are_unique() {
        for registry in registries() {
            let mut keys: Vec<_> = registry.entries().iter().map(|e| e.key).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), registry.entries().len());
        }
    }

    #[test]
    fn feature_names_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.as_str().parse::<Feature>(), Ok(feature));
        }
        assert!("NOPE".parse::<Feature>().is_err());
    }

    #[test]
    fn lookup_by_key() {
        let registry = FeatureRegistry::azure();
        let entry = registry.by_key("sql_db_protection").unwrap();
        assert_eq!(entry.feature, Feature::AzureSqlDbProtection);
        assert!(FeatureRegistry::aws().by_key("sql_db_protection").is_none());
        assert_eq!(Cloud::from_resource_type("aws_account"), Some(Cloud::Aws));
    }
}
