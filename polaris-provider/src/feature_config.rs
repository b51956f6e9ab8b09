//! Typed feature configuration
//!
//! Feature blocks arrive as loosely typed attribute maps. They are decoded
//! once here into [`FeatureConfig`] values, validated, and everything past
//! this module works with the typed form.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use polaris_core::differ::{maps_differ, sets_differ};
use polaris_core::resource::Value;
use serde::{Deserialize, Serialize};

use crate::feature::{Cloud, Feature, FeatureEntry, FeatureRegistry};
use crate::validation::{ValidationError, validate_permission_group, validate_region};

/// Feature configurations keyed by feature
pub type FeatureConfigs = BTreeMap<Feature, FeatureConfig>;

/// Azure resource group holding the resources RSC creates for a feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    pub name: String,
    pub region: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ResourceGroup {
    fn differs(&self, other: &ResourceGroup) -> bool {
        self.name != other.name
            || self.region != other.region
            || maps_differ(&self.tags, &other.tags)
    }
}

/// User-assigned managed identity used by a feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedIdentity {
    pub name: String,
    pub principal_id: String,
    pub region: String,
    pub resource_group_name: String,
}

/// Desired configuration of one feature
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(default)]
    pub permission_groups: BTreeSet<String>,
    /// Regions in declaration order; compared as a set
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub resource_group: Option<ResourceGroup>,
    #[serde(default)]
    pub managed_identity: Option<ManagedIdentity>,
    /// Opaque signal; a new value tells RSC permissions were updated
    #[serde(default)]
    pub permissions: Option<String>,
}

impl FeatureConfig {
    /// The resource group or managed identity changed, which needs a
    /// re-onboard
    pub fn structural_change(&self, other: &FeatureConfig) -> bool {
        let resource_group = match (&self.resource_group, &other.resource_group) {
            (Some(a), Some(b)) => a.differs(b),
            (None, None) => false,
            _ => true,
        };
        resource_group || self.managed_identity != other.managed_identity
    }

    /// Regions or permission groups changed, which is updated in place
    pub fn in_place_change(&self, other: &FeatureConfig) -> bool {
        sets_differ(&self.regions, &other.regions)
            || sets_differ(&self.permission_groups, &other.permission_groups)
    }

    /// Only the permissions signal differs
    pub fn permissions_change(&self, other: &FeatureConfig) -> bool {
        self.permissions != other.permissions
    }

    /// Decode a feature block
    pub fn from_value(
        cloud: Cloud,
        entry: &FeatureEntry,
        value: &Value,
    ) -> Result<Self, Vec<ValidationError>> {
        let path = entry.key;
        let Some(map) = value.as_map() else {
            return Err(vec![ValidationError::new(path, "expected a block")]);
        };

        let mut errors = Vec::new();
        let mut config = FeatureConfig::default();

        if let Some(value) = map.get("regions") {
            match string_list(value) {
                Some(regions) => {
                    for region in &regions {
                        if let Err(message) = validate_region(cloud, region) {
                            errors.push(ValidationError::new(format!("{}.regions", path), message));
                        }
                    }
                    config.regions = dedup_preserving_order(regions);
                }
                None => errors.push(ValidationError::new(
                    format!("{}.regions", path),
                    "expected a list of strings",
                )),
            }
        }
        if config.regions.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.regions", path),
                "at least one region is required",
            ));
        }

        if let Some(value) = map.get("permission_groups") {
            match string_list(value) {
                Some(groups) => {
                    for group in &groups {
                        if let Err(message) = validate_permission_group(group) {
                            errors.push(ValidationError::new(
                                format!("{}.permission_groups", path),
                                message,
                            ));
                        }
                    }
                    config.permission_groups = groups.into_iter().collect();
                }
                None => errors.push(ValidationError::new(
                    format!("{}.permission_groups", path),
                    "expected a list of strings",
                )),
            }
        }

        match map.get("permissions") {
            Some(Value::String(s)) => config.permissions = Some(s.clone()),
            Some(_) => errors.push(ValidationError::new(
                format!("{}.permissions", path),
                "expected a string",
            )),
            None => {}
        }

        match map.get("resource_group") {
            Some(_) if !entry.supports_resource_group => errors.push(ValidationError::new(
                format!("{}.resource_group", path),
                format!("not supported for {} accounts", cloud),
            )),
            Some(value) => match decode_resource_group(cloud, path, value) {
                Ok(rg) => config.resource_group = Some(rg),
                Err(mut e) => errors.append(&mut e),
            },
            None => {}
        }

        match map.get("managed_identity") {
            Some(_) if !entry.supports_resource_group => errors.push(ValidationError::new(
                format!("{}.managed_identity", path),
                format!("not supported for {} accounts", cloud),
            )),
            Some(value) => match decode_managed_identity(cloud, path, value) {
                Ok(mi) => config.managed_identity = Some(mi),
                Err(mut e) => errors.append(&mut e),
            },
            None if entry.requires_managed_identity => errors.push(ValidationError::new(
                format!("{}.managed_identity", path),
                "a managed identity is required",
            )),
            None => {}
        }

        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }

    /// Encode into a feature block, with the remote status when known
    pub fn to_value(&self, status: Option<&str>) -> Value {
        let mut map = HashMap::new();
        map.insert(
            "regions".to_string(),
            Value::string_list(self.regions.iter().cloned()),
        );
        if !self.permission_groups.is_empty() {
            map.insert(
                "permission_groups".to_string(),
                Value::string_list(self.permission_groups.iter().cloned()),
            );
        }
        if let Some(permissions) = &self.permissions {
            map.insert("permissions".to_string(), Value::from(permissions.clone()));
        }
        if let Some(rg) = &self.resource_group {
            let tags = rg
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                .collect();
            map.insert(
                "resource_group".to_string(),
                Value::Map(HashMap::from([
                    ("name".to_string(), Value::from(rg.name.clone())),
                    ("region".to_string(), Value::from(rg.region.clone())),
                    ("tags".to_string(), Value::Map(tags)),
                ])),
            );
        }
        if let Some(mi) = &self.managed_identity {
            map.insert(
                "managed_identity".to_string(),
                Value::Map(HashMap::from([
                    ("name".to_string(), Value::from(mi.name.clone())),
                    ("principal_id".to_string(), Value::from(mi.principal_id.clone())),
                    ("region".to_string(), Value::from(mi.region.clone())),
                    (
                        "resource_group_name".to_string(),
                        Value::from(mi.resource_group_name.clone()),
                    ),
                ])),
            );
        }
        if let Some(status) = status {
            map.insert("status".to_string(), Value::from(status));
        }
        Value::Map(map)
    }
}

/// Decode every feature block of a resource's attributes
pub fn decode_features(
    registry: &FeatureRegistry,
    attributes: &HashMap<String, Value>,
) -> Result<FeatureConfigs, Vec<ValidationError>> {
    let mut configs = FeatureConfigs::new();
    let mut errors = Vec::new();

    for entry in registry.entries() {
        if let Some(value) = attributes.get(entry.key) {
            match FeatureConfig::from_value(registry.cloud(), entry, value) {
                Ok(config) => {
                    configs.insert(entry.feature, config);
                }
                Err(mut e) => errors.append(&mut e),
            }
        }
    }

    if errors.is_empty() {
        Ok(configs)
    } else {
        Err(errors)
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_list()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn dedup_preserving_order(values: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn required_string(
    map: &HashMap<String, Value>,
    path: &str,
    field: &str,
    errors: &mut Vec<ValidationError>,
) -> String {
    match map.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => {
            errors.push(ValidationError::new(
                format!("{}.{}", path, field),
                "a non-empty string is required",
            ));
            String::new()
        }
    }
}

fn decode_resource_group(
    cloud: Cloud,
    path: &str,
    value: &Value,
) -> Result<ResourceGroup, Vec<ValidationError>> {
    let path = format!("{}.resource_group", path);
    let Some(map) = value.as_map() else {
        return Err(vec![ValidationError::new(path, "expected a block")]);
    };

    let mut errors = Vec::new();
    let name = required_string(map, &path, "name", &mut errors);
    let region = required_string(map, &path, "region", &mut errors);
    if !region.is_empty()
        && let Err(message) = validate_region(cloud, &region)
    {
        errors.push(ValidationError::new(format!("{}.region", path), message));
    }

    let mut tags = HashMap::new();
    match map.get("tags") {
        Some(Value::Map(entries)) => {
            for (k, v) in entries {
                match v.as_str() {
                    Some(s) => {
                        tags.insert(k.clone(), s.to_string());
                    }
                    None => errors.push(ValidationError::new(
                        format!("{}.tags.{}", path, k),
                        "expected a string",
                    )),
                }
            }
        }
        Some(_) => errors.push(ValidationError::new(
            format!("{}.tags", path),
            "expected a map of strings",
        )),
        None => {}
    }

    if errors.is_empty() {
        Ok(ResourceGroup { name, region, tags })
    } else {
        Err(errors)
    }
}

fn decode_managed_identity(
    cloud: Cloud,
    path: &str,
    value: &Value,
) -> Result<ManagedIdentity, Vec<ValidationError>> {
    let path = format!("{}.managed_identity", path);
    let Some(map) = value.as_map() else {
        return Err(vec![ValidationError::new(path, "expected a block")]);
    };

    let mut errors = Vec::new();
    let name = required_string(map, &path, "name", &mut errors);
    let principal_id = required_string(map, &path, "principal_id", &mut errors);
    let region = required_string(map, &path, "region", &mut errors);
    let resource_group_name = required_string(map, &path, "resource_group_name", &mut errors);

    if !principal_id.is_empty()
        && let Err(message) = polaris_core::schema::validate_uuid(&principal_id)
    {
        errors.push(ValidationError::new(
            format!("{}.principal_id", path),
            message,
        ));
    }
    if !region.is_empty()
        && let Err(message) = validate_region(cloud, &region)
    {
        errors.push(ValidationError::new(format!("{}.region", path), message));
    }

    if errors.is_empty() {
        Ok(ManagedIdentity {
            name,
            principal_id,
            region,
            resource_group_name,
        })
    } else {
        Err(errors)
    }
}
