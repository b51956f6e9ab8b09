//! Validation of cloud-specific identifiers
//!
//! These checks back the custom schema types and run on every decoded
//! feature configuration, so malformed input fails before any API call.

use std::sync::LazyLock;

use polaris_core::resource::Value;
use regex::Regex;

use crate::feature::Cloud;

static AZURE_REGION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]+[a-z0-9]*$").expect("valid regex"));

static AWS_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(?:-gov|-iso[a-z]?)?-[a-z]+-[0-9]{1,2}$").expect("valid regex")
});

static AWS_ACCOUNT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{12}$").expect("valid regex"));

static DOMAIN_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$")
        .expect("valid regex")
});

/// Permission groups accepted by RSC
pub const PERMISSION_GROUPS: &[&str] = &[
    "BASIC",
    "CLOUD_CLUSTER_ES",
    "CUSTOMER_MANAGED_BASIC",
    "ENCRYPTION",
    "EXPORT_AND_RESTORE",
    "FILE_LEVEL_RECOVERY",
    "PRIVATE_ENDPOINT",
    "RECOVERY",
    "RSC_MANAGED_CLUSTER",
    "SNAPSHOT_PRIVATE_ACCESS",
    "SQL_ARCHIVAL",
];

/// Validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a region name for the given cloud
pub fn validate_region(cloud: Cloud, region: &str) -> Result<(), String> {
    let valid = match cloud {
        Cloud::Azure => AZURE_REGION.is_match(region),
        Cloud::Aws => AWS_REGION.is_match(region),
    };
    if valid {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid {} region", region, cloud))
    }
}

/// Validate the native identifier of a cloud account
///
/// Azure subscriptions are identified by a UUID, AWS accounts by a
/// 12 digit account number.
pub fn validate_native_id(cloud: Cloud, native_id: &str) -> Result<(), String> {
    match cloud {
        Cloud::Azure => polaris_core::schema::validate_uuid(native_id),
        Cloud::Aws if AWS_ACCOUNT_ID.is_match(native_id) => Ok(()),
        Cloud::Aws => Err(format!(
            "'{}' is not a valid AWS account id: expected 12 digits",
            native_id
        )),
    }
}

/// Validate an Azure tenant domain (e.g., "contoso.onmicrosoft.com")
pub fn validate_tenant_domain(domain: &str) -> Result<(), String> {
    if DOMAIN_NAME.is_match(domain) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid tenant domain", domain))
    }
}

/// Validate a permission group name
pub fn validate_permission_group(group: &str) -> Result<(), String> {
    if PERMISSION_GROUPS.contains(&group) {
        Ok(())
    } else {
        Err(format!(
            "Invalid permission group '{}'. Must be one of: {}",
            group,
            PERMISSION_GROUPS.join(", ")
        ))
    }
}

/// Schema validator for Azure region values
pub fn azure_region_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_region(Cloud::Azure, s),
        _ => Err("Expected string".to_string()),
    }
}

/// Schema validator for AWS region values
pub fn aws_region_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_region(Cloud::Aws, s),
        _ => Err("Expected string".to_string()),
    }
}

/// Schema validator for permission group values
pub fn permission_group_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_permission_group(s),
        _ => Err("Expected string".to_string()),
    }
}

/// Schema validator for tenant domain values
pub fn tenant_domain_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_tenant_domain(s),
        _ => Err("Expected string".to_string()),
    }
}

/// Schema validator for AWS account ids
pub fn aws_account_id_value(value: &Value) -> Result<(), String> {
    match value {
        Value::String(s) => validate_native_id(Cloud::Aws, s),
        _ => Err("Expected string".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn azure_regions() {
        assert!(validate_region(Cloud::Azure, "eastus").is_ok());
        assert!(validate_region(Cloud::Azure, "westeurope").is_ok());
        assert!(validate_region(Cloud::Azure, "eastus2").is_ok());
        assert!(validate_region(Cloud::Azure, "East US").is_err());
        assert!(validate_region(Cloud::Azure, "us-east-1").is_err());
    }

    #[test]
    fn aws_regions() {
        assert!(validate_region(Cloud::Aws, "us-east-1").is_ok());
        assert!(validate_region(Cloud::Aws, "ap-northeast-1").is_ok());
        assert!(validate_region(Cloud::Aws, "us-gov-west-1").is_ok());
        assert!(validate_region(Cloud::Aws, "eastus").is_err());
    }

    #[test]
    fn native_ids() {
        assert!(validate_native_id(Cloud::Aws, "123456789012").is_ok());
        assert!(validate_native_id(Cloud::Aws, "12345").is_err());
        assert!(
            validate_native_id(Cloud::Azure, "8fa81a5e-a236-4a73-8e28-e1dcf863c56d").is_ok()
        );
        assert!(validate_native_id(Cloud::Azure, "123456789012").is_err());
    }

    #[test]
    fn tenant_domains() {
        assert!(validate_tenant_domain("contoso.onmicrosoft.com").is_ok());
        assert!(validate_tenant_domain("contoso").is_err());
    }

    #[test]
    fn permission_groups() {
        assert!(validate_permission_group("BASIC").is_ok());
        let err = validate_permission_group("basic").unwrap_err();
        assert!(err.contains("Must be one of"));
    }

    #[test]
    fn value_validators_reject_non_strings() {
        assert!(azure_region_value(&Value::Int(1)).is_err());
        assert!(aws_region_value(&Value::from("us-west-2")).is_ok());
    }
}
