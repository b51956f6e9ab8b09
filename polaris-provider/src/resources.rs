//! Resource types and their schemas
//!
//! Every resource type exposes a schema used to validate declared
//! attributes. Cloud account schemas carry one block per registry feature.

use polaris_core::provider::ResourceType;
use polaris_core::resource::Value;
use polaris_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use crate::api::SnapshotRetention;
use crate::feature::{Cloud, FeatureEntry, FeatureRegistry};
use crate::validation::{
    aws_account_id_value, aws_region_value, azure_region_value, permission_group_value,
    tenant_domain_value,
};

pub const AZURE_SUBSCRIPTION: &str = "azure_subscription";
pub const AWS_ACCOUNT: &str = "aws_account";
pub const SLA_DOMAIN_ASSIGNMENT: &str = "sla_domain_assignment";

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema
            }
        }
    };
}

define_resource_type!(
    AzureSubscriptionType,
    AZURE_SUBSCRIPTION,
    account_schema(Cloud::Azure)
);
define_resource_type!(AwsAccountType, AWS_ACCOUNT, account_schema(Cloud::Aws));
define_resource_type!(
    SlaDomainAssignmentType,
    SLA_DOMAIN_ASSIGNMENT,
    sla_domain_assignment_schema()
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(AzureSubscriptionType),
        Box::new(AwsAccountType),
        Box::new(SlaDomainAssignmentType),
    ]
}

/// Look up the schema of a resource type
pub fn schema_for(resource_type: &str) -> Option<ResourceSchema> {
    resource_types()
        .into_iter()
        .find(|t| t.name() == resource_type)
        .map(|t| t.schema())
}

fn region_type(cloud: Cloud) -> AttributeType {
    match cloud {
        Cloud::Azure => AttributeType::Custom {
            name: "AzureRegion".to_string(),
            base: Box::new(AttributeType::String),
            validate: azure_region_value,
        },
        Cloud::Aws => AttributeType::Custom {
            name: "AwsRegion".to_string(),
            base: Box::new(AttributeType::String),
            validate: aws_region_value,
        },
    }
}

fn permission_group_type() -> AttributeType {
    AttributeType::Custom {
        name: "PermissionGroup".to_string(),
        base: Box::new(AttributeType::String),
        validate: permission_group_value,
    }
}

fn resource_group_schema(cloud: Cloud) -> ResourceSchema {
    ResourceSchema::new("resource_group")
        .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
        .attribute(AttributeSchema::new("region", region_type(cloud)).required())
        .attribute(AttributeSchema::new(
            "tags",
            AttributeType::Map(Box::new(AttributeType::String)),
        ))
}

fn managed_identity_schema(cloud: Cloud) -> ResourceSchema {
    ResourceSchema::new("managed_identity")
        .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
        .attribute(AttributeSchema::new("principal_id", types::uuid()).required())
        .attribute(AttributeSchema::new("region", region_type(cloud)).required())
        .attribute(
            AttributeSchema::new("resource_group_name", types::non_empty_string()).required(),
        )
}

/// Schema of one feature block
pub fn feature_schema(cloud: Cloud, entry: &FeatureEntry) -> ResourceSchema {
    let mut schema = ResourceSchema::new(entry.key)
        .with_description(format!("Enables {}", entry.feature))
        .attribute(
            AttributeSchema::new("regions", AttributeType::List(Box::new(region_type(cloud))))
                .required()
                .with_description("Regions the feature protects"),
        )
        .attribute(AttributeSchema::new(
            "permission_groups",
            AttributeType::Set(Box::new(permission_group_type())),
        ))
        .attribute(
            AttributeSchema::new("permissions", AttributeType::String).with_description(
                "Changing this value signals that permissions were updated out of band",
            ),
        )
        .attribute(
            AttributeSchema::new("status", AttributeType::String)
                .computed()
                .with_description("Status reported by RSC"),
        );

    if entry.supports_resource_group {
        schema = schema
            .attribute(AttributeSchema::new(
                "resource_group",
                AttributeType::Block(Box::new(resource_group_schema(cloud))),
            ))
            .attribute({
                let mi = AttributeSchema::new(
                    "managed_identity",
                    AttributeType::Block(Box::new(managed_identity_schema(cloud))),
                );
                if entry.requires_managed_identity {
                    mi.required()
                } else {
                    mi
                }
            });
    }
    schema
}

/// Schema of a cloud account resource
pub fn account_schema(cloud: Cloud) -> ResourceSchema {
    let registry = FeatureRegistry::for_cloud(cloud);

    let native_id = match cloud {
        Cloud::Azure => AttributeSchema::new("native_id", types::uuid())
            .with_description("Azure subscription id"),
        Cloud::Aws => AttributeSchema::new(
            "native_id",
            AttributeType::Custom {
                name: "AwsAccountId".to_string(),
                base: Box::new(AttributeType::String),
                validate: aws_account_id_value,
            },
        )
        .with_description("AWS account number"),
    };

    let mut schema = ResourceSchema::new(cloud.resource_type())
        .with_description(format!("RSC {} cloud account", cloud))
        .attribute(native_id.required().force_new())
        .attribute(
            AttributeSchema::new("name", types::non_empty_string())
                .with_description("Account name in RSC (defaults to the resource name)"),
        )
        .attribute(
            AttributeSchema::new("delete_snapshots_on_destroy", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Delete snapshots when a feature is removed"),
        )
        .attribute(
            AttributeSchema::new("account_id", types::uuid())
                .computed()
                .with_description("RSC cloud account id"),
        );

    if cloud == Cloud::Azure {
        schema = schema.attribute(
            AttributeSchema::new(
                "tenant_domain",
                AttributeType::Custom {
                    name: "TenantDomain".to_string(),
                    base: Box::new(AttributeType::String),
                    validate: tenant_domain_value,
                },
            )
            .required()
            .force_new(),
        );
    }

    for entry in registry.entries() {
        schema = schema.attribute(AttributeSchema::new(
            entry.key,
            AttributeType::Block(Box::new(feature_schema(cloud, entry))),
        ));
    }
    schema
}

/// Schema of an SLA domain assignment
pub fn sla_domain_assignment_schema() -> ResourceSchema {
    ResourceSchema::new(SLA_DOMAIN_ASSIGNMENT)
        .with_description("Objects protected by an SLA domain")
        .attribute(
            AttributeSchema::new("sla_domain_id", types::uuid())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("object_ids", AttributeType::Set(Box::new(types::uuid())))
                .required(),
        )
        .attribute(
            AttributeSchema::new(
                "retention_on_unassign",
                AttributeType::Enum(
                    SnapshotRetention::ALL
                        .iter()
                        .map(|r| r.as_str().to_string())
                        .collect(),
                ),
            )
            .with_default(Value::from(SnapshotRetention::default().as_str())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use polaris_core::schema::TypeError;
    use std::collections::HashMap;

    fn feature_block(regions: &[&str]) -> Value {
        Value::Map(HashMap::from([(
            "regions".to_string(),
            Value::string_list(regions.iter().copied()),
        )]))
    }

    #[test]
    fn every_resource_type_has_a_schema() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
        assert!(schema_for("s3_bucket").is_none());
    }

    #[test]
    fn valid_azure_subscription() {
        let schema = account_schema(Cloud::Azure);
        let attrs = HashMap::from([
            (
                "native_id".to_string(),
                Value::from("8fa81a5e-a236-4a73-8e28-e1dcf863c56d"),
            ),
            (
                "tenant_domain".to_string(),
                Value::from("contoso.onmicrosoft.com"),
            ),
            ("cloud_native_protection".to_string(), feature_block(&["eastus"])),
        ]);
        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn aws_region_in_azure_block_is_rejected() {
        let schema = account_schema(Cloud::Azure);
        let attrs = HashMap::from([
            (
                "native_id".to_string(),
                Value::from("8fa81a5e-a236-4a73-8e28-e1dcf863c56d"),
            ),
            (
                "tenant_domain".to_string(),
                Value::from("contoso.onmicrosoft.com"),
            ),
            ("exocompute".to_string(), feature_block(&["us-east-1"])),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(errors[0], TypeError::BlockError { .. }));
    }

    #[test]
    fn aws_blocks_have_no_resource_group() {
        let registry = FeatureRegistry::aws();
        let entry = registry.by_key("exocompute").unwrap();
        let schema = feature_schema(Cloud::Aws, entry);
        assert!(!schema.attributes.contains_key("resource_group"));
        assert!(!schema.attributes.contains_key("managed_identity"));
    }

    #[test]
    fn encryption_requires_managed_identity() {
        let registry = FeatureRegistry::azure();
        let entry = registry.by_key("cloud_native_archival_encryption").unwrap();
        let schema = feature_schema(Cloud::Azure, entry);
        assert!(schema.attributes["managed_identity"].required);
    }

    #[test]
    fn status_is_computed() {
        let schema = account_schema(Cloud::Aws);
        let attrs = HashMap::from([
            ("native_id".to_string(), Value::from("123456789012")),
            (
                "cloud_native_protection".to_string(),
                Value::Map(HashMap::from([
                    ("regions".to_string(), Value::string_list(["us-east-1"])),
                    ("status".to_string(), Value::from("CONNECTED")),
                ])),
            ),
        ]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(errors[0].to_string().contains("status"));
    }

    #[test]
    fn native_id_forces_replacement() {
        let schema = account_schema(Cloud::Aws);
        let from = HashMap::from([("native_id".to_string(), Value::from("123456789012"))]);
        let to = HashMap::from([("native_id".to_string(), Value::from("210987654321"))]);
        assert_eq!(schema.force_new_changes(&from, &to), vec!["native_id"]);
    }

    #[test]
    fn sla_retention_defaults() {
        let schema = sla_domain_assignment_schema();
        let mut attrs = HashMap::new();
        schema.apply_defaults(&mut attrs);
        assert_eq!(
            attrs["retention_on_unassign"],
            Value::from("RETAIN_SNAPSHOTS")
        );
    }
}
