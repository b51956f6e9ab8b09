//! Polaris provider implementation
//!
//! Translates resource CRUD callbacks into reconciliation passes against
//! the RSC API. Attribute maps are decoded into typed configurations here;
//! everything below this layer is strongly typed.

use std::collections::HashMap;
use std::sync::Arc;

use polaris_core::provider::{ProviderError, ProviderResult};
use polaris_core::resource::{Resource, ResourceId, State, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{Account, AccountSpec, CloudAccountApi, SlaApi};
use crate::config::ProviderConfig;
use crate::feature::{Cloud, FeatureRegistry};
use crate::feature_config::{FeatureConfigs, decode_features};
use crate::plan::ReconcilePlan;
use crate::reconciler::{Reconciler, refresh_features};
use crate::resources::schema_for;
use crate::sla::{self, SlaDomainAssignment};
use crate::validation::ValidationError;

/// RSC provider
pub struct PolarisProvider {
    accounts: Arc<dyn CloudAccountApi>,
    sla: Arc<dyn SlaApi>,
    config: ProviderConfig,
    azure: FeatureRegistry,
    aws: FeatureRegistry,
    cancel: CancellationToken,
}

impl PolarisProvider {
    pub fn new(
        accounts: Arc<dyn CloudAccountApi>,
        sla: Arc<dyn SlaApi>,
        config: ProviderConfig,
    ) -> Self {
        Self {
            accounts,
            sla,
            config,
            azure: FeatureRegistry::azure(),
            aws: FeatureRegistry::aws(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token for SLA waits
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn registry(&self, cloud: Cloud) -> &FeatureRegistry {
        match cloud {
            Cloud::Azure => &self.azure,
            Cloud::Aws => &self.aws,
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate declared attributes against the resource schema
    ///
    /// Returns the attributes with schema defaults filled in.
    pub fn validate_resource(&self, resource: &Resource) -> ProviderResult<HashMap<String, Value>> {
        let schema = schema_for(&resource.id.resource_type).ok_or_else(|| {
            ProviderError::new(format!(
                "Unknown resource type: {}",
                resource.id.resource_type
            ))
            .for_resource(resource.id.clone())
        })?;

        let mut attributes = resource.attributes.clone();
        schema.apply_defaults(&mut attributes);
        schema.validate(&attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProviderError::new(format!("Invalid attributes: {}", messages.join("; ")))
                .for_resource(resource.id.clone())
        })?;

        if let Some(cloud) = Cloud::from_resource_type(&resource.id.resource_type) {
            decode_features(self.registry(cloud), &attributes)
                .map_err(|errors| validation_error(&resource.id, errors))?;
        }
        Ok(attributes)
    }

    // =========================================================================
    // Cloud Accounts
    // =========================================================================

    /// Read a cloud account
    ///
    /// `prior` keeps region ordering and permissions signals stable.
    pub async fn read_account(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let cloud = cloud_of(id)?;
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let account_id = parse_account_id(id, identifier)?;

        let account = match self.accounts.account(account_id).await {
            Ok(account) => account,
            Err(e) if e.is_not_found() => return Ok(State::not_found(id.clone())),
            Err(e) => {
                return Err(ProviderError::new(format!("Failed to read account: {}", e))
                    .for_resource(id.clone())
                    .with_cause(e));
            }
        };

        let local = prior
            .map(|state| self.local_features(cloud, &state.attributes))
            .unwrap_or_default();
        let delete_snapshots = prior
            .map(|state| delete_snapshots_on_destroy(&state.attributes))
            .unwrap_or(false);

        Ok(self.account_state(id, &account, &local, delete_snapshots))
    }

    /// Onboard a cloud account with its declared features
    pub async fn create_account(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let cloud = cloud_of(id)?;
        let attributes = self.validate_resource(resource)?;
        let spec = account_spec(cloud, id, &attributes);
        let desired = decode_features(self.registry(cloud), &attributes)
            .map_err(|errors| validation_error(id, errors))?;

        let existing = self
            .accounts
            .account_by_native_id(cloud, &spec.native_id)
            .await
            .map_err(|e| {
                ProviderError::new(format!("Failed to look up account: {}", e))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;
        if let Some(account) = existing {
            return Err(ProviderError::new(format!(
                "{} {} is already onboarded as account {}",
                cloud, spec.native_id, account.id
            ))
            .for_resource(id.clone()));
        }

        let outcome = Reconciler::new(self.accounts.as_ref(), self.registry(cloud))
            .reconcile(&spec, None, &FeatureConfigs::new(), &desired)
            .await
            .map_err(|e| reconcile_error(id, e))?;

        let account = outcome.account.ok_or_else(|| {
            ProviderError::new("Account was not found after onboarding").for_resource(id.clone())
        })?;
        Ok(self.account_state(
            id,
            &account,
            &desired,
            delete_snapshots_on_destroy(&attributes),
        ))
    }

    /// Reconcile a cloud account's features and name
    pub async fn update_account(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let cloud = cloud_of(id)?;
        let attributes = self.validate_resource(to)?;
        self.reject_replacement(id, &from.attributes, &attributes)?;

        let account_id = parse_account_id(id, identifier)?;
        let spec = account_spec(cloud, id, &attributes);
        let local = self.local_features(cloud, &from.attributes);
        let desired = decode_features(self.registry(cloud), &attributes)
            .map_err(|errors| validation_error(id, errors))?;

        let outcome = Reconciler::new(self.accounts.as_ref(), self.registry(cloud))
            .reconcile(&spec, Some(account_id), &local, &desired)
            .await
            .map_err(|e| reconcile_error(id, e))?;

        let mut account = outcome.account.ok_or_else(|| {
            ProviderError::new("Account was not found after reconciliation")
                .for_resource(id.clone())
        })?;

        if account.name != spec.name {
            log::info!("renaming account {} to '{}'", account.id, spec.name);
            self.accounts
                .rename_account(account.id, &spec.name)
                .await
                .map_err(|e| {
                    ProviderError::new(format!("Failed to rename account: {}", e))
                        .for_resource(id.clone())
                        .with_cause(e)
                })?;
            account.name = spec.name.clone();
        }

        Ok(self.account_state(
            id,
            &account,
            &desired,
            delete_snapshots_on_destroy(&attributes),
        ))
    }

    /// Offboard a cloud account by removing every feature
    ///
    /// Fails when the account is still onboarded afterwards.
    pub async fn delete_account(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let cloud = cloud_of(id)?;
        let account_id = parse_account_id(id, identifier)?;
        let spec = account_spec(cloud, id, &from.attributes);
        let local = self.local_features(cloud, &from.attributes);

        Reconciler::new(self.accounts.as_ref(), self.registry(cloud))
            .offboard(
                &spec,
                account_id,
                &local,
                delete_snapshots_on_destroy(&from.attributes),
            )
            .await
            .map_err(|e| reconcile_error(id, e))?;
        Ok(())
    }

    /// Operations a create or update of `to` would execute
    pub async fn plan_account(
        &self,
        from: Option<&State>,
        to: &Resource,
    ) -> ProviderResult<ReconcilePlan> {
        let id = &to.id;
        let cloud = cloud_of(id)?;
        let attributes = self.validate_resource(to)?;
        let desired = decode_features(self.registry(cloud), &attributes)
            .map_err(|errors| validation_error(id, errors))?;

        let (account_id, local) = match from {
            Some(state) if state.exists => {
                self.reject_replacement(id, &state.attributes, &attributes)?;
                let account_id = state
                    .identifier
                    .as_deref()
                    .map(|s| parse_account_id(id, s))
                    .transpose()?;
                (account_id, self.local_features(cloud, &state.attributes))
            }
            _ => (None, FeatureConfigs::new()),
        };

        Reconciler::new(self.accounts.as_ref(), self.registry(cloud))
            .plan(account_id, &local, &desired)
            .await
            .map_err(|e| reconcile_error(id, e))
    }

    /// Operations a delete of `from` would execute
    pub async fn plan_offboard(&self, from: &State) -> ProviderResult<ReconcilePlan> {
        let id = &from.id;
        let cloud = cloud_of(id)?;
        let account_id = from
            .identifier
            .as_deref()
            .map(|s| parse_account_id(id, s))
            .transpose()?;
        let local = self.local_features(cloud, &from.attributes);

        Reconciler::new(self.accounts.as_ref(), self.registry(cloud))
            .plan(account_id, &local, &FeatureConfigs::new())
            .await
            .map_err(|e| reconcile_error(id, e))
    }

    fn reject_replacement(
        &self,
        id: &ResourceId,
        from: &HashMap<String, Value>,
        to: &HashMap<String, Value>,
    ) -> ProviderResult<()> {
        let Some(schema) = schema_for(&id.resource_type) else {
            return Ok(());
        };
        let changed = schema.force_new_changes(from, to);
        if changed.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::new(format!(
                "Changing {} requires replacing the resource",
                changed.join(", ")
            ))
            .for_resource(id.clone()))
        }
    }

    /// Feature configurations recorded in a local state
    fn local_features(&self, cloud: Cloud, attributes: &HashMap<String, Value>) -> FeatureConfigs {
        decode_features(self.registry(cloud), attributes).unwrap_or_else(|errors| {
            log::warn!(
                "ignoring unreadable feature state: {}",
                errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            FeatureConfigs::new()
        })
    }

    fn account_state(
        &self,
        id: &ResourceId,
        account: &Account,
        local: &FeatureConfigs,
        delete_snapshots: bool,
    ) -> State {
        let registry = self.registry(account.cloud);
        let mut attributes = HashMap::new();

        attributes.insert(
            "native_id".to_string(),
            Value::String(account.native_id.clone()),
        );
        attributes.insert("name".to_string(), Value::String(account.name.clone()));
        attributes.insert(
            "account_id".to_string(),
            Value::String(account.id.to_string()),
        );
        attributes.insert(
            "delete_snapshots_on_destroy".to_string(),
            Value::Bool(delete_snapshots),
        );
        if let Some(domain) = &account.tenant_domain {
            attributes.insert("tenant_domain".to_string(), Value::String(domain.clone()));
        }

        for (feature, refreshed) in refresh_features(account, local) {
            if let Some(entry) = registry.get(feature) {
                attributes.insert(
                    entry.key.to_string(),
                    refreshed.config.to_value(Some(refreshed.status.as_str())),
                );
            }
        }

        State::existing(id.clone(), attributes).with_identifier(account.id.to_string())
    }

    // =========================================================================
    // SLA Domain Assignments
    // =========================================================================

    pub async fn read_sla_assignment(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let domain_id = parse_uuid(id, "SLA domain id", identifier)?;

        let object_ids = sla::protected_objects(self.sla.as_ref(), domain_id)
            .await
            .map_err(|e| sla_error(id, e))?;
        if object_ids.is_empty() {
            return Ok(State::not_found(id.clone()));
        }

        let retention = prior
            .and_then(|state| SlaDomainAssignment::from_attributes(&state.attributes).ok())
            .map(|a| a.retention)
            .unwrap_or_default();
        let assignment = SlaDomainAssignment {
            domain_id,
            object_ids,
            retention,
        };
        Ok(State::existing(id.clone(), assignment.to_attributes())
            .with_identifier(domain_id.to_string()))
    }

    pub async fn create_sla_assignment(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let attributes = self.validate_resource(resource)?;
        let assignment = SlaDomainAssignment::from_attributes(&attributes)
            .map_err(|errors| validation_error(id, errors))?;

        sla::assign(
            self.sla.as_ref(),
            &assignment,
            &self.config.sla_poll,
            &self.cancel,
        )
        .await
        .map_err(|e| sla_error(id, e))?;

        Ok(State::existing(id.clone(), assignment.to_attributes())
            .with_identifier(assignment.domain_id.to_string()))
    }

    pub async fn update_sla_assignment(
        &self,
        id: &ResourceId,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let attributes = self.validate_resource(to)?;
        self.reject_replacement(id, &from.attributes, &attributes)?;
        let previous = SlaDomainAssignment::from_attributes(&from.attributes)
            .map_err(|errors| validation_error(id, errors))?;
        let desired = SlaDomainAssignment::from_attributes(&attributes)
            .map_err(|errors| validation_error(id, errors))?;

        sla::reassign(
            self.sla.as_ref(),
            &previous,
            &desired,
            &self.config.sla_poll,
            &self.cancel,
        )
        .await
        .map_err(|e| sla_error(id, e))?;

        Ok(State::existing(id.clone(), desired.to_attributes())
            .with_identifier(desired.domain_id.to_string()))
    }

    pub async fn delete_sla_assignment(&self, id: &ResourceId, from: &State) -> ProviderResult<()> {
        let assignment = SlaDomainAssignment::from_attributes(&from.attributes)
            .map_err(|errors| validation_error(id, errors))?;

        sla::unassign(
            self.sla.as_ref(),
            &assignment,
            &self.config.sla_poll,
            &self.cancel,
        )
        .await
        .map_err(|e| sla_error(id, e))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn cloud_of(id: &ResourceId) -> ProviderResult<Cloud> {
    Cloud::from_resource_type(&id.resource_type).ok_or_else(|| {
        ProviderError::new(format!("Not a cloud account type: {}", id.resource_type))
            .for_resource(id.clone())
    })
}

fn parse_uuid(id: &ResourceId, what: &str, s: &str) -> ProviderResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| {
        ProviderError::new(format!("Invalid {} '{}'", what, s))
            .for_resource(id.clone())
            .with_cause(e)
    })
}

fn parse_account_id(id: &ResourceId, s: &str) -> ProviderResult<Uuid> {
    parse_uuid(id, "account id", s)
}

fn account_spec(cloud: Cloud, id: &ResourceId, attributes: &HashMap<String, Value>) -> AccountSpec {
    let string = |key: &str| attributes.get(key).and_then(Value::as_str).map(str::to_string);
    AccountSpec {
        cloud,
        native_id: string("native_id").unwrap_or_default(),
        name: string("name").unwrap_or_else(|| id.name.clone()),
        tenant_domain: string("tenant_domain"),
    }
}

fn delete_snapshots_on_destroy(attributes: &HashMap<String, Value>) -> bool {
    attributes
        .get("delete_snapshots_on_destroy")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn validation_error(id: &ResourceId, errors: Vec<ValidationError>) -> ProviderError {
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    ProviderError::new(format!("Invalid configuration: {}", messages.join("; ")))
        .for_resource(id.clone())
}

fn reconcile_error(id: &ResourceId, e: crate::reconciler::ReconcileError) -> ProviderError {
    ProviderError::new(e.to_string())
        .for_resource(id.clone())
        .with_cause(e)
}

fn sla_error(id: &ResourceId, e: sla::SlaError) -> ProviderError {
    ProviderError::new(e.to_string())
        .for_resource(id.clone())
        .with_cause(e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{FeatureStatus, SlaApi};
    use crate::feature::Feature;
    use crate::memory::{ApiCall, MemoryApi};
    use crate::plan::OperationKind;

    const SUBSCRIPTION: &str = "8fa81a5e-a236-4a73-8e28-e1dcf863c56d";

    fn provider() -> (Arc<MemoryApi>, PolarisProvider) {
        let api = Arc::new(MemoryApi::new());
        let provider = PolarisProvider::new(api.clone(), api.clone(), ProviderConfig::default());
        (api, provider)
    }

    fn block(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn regions(regions: &[&str]) -> Value {
        Value::string_list(regions.iter().copied())
    }

    fn resource_group(name: &str) -> Value {
        block(vec![
            ("name", Value::from(name)),
            ("region", Value::from("eastus")),
        ])
    }

    fn subscription() -> Resource {
        Resource::new("azure_subscription", "prod")
            .with_attribute("native_id", Value::from(SUBSCRIPTION))
            .with_attribute("tenant_domain", Value::from("contoso.onmicrosoft.com"))
            .with_attribute(
                "cloud_native_protection",
                block(vec![("regions", regions(&["westus", "eastus"]))]),
            )
    }

    #[tokio::test]
    async fn create_onboards_and_records_state() {
        let (_, provider) = provider();
        let state = provider.create_account(&subscription()).await.unwrap();

        assert!(state.exists);
        assert_eq!(state.attributes["name"], Value::from("prod"));
        assert_eq!(
            state.attributes["delete_snapshots_on_destroy"],
            Value::Bool(false)
        );
        let protection = state.attributes["cloud_native_protection"].as_map().unwrap();
        assert_eq!(protection["regions"], regions(&["westus", "eastus"]));
        assert_eq!(protection["status"], Value::from("CONNECTED"));
    }

    #[tokio::test]
    async fn create_rejects_already_onboarded_account() {
        let (_, provider) = provider();
        provider.create_account(&subscription()).await.unwrap();

        let err = provider.create_account(&subscription()).await.unwrap_err();
        assert!(err.message.contains("already onboarded"));
    }

    #[tokio::test]
    async fn create_without_features_is_rejected_before_any_call() {
        let (api, provider) = provider();
        let resource = Resource::new("azure_subscription", "prod")
            .with_attribute("native_id", Value::from(SUBSCRIPTION))
            .with_attribute("tenant_domain", Value::from("contoso.onmicrosoft.com"));

        assert!(provider.create_account(&resource).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_region_fails_validation() {
        let (api, provider) = provider();
        let resource = subscription().with_attribute(
            "exocompute",
            block(vec![("regions", regions(&["us-east-1"]))]),
        );

        let err = provider.create_account(&resource).await.unwrap_err();
        assert!(err.message.starts_with("Invalid attributes"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn update_reonboards_and_renames() {
        let (api, provider) = provider();
        let first = subscription().with_attribute(
            "exocompute",
            block(vec![
                ("regions", regions(&["eastus"])),
                ("resource_group", resource_group("A")),
            ]),
        );
        let state = provider.create_account(&first).await.unwrap();
        let identifier = state.identifier.clone().unwrap();
        api.clear_calls();

        let second = subscription()
            .with_attribute("name", Value::from("production"))
            .with_attribute(
                "exocompute",
                block(vec![
                    ("regions", regions(&["eastus"])),
                    ("resource_group", resource_group("B")),
                ]),
            );
        let updated = provider
            .update_account(&first.id, &identifier, &state, &second)
            .await
            .unwrap();

        assert_eq!(updated.attributes["name"], Value::from("production"));
        assert_eq!(
            api.calls(),
            vec![
                ApiCall::AddFeature {
                    feature: Feature::Exocompute,
                    resource_group: Some("B".to_string()),
                },
                ApiCall::RetireFeature {
                    feature: Feature::Exocompute,
                },
                ApiCall::RenameAccount {
                    name: "production".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn update_rejects_native_id_change() {
        let (_, provider) = provider();
        let state = provider.create_account(&subscription()).await.unwrap();
        let identifier = state.identifier.clone().unwrap();

        let moved = subscription()
            .with_attribute("native_id", Value::from("00000000-0000-0000-0000-000000000001"));
        let err = provider
            .update_account(&moved.id, &identifier, &state, &moved)
            .await
            .unwrap_err();
        assert!(err.message.contains("native_id"));
    }

    #[tokio::test]
    async fn delete_forwards_delete_snapshots() {
        let (api, provider) = provider();
        let resource =
            subscription().with_attribute("delete_snapshots_on_destroy", Value::Bool(true));
        let state = provider.create_account(&resource).await.unwrap();
        let identifier = state.identifier.clone().unwrap();
        api.clear_calls();

        provider
            .delete_account(&resource.id, &identifier, &state)
            .await
            .unwrap();

        assert_eq!(
            api.calls(),
            vec![ApiCall::RemoveFeature {
                feature: Feature::CloudNativeProtection,
                delete_snapshots: true,
            }]
        );
        let read = provider
            .read_account(&resource.id, Some(&identifier), Some(&state))
            .await
            .unwrap();
        assert!(!read.exists);
    }

    #[tokio::test]
    async fn delete_offboards_despite_stale_resource_group() {
        let (api, provider) = provider();
        let resource = subscription().with_attribute(
            "exocompute",
            block(vec![
                ("regions", regions(&["eastus"])),
                ("resource_group", resource_group("A")),
            ]),
        );
        let state = provider.create_account(&resource).await.unwrap();
        let identifier = state.identifier.clone().unwrap();
        let account_id = Uuid::parse_str(&identifier).unwrap();

        // Resource group changed outside of the recorded state
        let mut account = api.account(account_id).await.unwrap();
        let exocompute = account.features.get_mut(&Feature::Exocompute).unwrap();
        exocompute.resource_group.as_mut().unwrap().name = "B".to_string();
        api.insert_account(account);

        provider
            .delete_account(&resource.id, &identifier, &state)
            .await
            .unwrap();
        assert!(api.account(account_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn read_reports_missing_permissions() {
        let (api, provider) = provider();
        let state = provider.create_account(&subscription()).await.unwrap();
        let identifier = state.identifier.clone().unwrap();
        let account_id = Uuid::parse_str(&identifier).unwrap();
        api.set_status(
            account_id,
            Feature::CloudNativeProtection,
            FeatureStatus::MissingPermissions,
        );

        let read = provider
            .read_account(&subscription().id, Some(&identifier), Some(&state))
            .await
            .unwrap();
        let protection = read.attributes["cloud_native_protection"].as_map().unwrap();
        assert_eq!(protection["permissions"], Value::from("update-required"));
        assert_eq!(protection["status"], Value::from("MISSING_PERMISSIONS"));

        // Any new signal value acknowledges the permissions
        let acknowledged = subscription().with_attribute(
            "cloud_native_protection",
            block(vec![
                ("regions", regions(&["westus", "eastus"])),
                ("permissions", Value::from("v2")),
            ]),
        );
        let plan = provider
            .plan_account(Some(&read), &acknowledged)
            .await
            .unwrap();
        assert_eq!(
            plan.operations()[0].kind,
            OperationKind::AcknowledgePermissions
        );
    }

    #[tokio::test]
    async fn plan_does_not_touch_the_account() {
        let (api, provider) = provider();
        let plan = provider.plan_account(None, &subscription()).await.unwrap();

        assert_eq!(plan.operations().len(), 1);
        assert_eq!(plan.operations()[0].kind, OperationKind::AddFeature);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn sla_assignment_lifecycle() {
        let (api, provider) = provider();
        let domain = "3a5cbf5c-8f8e-45a4-a4c6-0a35d0bd9f79";
        let object = "d2f0c5b4-1e9a-4f3e-9b61-6c3e0a1b2c3d";
        let resource = Resource::new("sla_domain_assignment", "gold")
            .with_attribute("sla_domain_id", Value::from(domain))
            .with_attribute("object_ids", Value::string_list([object]));

        let state = provider.create_sla_assignment(&resource).await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some(domain));
        assert_eq!(
            state.attributes["retention_on_unassign"],
            Value::from("RETAIN_SNAPSHOTS")
        );

        let read = provider
            .read_sla_assignment(&resource.id, Some(domain), Some(&state))
            .await
            .unwrap();
        assert_eq!(read.attributes["object_ids"], Value::string_list([object]));

        provider
            .delete_sla_assignment(&resource.id, &state)
            .await
            .unwrap();
        let domain_id = Uuid::parse_str(domain).unwrap();
        assert!(api.protected_objects(domain_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sla_assignment_without_objects_is_rejected() {
        let (api, provider) = provider();
        let resource = Resource::new("sla_domain_assignment", "gold")
            .with_attribute(
                "sla_domain_id",
                Value::from("3a5cbf5c-8f8e-45a4-a4c6-0a35d0bd9f79"),
            )
            .with_attribute("object_ids", Value::List(Vec::new()));

        let err = provider.create_sla_assignment(&resource).await.unwrap_err();
        assert!(err.message.contains("object_ids"));
        assert!(api.calls().is_empty());
    }
}
