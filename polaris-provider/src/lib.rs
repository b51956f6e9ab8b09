//! Polaris Provider
//!
//! Manages RSC cloud accounts (Azure subscriptions, AWS accounts) and SLA
//! domain assignments.
//!
//! ## Module Structure
//!
//! - `api` - RSC API traits and wire types
//! - `memory` - In-process RSC API used by tests and the CLI
//! - `feature` - Per-cloud feature registries with execution orders
//! - `feature_config` - Typed feature configuration decoded from attributes
//! - `plan` / `reconciler` - Ordered feature reconciliation
//! - `sla` - SLA domain assignment with the assignment waiter
//! - `resources` - Resource types and schemas
//! - `provider` - PolarisProvider implementation

pub mod api;
pub mod config;
pub mod feature;
pub mod feature_config;
pub mod memory;
pub mod plan;
pub mod provider;
pub mod reconciler;
pub mod resources;
pub mod sla;
pub mod validation;

// Re-export main types
pub use config::{ConfigError, ProviderConfig};
pub use memory::{MemoryApi, MemoryStore};
pub use provider::PolarisProvider;

use polaris_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use polaris_core::resource::{Resource, ResourceId, State};

use feature::Cloud;
use resources::{SLA_DOMAIN_ASSIGNMENT, resource_types};

fn unsupported(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unsupported resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

fn is_account(id: &ResourceId) -> bool {
    Cloud::from_resource_type(&id.resource_type).is_some()
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for PolarisProvider {
    fn name(&self) -> &'static str {
        "polaris"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
        prior: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        let prior = prior.cloned();
        Box::pin(async move {
            if is_account(&id) {
                self.read_account(&id, identifier.as_deref(), prior.as_ref())
                    .await
            } else if id.resource_type == SLA_DOMAIN_ASSIGNMENT {
                self.read_sla_assignment(&id, identifier.as_deref(), prior.as_ref())
                    .await
            } else {
                Err(unsupported(&id))
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            if is_account(&resource.id) {
                self.create_account(&resource).await
            } else if resource.id.resource_type == SLA_DOMAIN_ASSIGNMENT {
                self.create_sla_assignment(&resource).await
            } else {
                Err(unsupported(&resource.id))
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            if is_account(&id) {
                self.update_account(&id, &identifier, &from, &to).await
            } else if id.resource_type == SLA_DOMAIN_ASSIGNMENT {
                self.update_sla_assignment(&id, &from, &to).await
            } else {
                Err(unsupported(&id))
            }
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move {
            if is_account(&id) {
                self.delete_account(&id, &identifier, &from).await
            } else if id.resource_type == SLA_DOMAIN_ASSIGNMENT {
                self.delete_sla_assignment(&id, &from).await
            } else {
                Err(unsupported(&id))
            }
        })
    }
}
