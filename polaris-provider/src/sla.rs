//! SLA domain assignment
//!
//! RSC applies SLA domain assignments asynchronously. After each request
//! the domain's protected-object listing is polled until it matches the
//! desired object set. A listing that does not converge before the deadline
//! is logged and otherwise ignored: the next read reports the actual state.
//!
//! The resource is authoritative for the objects protected by its domain.

use std::collections::{BTreeSet, HashMap};

use polaris_core::resource::Value;
use polaris_core::wait::{PollConfig, PollError, PollOutcome, poll_until};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{ApiError, SlaApi, SlaAssignment, SnapshotRetention};
use crate::validation::ValidationError;

/// Error raised while managing an SLA domain assignment
#[derive(Debug, thiserror::Error)]
pub enum SlaError {
    #[error("SLA domain request failed: {0}")]
    Api(#[from] ApiError),

    #[error("waiting for SLA domain {0} was cancelled")]
    Cancelled(Uuid),
}

/// Desired objects of an SLA domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaDomainAssignment {
    pub domain_id: Uuid,
    pub object_ids: BTreeSet<Uuid>,
    /// Applied to objects losing the domain
    pub retention: SnapshotRetention,
}

impl SlaDomainAssignment {
    pub fn from_attributes(
        attributes: &HashMap<String, Value>,
    ) -> Result<Self, Vec<ValidationError>> {
        let mut errors = Vec::new();

        let domain_id = match attributes.get("sla_domain_id").and_then(Value::as_str) {
            Some(s) => match Uuid::parse_str(s) {
                Ok(id) => Some(id),
                Err(_) => {
                    errors.push(ValidationError::new(
                        "sla_domain_id",
                        format!("invalid UUID '{}'", s),
                    ));
                    None
                }
            },
            None => {
                errors.push(ValidationError::new("sla_domain_id", "required"));
                None
            }
        };

        let mut object_ids = BTreeSet::new();
        match attributes.get("object_ids").and_then(Value::as_list) {
            Some(items) if items.is_empty() => errors.push(ValidationError::new(
                "object_ids",
                "at least one object id is required",
            )),
            Some(items) => {
                for (i, item) in items.iter().enumerate() {
                    match item.as_str().map(Uuid::parse_str) {
                        Some(Ok(id)) => {
                            object_ids.insert(id);
                        }
                        _ => errors.push(ValidationError::new(
                            format!("object_ids[{}]", i),
                            "expected a UUID",
                        )),
                    }
                }
            }
            None => errors.push(ValidationError::new("object_ids", "required")),
        }

        let retention = match attributes.get("retention_on_unassign") {
            None => SnapshotRetention::default(),
            Some(value) => {
                let found = value
                    .as_str()
                    .and_then(|s| SnapshotRetention::ALL.into_iter().find(|r| r.as_str() == s));
                match found {
                    Some(retention) => retention,
                    None => {
                        errors.push(ValidationError::new(
                            "retention_on_unassign",
                            "unknown retention",
                        ));
                        SnapshotRetention::default()
                    }
                }
            }
        };

        match domain_id {
            Some(domain_id) if errors.is_empty() => Ok(Self {
                domain_id,
                object_ids,
                retention,
            }),
            _ => Err(errors),
        }
    }

    pub fn to_attributes(&self) -> HashMap<String, Value> {
        HashMap::from([
            (
                "sla_domain_id".to_string(),
                Value::String(self.domain_id.to_string()),
            ),
            (
                "object_ids".to_string(),
                Value::string_list(self.object_ids.iter().map(|id| id.to_string())),
            ),
            (
                "retention_on_unassign".to_string(),
                Value::String(self.retention.as_str().to_string()),
            ),
        ])
    }
}

/// Wait until the objects protected by `domain_id` are exactly `desired`
///
/// Times out silently with a warning.
pub async fn wait_for_assignment<A: SlaApi + ?Sized>(
    api: &A,
    domain_id: Uuid,
    desired: &BTreeSet<Uuid>,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), SlaError> {
    let outcome = poll_until(poll, cancel, || async move {
        let listed = api.protected_objects(domain_id).await?;
        let pending = listed.symmetric_difference(desired).count();
        log::debug!("SLA domain {}: {} objects pending", domain_id, pending);
        Ok::<_, ApiError>(pending == 0)
    })
    .await;

    match outcome {
        Ok(PollOutcome::Converged) => Ok(()),
        Ok(PollOutcome::TimedOut) => {
            log::warn!(
                "SLA domain {} did not reach the desired assignment within {:?}",
                domain_id,
                poll.timeout
            );
            Ok(())
        }
        Err(PollError::Cancelled) => Err(SlaError::Cancelled(domain_id)),
        Err(PollError::Check(e)) => Err(SlaError::Api(e)),
    }
}

/// Objects currently protected by a domain
pub async fn protected_objects<A: SlaApi + ?Sized>(
    api: &A,
    domain_id: Uuid,
) -> Result<BTreeSet<Uuid>, SlaError> {
    Ok(api.protected_objects(domain_id).await?)
}

/// Assign the domain to its objects
pub async fn assign<A: SlaApi + ?Sized>(
    api: &A,
    assignment: &SlaDomainAssignment,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), SlaError> {
    log::info!(
        "assigning SLA domain {} to {} objects",
        assignment.domain_id,
        assignment.object_ids.len()
    );
    api.assign_sla_domain(&SlaAssignment {
        domain_id: Some(assignment.domain_id),
        object_ids: assignment.object_ids.clone(),
        retention: assignment.retention,
    })
    .await?;

    wait_for_assignment(
        api,
        assignment.domain_id,
        &assignment.object_ids,
        poll,
        cancel,
    )
    .await
}

/// Move a domain from one object set to another
///
/// Objects leaving the domain keep their snapshots according to the new
/// retention.
pub async fn reassign<A: SlaApi + ?Sized>(
    api: &A,
    from: &SlaDomainAssignment,
    to: &SlaDomainAssignment,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), SlaError> {
    let removed: BTreeSet<Uuid> = from.object_ids.difference(&to.object_ids).copied().collect();
    let added: BTreeSet<Uuid> = to.object_ids.difference(&from.object_ids).copied().collect();

    if !removed.is_empty() {
        log::info!(
            "removing {} objects from SLA domain {}",
            removed.len(),
            to.domain_id
        );
        api.assign_sla_domain(&SlaAssignment {
            domain_id: None,
            object_ids: removed,
            retention: to.retention,
        })
        .await?;
    }

    if !added.is_empty() {
        log::info!("adding {} objects to SLA domain {}", added.len(), to.domain_id);
        api.assign_sla_domain(&SlaAssignment {
            domain_id: Some(to.domain_id),
            object_ids: added,
            retention: to.retention,
        })
        .await?;
    }

    wait_for_assignment(api, to.domain_id, &to.object_ids, poll, cancel).await
}

/// Remove the domain from all its objects
pub async fn unassign<A: SlaApi + ?Sized>(
    api: &A,
    assignment: &SlaDomainAssignment,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), SlaError> {
    log::info!(
        "removing SLA domain {} from {} objects ({})",
        assignment.domain_id,
        assignment.object_ids.len(),
        assignment.retention.as_str()
    );
    api.assign_sla_domain(&SlaAssignment {
        domain_id: None,
        object_ids: assignment.object_ids.clone(),
        retention: assignment.retention,
    })
    .await?;

    wait_for_assignment(api, assignment.domain_id, &BTreeSet::new(), poll, cancel).await
}
