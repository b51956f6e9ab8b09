//! Plan - Ordered feature operations
//!
//! A plan is the list of operations one reconciliation pass executes, sorted
//! by execution order. Nothing touches the remote account until the plan is
//! executed.

use std::fmt;

use crate::feature::Feature;
use crate::feature_config::FeatureConfig;

/// Kind of feature operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Onboard the feature with its full configuration
    AddFeature,
    /// Offboard the feature
    RemoveFeature,
    /// Retire the previous configuration of a re-onboarded feature
    TemporaryRemoveFeature,
    /// Additive region or permission-group update
    UpdateInPlace,
    /// Signal that permissions were updated out of band
    AcknowledgePermissions,
}

impl OperationKind {
    /// Whether the operation takes something away from the account
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            OperationKind::RemoveFeature | OperationKind::TemporaryRemoveFeature
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationKind::AddFeature => "add",
            OperationKind::RemoveFeature => "remove",
            OperationKind::TemporaryRemoveFeature => "retire",
            OperationKind::UpdateInPlace => "update",
            OperationKind::AcknowledgePermissions => "acknowledge permissions",
        };
        f.write_str(s)
    }
}

/// One step of a reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub feature: Feature,
    /// Execution order; lower runs first
    pub order: u32,
    /// New configuration for adds and updates, the retired one for removals
    pub config: FeatureConfig,
}

impl Operation {
    pub fn new(kind: OperationKind, feature: Feature, order: u32, config: FeatureConfig) -> Self {
        Self {
            kind,
            feature,
            order,
            config,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.feature)
    }
}

/// Plan containing operations to be executed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    operations: Vec<Operation>,
}

impl ReconcilePlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Sort by execution order; equal orders keep insertion order
    pub fn sort(&mut self) {
        self.operations.sort_by_key(|op| op.order);
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Generate a summary of the plan for display
    ///
    /// An add is counted as a re-onboard when the same feature is retired
    /// in the plan.
    pub fn summary(&self) -> PlanSummary {
        let retired: Vec<Feature> = self
            .operations
            .iter()
            .filter(|op| op.kind == OperationKind::TemporaryRemoveFeature)
            .map(|op| op.feature)
            .collect();

        let mut summary = PlanSummary::default();
        for op in &self.operations {
            match op.kind {
                OperationKind::AddFeature if retired.contains(&op.feature) => {
                    summary.reonboard += 1
                }
                OperationKind::AddFeature => summary.add += 1,
                OperationKind::RemoveFeature => summary.remove += 1,
                OperationKind::TemporaryRemoveFeature => {}
                OperationKind::UpdateInPlace => summary.update += 1,
                OperationKind::AcknowledgePermissions => summary.acknowledge += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub add: usize,
    pub remove: usize,
    pub reonboard: usize,
    pub update: usize,
    pub acknowledge: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Plan: {} to add, {} to re-onboard, {} to update, {} to acknowledge, {} to remove",
            self.add, self.reonboard, self.update, self.acknowledge, self.remove
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OperationKind, feature: Feature, order: u32) -> Operation {
        Operation::new(kind, feature, order, FeatureConfig::default())
    }

    #[test]
    fn empty_plan() {
        let plan = ReconcilePlan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.summary(), PlanSummary::default());
    }

    #[test]
    fn sort_is_stable() {
        let mut plan = ReconcilePlan::new();
        plan.add(op(OperationKind::RemoveFeature, Feature::Exocompute, 31));
        plan.add(op(OperationKind::UpdateInPlace, Feature::CloudNativeArchival, 2));
        plan.add(op(OperationKind::AcknowledgePermissions, Feature::CloudNativeArchival, 2));
        plan.add(op(OperationKind::AddFeature, Feature::CloudNativeProtection, 1));
        plan.sort();

        let kinds: Vec<_> = plan.operations().iter().map(|o| o.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::AddFeature,
                OperationKind::UpdateInPlace,
                OperationKind::AcknowledgePermissions,
                OperationKind::RemoveFeature,
            ]
        );
    }

    #[test]
    fn plan_summary() {
        let mut plan = ReconcilePlan::new();
        plan.add(op(OperationKind::AddFeature, Feature::CloudNativeProtection, 1));
        plan.add(op(OperationKind::AddFeature, Feature::Exocompute, 17));
        plan.add(op(OperationKind::TemporaryRemoveFeature, Feature::Exocompute, 27));
        plan.add(op(OperationKind::RemoveFeature, Feature::CloudNativeArchival, 36));

        let summary = plan.summary();
        assert_eq!(summary.add, 1);
        assert_eq!(summary.reonboard, 1);
        assert_eq!(summary.remove, 1);
        assert_eq!(
            summary.to_string(),
            "Plan: 1 to add, 1 to re-onboard, 0 to update, 0 to acknowledge, 1 to remove"
        );
    }

    #[test]
    fn summary_of_a_lone_retire() {
        let mut plan = ReconcilePlan::new();
        plan.add(op(OperationKind::TemporaryRemoveFeature, Feature::Exocompute, 27));

        assert_eq!(plan.summary(), PlanSummary::default());
    }

    #[test]
    fn operation_display() {
        let op = op(OperationKind::TemporaryRemoveFeature, Feature::Exocompute, 27);
        assert_eq!(op.to_string(), "retire EXOCOMPUTE");
    }
}
