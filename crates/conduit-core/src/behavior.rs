//! Node input/output behavior rules.
//!
//! Endpoints configure each of their nodes with four independent rules:
//! allow-input, allow-output, force-input, and force-output. The surface
//! rule language that players write lives outside the core; what reaches
//! the engine is the compiled, declarative [`RoutingRule`] form, evaluated
//! here against the owning container's current contents.

use crate::container::ResourceContainer;
use crate::fixed::Quantity;
use crate::id::ResourceTypeId;
use serde::{Deserialize, Serialize};

/// Comparison operator for quantity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
    Ne,
}

impl ComparisonOp {
    fn eval(self, left: Quantity, right: Quantity) -> bool {
        match self {
            ComparisonOp::Gt => left > right,
            ComparisonOp::Lt => left < right,
            ComparisonOp::Eq => left == right,
            ComparisonOp::Gte => left >= right,
            ComparisonOp::Lte => left <= right,
            ComparisonOp::Ne => left != right,
        }
    }
}

/// A declarative predicate over a resource type and the owning container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutingRule {
    /// Never holds.
    Never,
    /// Always holds.
    Always,
    /// Holds only for the named resource type.
    OnlyType(ResourceTypeId),
    /// Compares the container's current quantity of `resource` to `value`.
    /// E.g. "allow input only while iron < 100".
    Quantity {
        resource: ResourceTypeId,
        op: ComparisonOp,
        value: Quantity,
    },
    /// Holds when every sub-rule holds.
    All(Vec<RoutingRule>),
    /// Holds when any sub-rule holds.
    Any(Vec<RoutingRule>),
}

impl RoutingRule {
    /// Evaluate this rule for a candidate resource against the owning
    /// container's current state.
    pub fn check(&self, resource: ResourceTypeId, container: &ResourceContainer) -> bool {
        match self {
            RoutingRule::Never => false,
            RoutingRule::Always => true,
            RoutingRule::OnlyType(only) => *only == resource,
            RoutingRule::Quantity {
                resource: watched,
                op,
                value,
            } => op.eval(container.quantity(*watched), *value),
            RoutingRule::All(rules) => rules.iter().all(|r| r.check(resource, container)),
            RoutingRule::Any(rules) => rules.iter().any(|r| r.check(resource, container)),
        }
    }

    /// Whether the rule can ever hold, independent of state. Used to skip
    /// nodes whose direction is disabled outright.
    pub fn is_possible(&self) -> bool {
        match self {
            RoutingRule::Never => false,
            RoutingRule::All(rules) => rules.iter().all(RoutingRule::is_possible),
            RoutingRule::Any(rules) => rules.iter().any(RoutingRule::is_possible),
            _ => true,
        }
    }
}

/// The four behavior slots of a resource node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeBehavior {
    pub allow_in: RoutingRule,
    pub allow_out: RoutingRule,
    pub force_in: RoutingRule,
    pub force_out: RoutingRule,
}

impl Default for NodeBehavior {
    /// Accept and emit everything, force nothing.
    fn default() -> Self {
        Self {
            allow_in: RoutingRule::Always,
            allow_out: RoutingRule::Always,
            force_in: RoutingRule::Never,
            force_out: RoutingRule::Never,
        }
    }
}

impl NodeBehavior {
    /// A node that only receives.
    pub fn input_only() -> Self {
        Self {
            allow_out: RoutingRule::Never,
            ..Self::default()
        }
    }

    /// A node that only emits.
    pub fn output_only() -> Self {
        Self {
            allow_in: RoutingRule::Never,
            ..Self::default()
        }
    }
}
