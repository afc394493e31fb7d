//! Resource containers and the capacity-reservation protocol.
//!
//! A container stores real quantities plus a parallel *expected* ledger of
//! reserved capacity. Reservations ([`ResourceContainer::expect`]) claim
//! destination space for a package the instant it is created, before it
//! physically arrives, so a second concurrent transfer cannot target the
//! same slot. When the package arrives, [`ResourceContainer::add`] consumes
//! the matching expectation as it stores the real resources.
//!
//! Invariants:
//! - stored quantity >= 0 and expected quantity >= 0, per type;
//! - for bounded containers, total stored + total expected <= capacity.
//!
//! Every mutator is paired with a boolean precondition (`can_add`,
//! `can_remove`, `space_for`, `contains`). The checked mutators re-verify
//! and return a [`ContainerError`]; the `_unchecked` variants are for
//! callers that have just verified the precondition themselves.

use crate::behavior::RoutingRule;
use crate::fixed::Quantity;
use crate::id::ResourceTypeId;
use crate::registry::{Registry, ResourceCategory};
use crate::resources::ResourceList;
use serde::{Deserialize, Serialize};

/// Errors from container mutations whose precondition does not hold.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContainerError {
    #[error("resource {0:?} does not match the container's category")]
    WrongCategory(ResourceTypeId),
    #[error("the container's rule refuses {0:?}")]
    Refused(ResourceTypeId),
    #[error("not enough free capacity for {0:?}")]
    NoSpace(ResourceTypeId),
    #[error("not enough of {0:?} stored")]
    Insufficient(ResourceTypeId),
}

/// A typed quantity store with reserved-capacity accounting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContainer {
    category: ResourceCategory,
    /// `None` means unbounded.
    capacity: Option<Quantity>,
    stored: ResourceList,
    expected: ResourceList,
    /// Container-level gate on additions, independent of any node rules.
    addition_rule: RoutingRule,
    /// Container-level gate on removals.
    removal_rule: RoutingRule,
}

impl ResourceContainer {
    /// An unbounded container accepting and releasing everything of its
    /// category.
    pub fn new(category: ResourceCategory) -> Self {
        Self {
            category,
            capacity: None,
            stored: ResourceList::new(),
            expected: ResourceList::new(),
            addition_rule: RoutingRule::Always,
            removal_rule: RoutingRule::Always,
        }
    }

    /// A bounded container holding at most `capacity` total units.
    pub fn with_capacity(category: ResourceCategory, capacity: Quantity) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::new(category)
        }
    }

    pub fn category(&self) -> ResourceCategory {
        self.category
    }

    pub fn capacity(&self) -> Option<Quantity> {
        self.capacity
    }

    pub fn set_addition_rule(&mut self, rule: RoutingRule) {
        self.addition_rule = rule;
    }

    pub fn set_removal_rule(&mut self, rule: RoutingRule) {
        self.removal_rule = rule;
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Whether `resource` belongs to this container's category.
    pub fn is_right_type(&self, registry: &Registry, resource: ResourceTypeId) -> bool {
        registry.category_of(resource) == Some(self.category)
    }

    pub fn quantity(&self, resource: ResourceTypeId) -> Quantity {
        self.stored.quantity(resource)
    }

    pub fn total_quantity(&self) -> Quantity {
        self.stored.total()
    }

    pub fn expected_quantity(&self, resource: ResourceTypeId) -> Quantity {
        self.expected.quantity(resource)
    }

    pub fn total_expected(&self) -> Quantity {
        self.expected.total()
    }

    pub fn contains(&self, resource: ResourceTypeId, quantity: Quantity) -> bool {
        self.stored.contains(resource, quantity)
    }

    /// Whether `quantity` more units fit, counting reserved capacity as
    /// already spent.
    pub fn space_for(&self, quantity: Quantity) -> bool {
        match self.capacity {
            None => true,
            Some(cap) => self.stored.total() + self.expected.total() + quantity <= cap,
        }
    }

    pub fn can_add(&self, registry: &Registry, resource: ResourceTypeId, quantity: Quantity) -> bool {
        self.is_right_type(registry, resource)
            && self.addition_rule.check(resource, self)
            && self.space_for(quantity)
    }

    pub fn can_remove(
        &self,
        registry: &Registry,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> bool {
        self.is_right_type(registry, resource)
            && self.removal_rule.check(resource, self)
            && self.contains(resource, quantity)
    }

    /// A snapshot of the stored resources.
    pub fn resource_list(&self) -> &ResourceList {
        &self.stored
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Add resources after checking `can_add`.
    pub fn add(
        &mut self,
        registry: &Registry,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<(), ContainerError> {
        if !self.is_right_type(registry, resource) {
            return Err(ContainerError::WrongCategory(resource));
        }
        if !self.addition_rule.check(resource, self) {
            return Err(ContainerError::Refused(resource));
        }
        // An expectation for this arrival has already paid for its space.
        let reserved = self.expected.quantity(resource).min(quantity);
        if !self.space_for(quantity - reserved) {
            return Err(ContainerError::NoSpace(resource));
        }
        self.add_unchecked(resource, quantity);
        Ok(())
    }

    /// Add resources without re-checking preconditions. A matching
    /// expectation, if any, is consumed by the arrival.
    pub fn add_unchecked(&mut self, resource: ResourceTypeId, quantity: Quantity) {
        let _ = self.expected.take(resource, quantity);
        self.stored.add(resource, quantity);
    }

    /// Remove resources after checking `can_remove`.
    pub fn remove(
        &mut self,
        registry: &Registry,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<(), ContainerError> {
        if !self.is_right_type(registry, resource) {
            return Err(ContainerError::WrongCategory(resource));
        }
        if !self.removal_rule.check(resource, self) {
            return Err(ContainerError::Refused(resource));
        }
        if !self.contains(resource, quantity) {
            return Err(ContainerError::Insufficient(resource));
        }
        self.remove_unchecked(resource, quantity);
        Ok(())
    }

    /// Remove resources without re-checking preconditions.
    pub fn remove_unchecked(&mut self, resource: ResourceTypeId, quantity: Quantity) {
        let taken = self.stored.take(resource, quantity);
        debug_assert_eq!(taken, quantity, "removal precondition violated");
    }

    /// Reserve capacity for a future arrival. Moves no real resources.
    pub fn expect(
        &mut self,
        registry: &Registry,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> Result<(), ContainerError> {
        if !self.is_right_type(registry, resource) {
            return Err(ContainerError::WrongCategory(resource));
        }
        if !self.space_for(quantity) {
            return Err(ContainerError::NoSpace(resource));
        }
        self.expected.add(resource, quantity);
        Ok(())
    }

    /// Release a reservation made with [`expect`](Self::expect). Releasing
    /// more than is reserved clamps to the reserved amount.
    pub fn cancel_expectation(&mut self, resource: ResourceTypeId, quantity: Quantity) {
        let _ = self.expected.take(resource, quantity);
    }

    /// Remove all stored resources. Reservations are untouched: in-flight
    /// packages still own their claims.
    pub fn clear(&mut self) {
        self.stored.clear();
    }
}
