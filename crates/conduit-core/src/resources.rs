//! Resource lists: ordered multisets of typed quantities.
//!
//! A [`ResourceList`] is the currency of every multi-line transfer and
//! aggregate query. Storage is a `BTreeMap` so iteration order is
//! deterministic regardless of insertion order.

use crate::fixed::Quantity;
use crate::id::ResourceTypeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An ordered mapping from resource type to quantity. Zero-quantity entries
/// are dropped eagerly so emptiness checks stay meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    entries: BTreeMap<ResourceTypeId, Quantity>,
}

impl ResourceList {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list holding a single resource line.
    pub fn of(resource: ResourceTypeId, quantity: Quantity) -> Self {
        let mut list = Self::new();
        list.add(resource, quantity);
        list
    }

    /// Add a quantity of a resource. Adding zero is a no-op.
    pub fn add(&mut self, resource: ResourceTypeId, quantity: Quantity) {
        if quantity <= Quantity::ZERO {
            return;
        }
        *self.entries.entry(resource).or_insert(Quantity::ZERO) += quantity;
    }

    /// Add every line of another list.
    pub fn add_all(&mut self, other: &ResourceList) {
        for (&resource, &quantity) in &other.entries {
            self.add(resource, quantity);
        }
    }

    /// Take up to `quantity` of a resource. Returns the amount actually
    /// taken, which may be less than requested.
    #[must_use = "returns the quantity actually taken, which may be less than requested"]
    pub fn take(&mut self, resource: ResourceTypeId, quantity: Quantity) -> Quantity {
        let Some(current) = self.entries.get_mut(&resource) else {
            return Quantity::ZERO;
        };
        let taken = quantity.min(*current);
        *current -= taken;
        if *current <= Quantity::ZERO {
            self.entries.remove(&resource);
        }
        taken
    }

    /// The stored quantity of a resource, zero if absent.
    pub fn quantity(&self, resource: ResourceTypeId) -> Quantity {
        self.entries.get(&resource).copied().unwrap_or(Quantity::ZERO)
    }

    /// Whether the list holds at least `quantity` of `resource`.
    pub fn contains(&self, resource: ResourceTypeId, quantity: Quantity) -> bool {
        self.quantity(resource) >= quantity
    }

    /// Sum of all quantities across types.
    pub fn total(&self) -> Quantity {
        self.entries.values().copied().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate lines in resource-id order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceTypeId, Quantity)> + '_ {
        self.entries.iter().map(|(&r, &q)| (r, q))
    }

    /// The set of types present with quantity greater than zero.
    pub fn types(&self) -> impl Iterator<Item = ResourceTypeId> + '_ {
        self.entries.keys().copied()
    }
}

impl FromIterator<(ResourceTypeId, Quantity)> for ResourceList {
    fn from_iter<I: IntoIterator<Item = (ResourceTypeId, Quantity)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (resource, quantity) in iter {
            list.add(resource, quantity);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::qty;

    const IRON: ResourceTypeId = ResourceTypeId(0);
    const COPPER: ResourceTypeId = ResourceTypeId(1);

    #[test]
    fn add_and_query() {
        let mut list = ResourceList::new();
        list.add(IRON, qty(10));
        list.add(IRON, qty(5));
        list.add(COPPER, qty(3));
        assert_eq!(list.quantity(IRON), qty(15));
        assert_eq!(list.quantity(COPPER), qty(3));
        assert_eq!(list.total(), qty(18));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn take_partial_and_exhaust() {
        let mut list = ResourceList::of(IRON, qty(10));
        assert_eq!(list.take(IRON, qty(4)), qty(4));
        assert_eq!(list.quantity(IRON), qty(6));
        // Taking more than present takes what is there and drops the entry.
        assert_eq!(list.take(IRON, qty(100)), qty(6));
        assert!(list.is_empty());
        assert_eq!(list.take(IRON, qty(1)), qty(0));
    }

    #[test]
    fn zero_add_is_noop() {
        let mut list = ResourceList::new();
        list.add(IRON, qty(0));
        assert!(list.is_empty());
    }

    #[test]
    fn contains_respects_quantity() {
        let list = ResourceList::of(IRON, qty(5));
        assert!(list.contains(IRON, qty(5)));
        assert!(!list.contains(IRON, qty(6)));
        assert!(!list.contains(COPPER, qty(1)));
        // Zero of anything is always contained.
        assert!(list.contains(COPPER, qty(0)));
    }

    #[test]
    fn iteration_is_ordered() {
        let mut list = ResourceList::new();
        list.add(COPPER, qty(1));
        list.add(IRON, qty(2));
        let types: Vec<_> = list.types().collect();
        assert_eq!(types, vec![IRON, COPPER]);
    }

    #[test]
    fn add_all_merges() {
        let mut a = ResourceList::of(IRON, qty(1));
        let b: ResourceList = [(IRON, qty(2)), (COPPER, qty(3))].into_iter().collect();
        a.add_all(&b);
        assert_eq!(a.quantity(IRON), qty(3));
        assert_eq!(a.quantity(COPPER), qty(3));
    }
}
