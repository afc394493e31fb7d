//! Resource nodes: the attachment points binding containers to the grid.
//!
//! A node sits at a tile facing a direction; the segment it attaches to is
//! the neighbor tile in that direction. Each node is owned by exactly one
//! container and belongs to at most one network at a time.

use crate::behavior::NodeBehavior;
use crate::container::ResourceContainer;
use crate::fixed::Quantity;
use crate::grid::{Direction, TileCoord};
use crate::id::{ContainerId, NetworkId, ResourceTypeId};
use crate::registry::{Registry, ResourceCategory};
use serde::{Deserialize, Serialize};

/// A resource node. Stored in the engine's node arena; all references are
/// ids into sibling arenas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceNode {
    pub tile: TileCoord,
    pub dir: Direction,
    pub category: ResourceCategory,
    /// The container this node moves resources in and out of.
    pub container: ContainerId,
    /// The network this node is attached to, if any.
    pub network: Option<NetworkId>,
    pub behavior: NodeBehavior,
}

impl ResourceNode {
    pub fn new(
        tile: TileCoord,
        dir: Direction,
        category: ResourceCategory,
        container: ContainerId,
    ) -> Self {
        Self {
            tile,
            dir,
            category,
            container,
            network: None,
            behavior: NodeBehavior::default(),
        }
    }

    /// The tile a transport segment must occupy to connect to this node.
    pub fn segment_tile(&self) -> TileCoord {
        self.tile.neighbor(self.dir)
    }

    /// Whether the resource belongs to this node's category.
    pub fn is_right_type(&self, registry: &Registry, resource: ResourceTypeId) -> bool {
        registry.category_of(resource) == Some(self.category)
    }

    /// Whether this node may receive `quantity` of `resource` right now:
    /// category match, the allow-input rule holds, and the owning container
    /// has free (unreserved) space.
    pub fn can_input(
        &self,
        registry: &Registry,
        container: &ResourceContainer,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> bool {
        self.is_right_type(registry, resource)
            && self.behavior.allow_in.check(resource, container)
            && container.can_add(registry, resource, quantity)
    }

    /// Whether this node may emit `quantity` of `resource` right now:
    /// category match, the allow-output rule holds, and the owning container
    /// has the goods.
    pub fn can_output(
        &self,
        registry: &Registry,
        container: &ResourceContainer,
        resource: ResourceTypeId,
        quantity: Quantity,
    ) -> bool {
        self.is_right_type(registry, resource)
            && self.behavior.allow_out.check(resource, container)
            && container.can_remove(registry, resource, quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::RoutingRule;
    use crate::fixed::qty;
    use crate::registry::RegistryBuilder;
    use slotmap::SlotMap;

    fn fixture() -> (Registry, ResourceTypeId, ContainerId, ResourceContainer) {
        let mut builder = RegistryBuilder::new();
        let iron = builder
            .register_resource("iron_ingot", ResourceCategory::Item)
            .unwrap();
        let registry = builder.build();
        let mut arena: SlotMap<ContainerId, ()> = SlotMap::with_key();
        let id = arena.insert(());
        let container = ResourceContainer::with_capacity(ResourceCategory::Item, qty(10));
        (registry, iron, id, container)
    }

    #[test]
    fn segment_tile_follows_direction() {
        let (_, _, container_id, _) = fixture();
        let node = ResourceNode::new(
            TileCoord::new(2, 2),
            Direction::East,
            ResourceCategory::Item,
            container_id,
        );
        assert_eq!(node.segment_tile(), TileCoord::new(3, 2));
    }

    #[test]
    fn can_input_checks_rule_and_space() {
        let (registry, iron, container_id, mut container) = fixture();
        let mut node = ResourceNode::new(
            TileCoord::new(0, 0),
            Direction::North,
            ResourceCategory::Item,
            container_id,
        );

        assert!(node.can_input(&registry, &container, iron, qty(10)));
        assert!(!node.can_input(&registry, &container, iron, qty(11)));

        node.behavior.allow_in = RoutingRule::Never;
        assert!(!node.can_input(&registry, &container, iron, qty(1)));

        node.behavior.allow_in = RoutingRule::Always;
        container.add(&registry, iron, qty(10)).unwrap();
        assert!(!node.can_input(&registry, &container, iron, qty(1)));
    }

    #[test]
    fn can_output_requires_stock() {
        let (registry, iron, container_id, mut container) = fixture();
        let node = ResourceNode::new(
            TileCoord::new(0, 0),
            Direction::South,
            ResourceCategory::Item,
            container_id,
        );

        assert!(!node.can_output(&registry, &container, iron, qty(1)));
        container.add(&registry, iron, qty(3)).unwrap();
        assert!(node.can_output(&registry, &container, iron, qty(3)));
        assert!(!node.can_output(&registry, &container, iron, qty(4)));
    }
}
