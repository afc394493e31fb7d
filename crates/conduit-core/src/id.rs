use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a transport segment (one grid cell of pipe/tube).
    pub struct SegmentId;

    /// Identifies a resource node (an endpoint attachment point).
    pub struct NodeId;

    /// Identifies a resource container.
    pub struct ContainerId;

    /// Identifies a routing network.
    pub struct NetworkId;

    /// Identifies an in-flight transfer package.
    pub struct PackageId;
}

/// Identifies a resource type in the registry. Cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceTypeId(pub u32);
