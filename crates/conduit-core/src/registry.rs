use crate::id::ResourceTypeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The broad class a resource belongs to. Networks of different categories
/// share machinery but never interoperate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceCategory {
    /// Discrete stackable items. Quantities are whole values.
    Item,
    /// Continuous fluids. Quantities may be fractional.
    Fluid,
}

/// A resource type definition in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    pub name: String,
    pub category: ResourceCategory,
}

/// Builder for constructing an immutable [`Registry`].
/// Two-phase lifecycle: registration, then finalization.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    resources: Vec<ResourceDef>,
    name_to_id: HashMap<String, ResourceTypeId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type. Returns its ID, or an error if the name
    /// is already taken.
    pub fn register_resource(
        &mut self,
        name: &str,
        category: ResourceCategory,
    ) -> Result<ResourceTypeId, RegistryError> {
        if self.name_to_id.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let id = ResourceTypeId(self.resources.len() as u32);
        self.resources.push(ResourceDef {
            name: name.to_string(),
            category,
        });
        self.name_to_id.insert(name.to_string(), id);
        Ok(id)
    }

    /// Lookup resource type ID by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceTypeId> {
        self.name_to_id.get(name).copied()
    }

    /// Finalize and build the immutable registry.
    pub fn build(self) -> Registry {
        Registry {
            resources: self.resources,
            name_to_id: self.name_to_id,
        }
    }
}

/// Immutable registry of resource types, frozen at engine construction.
/// Replaces ambient global type tables with an explicit object passed by
/// reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    resources: Vec<ResourceDef>,
    name_to_id: HashMap<String, ResourceTypeId>,
}

impl Registry {
    /// Returns the definition for a resource type, if registered.
    pub fn resource(&self, id: ResourceTypeId) -> Option<&ResourceDef> {
        self.resources.get(id.0 as usize)
    }

    /// Returns the category of a resource type, if registered.
    pub fn category_of(&self, id: ResourceTypeId) -> Option<ResourceCategory> {
        self.resource(id).map(|def| def.category)
    }

    /// Lookup resource type ID by name.
    pub fn resource_id(&self, name: &str) -> Option<ResourceTypeId> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered resource types.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Errors from registry construction and lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("resource name already registered: {0}")]
    DuplicateName(String),
    #[error("resource not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let mut builder = RegistryBuilder::new();
        let iron = builder
            .register_resource("iron_ingot", ResourceCategory::Item)
            .unwrap();
        let water = builder
            .register_resource("water", ResourceCategory::Fluid)
            .unwrap();
        let registry = builder.build();

        assert_eq!(registry.resource_id("iron_ingot"), Some(iron));
        assert_eq!(registry.category_of(iron), Some(ResourceCategory::Item));
        assert_eq!(registry.category_of(water), Some(ResourceCategory::Fluid));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_resource("iron_ingot", ResourceCategory::Item)
            .unwrap();
        let err = builder.register_resource("iron_ingot", ResourceCategory::Item);
        assert!(matches!(err, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn unknown_id_is_none() {
        let registry = RegistryBuilder::new().build();
        assert!(registry.resource(ResourceTypeId(0)).is_none());
        assert!(registry.resource_id("missing").is_none());
        assert!(registry.is_empty());
    }
}
