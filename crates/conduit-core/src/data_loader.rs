//! Data-driven registry loading from JSON.
//!
//! Feature-gated behind `data-loader`. Provides JSON deserialization into
//! [`RegistryBuilder`] for resource types defined in data files.

use crate::registry::{RegistryBuilder, RegistryError, ResourceCategory};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("unknown resource category: {0}")]
    UnknownCategory(String),
}

// ---------------------------------------------------------------------------
// JSON data structures
// ---------------------------------------------------------------------------

/// Top-level registry data structure for JSON deserialization.
#[derive(Debug, serde::Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub resources: Vec<ResourceData>,
}

/// JSON representation of a resource type.
#[derive(Debug, serde::Deserialize)]
pub struct ResourceData {
    pub name: String,
    /// "item" or "fluid".
    pub category: String,
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a registry builder from a JSON string.
pub fn load_registry_json(json: &str) -> Result<RegistryBuilder, DataLoadError> {
    let data: RegistryData = serde_json::from_str(json)?;
    build_registry(data)
}

/// Load a registry builder from JSON bytes.
pub fn load_registry_json_bytes(bytes: &[u8]) -> Result<RegistryBuilder, DataLoadError> {
    let data: RegistryData = serde_json::from_slice(bytes)?;
    build_registry(data)
}

fn parse_category(name: &str) -> Result<ResourceCategory, DataLoadError> {
    match name {
        "item" => Ok(ResourceCategory::Item),
        "fluid" => Ok(ResourceCategory::Fluid),
        other => Err(DataLoadError::UnknownCategory(other.to_string())),
    }
}

fn build_registry(data: RegistryData) -> Result<RegistryBuilder, DataLoadError> {
    let mut builder = RegistryBuilder::new();
    for resource in &data.resources {
        let category = parse_category(&resource.category)?;
        builder.register_resource(&resource.name, category)?;
    }
    Ok(builder)
}
