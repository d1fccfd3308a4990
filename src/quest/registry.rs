//! Capability Registry
//!
//! Maps metadata, addon and objective ids found in quest configs to the
//! code that builds them. Engines start from [`CapabilityRegistry::with_builtins`]
//! and games register their own kinds on top.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::addon::{ADDON_STATS, Extension, StatsAddon};
use super::container::ContainerScope;
use super::meta::{ControlMeta, META_CONTROL, META_RESTART, META_TIMEOUT, Metadata, RestartMeta, TimeoutMeta};
use super::objective::{Objective, SignatureObjective};

/// Builds a metadata capability from its config value
pub type MetadataFactory =
    Box<dyn Fn(&toml::Value, &ContainerScope) -> Result<Arc<dyn Metadata>, String> + Send + Sync>;

/// Builds an extension capability from its config value
pub type ExtensionFactory =
    Box<dyn Fn(&toml::Value, &ContainerScope) -> Result<Arc<dyn Extension>, String> + Send + Sync>;

#[derive(Default)]
pub struct CapabilityRegistry {
    metadata: HashMap<String, MetadataFactory>,
    extensions: HashMap<String, ExtensionFactory>,
    objectives: HashMap<String, Arc<dyn Objective>>,
}

impl CapabilityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the builtin control/restart/timeout metadata, the stats
    /// addon and the signature objective
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_metadata(META_CONTROL, |value, _| {
            Ok(Arc::new(ControlMeta::from_config(value)?) as Arc<dyn Metadata>)
        });
        registry.register_metadata(META_RESTART, |value, _| {
            Ok(Arc::new(RestartMeta::from_config(value)?) as Arc<dyn Metadata>)
        });
        registry.register_metadata(META_TIMEOUT, |value, _| {
            Ok(Arc::new(TimeoutMeta::from_config(value)?) as Arc<dyn Metadata>)
        });
        registry.register_extension(ADDON_STATS, |value, _| {
            Ok(Arc::new(StatsAddon::from_config(value)?) as Arc<dyn Extension>)
        });
        registry.register_objective(Arc::new(SignatureObjective));

        registry
    }

    pub fn register_metadata<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&toml::Value, &ContainerScope) -> Result<Arc<dyn Metadata>, String> + Send + Sync + 'static,
    {
        self.metadata.insert(id.to_string(), Box::new(factory));
    }

    pub fn register_extension<F>(&mut self, id: &str, factory: F)
    where
        F: Fn(&toml::Value, &ContainerScope) -> Result<Arc<dyn Extension>, String> + Send + Sync + 'static,
    {
        self.extensions.insert(id.to_string(), Box::new(factory));
    }

    pub fn register_objective(&mut self, objective: Arc<dyn Objective>) {
        self.objectives.insert(objective.name().to_string(), objective);
    }

    /// Build metadata `id`; `None` when the id is not registered
    pub fn create_metadata(
        &self,
        id: &str,
        value: &toml::Value,
        scope: &ContainerScope,
    ) -> Option<Result<Arc<dyn Metadata>, String>> {
        self.metadata.get(id).map(|factory| factory(value, scope))
    }

    /// Build extension `id`; `None` when the id is not registered
    pub fn create_extension(
        &self,
        id: &str,
        value: &toml::Value,
        scope: &ContainerScope,
    ) -> Option<Result<Arc<dyn Extension>, String>> {
        self.extensions.get(id).map(|factory| factory(value, scope))
    }

    pub fn objective(&self, name: &str) -> Option<Arc<dyn Objective>> {
        self.objectives.get(name).cloned()
    }

    pub fn metadata_ids(&self) -> Vec<String> {
        sorted_keys(self.metadata.keys())
    }

    pub fn extension_ids(&self) -> Vec<String> {
        sorted_keys(self.extensions.keys())
    }

    pub fn objective_names(&self) -> Vec<String> {
        sorted_keys(self.objectives.keys())
    }
}

fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut keys: Vec<String> = keys.cloned().collect();
    keys.sort();
    keys
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("metadata", &self.metadata_ids())
            .field("extensions", &self.extension_ids())
            .field("objectives", &self.objective_names())
            .finish()
    }
}
