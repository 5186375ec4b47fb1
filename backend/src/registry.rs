//! Pipeline registry.
//!
//! Holds every table configuration, resolves the global processing order and
//! hands out business validators and value transformers by name.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::{tables, PipelineSettings, TableConfiguration};
use crate::error::{ConfigError, ConfigResult};
use crate::transform::dsl::transformers::{self, Transformer};
use crate::validation::business::{self, BusinessValidator};

/// Validated set of table configurations.
#[derive(Clone)]
pub struct PipelineRegistry {
    configs: BTreeMap<String, TableConfiguration>,
    validators: BTreeMap<&'static str, BusinessValidator>,
    transformers: BTreeMap<&'static str, Transformer>,
    order: Vec<String>,
}

impl fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("tables", &self.order)
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PipelineRegistry {
    /// Register and validate `configs`.
    ///
    /// Every configuration problem is reported here, before any stage runs.
    pub fn new(configs: Vec<TableConfiguration>, settings: &PipelineSettings) -> ConfigResult<Self> {
        let mut registry = Self {
            configs: BTreeMap::new(),
            validators: business::builtin().into_iter().collect(),
            transformers: transformers::builtin().into_iter().collect(),
            order: Vec::new(),
        };

        for config in configs {
            config.validate()?;
            if registry.configs.contains_key(&config.name) {
                return Err(ConfigError::DuplicateTable(config.name));
            }
            registry.configs.insert(config.name.clone(), config);
        }

        for config in registry.configs.values() {
            registry.check_references(config)?;
        }

        if settings.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize("<settings>".to_string()));
        }
        if let Some(unknown) = settings
            .tables
            .iter()
            .find(|t| !registry.configs.contains_key(t.as_str()))
        {
            return Err(ConfigError::UnknownTable(unknown.clone()));
        }

        registry.order = registry.topological_order()?;
        Ok(registry)
    }

    /// Registry over the built-in source tables.
    pub fn with_builtin_tables(settings: &PipelineSettings) -> ConfigResult<Self> {
        Self::new(tables::all(), settings)
    }

    fn check_references(&self, config: &TableConfiguration) -> ConfigResult<()> {
        if let Some(name) = &config.validator {
            if !self.validators.contains_key(name.as_str()) {
                return Err(ConfigError::UnknownValidator {
                    table: config.name.clone(),
                    name: name.clone(),
                });
            }
        }
        for rule in &config.transformations {
            if !self.transformers.contains_key(rule.transformer.as_str()) {
                return Err(ConfigError::UnknownTransformer {
                    table: config.name.clone(),
                    name: rule.transformer.clone(),
                });
            }
        }
        for dependency in &config.dependencies {
            if !self.configs.contains_key(dependency) {
                return Err(ConfigError::UnknownDependency {
                    table: config.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
        for field in config.consumed_fields() {
            if self.provider_of(field).is_none() {
                return Err(ConfigError::UnknownSharedField {
                    table: config.name.clone(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Table that provides shared field `field`.
    pub fn provider_of(&self, field: &str) -> Option<&str> {
        self.configs
            .values()
            .find(|c| c.provides.iter().any(|p| p == field))
            .map(|c| c.name.as_str())
    }

    /// Declared dependencies plus the providers of every consumed shared field.
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<String> {
        let Some(config) = self.configs.get(name) else {
            return BTreeSet::new();
        };
        let mut deps: BTreeSet<String> = config.dependencies.iter().cloned().collect();
        for field in config.consumed_fields() {
            if let Some(provider) = self.provider_of(field) {
                if provider != name {
                    deps.insert(provider.to_string());
                }
            }
        }
        deps
    }

    /// Kahn's algorithm; ready tables are taken alphabetically.
    fn topological_order(&self) -> ConfigResult<Vec<String>> {
        let mut in_degree: BTreeMap<String, usize> =
            self.configs.keys().map(|name| (name.clone(), 0usize)).collect();
        let mut outgoing: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.configs.keys() {
            for dep in self.dependencies_of(name) {
                *in_degree.entry(name.clone()).or_default() += 1;
                outgoing.entry(dep).or_default().push(name.clone());
            }
        }

        let mut ready: BTreeSet<String> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.clone())
            .collect();
        let mut order = Vec::with_capacity(self.configs.len());

        while let Some(node) = ready.pop_first() {
            if let Some(children) = outgoing.get(&node) {
                for child in children {
                    if let Some(entry) = in_degree.get_mut(child) {
                        *entry = entry.saturating_sub(1);
                        if *entry == 0 {
                            ready.insert(child.clone());
                        }
                    }
                }
            }
            order.push(node);
        }

        if order.len() != self.configs.len() {
            let stuck = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name)
                .collect();
            return Err(ConfigError::Cycle(stuck));
        }
        Ok(order)
    }

    /// Global processing order: every table after all of its dependencies.
    pub fn processing_order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, name: &str) -> ConfigResult<&TableConfiguration> {
        self.configs
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTable(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableConfiguration> {
        self.configs.values()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn validator(&self, name: &str) -> Option<BusinessValidator> {
        self.validators.get(name).copied()
    }

    pub fn transformer(&self, name: &str) -> Option<Transformer> {
        self.transformers.get(name).copied()
    }
}
