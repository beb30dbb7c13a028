// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type definitions and the registry that builds nodes from them.

use crate::group::GroupBehavior;
use crate::node::Processor;
use crate::property::{PropertyContainer, PropertyError, PropertyValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Catalog category of a node type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Reads media
    Source,
    /// Changes pixel values
    Color,
    /// Remaps time
    Time,
    /// Combines or chooses between inputs
    Composite,
    /// Stores results
    Utility,
    /// Encapsulates a subgraph
    Group,
    /// Graph plumbing, never created by users
    Internal,
}

/// Everything a freshly constructed node starts with
pub struct NodeSpec {
    /// Evaluation behavior
    pub processor: Box<dyn Processor>,
    /// Declared properties and their defaults
    pub properties: PropertyContainer,
    /// Input limit, `None` for unlimited
    pub max_inputs: Option<usize>,
    /// Accepts inputs from any scope
    pub unconstrained_inputs: bool,
    /// Present for group nodes
    pub group: Option<Arc<dyn GroupBehavior>>,
}

impl NodeSpec {
    /// Spec with a processor, no properties and unlimited inputs
    pub fn new(processor: impl Processor + 'static) -> Self {
        Self {
            processor: Box::new(processor),
            properties: PropertyContainer::new(),
            max_inputs: None,
            unconstrained_inputs: false,
            group: None,
        }
    }

    /// Replace the property set
    pub fn with_properties(mut self, properties: PropertyContainer) -> Self {
        self.properties = properties;
        self
    }

    /// Limit the number of inputs
    pub fn max_inputs(mut self, max: usize) -> Self {
        self.max_inputs = Some(max);
        self
    }

    /// Accept inputs from any scope
    pub fn unconstrained(mut self) -> Self {
        self.unconstrained_inputs = true;
        self
    }

    /// Make the node a group driven by `behavior`
    pub fn group(mut self, behavior: impl GroupBehavior + 'static) -> Self {
        self.group = Some(Arc::new(behavior));
        self
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("processor", &self.processor)
            .field("properties", &self.properties.len())
            .field("max_inputs", &self.max_inputs)
            .field("group", &self.group.is_some())
            .finish()
    }
}

/// Builds the initial state of a node
pub type NodeFactory = Arc<dyn Fn(&NodeDefinition) -> Result<NodeSpec, PropertyError> + Send + Sync>;

/// A node type: metadata, defaults and a factory
#[derive(Clone)]
pub struct NodeDefinition {
    type_name: String,
    version: u32,
    category: NodeCategory,
    default_name: String,
    summary: String,
    user_visible: bool,
    defaults: IndexMap<String, PropertyValue>,
    factory: NodeFactory,
}

impl NodeDefinition {
    /// Create a definition. The default name is the type name with a
    /// lowercase first letter.
    pub fn new(
        type_name: impl Into<String>,
        category: NodeCategory,
        factory: impl Fn(&NodeDefinition) -> Result<NodeSpec, PropertyError> + Send + Sync + 'static,
    ) -> Self {
        let type_name = type_name.into();
        let default_name = default_name_for(&type_name);
        Self {
            type_name,
            version: 1,
            category,
            default_name,
            summary: String::new(),
            user_visible: true,
            defaults: IndexMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Set the version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Set the name given to nodes created without one
    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = name.into();
        self
    }

    /// Set the catalog summary
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Hide from user-facing catalogs
    pub fn hidden(mut self) -> Self {
        self.user_visible = false;
        self
    }

    /// Add or replace a default value, e.g. `defaults.pipeline`
    pub fn with_default(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    /// Type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Catalog category
    pub fn category(&self) -> NodeCategory {
        self.category
    }

    /// Name for nodes created without one
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Catalog summary
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Shown in user-facing catalogs
    pub fn user_visible(&self) -> bool {
        self.user_visible
    }

    /// All default values
    pub fn defaults(&self) -> &IndexMap<String, PropertyValue> {
        &self.defaults
    }

    /// First string of a default, or `fallback`
    pub fn string_value(&self, key: &str, fallback: &str) -> String {
        self.defaults
            .get(key)
            .and_then(|v| v.as_slice::<String>())
            .and_then(<[String]>::first)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Every string of a default, or `fallback`
    pub fn string_array_value(&self, key: &str, fallback: &[&str]) -> Vec<String> {
        self.defaults
            .get(key)
            .and_then(|v| v.as_slice::<String>())
            .map_or_else(
                || fallback.iter().map(ToString::to_string).collect(),
                <[String]>::to_vec,
            )
    }

    /// First integer of a default, or `fallback`
    pub fn int_value(&self, key: &str, fallback: i32) -> i32 {
        self.defaults
            .get(key)
            .and_then(|v| v.as_slice::<i32>())
            .and_then(<[i32]>::first)
            .copied()
            .unwrap_or(fallback)
    }

    /// First float of a default, or `fallback`
    pub fn float_value(&self, key: &str, fallback: f32) -> f32 {
        self.defaults
            .get(key)
            .and_then(|v| v.as_slice::<f32>())
            .and_then(<[f32]>::first)
            .copied()
            .unwrap_or(fallback)
    }

    /// Run the factory
    pub fn instantiate(&self) -> Result<NodeSpec, PropertyError> {
        (self.factory)(self)
    }
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("type_name", &self.type_name)
            .field("version", &self.version)
            .field("category", &self.category)
            .field("default_name", &self.default_name)
            .field("user_visible", &self.user_visible)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Errors loading definitions
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// RON syntax or shape error
    #[error("Failed to parse node definitions: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// A definition derives from an unregistered type
    #[error("Definition {name} derives from unknown type {base}")]
    UnknownBase {
        /// Definition being loaded
        name: String,
        /// Missing base type
        base: String,
    },
}

#[derive(Debug, Deserialize)]
struct DefinitionFile {
    definitions: Vec<DefinitionEntry>,
}

#[derive(Debug, Deserialize)]
struct DefinitionEntry {
    name: String,
    base: String,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    default_name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    user_visible: Option<bool>,
    #[serde(default)]
    defaults: IndexMap<String, PropertyValue>,
}

/// Registry of node definitions
#[derive(Debug, Default)]
pub struct NodeManager {
    definitions: IndexMap<String, Arc<NodeDefinition>>,
}

impl NodeManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager holding every built-in node type
    pub fn with_builtin_nodes() -> Self {
        let mut manager = Self::new();
        crate::kinds::register_builtin(&mut manager);
        manager
    }

    /// Register a definition, replacing any previous one of the same type
    pub fn register(&mut self, definition: NodeDefinition) {
        let name = definition.type_name().to_string();
        if self.definitions.contains_key(&name) {
            tracing::debug!("Replacing node definition {}", name);
        }
        self.definitions.insert(name, Arc::new(definition));
    }

    /// Look up a definition by type name
    pub fn definition(&self, type_name: &str) -> Option<Arc<NodeDefinition>> {
        self.definitions.get(type_name).cloned()
    }

    /// Whether a type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.definitions.contains_key(type_name)
    }

    /// All registered definitions
    pub fn definitions(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions.values().map(AsRef::as_ref)
    }

    /// Definitions in one category
    pub fn definitions_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions().filter(move |d| d.category() == category)
    }

    /// Definitions shown to users
    pub fn user_visible_definitions(&self) -> impl Iterator<Item = &NodeDefinition> {
        self.definitions().filter(|d| d.user_visible())
    }

    /// Load derived definitions from RON text.
    ///
    /// Each entry names an already registered `base` type and overrides its
    /// metadata and defaults. Returns the names of the loaded definitions.
    pub fn load_definitions_ron(&mut self, text: &str) -> Result<Vec<String>, DefinitionError> {
        let file: DefinitionFile = ron::from_str(text)?;
        let mut loaded = Vec::new();

        for entry in file.definitions {
            let base = self.definition(&entry.base).ok_or_else(|| DefinitionError::UnknownBase {
                name: entry.name.clone(),
                base: entry.base.clone(),
            })?;

            let mut definition = (*base).clone();
            definition.type_name = entry.name.clone();
            definition.default_name = entry
                .default_name
                .unwrap_or_else(|| default_name_for(&entry.name));
            if let Some(version) = entry.version {
                definition.version = version;
            }
            if let Some(summary) = entry.summary {
                definition.summary = summary;
            }
            if let Some(visible) = entry.user_visible {
                definition.user_visible = visible;
            }
            definition.defaults.extend(entry.defaults);

            tracing::info!("Loaded node definition {} (from {})", entry.name, entry.base);
            loaded.push(entry.name);
            self.register(definition);
        }

        Ok(loaded)
    }
}

fn default_name_for(type_name: &str) -> String {
    let mut chars = type_name.chars();
    chars
        .next()
        .map(|c| c.to_lowercase().chain(chars).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::basic::PassThrough;

    #[test]
    fn test_default_name_lowercases_first_letter() {
        let manager = NodeManager::with_builtin_nodes();
        let def = manager.definition("ColorPipelineGroup").unwrap();
        assert_eq!(def.default_name(), "colorPipelineGroup");
        assert!(def.user_visible());
        assert!(!manager.definition("Adaptor").unwrap().user_visible());
    }

    #[test]
    fn test_defaults_accessors() {
        let def = NodeDefinition::new("Thing", NodeCategory::Utility, |_| Ok(NodeSpec::new(PassThrough)))
            .with_default("defaults.pipeline", PropertyValue::String(vec!["Color".into(), "Retime".into()]))
            .with_default("defaults.count", PropertyValue::Int(vec![3]));

        assert_eq!(def.string_array_value("defaults.pipeline", &[]), vec!["Color", "Retime"]);
        assert_eq!(def.string_value("defaults.pipeline", "x"), "Color");
        assert_eq!(def.int_value("defaults.count", 0), 3);
        assert_eq!(def.float_value("defaults.count", 1.5), 1.5);
        assert_eq!(def.string_array_value("defaults.missing", &["A"]), vec!["A"]);
    }

    #[test]
    fn test_load_definitions_ron() {
        let mut manager = NodeManager::with_builtin_nodes();
        let text = r#"(
            definitions: [
                (
                    name: "GradePipelineGroup",
                    base: "ColorPipelineGroup",
                    summary: Some("Grading stack"),
                    defaults: {
                        "defaults.pipeline": String(["ColorExposure", "Color"]),
                    },
                ),
            ],
        )"#;

        let loaded = manager.load_definitions_ron(text).unwrap();
        assert_eq!(loaded, vec!["GradePipelineGroup"]);

        let def = manager.definition("GradePipelineGroup").unwrap();
        assert_eq!(def.default_name(), "gradePipelineGroup");
        assert_eq!(def.summary(), "Grading stack");
        assert_eq!(
            def.string_array_value("defaults.pipeline", &[]),
            vec!["ColorExposure", "Color"]
        );
        assert_eq!(def.category(), NodeCategory::Group);
    }

    #[test]
    fn test_load_definitions_unknown_base() {
        let mut manager = NodeManager::new();
        let text = r#"(definitions: [(name: "A", base: "Nope")])"#;
        let err = manager.load_definitions_ron(text).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownBase { .. }));
    }
}
