// SPDX-License-Identifier: MIT OR Apache-2.0
//! Profiles: named bundles of property values for a node and its members.
//!
//! A profile is captured from a node (recursing through group members) and
//! can be applied to another node of the same shape. Entries are matched to
//! nodes by type, in depth-first order, and values go through the normal
//! property path so group rebuilds happen as the values land.

use crate::graph::{Graph, GraphError};
use crate::property::{PropertyInfo, PropertyValue};
use crate::store::NodeId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Profile errors
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Malformed RON
    #[error("Failed to parse profile: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Failed to serialize profile: {0}")]
    Serialize(#[from] ron::Error),

    /// Reading or writing the file failed
    #[error("Profile I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Applying a value failed
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Property values captured from one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileEntry {
    /// Type of the node the values came from
    pub node_type: String,
    /// Values by qualified property name
    pub properties: IndexMap<String, PropertyValue>,
}

/// Named set of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name
    pub name: String,
    /// Free-form tag used to group profiles
    #[serde(default)]
    pub tag: String,
    /// Entries in depth-first node order
    pub entries: Vec<ProfileEntry>,
}

fn captured(info: PropertyInfo) -> bool {
    info.persistent && !info.output_only && !info.excluded_from_profile
}

impl Profile {
    /// Capture `node` and its members
    pub fn capture(
        graph: &Graph,
        node: NodeId,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let mut entries = Vec::new();
        capture_into(graph, node, &mut entries)?;
        Ok(Self {
            name: name.into(),
            tag: tag.into(),
            entries,
        })
    }

    /// Apply to `node` and its members; returns the number of values set
    pub fn apply(&self, graph: &mut Graph, node: NodeId) -> Result<usize, ProfileError> {
        let mut used = vec![false; self.entries.len()];
        let applied = self.apply_node(graph, node, &mut used)?;
        tracing::debug!(
            "Applied profile {} to {}: {} values",
            self.name,
            graph.node_name(node).unwrap_or_default(),
            applied
        );
        Ok(applied)
    }

    fn apply_node(&self, graph: &mut Graph, id: NodeId, used: &mut [bool]) -> Result<usize, ProfileError> {
        let type_name = graph
            .node(id)
            .ok_or(GraphError::StaleNode(id))?
            .type_name()
            .to_string();

        let mut applied = 0;
        let slot = (0..self.entries.len()).find(|&i| !used[i] && self.entries[i].node_type == type_name);
        if let Some(i) = slot {
            used[i] = true;
            for (name, value) in &self.entries[i].properties {
                let Some(info) = graph.node(id).and_then(|n| n.properties().info(name)) else {
                    tracing::debug!("Profile {}: {} has no property {}", self.name, type_name, name);
                    continue;
                };
                if !captured(info) {
                    continue;
                }
                graph.set_property_value(id, name, value.clone())?;
                applied += 1;
            }
        }

        // Values above may have rebuilt the group
        let members = match graph.node(id).and_then(|n| n.members()) {
            Some(members) => members.ids(),
            None => Vec::new(),
        };
        for member in members {
            if graph.is_live(member) {
                applied += self.apply_node(graph, member, used)?;
            }
        }
        Ok(applied)
    }

    /// Parse from RON
    pub fn from_ron(text: &str) -> Result<Self, ProfileError> {
        Ok(ron::from_str(text)?)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ProfileError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Save to a file
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

fn capture_into(graph: &Graph, id: NodeId, entries: &mut Vec<ProfileEntry>) -> Result<(), GraphError> {
    let node = graph.node(id).ok_or(GraphError::StaleNode(id))?;
    let properties = node
        .properties()
        .iter()
        .filter(|p| captured(p.info()))
        .map(|p| (p.name().to_string(), p.value().clone()))
        .collect();
    entries.push(ProfileEntry {
        node_type: node.type_name().to_string(),
        properties,
    });
    if let Some(members) = node.members() {
        for member in members.ids() {
            capture_into(graph, member, entries)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded_pipeline(graph: &mut Graph) -> NodeId {
        let group = graph.new_node("ColorPipelineGroup", "").unwrap();
        graph
            .set_property(group, "pipeline.nodes", vec!["ColorExposure".to_string(), "Color".to_string()])
            .unwrap();
        let chain = graph.group_members(group).unwrap().chain().to_vec();
        graph.set_property(chain[0], "color.exposure", vec![1.5f32]).unwrap();
        graph.set_property(chain[1], "color.saturation", vec![0.5f32]).unwrap();
        group
    }

    #[test]
    fn test_capture_recurses_into_members() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graded_pipeline(&mut graph);
        let profile = Profile::capture(&graph, group, "grade", "look").unwrap();

        assert_eq!(profile.entries[0].node_type, "ColorPipelineGroup");
        let types: Vec<&str> = profile.entries.iter().map(|e| e.node_type.as_str()).collect();
        assert!(types.contains(&"ColorExposure"));
        assert!(types.contains(&"Color"));
        assert!(types.contains(&"Adaptor"));
    }

    #[test]
    fn test_apply_rebuilds_and_sets_members() {
        let mut graph = Graph::with_builtins().unwrap();
        let source = graded_pipeline(&mut graph);
        let profile = Profile::capture(&graph, source, "grade", "").unwrap();

        let target = graph.new_node("ColorPipelineGroup", "").unwrap();
        profile.apply(&mut graph, target).unwrap();

        let chain = graph.group_members(target).unwrap().chain().to_vec();
        assert_eq!(chain.len(), 2);
        let exposure = graph.node(chain[0]).unwrap();
        assert_eq!(exposure.type_name(), "ColorExposure");
        assert_eq!(exposure.properties().front_or("color.exposure", 0.0f32), 1.5);
        assert_eq!(
            graph.node(chain[1]).unwrap().properties().front_or("color.saturation", 1.0f32),
            0.5
        );
    }

    #[test]
    fn test_unknown_properties_skipped() {
        let mut graph = Graph::with_builtins().unwrap();
        let node = graph.new_node("ColorExposure", "").unwrap();
        let mut properties = IndexMap::new();
        properties.insert("color.exposure".to_string(), PropertyValue::Float(vec![2.0]));
        properties.insert("color.sparkle".to_string(), PropertyValue::Float(vec![1.0]));
        let profile = Profile {
            name: "p".to_string(),
            tag: String::new(),
            entries: vec![ProfileEntry {
                node_type: "ColorExposure".to_string(),
                properties,
            }],
        };

        assert_eq!(profile.apply(&mut graph, node).unwrap(), 1);
        assert!(graph.property_value(node, "color.sparkle").is_none());
    }

    #[test]
    fn test_ron_text() {
        let mut graph = Graph::with_builtins().unwrap();
        let group = graded_pipeline(&mut graph);
        let profile = Profile::capture(&graph, group, "grade", "look").unwrap();
        let text = profile.to_ron().unwrap();
        assert!(text.contains("ColorExposure"));
        assert_eq!(Profile::from_ron(&text).unwrap(), profile);
    }
}
