// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pipeline groups: a configurable chain of single-input members.
//!
//! `pipeline.nodes` lists member types, upstream first. Changing it rebuilds
//! the chain, reusing existing members of a matching type in order so their
//! settings survive.

use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::graph::{Graph, GraphError};
use crate::group::{GroupBehavior, GroupProcessor};
use crate::property::{PropertyContainer, PropertyError, PropertyInfo, PropertyValue};
use crate::store::NodeId;

/// Property holding the member types
pub const PIPELINE_NODES: &str = "pipeline.nodes";

/// Keeps the chain in sync with `pipeline.nodes`
#[derive(Debug, Default)]
pub struct PipelineBehavior;

fn pipeline_adaptor(graph: &Graph, group: NodeId) -> Result<NodeId, GraphError> {
    graph.find_member(group, "adaptor").ok_or_else(|| {
        let name = graph.node_name(group).unwrap_or_default();
        tracing::error!("Pipeline {} lost its adaptor", name);
        GraphError::Internal(format!("pipeline {name} has no adaptor"))
    })
}

impl GroupBehavior for PipelineBehavior {
    fn build(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        let adaptor = graph.new_adaptor(group, None)?;
        graph.set_group_root(group, Some(adaptor))?;
        self.rebuild(graph, group)
    }

    fn set_inputs(&self, graph: &mut Graph, group: NodeId, _old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError> {
        let adaptor = pipeline_adaptor(graph, group)?;
        graph.rebind_adaptor(adaptor, new.first().copied())
    }

    fn rebuild(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        let types: Vec<String> = graph
            .property_value(group, PIPELINE_NODES)
            .and_then(PropertyValue::as_slice::<String>)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        let adaptor = pipeline_adaptor(graph, group)?;

        let mut unused: Vec<Option<NodeId>> = graph
            .group_members(group)?
            .chain()
            .iter()
            .copied()
            .map(Some)
            .collect();
        let mut chain = Vec::with_capacity(types.len());

        for type_name in &types {
            let position = unused.iter().position(|slot| {
                slot.is_some_and(|id| graph.node(id).is_some_and(|n| n.type_name() == type_name))
            });
            if let Some(id) = position.and_then(|i| unused[i].take()) {
                chain.push(id);
                continue;
            }

            let Some(stem) = graph.manager().definition(type_name).map(|d| d.default_name().to_string()) else {
                tracing::warn!("Skipping unknown pipeline node type {}", type_name);
                continue;
            };
            chain.push(graph.new_member_node(group, type_name, &stem)?);
        }

        for id in unused.into_iter().flatten() {
            graph.destroy_member(id)?;
        }

        let mut upstream = adaptor;
        for &id in &chain {
            graph.connect_member(id, vec![upstream])?;
            upstream = id;
        }
        tracing::debug!(
            "Pipeline {} is now {:?}",
            graph.node_name(group).unwrap_or_default(),
            types
        );
        graph.set_group_chain(group, chain)?;
        graph.set_group_root(group, Some(upstream))
    }
}

fn pipeline_spec(definition: &NodeDefinition) -> Result<NodeSpec, PropertyError> {
    let mut properties = PropertyContainer::new();
    properties.declare_with_info(
        PIPELINE_NODES,
        definition.string_array_value("defaults.pipeline", &[]),
        PropertyInfo::DEFAULT.graph_edit(),
    )?;
    Ok(NodeSpec::new(GroupProcessor)
        .with_properties(properties)
        .max_inputs(1)
        .group(PipelineBehavior))
}

fn pipeline_definition(type_name: &str, summary: &str, nodes: &[&str]) -> NodeDefinition {
    NodeDefinition::new(type_name, NodeCategory::Group, pipeline_spec)
        .with_summary(summary)
        .with_default(
            "defaults.pipeline",
            PropertyValue::String(nodes.iter().map(ToString::to_string).collect()),
        )
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(pipeline_definition("PipelineGroup", "Chain of single-input nodes", &[]));
    manager.register(pipeline_definition(
        "ColorPipelineGroup",
        "Per-source color correction",
        &["Color"],
    ));
    manager.register(pipeline_definition(
        "LinearizePipelineGroup",
        "Conversion to linear light",
        &[],
    ));
    manager.register(pipeline_definition("LookPipelineGroup", "Creative look", &[]));
    manager.register(pipeline_definition(
        "DisplayPipelineGroup",
        "Display transform",
        &["DisplayColor"],
    ));
}
