// SPDX-License-Identifier: MIT OR Apache-2.0
//! Groups that combine their inputs through one fan-in member.
//!
//! Each input gets `adaptor -> per-input member` (a `Retime` unless the
//! definition says otherwise) and every per-input head feeds the fan-in
//! member. Reordering inputs moves the per-input members along with them.

use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::graph::{Graph, GraphError};
use crate::group::{set_inputs_with_reordering, GroupBehavior, GroupProcessor};
use crate::property::{PropertyContainer, PropertyError, PropertyValue};
use crate::store::NodeId;

/// Structure shared by the stack and sequence groups
#[derive(Debug, Clone)]
pub struct FanInBehavior {
    fan_in: String,
    per_input: String,
}

impl FanInBehavior {
    /// Behavior feeding `per_input` members into a `fan_in` member
    pub fn new(fan_in: impl Into<String>, per_input: impl Into<String>) -> Self {
        Self {
            fan_in: fan_in.into(),
            per_input: per_input.into(),
        }
    }

    fn stem(graph: &Graph, type_name: &str) -> String {
        graph
            .manager()
            .definition(type_name)
            .map_or_else(|| type_name.to_lowercase(), |d| d.default_name().to_string())
    }

    /// Copy a group property onto the fan-in if it has one of that name
    fn forward(&self, graph: &mut Graph, group: NodeId, property: &str) -> Result<(), GraphError> {
        let Some(fan_in) = graph.group_members(group)?.fan_in() else {
            return Ok(());
        };
        let Some(value) = graph.property_value(group, property).cloned() else {
            return Ok(());
        };
        if graph.property_value(fan_in, property).is_none() {
            return Ok(());
        }
        graph.set_property_value(fan_in, property, value)
    }
}

impl GroupBehavior for FanInBehavior {
    fn build(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        let stem = Self::stem(graph, &self.fan_in);
        let fan_in = graph.new_member_node(group, &self.fan_in, &stem)?;
        graph.set_group_fan_in(group, Some(fan_in))?;
        graph.set_group_root(group, Some(fan_in))?;

        let names: Vec<String> = graph.node_checked(group)?.properties.names().map(str::to_string).collect();
        for name in names {
            self.forward(graph, group, &name)?;
        }
        Ok(())
    }

    fn set_inputs(&self, graph: &mut Graph, group: NodeId, _old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError> {
        set_inputs_with_reordering(self, graph, group, new)
    }

    fn new_subgraph_for_input(
        &self,
        graph: &mut Graph,
        group: NodeId,
        _slot: usize,
        input: NodeId,
    ) -> Result<NodeId, GraphError> {
        let adaptor = graph.new_adaptor(group, Some(input))?;
        if self.per_input.is_empty() {
            return Ok(adaptor);
        }
        let stem = Self::stem(graph, &self.per_input);
        let head = graph
            .new_member_node(group, &self.per_input, &stem)
            .and_then(|head| graph.connect_member(head, vec![adaptor]).map(|()| head));
        if head.is_err() {
            graph.destroy_subgraph(adaptor)?;
        }
        head
    }

    fn property_changed(&self, graph: &mut Graph, group: NodeId, property: &str) -> Result<(), GraphError> {
        self.forward(graph, group, property)
    }
}

fn fan_in_spec(definition: &NodeDefinition) -> Result<NodeSpec, PropertyError> {
    let fan_in = definition.string_value("defaults.fanIn", "Stack");
    let per_input = definition.string_value("defaults.perInput", "Retime");
    let mut properties = PropertyContainer::new();
    if fan_in == "Stack" {
        properties.declare("composite", "type", "over".to_string())?;
    }
    Ok(NodeSpec::new(GroupProcessor)
        .with_properties(properties)
        .group(FanInBehavior::new(fan_in, per_input)))
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("StackGroup", NodeCategory::Group, fan_in_spec)
            .with_summary("Composites its inputs")
            .with_default("defaults.fanIn", PropertyValue::String(vec!["Stack".to_string()])),
    );
    manager.register(
        NodeDefinition::new("SequenceGroup", NodeCategory::Group, fan_in_spec)
            .with_summary("Plays its inputs back to back")
            .with_default("defaults.fanIn", PropertyValue::String(vec!["Sequence".to_string()])),
    );
}
