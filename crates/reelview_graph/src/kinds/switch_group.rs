// SPDX-License-Identifier: MIT OR Apache-2.0
//! Switch group: one adaptor per input feeding a `Switch` member.

use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::graph::{Graph, GraphError};
use crate::group::{set_inputs_with_reordering, GroupBehavior, GroupProcessor};
use crate::property::{PropertyContainer, PropertyInfo};
use crate::store::NodeId;

/// Maintains the adaptors and the switch fan-in
#[derive(Debug, Default)]
pub struct SwitchGroupBehavior;

impl SwitchGroupBehavior {
    fn new_fan_in(&self, graph: &mut Graph, group: NodeId) -> Result<NodeId, GraphError> {
        let fan_in = graph.new_member_node(group, "Switch", "switch")?;
        let active = graph
            .node(group)
            .map_or(0, |n| n.properties().front_or("switch.active", 0i32));
        graph.set_property(fan_in, "switch.active", vec![active])?;
        graph.set_group_fan_in(group, Some(fan_in))?;
        graph.set_group_root(group, Some(fan_in))?;
        Ok(fan_in)
    }
}

impl GroupBehavior for SwitchGroupBehavior {
    fn build(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        self.new_fan_in(graph, group).map(|_| ())
    }

    fn set_inputs(&self, graph: &mut Graph, group: NodeId, _old: &[NodeId], new: &[NodeId]) -> Result<(), GraphError> {
        set_inputs_with_reordering(self, graph, group, new)
    }

    fn rebuild(&self, graph: &mut Graph, group: NodeId) -> Result<(), GraphError> {
        let members = graph.group_members(group)?;
        let heads = members.heads().to_vec();
        if let Some(old) = members.fan_in() {
            graph.destroy_member(old)?;
        }
        let fan_in = self.new_fan_in(graph, group)?;
        graph.connect_member(fan_in, heads)
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("SwitchGroup", NodeCategory::Group, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare_with_info("switch.active", vec![0i32], PropertyInfo::DEFAULT.graph_edit())?;
            Ok(NodeSpec::new(GroupProcessor)
                .with_properties(properties)
                .group(SwitchGroupBehavior))
        })
        .with_summary("Shows one of its inputs"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_group_rebuilds_fan_in() {
        let mut graph = Graph::with_builtins().unwrap();
        let a = graph.new_node("FileSource", "a").unwrap();
        let b = graph.new_node("FileSource", "b").unwrap();
        graph.set_property(a, "media.movie", vec!["solid,red=1.movieproc".to_string()]).unwrap();
        graph.set_property(b, "media.movie", vec!["solid,green=1.movieproc".to_string()]).unwrap();
        let group = graph.new_node("SwitchGroup", "").unwrap();
        graph.set_inputs(group, &[a, b]).unwrap();
        let context = graph.context_for_frame(1);

        let first_fan_in = graph.group_members(group).unwrap().fan_in().unwrap();
        assert_eq!(
            graph.evaluate_node_identifier(group, &context),
            graph.evaluate_node_identifier(a, &context)
        );

        graph.set_property(group, "switch.active", vec![1i32]).unwrap();
        let members = graph.group_members(group).unwrap();
        let fan_in = members.fan_in().unwrap();
        assert_ne!(fan_in, first_fan_in);
        assert_eq!(graph.node(fan_in).unwrap().inputs(), members.heads());
        assert_eq!(
            graph.evaluate_node_identifier(group, &context),
            graph.evaluate_node_identifier(b, &context)
        );
    }
}
