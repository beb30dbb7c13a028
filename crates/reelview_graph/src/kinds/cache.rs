// SPDX-License-Identifier: MIT OR Apache-2.0
//! Caching node.

use crate::cache::FrameCache;
use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{ImageDescription, ImageId};
use crate::node::{NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

/// Memoizes its input's descriptions by identifier
#[derive(Debug, Default)]
pub struct Cache {
    active: bool,
    cache: FrameCache,
}

impl Cache {
    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Processor for Cache {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        self.active = properties.front_or("cache.active", 1i32) != 0;
        if !self.active {
            self.cache.flush();
        }
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        if !self.active {
            return node.evaluate_input(0, context);
        }
        let key = node.input_identifier(0, context);
        self.cache.get_or_fill(&key, || node.evaluate_input(0, context))
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        node.input_identifier(0, context)
    }

    fn flush(&self) {
        let dropped = self.cache.flush();
        if dropped > 0 {
            tracing::trace!("Flushed {} cached frames", dropped);
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Cache", NodeCategory::Utility, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("cache", "active", 1i32)?;
            Ok(NodeSpec::new(Cache::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Keeps evaluated frames by identifier"),
    );
}
