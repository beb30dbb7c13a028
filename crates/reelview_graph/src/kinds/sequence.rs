// SPDX-License-Identifier: MIT OR Apache-2.0
//! Back-to-back playback.
//!
//! A sequence plays a list of cuts. With `sequence.autoEDL` set (the default)
//! there is one cut per input covering its whole range, in input order.
//! Otherwise the cuts come from the `edl.source`, `edl.in` and `edl.out`
//! arrays. Output frames start at 1.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{ImageDescription, ImageId};
use crate::node::{clamp_frame, ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::{PropertyContainer, PropertyInfo};

const OUT_OF_RANGE: &str = "Out of range";

/// One cut of an edit decision list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cut {
    /// Input index
    pub source: usize,
    /// First input frame
    pub cut_in: i32,
    /// Last input frame, inclusive
    pub cut_out: i32,
}

impl Cut {
    fn len(&self) -> i64 {
        (i64::from(self.cut_out) - i64::from(self.cut_in) + 1).max(0)
    }
}

/// Plays cuts of its inputs one after another
#[derive(Debug)]
pub struct Sequence {
    auto_edl: bool,
    manual: Vec<Cut>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self {
            auto_edl: true,
            manual: Vec::new(),
        }
    }
}

impl Sequence {
    /// Cuts in playback order
    pub fn cuts(&self, node: NodeRef<'_>) -> Vec<Cut> {
        let count = node.inputs().len();
        if !self.auto_edl {
            return self.manual.iter().copied().filter(|c| c.source < count).collect();
        }
        (0..count)
            .map(|source| {
                let range = node.input_range_info(source);
                Cut {
                    source,
                    cut_in: range.cut_in,
                    cut_out: range.cut_out,
                }
            })
            .collect()
    }

    /// Input index and input frame shown at output `frame`
    pub fn locate(&self, node: NodeRef<'_>, frame: i32) -> Option<(usize, i32)> {
        let frame = i64::from(frame);
        let mut start = 1i64;
        for cut in self.cuts(node) {
            if frame >= start && frame < start + cut.len() {
                return Some((cut.source, clamp_frame(i64::from(cut.cut_in) + frame - start)));
            }
            start += cut.len();
        }
        None
    }
}

impl Processor for Sequence {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        self.auto_edl = properties.front_or("sequence.autoEDL", 1i32) != 0;
        let sources = properties.get::<i32>("edl.source").unwrap_or_default();
        let ins = properties.get::<i32>("edl.in").unwrap_or_default();
        let outs = properties.get::<i32>("edl.out").unwrap_or_default();
        if !self.auto_edl && (sources.len() != ins.len() || sources.len() != outs.len()) {
            tracing::warn!(
                "EDL arrays differ in length ({}, {}, {}); extra entries ignored",
                sources.len(),
                ins.len(),
                outs.len()
            );
        }

        self.manual = sources
            .iter()
            .zip(ins)
            .zip(outs)
            .filter_map(|((&source, &cut_in), &cut_out)| {
                Some(Cut {
                    source: usize::try_from(source).ok()?,
                    cut_in,
                    cut_out,
                })
            })
            .collect();
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        match self.locate(node, context.frame) {
            Some((input, frame)) => node.evaluate_input(input, &context.with_frame(frame)),
            None => ImageDescription::no_image(node.name(), OUT_OF_RANGE),
        }
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        match self.locate(node, context.frame) {
            Some((input, frame)) => node.input_identifier(input, &context.with_frame(frame)),
            None => ImageId::no_image(node.name(), OUT_OF_RANGE),
        }
    }

    fn image_range_info(&self, node: NodeRef<'_>) -> ImageRangeInfo {
        let cuts = self.cuts(node);
        let total = clamp_frame(cuts.iter().map(Cut::len).fold(0i64, i64::saturating_add));
        let fps = cuts
            .first()
            .map_or(0.0, |cut| node.input_range_info(cut.source).fps);
        ImageRangeInfo::new(1, total.max(1), fps)
    }

    fn meta_evaluate(&self, node: NodeRef<'_>, context: &Context, visitor: &mut dyn MetaEvalVisitor) {
        if let Some((input, frame)) = self.locate(node, context.frame) {
            node.meta_evaluate_input(input, &context.with_frame(frame), visitor);
        }
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("Sequence", NodeCategory::Time, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("sequence", "autoEDL", 1i32)?;
            properties.declare_with_info("edl.source", Vec::<i32>::new(), PropertyInfo::DEFAULT)?;
            properties.declare_with_info("edl.in", Vec::<i32>::new(), PropertyInfo::DEFAULT)?;
            properties.declare_with_info("edl.out", Vec::<i32>::new(), PropertyInfo::DEFAULT)?;
            Ok(NodeSpec::new(Sequence::default()).with_properties(properties))
        })
        .with_summary("Plays inputs back to back"),
    );
}
