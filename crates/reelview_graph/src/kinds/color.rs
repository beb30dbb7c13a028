// SPDX-License-Identifier: MIT OR Apache-2.0
//! Color correction kinds.
//!
//! Each kind turns its properties into a list of shader ops once, when a
//! property changes. Evaluation applies the list to the input description
//! and identification applies it to the input identifier, so both always
//! agree. An empty list means the node is an identity and forwards its
//! input untouched.

use crate::context::Context;
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{Arg, ImageDescription, ImageId, ShaderOp};
use crate::lut::{declare_lut_properties, LutParams};
use crate::node::{NodeRef, Processor, ProcessorEnv};
use crate::property::PropertyContainer;

/// Apply `ops` to input 0
pub fn evaluate_ops(node: NodeRef<'_>, context: &Context, ops: &[ShaderOp]) -> ImageDescription {
    ops.iter()
        .fold(node.evaluate_input(0, context), |image, op| image.apply(node.name(), op.clone()))
}

/// Identifier of [`evaluate_ops`]
pub fn identify_ops(node: NodeRef<'_>, context: &Context, ops: &[ShaderOp]) -> ImageId {
    ops.iter()
        .fold(node.input_identifier(0, context), |id, op| id.apply(node.name(), op))
}

/// Exposure-only adjustment
#[derive(Debug, Default)]
pub struct ColorExposure {
    ops: Vec<ShaderOp>,
}

impl Processor for ColorExposure {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let exposure = properties.front_or("color.exposure", 0.0f32);
        self.ops.clear();
        if exposure != 0.0 {
            self.ops.push(ShaderOp::new("exposure", vec![Arg::Float(exposure)]));
        }
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        evaluate_ops(node, context, &self.ops)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        identify_ops(node, context, &self.ops)
    }
}

/// Parameters of the [`Color`] kind
#[derive(Debug, Clone, PartialEq)]
pub struct ColorParams {
    /// Master switch
    pub active: bool,
    /// Per-channel exposure in stops
    pub exposure: [f32; 3],
    /// Per-channel gamma
    pub gamma: [f32; 3],
    /// Per-channel offset
    pub offset: [f32; 3],
    /// Saturation, 1 is unchanged
    pub saturation: f32,
    /// Invert colors
    pub invert: bool,
}

impl ColorParams {
    fn from_properties(properties: &PropertyContainer) -> Self {
        Self {
            active: properties.front_or("color.active", 1i32) != 0,
            exposure: properties.front_or("color.exposure", [0.0; 3]),
            gamma: properties.front_or("color.gamma", [1.0; 3]),
            offset: properties.front_or("color.offset", [0.0; 3]),
            saturation: properties.front_or("color.saturation", 1.0f32),
            invert: properties.front_or("color.invert", 0i32) != 0,
        }
    }

    fn ops(&self) -> Vec<ShaderOp> {
        let mut ops = Vec::new();
        if !self.active {
            return ops;
        }
        if self.exposure != [0.0; 3] {
            ops.push(ShaderOp::new("exposure", vec![Arg::Vec3(self.exposure)]));
        }
        if self.offset != [0.0; 3] {
            ops.push(ShaderOp::new("offset", vec![Arg::Vec3(self.offset)]));
        }
        if self.gamma != [1.0; 3] {
            ops.push(ShaderOp::new("gamma", vec![Arg::Vec3(self.gamma)]));
        }
        if self.saturation != 1.0 {
            ops.push(ShaderOp::new("saturation", vec![Arg::Float(self.saturation)]));
        }
        if self.invert {
            ops.push(ShaderOp::new("invert", Vec::new()));
        }
        ops
    }
}

/// Full color correction with an optional LUT
#[derive(Debug, Default)]
pub struct Color {
    ops: Vec<ShaderOp>,
}

impl Processor for Color {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let params = ColorParams::from_properties(properties);
        self.ops = params.ops();
        if params.active {
            self.ops
                .extend(LutParams::from_properties(properties, "Color").shader_op());
        }
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        evaluate_ops(node, context, &self.ops)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        identify_ops(node, context, &self.ops)
    }
}

/// Display transform: channel order, gamma, brightness, LUT
#[derive(Debug, Default)]
pub struct DisplayColor {
    ops: Vec<ShaderOp>,
}

impl Processor for DisplayColor {
    fn refresh(&mut self, properties: &PropertyContainer, _env: &ProcessorEnv<'_>) {
        let order = properties.front_or("color.channelOrder", "RGBA".to_string());
        let gamma = properties.front_or("color.gamma", 1.0f32);
        let brightness = properties.front_or("color.brightness", 0.0f32);

        self.ops.clear();
        if order != "RGBA" {
            self.ops.push(ShaderOp::new("channelOrder", vec![Arg::Text(order)]));
        }
        self.ops
            .extend(LutParams::from_properties(properties, "DisplayColor").shader_op());
        if brightness != 0.0 {
            self.ops.push(ShaderOp::new("brightness", vec![Arg::Float(brightness)]));
        }
        if gamma != 1.0 {
            self.ops.push(ShaderOp::new("displayGamma", vec![Arg::Float(gamma)]));
        }
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        evaluate_ops(node, context, &self.ops)
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        identify_ops(node, context, &self.ops)
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("ColorExposure", NodeCategory::Color, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("color", "exposure", 0.0f32)?;
            Ok(NodeSpec::new(ColorExposure::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Exposure in stops"),
    );

    manager.register(
        NodeDefinition::new("Color", NodeCategory::Color, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("color", "active", 1i32)?;
            properties.declare("color", "exposure", [0.0f32; 3])?;
            properties.declare("color", "gamma", [1.0f32; 3])?;
            properties.declare("color", "offset", [0.0f32; 3])?;
            properties.declare("color", "saturation", 1.0f32)?;
            properties.declare("color", "invert", 0i32)?;
            declare_lut_properties(&mut properties)?;
            Ok(NodeSpec::new(Color::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Exposure, offset, gamma, saturation and LUT"),
    );

    manager.register(
        NodeDefinition::new("DisplayColor", NodeCategory::Color, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("color", "channelOrder", "RGBA".to_string())?;
            properties.declare("color", "gamma", 1.0f32)?;
            properties.declare("color", "brightness", 0.0f32)?;
            declare_lut_properties(&mut properties)?;
            Ok(NodeSpec::new(DisplayColor::default())
                .with_properties(properties)
                .max_inputs(1))
        })
        .with_summary("Display transform"),
    );
}
