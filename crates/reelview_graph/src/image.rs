// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render descriptions and their cheap identifiers.
//!
//! Evaluating a node yields an [`ImageDescription`]: a tree that says what to
//! draw (frame buffers, shader expressions, how children merge and where the
//! result goes) without drawing anything. Evaluating a node's *identifier*
//! yields an [`ImageId`], a tree of canonical strings that is equal for two
//! requests exactly when the graph guarantees the descriptions are equal.

use crate::fingerprint::Fnv1a64;
use crate::media::FrameBuffer;
use serde::Serialize;
use std::fmt::{self, Write as _};

/// Canonical, bit-exact rendering of a float
pub(crate) fn float_token(value: f32) -> String {
    format!("{:08x}", value.to_bits())
}

/// Parameter of a shader call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Arg {
    /// Integer constant
    Int(i32),
    /// Float constant
    Float(f32),
    /// 3-vector constant
    Vec3([f32; 3]),
    /// 4-vector constant
    Vec4([f32; 4]),
    /// String constant
    Text(String),
    /// Lookup table referenced by shape and content fingerprint
    Lut {
        /// Table dimensions
        dims: Vec<usize>,
        /// Fingerprint of the table values
        fingerprint: u64,
    },
}

impl Arg {
    fn write_canonical(&self, out: &mut String) {
        match self {
            Self::Int(v) => {
                let _ = write!(out, "i:{v}");
            }
            Self::Float(v) => {
                let _ = write!(out, "f:{}", float_token(*v));
            }
            Self::Vec3(v) => {
                let _ = write!(out, "v3:{},{},{}", float_token(v[0]), float_token(v[1]), float_token(v[2]));
            }
            Self::Vec4(v) => {
                let _ = write!(
                    out,
                    "v4:{},{},{},{}",
                    float_token(v[0]),
                    float_token(v[1]),
                    float_token(v[2]),
                    float_token(v[3])
                );
            }
            Self::Text(s) => {
                let _ = write!(out, "s:{}:{s}", s.len());
            }
            Self::Lut { dims, fingerprint } => {
                let dims: Vec<String> = dims.iter().map(ToString::to_string).collect();
                let _ = write!(out, "lut:{}:{fingerprint:016x}", dims.join("x"));
            }
        }
    }
}

/// A named shader function with constant parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShaderOp {
    /// Function name
    pub function: String,
    /// Constant parameters
    pub args: Vec<Arg>,
}

impl ShaderOp {
    /// Create an operation
    pub fn new(function: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }

    /// Canonical text form, e.g. `exposure(v3:...)`
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.function);
        out.push('(');
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            arg.write_canonical(&mut out);
        }
        out.push(')');
        out
    }
}

/// Shader expression over an image's input slots
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// Sample input slot
    Source {
        /// Slot index
        slot: usize,
    },
    /// Apply a function to a sub-expression
    Call {
        /// Function and constants
        op: ShaderOp,
        /// Image argument
        input: Box<Expr>,
    },
}

impl Expr {
    /// Wrap `input` in a call
    pub fn call(op: ShaderOp, input: Expr) -> Self {
        Self::Call {
            op,
            input: Box::new(input),
        }
    }

    /// Canonical text form
    pub fn canonical(&self) -> String {
        match self {
            Self::Source { slot } => format!("${slot}"),
            Self::Call { op, input } => {
                let mut text = op.canonical();
                text.pop();
                if !op.args.is_empty() {
                    text.push(';');
                }
                text.push_str(&input.canonical());
                text.push(')');
                text
            }
        }
    }

    /// Stable hash of the canonical form, used to key compiled programs
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a64::default();
        h.write_str(&self.canonical());
        h.finish()
    }

    /// Number of function calls in the expression
    pub fn call_count(&self) -> usize {
        match self {
            Self::Source { .. } => 0,
            Self::Call { input, .. } => 1 + input.call_count(),
        }
    }

    /// Function names from innermost to outermost
    pub fn functions(&self) -> Vec<&str> {
        match self {
            Self::Source { .. } => Vec::new(),
            Self::Call { op, input } => {
                let mut names = input.functions();
                names.push(&op.function);
                names
            }
        }
    }
}

/// Where a rendered description ends up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum RenderDestination {
    /// Consumed by a parent description
    #[default]
    Intermediate,
    /// Presented on a display device
    Display {
        /// Device name
        device: String,
    },
    /// Written by an output device
    Output {
        /// Device name
        device: String,
    },
}

/// What a description node draws
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ImageKind {
    /// A decoded frame
    Frame(FrameBuffer),
    /// A solid-black placeholder of a given size
    Blank,
    /// Rendered from children
    Intermediate,
    /// Nothing to draw
    NoImage {
        /// Why
        message: String,
    },
    /// Evaluation failed
    Error {
        /// What went wrong
        message: String,
    },
}

/// Resources a description tree needs to render
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    /// Frame buffers to upload
    pub buffers: usize,
    /// Shader function calls
    pub shader_calls: usize,
    /// Intermediate render targets
    pub intermediates: usize,
}

/// Tree describing how to render one result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDescription {
    /// Name of the node that produced this level
    pub node: String,
    /// What is drawn at this level
    pub kind: ImageKind,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Shader applied to this level's input slots
    pub shader: Option<Expr>,
    /// How children are combined, if they are
    pub merge: Option<ShaderOp>,
    /// Target of the render
    pub destination: RenderDestination,
    /// Input images
    pub children: Vec<ImageDescription>,
}

impl ImageDescription {
    fn leaf(node: &str, kind: ImageKind, width: u32, height: u32) -> Self {
        Self {
            node: node.to_string(),
            kind,
            width,
            height,
            shader: None,
            merge: None,
            destination: RenderDestination::Intermediate,
            children: Vec::new(),
        }
    }

    /// A decoded frame
    pub fn frame(node: &str, buffer: FrameBuffer) -> Self {
        let (width, height) = (buffer.width, buffer.height);
        Self::leaf(node, ImageKind::Frame(buffer), width, height)
    }

    /// A placeholder of a given size
    pub fn blank(node: &str, width: u32, height: u32) -> Self {
        Self::leaf(node, ImageKind::Blank, width, height)
    }

    /// Nothing to draw
    pub fn no_image(node: &str, message: impl Into<String>) -> Self {
        Self::leaf(node, ImageKind::NoImage { message: message.into() }, 0, 0)
    }

    /// Evaluation failure
    pub fn error(node: &str, message: impl Into<String>) -> Self {
        Self::leaf(node, ImageKind::Error { message: message.into() }, 0, 0)
    }

    /// Several images combined by `merge`; the size is the union of the children
    pub fn composite(node: &str, children: Vec<ImageDescription>, merge: Option<ShaderOp>) -> Self {
        let width = children.iter().map(|c| c.width).max().unwrap_or(0);
        let height = children.iter().map(|c| c.height).max().unwrap_or(0);
        Self {
            children,
            merge,
            ..Self::leaf(node, ImageKind::Intermediate, width, height)
        }
    }

    /// Apply a shader function on behalf of `node`.
    ///
    /// Leaf images get the call appended to their own expression; merged
    /// composites are rendered to an intermediate first. Absent and failed
    /// images pass through untouched.
    pub fn apply(mut self, node: &str, op: ShaderOp) -> Self {
        if matches!(self.kind, ImageKind::NoImage { .. } | ImageKind::Error { .. }) {
            return self;
        }
        if self.merge.is_none() {
            let input = self.shader.take().unwrap_or(Expr::Source { slot: 0 });
            self.shader = Some(Expr::call(op, input));
            return self;
        }
        let (width, height) = (self.width, self.height);
        Self {
            shader: Some(Expr::call(op, Expr::Source { slot: 0 })),
            children: vec![self],
            ..Self::leaf(node, ImageKind::Intermediate, width, height)
        }
    }

    /// Retarget the description
    pub fn with_destination(mut self, destination: RenderDestination) -> Self {
        self.destination = destination;
        self
    }

    /// True for [`ImageKind::NoImage`]
    pub fn is_no_image(&self) -> bool {
        matches!(self.kind, ImageKind::NoImage { .. })
    }

    /// Error message if evaluation failed anywhere in the tree
    pub fn error_message(&self) -> Option<&str> {
        match &self.kind {
            ImageKind::Error { message } => Some(message),
            _ => self.children.iter().find_map(ImageDescription::error_message),
        }
    }

    /// First frame buffer in the tree
    pub fn frame_buffer(&self) -> Option<&FrameBuffer> {
        match &self.kind {
            ImageKind::Frame(buffer) => Some(buffer),
            _ => self.children.iter().find_map(ImageDescription::frame_buffer),
        }
    }

    /// Visit every level, parents before children
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a ImageDescription)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    /// Count what rendering this tree takes
    pub fn resource_usage(&self) -> ResourceUsage {
        let mut usage = ResourceUsage::default();
        self.walk(&mut |image| {
            match image.kind {
                ImageKind::Frame(_) => usage.buffers += 1,
                ImageKind::Intermediate => usage.intermediates += 1,
                _ => {}
            }
            usage.shader_calls += image.shader.as_ref().map_or(0, Expr::call_count);
        });
        usage
    }
}

/// Identifier tree of a render result
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ImageId {
    /// Canonical token for this level
    pub id: String,
    /// Identifiers of the inputs this level depends on
    pub children: Vec<ImageId>,
}

impl ImageId {
    /// Leaf identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            children: Vec::new(),
        }
    }

    /// Identifier with children
    pub fn with_children(id: impl Into<String>, children: Vec<ImageId>) -> Self {
        Self {
            id: id.into(),
            children,
        }
    }

    /// Matches [`ImageDescription::no_image`]
    pub fn no_image(node: &str, message: &str) -> Self {
        Self::new(format!("noimage:{node}:{message}"))
    }

    /// Matches [`ImageDescription::error`]
    pub fn error(node: &str, message: &str) -> Self {
        Self::new(format!("error:{node}:{message}"))
    }

    /// Identifier of `op` applied by `node` to this one
    pub fn apply(self, node: &str, op: &ShaderOp) -> Self {
        Self::with_children(format!("{node}:{}", op.canonical()), vec![self])
    }

    /// Single-line canonical form
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        out.push_str(&self.id);
        if !self.children.is_empty() {
            out.push('[');
            for (i, child) in self.children.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                child.write_canonical(out);
            }
            out.push(']');
        }
    }

    /// Stable 64-bit hash of the tree
    pub fn fingerprint(&self) -> u64 {
        let mut h = Fnv1a64::default();
        self.hash_into(&mut h);
        h.finish()
    }

    fn hash_into(&self, h: &mut Fnv1a64) {
        h.write_str(&self.id);
        h.write_u64(self.children.len() as u64);
        for child in &self.children {
            child.hash_into(h);
        }
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}
