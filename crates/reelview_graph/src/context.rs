// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation context passed down the graph.
//!
//! A [`Context`] is immutable once built. Nodes that need different
//! parameters for their inputs (a retime asking for another frame, a stereo
//! node asking for one eye) derive a child context that remembers its parent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stereo eye selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    /// Whatever the media provides for a mono request
    #[default]
    Either,
    /// Left eye
    Left,
    /// Right eye
    Right,
}

impl Eye {
    /// Short tag used in identifiers
    pub fn tag(self) -> &'static str {
        match self {
            Self::Either => "",
            Self::Left => "L",
            Self::Right => "R",
        }
    }
}

/// Pixel storage type requested by the consumer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// 8 bits per channel
    Uint8,
    /// 16 bits per channel
    Uint16,
    /// Half floats
    Half,
    /// 32-bit floats
    #[default]
    Float,
}

/// Sub-image selector for multi-part media
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageComponent {
    /// The default image
    #[default]
    Default,
    /// A named view
    View(String),
    /// A layer within a view
    Layer {
        /// View name
        view: String,
        /// Layer name
        layer: String,
    },
    /// A single channel of a layer
    Channel {
        /// View name
        view: String,
        /// Layer name
        layer: String,
        /// Channel name
        channel: String,
    },
}

impl fmt::Display for ImageComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => Ok(()),
            Self::View(view) => write!(f, "{view}"),
            Self::Layer { view, layer } => write!(f, "{view}/{layer}"),
            Self::Channel { view, layer, channel } => write!(f, "{view}/{layer}/{channel}"),
        }
    }
}

/// Parameters of one evaluation request
#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    /// Frame being evaluated at this level of the graph
    pub frame: i32,
    /// Frame requested at the top of the evaluation
    pub base_frame: i32,
    /// Playback rate
    pub fps: f32,
    /// Width of the target viewport or device
    pub view_width: u32,
    /// Height of the target viewport or device
    pub view_height: u32,
    /// Requested pixel storage
    pub data_type: DataType,
    /// Whether the consumer displays stereo
    pub stereo: bool,
    /// Eye being evaluated
    pub eye: Eye,
    /// Sub-image selection
    pub component: ImageComponent,
    parent: Option<Arc<Context>>,
}

impl Context {
    /// Top-level context for `frame`
    pub fn new(frame: i32, fps: f32) -> Self {
        Self {
            frame,
            base_frame: frame,
            fps,
            view_width: 1920,
            view_height: 1080,
            data_type: DataType::default(),
            stereo: false,
            eye: Eye::default(),
            component: ImageComponent::default(),
            parent: None,
        }
    }

    /// Context this one was derived from
    pub fn parent(&self) -> Option<&Context> {
        self.parent.as_deref()
    }

    /// Number of derivations between this context and the root one
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent();
        while let Some(context) = current {
            depth += 1;
            current = context.parent();
        }
        depth
    }

    /// Child context with identical parameters
    pub fn derive(&self) -> Self {
        let mut child = self.clone();
        child.parent = Some(Arc::new(self.clone()));
        child
    }

    /// Child context at another frame
    pub fn with_frame(&self, frame: i32) -> Self {
        let mut child = self.derive();
        child.frame = frame;
        child
    }

    /// Child context for one eye
    pub fn with_eye(&self, eye: Eye) -> Self {
        let mut child = self.derive();
        child.eye = eye;
        child
    }

    /// Child context sized for a target
    pub fn with_view_size(&self, width: u32, height: u32) -> Self {
        let mut child = self.derive();
        child.view_width = width;
        child.view_height = height;
        child
    }

    /// Child context selecting a sub-image
    pub fn with_component(&self, component: ImageComponent) -> Self {
        let mut child = self.derive();
        child.component = component;
        child
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(1, 24.0)
    }
}
