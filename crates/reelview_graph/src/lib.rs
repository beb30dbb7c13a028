// SPDX-License-Identifier: MIT OR Apache-2.0
//! Image-processing node graph for the reelview player.
//!
//! This crate provides the graph that turns media sources into render
//! descriptions:
//! - Typed node properties with change propagation
//! - Topology edits with cycle checks and isolation for undo
//! - Group nodes owning private subgraphs
//! - Evaluation to resolution-independent image descriptions and identifiers
//!
//! ## Architecture
//!
//! A [`Graph`] owns every node in one generational store. Each node pairs a
//! [`PropertyContainer`] with a [`Processor`] supplied by its
//! [`NodeDefinition`]. Evaluation is a read-only recursive walk driven by a
//! [`Context`]; pixels never pass through here, only descriptions of how
//! to draw them.

pub mod cache;
pub mod context;
pub mod definition;
pub mod device;
pub mod fingerprint;
pub mod graph;
pub mod group;
pub mod image;
pub mod kinds;
pub mod lut;
pub mod media;
pub mod naming;
pub mod node;
pub mod procedural;
pub mod profile;
pub mod property;
pub mod store;

pub use context::{Context, Eye};
pub use definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
pub use device::{DeviceDescriptor, VideoDevice, VideoModule};
pub use graph::{FlushContext, Graph, GraphError, GraphEvent};
pub use group::{GroupBehavior, Members};
pub use image::{ImageDescription, ImageId, RenderDestination};
pub use media::{FrameBufferIo, MediaError, MediaInfo, MediaRegistry, MovieWriter};
pub use node::{ImageRangeInfo, Node, NodeRef, Processor};
pub use profile::{Profile, ProfileError};
pub use property::{PropertyContainer, PropertyError, PropertyInfo, PropertyValue};
pub use store::NodeId;
