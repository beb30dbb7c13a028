// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node kinds.
//!
//! Each module contributes processors (and group behaviors) plus a
//! `register` function adding their definitions to a [`NodeManager`].

pub mod basic;
pub mod cache;
pub mod color;
pub mod fan_in_group;
pub mod output_group;
pub mod pipeline_group;
pub mod retime;
pub mod sequence;
pub mod source;
pub mod stack;
pub mod stereo;
pub mod switch;
pub mod switch_group;

use crate::definition::NodeManager;

/// Register every built-in kind
pub fn register_builtin(manager: &mut NodeManager) {
    basic::register(manager);
    source::register(manager);
    color::register(manager);
    retime::register(manager);
    switch::register(manager);
    stack::register(manager);
    sequence::register(manager);
    cache::register(manager);
    stereo::register(manager);
    pipeline_group::register(manager);
    switch_group::register(manager);
    fan_in_group::register(manager);
    output_group::register(manager);
}
