// SPDX-License-Identifier: MIT OR Apache-2.0
//! Video output devices.
//!
//! Display and output groups are bound to a [`DeviceDescriptor`], a plain
//! snapshot of a device's name and geometry, so the graph never holds on to a
//! live device. Hosts keep the [`VideoDevice`] and present evaluated results
//! to it.

use crate::context::DataType;
use crate::image::ImageDescription;
use serde::Serialize;
use std::fmt;

/// Errors raised by devices
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    /// No device with this name
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// Operation requires an open device
    #[error("Device {0} is not open")]
    NotOpen(String),

    /// Device-specific failure
    #[error("Device {device} failed: {reason}")]
    Failed {
        /// Device name
        device: String,
        /// Diagnostic
        reason: String,
    },
}

/// Pixel format a device accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel aspect ratio
    pub pixel_aspect: f32,
    /// Pixel storage
    pub data_type: DataType,
    /// Human-readable name, e.g. `1080p`
    pub description: String,
}

/// Refresh timing of a device
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoTiming {
    /// Refresh rate
    pub hz: f32,
}

/// A display or output device
pub trait VideoDevice: fmt::Debug + Send {
    /// Unique device name
    fn name(&self) -> &str;

    /// Acquire the device
    fn open(&mut self) -> Result<(), DeviceError>;

    /// Release the device
    fn close(&mut self);

    /// Whether the device is acquired
    fn is_open(&self) -> bool;

    /// Active format
    fn format(&self) -> VideoFormat;

    /// Active timing
    fn timing(&self) -> VideoTiming;

    /// Position of the device's origin in a shared desktop
    fn offset(&self) -> (i32, i32) {
        (0, 0)
    }

    /// Show or write one evaluated frame
    fn present(&mut self, frame: i32, image: &ImageDescription) -> Result<(), DeviceError>;

    /// Snapshot for binding a display or output group
    fn descriptor(&self) -> DeviceDescriptor {
        let format = self.format();
        DeviceDescriptor {
            name: self.name().to_string(),
            width: format.width,
            height: format.height,
            hz: self.timing().hz,
        }
    }
}

/// A family of devices, e.g. one vendor SDK
pub trait VideoModule: fmt::Debug {
    /// Module name
    fn name(&self) -> &str;

    /// Names of devices this module can create
    fn device_names(&self) -> Vec<String>;

    /// Create a device by name
    fn new_device(&self, name: &str) -> Result<Box<dyn VideoDevice>, DeviceError>;
}

/// Name and geometry of a device, bound to display and output groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDescriptor {
    /// Device name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Refresh rate
    pub hz: f32,
}

impl DeviceDescriptor {
    /// Build a descriptor directly
    pub fn new(name: impl Into<String>, width: u32, height: u32, hz: f32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            hz,
        }
    }
}
