// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless video module: devices that log what they are shown.

use reelview_graph::context::DataType;
use reelview_graph::device::{DeviceError, VideoFormat, VideoTiming};
use reelview_graph::{ImageDescription, VideoDevice, VideoModule};

/// Devices this module can create: name, width, height, refresh rate
const DEVICES: &[(&str, u32, u32, f32)] = &[
    ("headless", 1920, 1080, 24.0),
    ("headless-uhd", 3840, 2160, 24.0),
    ("headless-sd", 720, 486, 29.97),
];

/// Module providing [`HeadlessDevice`]s
#[derive(Debug, Default)]
pub struct HeadlessModule;

impl VideoModule for HeadlessModule {
    fn name(&self) -> &str {
        "headless"
    }

    fn device_names(&self) -> Vec<String> {
        DEVICES.iter().map(|(name, ..)| (*name).to_string()).collect()
    }

    fn new_device(&self, name: &str) -> Result<Box<dyn VideoDevice>, DeviceError> {
        let &(name, width, height, hz) = DEVICES
            .iter()
            .find(|(n, ..)| *n == name)
            .ok_or_else(|| DeviceError::UnknownDevice(name.to_string()))?;
        Ok(Box::new(HeadlessDevice {
            name: name.to_string(),
            width,
            height,
            hz,
            open: false,
            presented: 0,
        }))
    }
}

/// A device with no output; it counts and logs presented frames
#[derive(Debug)]
pub struct HeadlessDevice {
    name: String,
    width: u32,
    height: u32,
    hz: f32,
    open: bool,
    presented: usize,
}

impl VideoDevice for HeadlessDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), DeviceError> {
        self.open = true;
        tracing::debug!("Opened {}", self.name);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            tracing::info!("Closed {} after {} frames", self.name, self.presented);
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn format(&self) -> VideoFormat {
        VideoFormat {
            width: self.width,
            height: self.height,
            pixel_aspect: 1.0,
            data_type: DataType::Uint8,
            description: format!("{}x{}", self.width, self.height),
        }
    }

    fn timing(&self) -> VideoTiming {
        VideoTiming { hz: self.hz }
    }

    fn present(&mut self, frame: i32, image: &ImageDescription) -> Result<(), DeviceError> {
        if !self.open {
            return Err(DeviceError::NotOpen(self.name.clone()));
        }
        let usage = image.resource_usage();
        tracing::debug!(
            "{} frame {}: {} buffers, {} shader calls, {} intermediates",
            self.name,
            frame,
            usage.buffers,
            usage.shader_calls,
            usage.intermediates
        );
        if let Some(message) = image.error_message() {
            tracing::warn!("{} frame {}: {}", self.name, frame, message);
        }
        self.presented += 1;
        Ok(())
    }
}
