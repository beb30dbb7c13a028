// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media reader and writer contracts.
//!
//! Sources never decode files themselves. They ask the [`MediaRegistry`] for
//! the first [`FrameBufferIo`] that claims a path and go through it for both
//! header information and frames.

use crate::context::{DataType, Eye, ImageComponent};
use crate::image::ImageDescription;
use crate::node::clamp_frame;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Errors from media readers and writers
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    /// No registered reader accepts the path
    #[error("No reader for {0}")]
    NoReader(String),

    /// A reader accepted the path but could not parse it
    #[error("Cannot read {path}: {reason}")]
    Unreadable {
        /// Media path
        path: String,
        /// Reader diagnostic
        reason: String,
    },

    /// The frame is outside the media's range
    #[error("Frame {frame} is outside {path}")]
    FrameOutOfRange {
        /// Media path
        path: String,
        /// Requested frame
        frame: i32,
    },

    /// Writer misuse or failure
    #[error("Write failed: {0}")]
    Write(String),
}

/// Header information about a piece of media
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// First frame
    pub start: i32,
    /// Last frame, inclusive
    pub end: i32,
    /// Native rate
    pub fps: f32,
    /// Channel names
    pub channels: Vec<String>,
    /// Native pixel storage
    pub data_type: DataType,
    /// Named views, empty for mono media
    pub views: Vec<String>,
}

impl MediaInfo {
    /// Number of frames
    pub fn frame_count(&self) -> i32 {
        clamp_frame((i64::from(self.end) - i64::from(self.start) + 1).max(0))
    }
}

/// One frame read request
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    /// Media path
    pub path: String,
    /// Frame in the media's own numbering
    pub frame: i32,
    /// Eye for stereo media
    pub eye: Eye,
    /// Sub-image selection
    pub component: ImageComponent,
}

/// Handle to decoded pixels.
///
/// Descriptions carry the handle only; pixel storage stays with the reader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FrameBuffer {
    /// Unique name of the decoded frame
    pub identifier: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel storage
    pub data_type: DataType,
    /// Channel names
    pub channels: Vec<String>,
}

/// A media reader
pub trait FrameBufferIo: fmt::Debug + Send + Sync {
    /// Reader name for diagnostics
    fn name(&self) -> &str;

    /// Whether this reader claims `path`
    fn can_read(&self, path: &str) -> bool;

    /// Header information without decoding frames
    fn image_info(&self, path: &str) -> Result<MediaInfo, MediaError>;

    /// Decode one frame
    fn read_image(&self, request: &ReadRequest) -> Result<FrameBuffer, MediaError>;
}

/// A movie or image-sequence writer
pub trait MovieWriter: Send {
    /// Start a new file
    fn open(&mut self, path: &str, info: &MediaInfo) -> Result<(), MediaError>;

    /// Append one rendered frame
    fn write_frame(&mut self, frame: i32, image: &ImageDescription) -> Result<(), MediaError>;

    /// Finish the file
    fn close(&mut self) -> Result<(), MediaError>;
}

/// Ordered set of readers; the first that accepts a path wins
#[derive(Debug, Clone, Default)]
pub struct MediaRegistry {
    readers: Vec<Arc<dyn FrameBufferIo>>,
}

impl MediaRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in procedural reader
    pub fn with_builtin_readers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::procedural::ProceduralIo::new()));
        registry
    }

    /// Append a reader; earlier readers take precedence
    pub fn register(&mut self, reader: Arc<dyn FrameBufferIo>) {
        tracing::debug!("Registered media reader {}", reader.name());
        self.readers.push(reader);
    }

    /// First reader claiming `path`
    pub fn reader_for(&self, path: &str) -> Option<&Arc<dyn FrameBufferIo>> {
        self.readers.iter().find(|r| r.can_read(path))
    }

    /// Header information through the claiming reader
    pub fn image_info(&self, path: &str) -> Result<MediaInfo, MediaError> {
        self.reader_for(path)
            .ok_or_else(|| MediaError::NoReader(path.to_string()))?
            .image_info(path)
    }

    /// Decode a frame through the claiming reader
    pub fn read_image(&self, request: &ReadRequest) -> Result<FrameBuffer, MediaError> {
        self.reader_for(&request.path)
            .ok_or_else(|| MediaError::NoReader(request.path.clone()))?
            .read_image(request)
    }

    /// Registered reader names in precedence order
    pub fn reader_names(&self) -> Vec<&str> {
        self.readers.iter().map(|r| r.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Claims(&'static str, &'static str);

    impl FrameBufferIo for Claims {
        fn name(&self) -> &str {
            self.0
        }

        fn can_read(&self, path: &str) -> bool {
            path.ends_with(self.1)
        }

        fn image_info(&self, _path: &str) -> Result<MediaInfo, MediaError> {
            Ok(MediaInfo {
                width: 1,
                height: 1,
                start: 1,
                end: 1,
                fps: 24.0,
                channels: Vec::new(),
                data_type: DataType::Uint8,
                views: Vec::new(),
            })
        }

        fn read_image(&self, request: &ReadRequest) -> Result<FrameBuffer, MediaError> {
            Ok(FrameBuffer {
                identifier: format!("{}:{}", self.0, request.path),
                width: 1,
                height: 1,
                data_type: DataType::Uint8,
                channels: Vec::new(),
            })
        }
    }

    #[test]
    fn test_first_reader_wins() {
        let mut registry = MediaRegistry::new();
        registry.register(Arc::new(Claims("first", ".exr")));
        registry.register(Arc::new(Claims("second", "")));

        assert_eq!(registry.reader_for("a.exr").map(|r| r.name()), Some("first"));
        assert_eq!(registry.reader_for("a.mov").map(|r| r.name()), Some("second"));
        assert_eq!(registry.reader_names(), vec!["first", "second"]);
    }

    #[test]
    fn test_no_reader() {
        let registry = MediaRegistry::new();
        assert_eq!(
            registry.image_info("clip.mov"),
            Err(MediaError::NoReader("clip.mov".into()))
        );
    }
}
