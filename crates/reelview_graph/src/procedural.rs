// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedurally generated media.
//!
//! Paths ending in `.movieproc` describe synthetic media instead of naming a
//! file, e.g. `solid,red=1,width=640,height=480,start=1,end=48.movieproc`.
//! The first comma-separated token picks the pattern; the rest are
//! `key=value` settings. The `error` pattern has a valid header but fails
//! every frame read, which makes it handy for exercising error paths.

use crate::context::{DataType, Eye};
use crate::image::float_token;
use crate::media::{FrameBuffer, FrameBufferIo, MediaError, MediaInfo, ReadRequest};

const EXTENSION: &str = ".movieproc";

/// Parsed procedural description
#[derive(Debug, Clone, PartialEq)]
pub struct ProceduralSpec {
    /// Pattern name
    pub pattern: String,
    /// Header the pattern reports
    pub info: MediaInfo,
    /// Fill color for solid patterns
    pub color: [f32; 4],
    /// Message reported by the `error` pattern
    pub error_message: Option<String>,
}

impl ProceduralSpec {
    /// Parse a `.movieproc` path
    pub fn parse(path: &str) -> Result<Self, MediaError> {
        let unreadable = |reason: String| MediaError::Unreadable {
            path: path.to_string(),
            reason,
        };

        let file_name = path.rsplit('/').next().unwrap_or(path);
        let body = file_name
            .strip_suffix(EXTENSION)
            .ok_or_else(|| unreadable("not a movieproc path".into()))?;

        let mut tokens = body.split(',').filter(|t| !t.is_empty());
        let pattern = tokens
            .next()
            .ok_or_else(|| unreadable("missing pattern".into()))?
            .to_string();

        let mut spec = Self {
            pattern,
            info: MediaInfo {
                width: 720,
                height: 486,
                start: 1,
                end: 1,
                fps: 24.0,
                channels: ["R", "G", "B", "A"].iter().map(ToString::to_string).collect(),
                data_type: DataType::Uint8,
                views: Vec::new(),
            },
            color: [0.0, 0.0, 0.0, 1.0],
            error_message: None,
        };

        for token in tokens {
            let (key, value) = token.split_once('=').unwrap_or((token, ""));
            let bad = || unreadable(format!("bad value for {key}: {value:?}"));
            match key {
                "start" => spec.info.start = value.parse().map_err(|_| bad())?,
                "end" => spec.info.end = value.parse().map_err(|_| bad())?,
                "fps" => spec.info.fps = value.parse().map_err(|_| bad())?,
                "width" => spec.info.width = value.parse().map_err(|_| bad())?,
                "height" => spec.info.height = value.parse().map_err(|_| bad())?,
                "red" => spec.color[0] = value.parse().map_err(|_| bad())?,
                "green" => spec.color[1] = value.parse().map_err(|_| bad())?,
                "blue" => spec.color[2] = value.parse().map_err(|_| bad())?,
                "alpha" => spec.color[3] = value.parse().map_err(|_| bad())?,
                "gray" | "grey" => {
                    let v: f32 = value.parse().map_err(|_| bad())?;
                    spec.color[..3].fill(v);
                }
                "views" => spec.info.views = value.split(':').map(ToString::to_string).collect(),
                "errorString" => spec.error_message = Some(value.to_string()),
                "depth" => {
                    spec.info.data_type = match value {
                        "8" => DataType::Uint8,
                        "16" => DataType::Uint16,
                        "16f" => DataType::Half,
                        "32f" => DataType::Float,
                        _ => return Err(bad()),
                    };
                }
                _ => tracing::warn!("Ignoring movieproc setting {key} in {path}"),
            }
        }

        if spec.info.end < spec.info.start {
            return Err(unreadable(format!(
                "end {} precedes start {}",
                spec.info.end, spec.info.start
            )));
        }

        match spec.pattern.as_str() {
            "black" => spec.color = [0.0, 0.0, 0.0, 1.0],
            "white" => spec.color = [1.0; 4],
            "blank" => spec.color = [0.0; 4],
            "solid" | "error" | "smptebars" => {}
            other => return Err(unreadable(format!("unknown pattern {other}"))),
        }

        Ok(spec)
    }

    fn buffer_identifier(&self, frame: i32, eye: Eye) -> String {
        let color: Vec<String> = self.color.iter().copied().map(float_token).collect();
        format!(
            "{}:{}x{}:{}@{}{}",
            self.pattern,
            self.info.width,
            self.info.height,
            color.join(","),
            frame,
            eye.tag()
        )
    }
}

/// Reader for `.movieproc` paths
#[derive(Debug, Default)]
pub struct ProceduralIo;

impl ProceduralIo {
    /// Create the reader
    pub fn new() -> Self {
        Self
    }
}

impl FrameBufferIo for ProceduralIo {
    fn name(&self) -> &str {
        "movieproc"
    }

    fn can_read(&self, path: &str) -> bool {
        path.ends_with(EXTENSION)
    }

    fn image_info(&self, path: &str) -> Result<MediaInfo, MediaError> {
        ProceduralSpec::parse(path).map(|spec| spec.info)
    }

    fn read_image(&self, request: &ReadRequest) -> Result<FrameBuffer, MediaError> {
        let spec = ProceduralSpec::parse(&request.path)?;
        if request.frame < spec.info.start || request.frame > spec.info.end {
            return Err(MediaError::FrameOutOfRange {
                path: request.path.clone(),
                frame: request.frame,
            });
        }
        if spec.pattern == "error" {
            return Err(MediaError::Unreadable {
                path: request.path.clone(),
                reason: spec
                    .error_message
                    .unwrap_or_else(|| "procedural error source".to_string()),
            });
        }

        Ok(FrameBuffer {
            identifier: spec.buffer_identifier(request.frame, request.eye),
            width: spec.info.width,
            height: spec.info.height,
            data_type: spec.info.data_type,
            channels: spec.info.channels,
        })
    }
}
