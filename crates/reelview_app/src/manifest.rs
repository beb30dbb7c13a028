// SPDX-License-Identifier: MIT OR Apache-2.0
//! A movie writer that records what it was asked to write.
//!
//! Each output is a JSON-lines file: a header with the media info, then one
//! line per frame with the identifier fingerprint and resource usage of the
//! description it received.

use reelview_graph::{ImageDescription, MediaError, MediaInfo, MovieWriter};
use std::fs::File;
use std::io::{BufWriter, Write};

/// Writes a JSON-lines manifest per output
#[derive(Debug, Default)]
pub struct ManifestWriter {
    out: Option<BufWriter<File>>,
    frames: usize,
}

impl ManifestWriter {
    /// Writer with no open file
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&mut self, value: &serde_json::Value) -> Result<(), MediaError> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| MediaError::Write("manifest is not open".to_string()))?;
        serde_json::to_writer(&mut *out, value).map_err(|e| MediaError::Write(e.to_string()))?;
        out.write_all(b"\n").map_err(|e| MediaError::Write(e.to_string()))
    }
}

impl MovieWriter for ManifestWriter {
    fn open(&mut self, path: &str, info: &MediaInfo) -> Result<(), MediaError> {
        let file = File::create(path).map_err(|e| MediaError::Write(format!("{}: {}", path, e)))?;
        self.out = Some(BufWriter::new(file));
        self.frames = 0;
        tracing::info!("Writing manifest {}", path);
        self.line(&serde_json::json!({ "path": path, "info": info }))
    }

    fn write_frame(&mut self, frame: i32, image: &ImageDescription) -> Result<(), MediaError> {
        self.frames += 1;
        self.line(&serde_json::json!({
            "frame": frame,
            "node": image.node,
            "size": [image.width, image.height],
            "destination": image.destination,
            "usage": image.resource_usage(),
            "error": image.error_message(),
        }))
    }

    fn close(&mut self) -> Result<(), MediaError> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        out.flush().map_err(|e| MediaError::Write(e.to_string()))?;
        tracing::info!("Manifest closed after {} frames", self.frames);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelview_graph::context::DataType;

    fn info() -> MediaInfo {
        MediaInfo {
            width: 64,
            height: 32,
            start: 1,
            end: 2,
            fps: 24.0,
            channels: vec!["R".into(), "G".into(), "B".into()],
            data_type: DataType::Uint8,
            views: Vec::new(),
        }
    }

    #[test]
    fn test_write_before_open_fails() {
        let mut writer = ManifestWriter::new();
        let image = ImageDescription::blank("test", 64, 32);
        assert!(matches!(writer.write_frame(1, &image), Err(MediaError::Write(_))));
        writer.close().unwrap();
    }

    #[test]
    fn test_manifest_lines() {
        let path = std::env::temp_dir().join(format!("reelview-manifest-{}.jsonl", std::process::id()));
        let path_str = path.to_string_lossy().to_string();
        let mut writer = ManifestWriter::new();
        writer.open(&path_str, &info()).unwrap();
        writer.write_frame(1, &ImageDescription::blank("out", 64, 32)).unwrap();
        writer.write_frame(2, &ImageDescription::error("out", "boom")).unwrap();
        writer.close().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["info"]["width"], 64);
        assert_eq!(lines[1]["frame"], 1);
        assert_eq!(lines[2]["error"], "boom");
    }
}
