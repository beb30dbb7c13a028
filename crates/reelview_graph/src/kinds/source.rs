// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media sources.

use crate::context::{Context, Eye};
use crate::definition::{NodeCategory, NodeDefinition, NodeManager, NodeSpec};
use crate::image::{ImageDescription, ImageId};
use crate::media::{MediaError, MediaInfo, ReadRequest};
use crate::node::{ImageRangeInfo, MetaEvalVisitor, NodeRef, Processor, ProcessorEnv};
use crate::property::{PropertyContainer, PropertyInfo, PropertyValue};

const NO_MEDIA: &str = "No Media";

/// Reads frames of one media path through the media registry
#[derive(Debug, Default)]
pub struct FileSource {
    movie: String,
    eye: Option<Eye>,
    info: Option<Result<MediaInfo, MediaError>>,
}

impl FileSource {
    /// Header of the media, if it loaded
    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.info.as_ref().and_then(|r| r.as_ref().ok())
    }

    fn request(&self, info: &MediaInfo, context: &Context) -> ReadRequest {
        ReadRequest {
            path: self.movie.clone(),
            frame: context.frame.clamp(info.start, info.end),
            eye: self.eye.unwrap_or(context.eye),
            component: context.component.clone(),
        }
    }
}

impl Processor for FileSource {
    fn refresh(&mut self, properties: &PropertyContainer, env: &ProcessorEnv<'_>) {
        let movie = properties.front_or("media.movie", String::new());
        self.eye = match properties.front_or("media.eye", -1i32) {
            0 => Some(Eye::Left),
            1 => Some(Eye::Right),
            _ => None,
        };
        if movie == self.movie && self.info.is_some() {
            return;
        }

        self.info = (!movie.is_empty()).then(|| env.media.image_info(&movie));
        if let Some(Err(err)) = &self.info {
            tracing::warn!("Source media failed to load: {}", err);
        }
        self.movie = movie;
    }

    fn evaluate(&self, node: NodeRef<'_>, context: &Context) -> ImageDescription {
        match &self.info {
            None => ImageDescription::no_image(node.name(), NO_MEDIA),
            Some(Err(err)) => ImageDescription::error(node.name(), err.to_string()),
            Some(Ok(info)) => match node.graph().media().read_image(&self.request(info, context)) {
                Ok(buffer) => ImageDescription::frame(node.name(), buffer),
                Err(err) => {
                    tracing::warn!("{} frame {}: {}", node.name(), context.frame, err);
                    ImageDescription::error(node.name(), err.to_string())
                }
            },
        }
    }

    fn evaluate_identifier(&self, node: NodeRef<'_>, context: &Context) -> ImageId {
        match &self.info {
            None => ImageId::no_image(node.name(), NO_MEDIA),
            Some(Err(err)) => ImageId::error(node.name(), &err.to_string()),
            Some(Ok(info)) => {
                let request = self.request(info, context);
                ImageId::new(format!(
                    "source:{}:{}@{}{}:{}",
                    node.name(),
                    request.path,
                    request.frame,
                    request.eye.tag(),
                    request.component
                ))
            }
        }
    }

    fn image_range_info(&self, _node: NodeRef<'_>) -> ImageRangeInfo {
        self.media_info()
            .map_or_else(ImageRangeInfo::empty, |info| ImageRangeInfo::new(info.start, info.end, info.fps))
    }

    fn meta_evaluate(&self, _node: NodeRef<'_>, _context: &Context, _visitor: &mut dyn MetaEvalVisitor) {}

    fn output_properties(&self) -> Vec<(&'static str, PropertyValue)> {
        let (width, height) = self
            .media_info()
            .map_or((0, 0), |info| (info.width, info.height));
        vec![
            ("image.width", PropertyValue::Int(vec![i32::try_from(width).unwrap_or(i32::MAX)])),
            ("image.height", PropertyValue::Int(vec![i32::try_from(height).unwrap_or(i32::MAX)])),
        ]
    }
}

pub(crate) fn register(manager: &mut NodeManager) {
    manager.register(
        NodeDefinition::new("FileSource", NodeCategory::Source, |_| {
            let mut properties = PropertyContainer::new();
            properties.declare("media", "movie", String::new())?;
            properties.declare("media", "eye", -1i32)?;
            properties.declare_with_info("image.width", vec![0i32], PropertyInfo::DEFAULT.output_only())?;
            properties.declare_with_info("image.height", vec![0i32], PropertyInfo::DEFAULT.output_only())?;
            Ok(NodeSpec::new(FileSource::default())
                .with_properties(properties)
                .max_inputs(0))
        })
        .with_default_name("source")
        .with_summary("Media read through the registered readers"),
    );
}

#[cfg(test)]
mod tests {
    use crate::graph::Graph;

    #[test]
    fn test_source_publishes_size() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph
            .set_property(src, "media.movie", vec!["solid,width=640,height=480.movieproc".to_string()])
            .unwrap();

        let props = graph.node(src).unwrap().properties();
        assert_eq!(props.front_or("image.width", 0i32), 640);
        assert_eq!(props.front_or("image.height", 0i32), 480);
    }

    #[test]
    fn test_frames_clamped_to_media() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph
            .set_property(src, "media.movie", vec!["solid,start=1,end=10.movieproc".to_string()])
            .unwrap();

        let late = graph.context_for_frame(50);
        let last = graph.context_for_frame(10);
        assert_eq!(
            graph.evaluate_node_identifier(src, &late),
            graph.evaluate_node_identifier(src, &last)
        );
        assert_eq!(graph.evaluate_node(src, &late), graph.evaluate_node(src, &last));
    }

    #[test]
    fn test_unreadable_media_is_error_image() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        graph.set_property(src, "media.movie", vec!["/no/such/file.exr".to_string()]).unwrap();

        let image = graph.evaluate_node(src, &graph.context_for_frame(1));
        assert!(image.error_message().unwrap().contains("No reader"));
        assert_eq!(graph.image_range_info(src).len(), 1);
    }

    #[test]
    fn test_no_media() {
        let mut graph = Graph::with_builtins().unwrap();
        let src = graph.new_node("FileSource", "").unwrap();
        assert_eq!(graph.node_name(src), Some("source"));
        assert!(graph.evaluate_node(src, &graph.context_for_frame(1)).is_no_image());
    }
}
