// SPDX-License-Identifier: MIT OR Apache-2.0
//! `reelview` - headless review player
//!
//! Builds a graph from the command line:
//! - one source per media argument
//! - a combining node (sequence, stack, switch, ...) fed by every source
//! - an optional profile applied to the combining node
//!
//! It then plays a frame range, presenting the display group's result to a
//! headless video device and optionally writing the output group's result
//! through a manifest writer.

mod headless;
mod manifest;

use clap::Parser;
use headless::HeadlessModule;
use manifest::ManifestWriter;
use reelview_commands::{CommandError, Session};
use reelview_graph::context::DataType;
use reelview_graph::definition::DefinitionError;
use reelview_graph::device::DeviceError;
use reelview_graph::{
    DeviceDescriptor, Graph, GraphError, MediaError, MediaInfo, MediaRegistry, MovieWriter, NodeId, NodeManager,
    Profile, ProfileError, PropertyValue, VideoModule,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Media used when none is given
const DEFAULT_MEDIA: &str = "smptebars,start=1,end=24,fps=24.movieproc";

/// Command line
#[derive(Debug, Parser)]
#[command(name = "reelview", version, about = "Headless review player")]
struct Cli {
    /// Media paths; procedural `.movieproc` names need no files
    #[arg(value_name = "MEDIA")]
    media: Vec<String>,

    /// Node type that combines the sources
    #[arg(long, default_value = "SequenceGroup")]
    combine: String,

    /// First frame to play; defaults to the start of the view's range
    #[arg(long)]
    start: Option<i32>,

    /// Last frame to play; defaults to the end of the view's range
    #[arg(long)]
    end: Option<i32>,

    /// Headless device to present to
    #[arg(long, default_value = "headless")]
    device: String,

    /// Profile (RON) applied to the combining node
    #[arg(long, value_name = "FILE")]
    profile: Option<PathBuf>,

    /// Extra node definitions (RON)
    #[arg(long, value_name = "FILE")]
    definitions: Option<PathBuf>,

    /// Write a manifest of the output group's frames
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print each displayed description as JSON
    #[arg(long)]
    json: bool,
}

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Definitions(#[from] DefinitionError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot print description: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reelview=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting reelview v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn node_manager(definitions: Option<&PathBuf>) -> Result<NodeManager, AppError> {
    let mut manager = NodeManager::with_builtin_nodes();
    if let Some(path) = definitions {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::Read {
            path: path.clone(),
            source,
        })?;
        let loaded = manager.load_definitions_ron(&text)?;
        tracing::info!("Loaded {} node definitions from {}", loaded.len(), path.display());
    }
    Ok(manager)
}

/// Sources, combining node and view, recorded as one undo step
fn build(session: &mut Session, cli: &Cli) -> Result<NodeId, AppError> {
    let media = if cli.media.is_empty() {
        vec![DEFAULT_MEDIA.to_string()]
    } else {
        cli.media.clone()
    };

    session.begin_compound("Load media");
    let mut sources = Vec::with_capacity(media.len());
    for path in media {
        let source = session.new_node("FileSource", "")?;
        session.set_property(source, "media.movie", PropertyValue::String(vec![path]))?;
        sources.push(source);
    }
    let combine = session.new_node(&cli.combine, "")?;
    session.set_inputs(combine, &sources)?;
    if let Some(path) = &cli.profile {
        session.apply_profile(combine, Profile::load(path)?)?;
    }
    session.set_view_node(Some(combine))?;
    session.end_compound()?;
    Ok(combine)
}

fn run(cli: Cli) -> Result<(), AppError> {
    let manager = node_manager(cli.definitions.as_ref())?;
    let mut graph = Graph::new(Arc::new(manager), Arc::new(MediaRegistry::with_builtin_readers()))?;

    let module = HeadlessModule;
    let mut device = module.new_device(&cli.device)?;
    device.open()?;
    let descriptor = device.descriptor();
    let display = graph.default_display_group();
    graph.bind_device(display, &descriptor)?;

    let output = match &cli.output {
        Some(_) => Some(graph.add_output_group(&DeviceDescriptor::new(
            "manifest",
            descriptor.width,
            descriptor.height,
            descriptor.hz,
        ))?),
        None => None,
    };

    let mut session = Session::new(graph);
    let combine = build(&mut session, &cli)?;

    let range = session.graph().view_range();
    let start = cli.start.unwrap_or(range.start);
    let end = cli.end.unwrap_or(range.end);
    tracing::info!(
        "Playing {} frames {}..={} at {} fps",
        session.graph().node_name(combine).unwrap_or_default(),
        start,
        end,
        range.fps
    );

    let mut writer = match (&cli.output, output) {
        (Some(path), Some(_)) => {
            let mut writer = ManifestWriter::new();
            let info = MediaInfo {
                width: descriptor.width,
                height: descriptor.height,
                start,
                end,
                fps: range.fps,
                channels: vec!["R".into(), "G".into(), "B".into(), "A".into()],
                data_type: DataType::Uint8,
                views: Vec::new(),
            };
            writer.open(&path.to_string_lossy(), &info)?;
            Some(writer)
        }
        _ => None,
    };

    for frame in start..=end {
        session.set_frame(frame)?;
        let graph = session.graph();
        let context = graph.context_for_frame(frame);

        let image = graph.evaluate_node(display, &context);
        device.present(frame, &image)?;
        if cli.json {
            println!("{}", serde_json::to_string(&image)?);
        } else {
            let id = graph.evaluate_node_identifier(display, &context);
            println!("{frame}\t{:016x}\t{}", id.fingerprint(), image.node);
        }

        if let (Some(writer), Some(output)) = (writer.as_mut(), output) {
            writer.write_frame(frame, &graph.evaluate_node(output, &context))?;
        }
    }

    if let Some(mut writer) = writer {
        writer.close()?;
    }
    device.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["reelview"]).unwrap();
        assert!(cli.media.is_empty());
        assert_eq!(cli.combine, "SequenceGroup");
        assert_eq!(cli.device, "headless");
        assert!(!cli.json);
    }

    #[test]
    fn test_build_sequences_sources() {
        let cli = Cli::try_parse_from([
            "reelview",
            "solid,red=1,start=1,end=5.movieproc",
            "solid,green=1,start=1,end=5.movieproc",
        ])
        .unwrap();
        let mut session = Session::with_builtins().unwrap();
        let combine = build(&mut session, &cli).unwrap();

        assert_eq!(session.graph().view_node(), Some(combine));
        assert_eq!(session.graph().node(combine).unwrap().inputs().len(), 2);
        assert_eq!(session.graph().view_range().end, 10);
        assert_eq!(session.history().stats().undo_count, 1);

        session.undo().unwrap();
        assert_eq!(session.graph().view_node(), None);
    }

    #[test]
    fn test_unknown_combine_type_fails() {
        let cli = Cli::try_parse_from(["reelview", "--combine", "Blender"]).unwrap();
        let mut session = Session::with_builtins().unwrap();
        assert!(matches!(
            build(&mut session, &cli),
            Err(AppError::Command(CommandError::Graph(GraphError::UnknownType(_))))
        ));
    }
}
