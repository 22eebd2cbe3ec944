//! Short vertical video generation.
//!
//! `reelstack` turns a text post into a narrated vertical video. The post is rendered as a
//! still, scrolled over the narration's length, stacked above a motion clip, centred on a
//! blurred copy of that clip, and muxed with the narration. A [`Generator`] repeats this
//! unattended, never reusing a post recorded in its [`UsageLedger`].
//!
//! Media decode and encode go through the system `ffmpeg` and `ffprobe` binaries; pixel work
//! happens in-process on RGBA frames.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;
mod media;

pub mod audio_sync;
pub mod blur;
pub mod collab;
pub mod config;
pub mod geometry;
pub mod ledger;
pub mod pad;
pub mod pipeline;
pub mod scroll;
pub mod stack;

pub use audio_sync::{AudioPlan, sync_audio};
pub use collab::{
    ClipLibraryMotionSource, ClipRequest, CommandImageRenderer, CommandMetadataService,
    CommandNarrator, CommandTemplate, ContentItem, ContentStore, ImageRenderer,
    JsonDirContentStore, Metadata, MetadataService, MotionSource, Narration, NarrationService,
};
pub use config::{CommandsConfig, GeneratorConfig};
pub use foundation::core::{Dims, Fps, FrameIndex, RenderSpec};
pub use foundation::error::{ReelError, ReelResult};
pub use geometry::{keep_aspect_height, resize, resize_keep_aspect};
pub use ledger::UsageLedger;
pub use media::decode::{FfmpegFrameReader, FrameSource, VecFrameSource};
pub use media::encode::{
    AudioInput, FfmpegSink, FfmpegSinkOpts, FrameSink, InMemorySink, SinkConfig,
};
pub use media::ffmpeg::{ffmpeg_available, is_ffmpeg_on_path};
pub use media::probe::{MediaAsset, MediaInfo, probe};
pub use pad::{PadLayout, PadOptions, composite_with_background};
pub use pipeline::{Collaborators, Generator, LoopStats, RunOutcome, Stage};
pub use scroll::{ScrollParams, render_scroll};
pub use stack::{StackLayout, stack_vertically};
