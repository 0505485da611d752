//! reelsmith composes short vertical videos: narration audio, a background
//! clip and a script go in, a 9:16 MP4 with narration-locked subtitles comes
//! out.
//!
//! # Pipeline overview
//!
//! 1. **Segment**: `script text + narration duration -> Vec<SubtitleChunk>`
//!    (display windows proportional to word count)
//! 2. **Fit**: `background metadata -> CropTransform + TrimPlan` (centered
//!    9:16 crop; random trim or loop to the narration duration)
//! 3. **Render**: `SubtitleChunk + StyleSpec -> SubtitleOverlay` (Parley
//!    layout, `vello_cpu` rasterization; idempotent)
//! 4. **Compose**: decode background frames through the plan, burn in the
//!    active overlay, stream frames plus the narration track into the system
//!    `ffmpeg` binary, publish the MP4 atomically
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Duration lock**: output length always follows the narration, never
//!   the background clip.
//! - **Deterministic-by-default**: all randomized choices (background pick,
//!   trim offset, random topic) draw from an injected, seedable rng.
//! - **No partial artifacts**: output is written to a scratch path and only
//!   renamed into place after a clean encode; failures and aborts delete it.

#![forbid(unsafe_code)]

pub mod anim;
pub mod compose;
pub mod config;
pub mod core;
pub mod encode_ffmpeg;
pub mod error;
pub mod fit;
pub mod media;
pub mod pipeline;
pub mod sources;
pub mod style;
pub mod subtitle;
pub mod timeline;

pub use crate::anim::{Ease, OverlayPose};
pub use crate::compose::{ComposeOpts, CompositionPlan, Compositor};
pub use crate::config::PipelineConfig;
pub use crate::core::{Canvas, Fps, FrameIndex, FrameRGBA, FrameRange};
pub use crate::encode_ffmpeg::{AudioInput, FfmpegSink, FfmpegSinkOpts, SinkConfig};
pub use crate::error::{ReelError, ReelResult};
pub use crate::fit::{CropTransform, TrimPlan};
pub use crate::media::{NarrationAudio, VideoSourceInfo, probe_video};
pub use crate::pipeline::Pipeline;
pub use crate::sources::{BackgroundLibrary, Script, ScriptSource, SpeechSource};
pub use crate::style::{Animation, PositionAnchor, StyleSpec};
pub use crate::subtitle::{SubtitleOverlay, SubtitleRenderer};
pub use crate::timeline::{SubtitleChunk, segment};
