//! The composition engine: merges a fitted background track, the narration
//! audio, and timed subtitle overlays into one MP4.
//!
//! `compose` is a linear state machine (INIT, FIT, TIMELINE, RENDER, MERGE,
//! FINALIZE) with no internal retries; the whole call is the caller's unit of
//! retry. Each run owns its inputs, so independent runs can execute
//! concurrently without shared state.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::anim;
use crate::core::{Canvas, FrameIndex, FrameRGBA, FrameRange, Fps};
use crate::encode_ffmpeg::{AudioInput, FfmpegSink, FfmpegSinkOpts, SinkConfig};
use crate::error::{ReelError, ReelResult};
use crate::fit::{self, CropTransform, TrimPlan};
use crate::media::{self, NarrationAudio, VideoSourceInfo};
use crate::style::{Animation, StyleSpec};
use crate::subtitle::{SubtitleOverlay, SubtitleRenderer};
use crate::timeline::SubtitleChunk;

/// Derived per-run composition state: the crop, the trim/loop choice, and the
/// repaired subtitle timeline. Transient; never outlives one run.
#[derive(Clone, Debug)]
pub struct CompositionPlan {
    pub crop: CropTransform,
    pub trim: TrimPlan,
    pub chunks: Vec<SubtitleChunk>,
}

/// Engine options. Defaults target the standard 1080x1920 shorts canvas.
#[derive(Clone, Copy, Debug)]
pub struct ComposeOpts {
    pub canvas: Canvas,
    pub fps: Fps,
    /// Frames requested per `ffmpeg` decode call.
    pub decode_batch: u32,
}

impl Default for ComposeOpts {
    fn default() -> Self {
        Self {
            canvas: Canvas::SHORTS,
            fps: Fps { num: 30, den: 1 },
            decode_batch: 32,
        }
    }
}

/// The orchestrating compositor. Owns the subtitle renderer (and with it the
/// resolved font) for the lifetime of a pipeline.
pub struct Compositor {
    opts: ComposeOpts,
    renderer: SubtitleRenderer,
}

impl Compositor {
    pub fn new(opts: ComposeOpts, font_bytes: Vec<u8>) -> ReelResult<Self> {
        if opts.canvas.width == 0 || opts.canvas.height == 0 {
            return Err(ReelError::invalid_input("canvas must be non-zero"));
        }
        if !opts.canvas.is_nine_by_sixteen() {
            return Err(ReelError::invalid_input(format!(
                "canvas must be 9:16, got {}x{}",
                opts.canvas.width, opts.canvas.height
            )));
        }
        if !opts.canvas.width.is_multiple_of(2) || !opts.canvas.height.is_multiple_of(2) {
            return Err(ReelError::invalid_input(
                "canvas dimensions must be even for mp4 output",
            ));
        }
        if opts.canvas.width > u16::MAX as u32 || opts.canvas.height > u16::MAX as u32 {
            return Err(ReelError::invalid_input("canvas dimensions exceed u16"));
        }
        if opts.fps.num == 0 || opts.fps.den == 0 {
            return Err(ReelError::invalid_input("fps must be non-zero"));
        }
        if opts.decode_batch == 0 {
            return Err(ReelError::invalid_input("decode_batch must be > 0"));
        }

        let renderer = SubtitleRenderer::new(opts.canvas, font_bytes)?;
        Ok(Self { opts, renderer })
    }

    pub fn opts(&self) -> ComposeOpts {
        self.opts
    }

    /// Compose one output video. The random trim offset comes from `rng`.
    #[tracing::instrument(skip(self, narration, background, chunks, style, rng))]
    pub fn compose<R: Rng>(
        &mut self,
        narration: &NarrationAudio,
        background: &VideoSourceInfo,
        chunks: Vec<SubtitleChunk>,
        style: &StyleSpec,
        out_path: &Path,
        rng: &mut R,
    ) -> ReelResult<()> {
        // INIT
        let target = narration.duration_sec;
        if !target.is_finite() || target <= 0.0 {
            return Err(ReelError::invalid_input(format!(
                "narration '{}' has non-positive duration {target}",
                narration.source_path.display()
            )));
        }
        if background.width == 0 || background.height == 0 {
            return Err(ReelError::invalid_input(format!(
                "background '{}' has zero dimensions",
                background.source_path.display()
            )));
        }
        tracing::info!(
            narration_sec = target,
            background_sec = background.duration_sec,
            "compose: validated inputs"
        );

        // FIT
        let (crop, trim) = fit::fit(background, target, self.opts.canvas, rng)?;
        tracing::info!(?trim, "compose: fitted background");

        // TIMELINE
        let chunks = clamp_chunks(chunks, target);

        // RENDER
        let overlays: Vec<SubtitleOverlay> = chunks
            .iter()
            .map(|c| self.renderer.render(c, style))
            .collect::<ReelResult<_>>()?;
        let paints: Vec<OverlayPaint> = overlays
            .iter()
            .map(|o| OverlayPaint::build(o, style.animation))
            .collect::<ReelResult<_>>()?;
        tracing::info!(overlays = paints.len(), "compose: rendered subtitles");

        let plan = CompositionPlan { crop, trim, chunks };

        // MERGE + FINALIZE: encoder failure or abort cleans up the partial
        // file (sink drop), so no truncated artifact survives an error here.
        let frames = self.opts.fps.secs_to_frames_round(target);
        let range = FrameRange::new(FrameIndex(0), FrameIndex(frames))?;
        let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
        sink.begin(SinkConfig {
            width: self.opts.canvas.width,
            height: self.opts.canvas.height,
            fps: self.opts.fps,
            audio: Some(AudioInput {
                path: narration.source_path.clone(),
            }),
        })?;
        self.stream_frames(&mut sink, background, &plan, &paints, range)?;
        sink.finish()?;
        tracing::info!(frames, out = %out_path.display(), "compose: published output");
        Ok(())
    }

    /// Compose a single frame at `time_sec` without encoding, for preview and
    /// inspection.
    pub fn compose_frame<R: Rng>(
        &mut self,
        narration_duration_sec: f64,
        background: &VideoSourceInfo,
        chunks: Vec<SubtitleChunk>,
        style: &StyleSpec,
        time_sec: f64,
        rng: &mut R,
    ) -> ReelResult<FrameRGBA> {
        if !narration_duration_sec.is_finite() || narration_duration_sec <= 0.0 {
            return Err(ReelError::invalid_input(
                "narration duration must be > 0 for frame preview",
            ));
        }
        let t = time_sec.clamp(0.0, narration_duration_sec);

        let (crop, trim) = fit::fit(background, narration_duration_sec, self.opts.canvas, rng)?;
        let chunks = clamp_chunks(chunks, narration_duration_sec);

        let active = chunks.iter().find(|c| c.active_at(t));
        let paint = active
            .map(|c| {
                let overlay = self.renderer.render(c, style)?;
                OverlayPaint::build(&overlay, style.animation)
            })
            .transpose()?;

        let src_t = trim.source_time_for(t, background.duration_sec);
        let bg = media::decode_video_frames_rgba8(background, src_t, 1)?
            .pop()
            .ok_or_else(|| {
                ReelError::incompatible_media(format!(
                    "ffmpeg returned no frame for '{}' at {src_t:.3}s",
                    background.source_path.display()
                ))
            })?;

        let mut painter = FramePainter::new(self.opts.canvas, crop);
        painter.paint(&bg, background, paint.as_ref(), t)
    }

    fn stream_frames(
        &mut self,
        sink: &mut FfmpegSink,
        background: &VideoSourceInfo,
        plan: &CompositionPlan,
        paints: &[OverlayPaint],
        range: FrameRange,
    ) -> ReelResult<()> {
        let mut reader = BackgroundReader::new(
            background.clone(),
            plan.trim,
            self.opts.fps,
            self.opts.decode_batch,
        );
        let mut painter = FramePainter::new(self.opts.canvas, plan.crop);

        let mut cursor = 0usize;
        for idx in range.start.0..range.end.0 {
            let t = self.opts.fps.frames_to_secs(idx);
            let bg = reader.next_frame()?;

            // Chunks are ordered and non-overlapping, so at most one overlay
            // is active and the cursor only moves forward.
            while cursor < paints.len() && t >= paints[cursor].end_sec {
                cursor += 1;
            }
            let active = paints.get(cursor).filter(|p| p.active_at(t));

            let frame = painter.paint(&bg, background, active, t)?;
            sink.push_frame(FrameIndex(idx), &frame)?;
        }
        Ok(())
    }
}

/// Repair the subtitle timeline against the narration window: clamp chunks
/// straddling a bound, drop chunks entirely outside. Non-fatal by design.
pub(crate) fn clamp_chunks(chunks: Vec<SubtitleChunk>, duration_sec: f64) -> Vec<SubtitleChunk> {
    let mut out = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.start_sec >= duration_sec || chunk.end_sec <= 0.0 {
            tracing::warn!(
                text = %chunk.text,
                start = chunk.start_sec,
                end = chunk.end_sec,
                "dropping subtitle chunk outside narration window"
            );
            continue;
        }
        let start_sec = chunk.start_sec.max(0.0);
        let end_sec = chunk.end_sec.min(duration_sec);
        if start_sec != chunk.start_sec || end_sec != chunk.end_sec {
            tracing::warn!(
                text = %chunk.text,
                "clamping subtitle chunk to narration window"
            );
        }
        if end_sec - start_sec <= f64::EPSILON {
            continue;
        }
        out.push(SubtitleChunk {
            text: chunk.text,
            start_sec,
            end_sec,
        });
    }
    out
}

/// A subtitle overlay prepared for per-frame drawing.
struct OverlayPaint {
    image: vello_cpu::Image,
    width: f64,
    height: f64,
    dst_x: f64,
    dst_y: f64,
    start_sec: f64,
    end_sec: f64,
    animation: Animation,
}

impl OverlayPaint {
    fn build(overlay: &SubtitleOverlay, animation: Animation) -> ReelResult<Self> {
        let image = rgba_premul_to_image(&overlay.rgba8_premul, overlay.width, overlay.height)?;
        Ok(Self {
            image,
            width: f64::from(overlay.width),
            height: f64::from(overlay.height),
            dst_x: overlay.dst_x,
            dst_y: overlay.dst_y,
            start_sec: overlay.chunk.start_sec,
            end_sec: overlay.chunk.end_sec,
            animation,
        })
    }

    fn active_at(&self, t: f64) -> bool {
        self.start_sec <= t && t < self.end_sec
    }

    fn draw(&self, ctx: &mut vello_cpu::RenderContext, t: f64) {
        let pose = anim::pose_at(self.animation, t - self.start_sec);
        if pose.opacity <= 0.0 {
            return;
        }

        // Scale about the overlay center, then place on the canvas.
        let half = kurbo::Vec2::new(self.width / 2.0, self.height / 2.0);
        let tr = kurbo::Affine::translate(kurbo::Vec2::new(self.dst_x, self.dst_y))
            * kurbo::Affine::translate(half)
            * kurbo::Affine::scale(pose.scale)
            * kurbo::Affine::translate(-half);

        ctx.set_transform(affine_to_cpu(tr));
        ctx.set_paint(self.image.clone());
        if pose.opacity < 1.0 {
            ctx.push_opacity_layer(pose.opacity);
        }
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, self.width, self.height));
        if pose.opacity < 1.0 {
            ctx.pop_layer();
        }
    }
}

/// Draws one output frame: fitted background, then the active overlay.
struct FramePainter {
    canvas: Canvas,
    crop_affine: vello_cpu::kurbo::Affine,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
}

impl FramePainter {
    fn new(canvas: Canvas, crop: CropTransform) -> Self {
        let (w, h) = (canvas.width as u16, canvas.height as u16);
        Self {
            canvas,
            crop_affine: affine_to_cpu(crop.to_affine()),
            ctx: vello_cpu::RenderContext::new(w, h),
            pixmap: vello_cpu::Pixmap::new(w, h),
        }
    }

    fn paint(
        &mut self,
        bg_rgba: &[u8],
        background: &VideoSourceInfo,
        overlay: Option<&OverlayPaint>,
        t: f64,
    ) -> ReelResult<FrameRGBA> {
        let bg_image = rgba_straight_to_image_premul(bg_rgba, background.width, background.height)?;

        // Rendering blends over existing pixmap content, so start each frame
        // from transparent.
        self.pixmap.data_as_u8_slice_mut().fill(0);
        self.ctx.reset();
        self.ctx.set_transform(self.crop_affine);
        self.ctx.set_paint(bg_image);
        self.ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
            0.0,
            0.0,
            f64::from(background.width),
            f64::from(background.height),
        ));

        if let Some(ov) = overlay {
            ov.draw(&mut self.ctx, t);
        }

        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);

        Ok(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data: self.pixmap.data_as_u8_slice().to_vec(),
        })
    }
}

/// Sequential background frame supply over a trim/loop plan.
///
/// Decodes in batches, never crossing a loop seam within one `ffmpeg` call,
/// and pads with the last decoded frame when a stream ends a few frames
/// short of its container duration.
struct BackgroundReader {
    info: VideoSourceInfo,
    trim: TrimPlan,
    fps: Fps,
    batch: u32,
    queue: VecDeque<Vec<u8>>,
    next_idx: u64,
    last: Option<Vec<u8>>,
}

impl BackgroundReader {
    fn new(info: VideoSourceInfo, trim: TrimPlan, fps: Fps, batch: u32) -> Self {
        Self {
            info,
            trim,
            fps,
            batch: batch.max(1),
            queue: VecDeque::new(),
            next_idx: 0,
            last: None,
        }
    }

    fn next_frame(&mut self) -> ReelResult<Vec<u8>> {
        if self.queue.is_empty() {
            self.refill()?;
        }
        let frame = self
            .queue
            .pop_front()
            .ok_or_else(|| ReelError::incompatible_media("background reader underflow"))?;
        self.last = Some(frame.clone());
        Ok(frame)
    }

    fn refill(&mut self) -> ReelResult<()> {
        let t0 = self.fps.frames_to_secs(self.next_idx);
        let src_t0 = self.trim.source_time_for(t0, self.info.duration_sec);

        let mut want = self.batch;
        if let Some(remaining) = self.trim.contiguous_until(t0, self.info.duration_sec) {
            let contig = (remaining * self.fps.as_f64()).floor() as u32;
            want = want.min(contig.max(1));
        }

        let decoded = media::decode_video_frames_rgba8(&self.info, src_t0, want)?;
        let got = decoded.len() as u32;
        self.queue.extend(decoded);

        if got < want {
            let pad = self
                .queue
                .back()
                .cloned()
                .or_else(|| self.last.clone())
                .ok_or_else(|| {
                    ReelError::incompatible_media(format!(
                        "ffmpeg returned no frames for '{}' at {src_t0:.3}s",
                        self.info.source_path.display()
                    ))
                })?;
            for _ in got..want {
                self.queue.push_back(pad.clone());
            }
        }

        self.next_idx += u64::from(want);
        Ok(())
    }
}

fn affine_to_cpu(a: kurbo::Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn premultiply_rgba8_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = ((px[0] as u16 * a + 127) / 255) as u8;
        px[1] = ((px[1] as u16 * a + 127) / 255) as u8;
        px[2] = ((px[2] as u16 * a + 127) / 255) as u8;
    }
}

fn pixmap_from_premul_bytes(
    bytes: &[u8],
    width: u32,
    height: u32,
) -> ReelResult<vello_cpu::Pixmap> {
    let w: u16 = width
        .try_into()
        .map_err(|_| ReelError::invalid_input("pixmap width exceeds u16"))?;
    let h: u16 = height
        .try_into()
        .map_err(|_| ReelError::invalid_input("pixmap height exceeds u16"))?;
    if bytes.len()
        != (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(4)
    {
        return Err(ReelError::invalid_input("pixmap byte len mismatch"));
    }
    // Pixmap stores PremulRgba8; our bytes are already premultiplied.
    let mut pixels = Vec::<vello_cpu::peniko::color::PremulRgba8>::with_capacity(
        (width as usize) * (height as usize),
    );
    for px in bytes.chunks_exact(4) {
        pixels.push(vello_cpu::peniko::color::PremulRgba8::from_u8_array([
            px[0], px[1], px[2], px[3],
        ]));
    }
    Ok(vello_cpu::Pixmap::from_parts_with_opacity(
        pixels, w, h, true,
    ))
}

fn rgba_premul_to_image(
    bytes_premul: &[u8],
    width: u32,
    height: u32,
) -> ReelResult<vello_cpu::Image> {
    let pixmap = pixmap_from_premul_bytes(bytes_premul, width, height)?;
    Ok(vello_cpu::Image {
        image: vello_cpu::ImageSource::Pixmap(Arc::new(pixmap)),
        sampler: vello_cpu::peniko::ImageSampler::default(),
    })
}

fn rgba_straight_to_image_premul(
    bytes_rgba: &[u8],
    width: u32,
    height: u32,
) -> ReelResult<vello_cpu::Image> {
    let mut tmp = bytes_rgba.to_vec();
    premultiply_rgba8_in_place(&mut tmp);
    rgba_premul_to_image(&tmp, width, height)
}
