//! Streams composited frames into the system `ffmpeg` binary and publishes
//! the finished MP4 atomically.
//!
//! The encoder writes to a `.part` sibling of the target path and renames it
//! into place only after `ffmpeg` exits cleanly. Any failure or abort after
//! bytes were written removes the partial file, so a crash or error never
//! leaves a truncated artifact at the target path.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use crate::core::{FrameIndex, FrameRGBA, Fps};
use crate::error::{ReelError, ReelResult};

/// Narration track attached as the sole audio stream of the output.
///
/// The file is handed to `ffmpeg` as a second input and transcoded to AAC;
/// any background-clip audio never enters the graph.
#[derive(Clone, Debug)]
pub struct AudioInput {
    pub path: PathBuf,
}

/// Stream geometry and timing for one encode.
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub audio: Option<AudioInput>,
}

/// Options for [`FfmpegSink`] MP4 output.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    /// Final output MP4 path (published via rename).
    pub out_path: PathBuf,
    /// Overwrite the output file if it already exists.
    pub overwrite: bool,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
        }
    }
}

/// Encoder sink that spawns the system `ffmpeg` and streams raw premultiplied
/// RGBA8 frames to its stdin.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    part_path: PathBuf,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    scratch: Vec<u8>,
    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        let part_path = partial_path(&opts.out_path);
        Self {
            opts,
            part_path,
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            cfg: None,
            last_idx: None,
        }
    }

    /// Spawn `ffmpeg` and prepare to accept frames.
    pub fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.fps.num == 0 || cfg.fps.den == 0 {
            return Err(ReelError::invalid_input("sink fps must be non-zero"));
        }
        if cfg.width == 0 || cfg.height == 0 {
            return Err(ReelError::invalid_input(
                "sink width/height must be non-zero",
            ));
        }
        if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
            return Err(ReelError::invalid_input(
                "sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(ReelError::invalid_input(format!(
                "output file '{}' already exists",
                self.opts.out_path.display()
            )));
        }

        if !crate::media::is_ffmpeg_on_path() {
            return Err(ReelError::encoding(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        // The partial file is always fresh; -y keeps reruns from stalling on
        // a leftover from a killed process.
        cmd.arg("-y");

        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = cfg.audio.as_ref() {
            cmd.arg("-i").arg(&audio.path).args([
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
                "-movflags",
                "+faststart",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        // The `.part` extension defeats container detection, so name the
        // muxer explicitly.
        cmd.args(["-f", "mp4"]).arg(&self.part_path);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::encoding(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::encoding("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::encoding("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.scratch = vec![0u8; (cfg.width * cfg.height * 4) as usize];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    /// Flatten one premultiplied frame over opaque black and write it to
    /// `ffmpeg`. Frames must arrive in strictly increasing index order.
    pub fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::encoding("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelError::encoding(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(ReelError::invalid_input(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if frame.data.len() != self.scratch.len() {
            return Err(ReelError::invalid_input(
                "frame.data size mismatch with width*height*4",
            ));
        }

        flatten_premul_to_opaque_rgba8(&mut self.scratch, &frame.data)?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::encoding("ffmpeg sink is already finalized"));
        };

        use std::io::Write as _;
        stdin.write_all(&self.scratch).map_err(|e| {
            ReelError::encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    /// Close the stream, await `ffmpeg`, and publish the output via rename.
    ///
    /// On any failure the partial file is removed before the error is
    /// returned.
    pub fn finish(mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::encoding("ffmpeg sink not started"))?;

        let waited = child.wait();
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle.join().ok().and_then(|r| r.ok()).unwrap_or_default(),
            None => Vec::new(),
        };

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                self.discard_partial();
                return Err(ReelError::encoding(format!(
                    "failed to wait for ffmpeg to finish: {e}"
                )));
            }
        };

        if !status.success() {
            self.discard_partial();
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(ReelError::encoding(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        if let Err(e) = std::fs::rename(&self.part_path, &self.opts.out_path) {
            self.discard_partial();
            return Err(ReelError::encoding(format!(
                "failed to publish output '{}': {e}",
                self.opts.out_path.display()
            )));
        }

        self.cfg = None;
        Ok(())
    }

    fn discard_partial(&self) {
        let _ = std::fs::remove_file(&self.part_path);
    }
}

impl Drop for FfmpegSink {
    /// Abort path: a sink dropped mid-encode kills the child and removes the
    /// partial output so cancellation never leaves an artifact behind.
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
            self.discard_partial();
        }
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
    }
}

/// Sibling path the encoder writes to before publishing.
fn partial_path(out_path: &Path) -> PathBuf {
    let mut name = out_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    out_path.with_file_name(name)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn flatten_premul_to_opaque_rgba8(dst: &mut [u8], src_premul: &[u8]) -> ReelResult<()> {
    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(ReelError::invalid_input(
            "flatten_premul_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    // Flatten over opaque black: premultiplied channels pass through, alpha
    // becomes 255. `ffmpeg` does not understand premul input.
    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        d[0] = s[0];
        d[1] = s[1];
        d[2] = s[2];
        d[3] = 255;
    }

    Ok(())
}
