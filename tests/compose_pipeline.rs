//! End-to-end composition tests against synthesized media.
//!
//! These tests shell out to `ffmpeg`/`ffprobe` and rasterize text with a
//! system font; they skip cleanly when either is unavailable.

use std::path::{Path, PathBuf};
use std::process::Command;

use rand::SeedableRng as _;
use rand::rngs::StdRng;

use reelsmith::{
    AudioInput, Canvas, ComposeOpts, Compositor, FfmpegSink, FfmpegSinkOpts, Fps, FrameIndex,
    FrameRGBA, NarrationAudio, PipelineConfig, Pipeline, ReelResult, Script, ScriptSource,
    SinkConfig, SpeechSource, probe_video, segment, style,
};

/// Small 9:16 canvas to keep encode times down.
const TEST_CANVAS: Canvas = Canvas {
    width: 270,
    height: 480,
};

fn ffmpeg_tools_available() -> bool {
    let ok = |tool: &str| {
        Command::new(tool)
            .arg("-version")
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    };
    ok("ffmpeg") && ok("ffprobe")
}

fn test_font() -> Option<Vec<u8>> {
    let path = reelsmith::subtitle::find_fallback_font()?;
    std::fs::read(path).ok()
}

fn synth_clip(path: &Path, duration_sec: f64) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=64x64:rate=30",
            "-t",
            &format!("{duration_sec}"),
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "libx264",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating test clip");
    Ok(())
}

fn synth_tone(path: &Path, duration_sec: f64) -> anyhow::Result<()> {
    let status = Command::new("ffmpeg")
        .args([
            "-v",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            &format!("{duration_sec}"),
            "-c:a",
            "pcm_s16le",
        ])
        .arg(path)
        .status()?;
    anyhow::ensure!(status.success(), "ffmpeg failed creating test tone");
    Ok(())
}

fn test_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from("target").join("it_compose").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_compositor(font: Vec<u8>) -> Compositor {
    Compositor::new(
        ComposeOpts {
            canvas: TEST_CANVAS,
            fps: Fps { num: 30, den: 1 },
            ..ComposeOpts::default()
        },
        font,
    )
    .unwrap()
}

const SCRIPT: &str = "The ocean covers seventy percent of Earth. \
                      It holds ninety seven percent of the planet's water.";

#[test]
fn output_duration_follows_narration_not_background() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }
    let Some(font) = test_font() else {
        eprintln!("skipping: no system font found");
        return;
    };

    let dir = test_dir("duration_lock");
    let tone = dir.join("tone.wav");
    synth_tone(&tone, 2.0).unwrap();
    let narration = NarrationAudio::probe(&tone).unwrap();
    let spec = style::resolve("ultra_vibrant").unwrap();

    // Background shorter than (loop), equal to (trim at 0), and longer than
    // (random trim) the narration.
    for (tag, clip_sec) in [("short", 1.0), ("equal", 2.0), ("long", 4.0)] {
        let clip = dir.join(format!("clip_{tag}.mp4"));
        synth_clip(&clip, clip_sec).unwrap();
        let background = probe_video(&clip).unwrap();

        let chunks = segment(SCRIPT, narration.duration_sec).unwrap();
        let out = dir.join(format!("out_{tag}.mp4"));
        let mut rng = StdRng::seed_from_u64(11);
        let mut compositor = test_compositor(font.clone());
        compositor
            .compose(&narration, &background, chunks, &spec, &out, &mut rng)
            .unwrap();

        let produced = probe_video(&out).unwrap();
        assert_eq!(produced.width, TEST_CANVAS.width, "{tag}");
        assert_eq!(produced.height, TEST_CANVAS.height, "{tag}");
        assert!(produced.has_audio, "{tag}: narration track missing");
        assert!(
            (produced.duration_sec - narration.duration_sec).abs() < 0.25,
            "{tag}: output {}s vs narration {}s",
            produced.duration_sec,
            narration.duration_sec
        );
    }
}

#[test]
fn empty_script_produces_unsubtitled_output() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }
    let Some(font) = test_font() else {
        eprintln!("skipping: no system font found");
        return;
    };

    let dir = test_dir("no_subtitles");
    let tone = dir.join("tone.wav");
    synth_tone(&tone, 1.0).unwrap();
    let clip = dir.join("clip.mp4");
    synth_clip(&clip, 2.0).unwrap();

    let narration = NarrationAudio::probe(&tone).unwrap();
    let background = probe_video(&clip).unwrap();
    let chunks = segment("", narration.duration_sec).unwrap();
    assert!(chunks.is_empty());

    let out = dir.join("out.mp4");
    let mut rng = StdRng::seed_from_u64(3);
    let mut compositor = test_compositor(font);
    compositor
        .compose(
            &narration,
            &background,
            chunks,
            &style::resolve("fire_text").unwrap(),
            &out,
            &mut rng,
        )
        .unwrap();
    assert!(out.is_file());
}

#[test]
fn encoder_failure_leaves_no_output_file() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }

    let dir = test_dir("encode_fail");
    let out = dir.join("out.mp4");

    // A missing narration file makes ffmpeg exit non-zero; the partial
    // output must be cleaned up before the error propagates.
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out));
    sink.begin(SinkConfig {
        width: 64,
        height: 64,
        fps: Fps { num: 30, den: 1 },
        audio: Some(AudioInput {
            path: dir.join("missing.wav"),
        }),
    })
    .unwrap();

    let frame = FrameRGBA {
        width: 64,
        height: 64,
        data: vec![0u8; 64 * 64 * 4],
    };
    // Writes may fail with a broken pipe once ffmpeg has bailed; the error
    // we care about comes from finish().
    let _ = sink.push_frame(FrameIndex(0), &frame);
    let _ = sink.push_frame(FrameIndex(1), &frame);
    assert!(sink.finish().is_err());

    assert!(!out.exists());
    let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().flatten().collect();
    assert!(
        leftovers.is_empty(),
        "partial files left behind: {leftovers:?}"
    );
}

#[test]
fn aborted_encode_cleans_up_partial_file() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }

    let dir = test_dir("encode_abort");
    let out = dir.join("out.mp4");

    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out));
    sink.begin(SinkConfig {
        width: 64,
        height: 64,
        fps: Fps { num: 30, den: 1 },
        audio: None,
    })
    .unwrap();
    let frame = FrameRGBA {
        width: 64,
        height: 64,
        data: vec![128u8; 64 * 64 * 4],
    };
    sink.push_frame(FrameIndex(0), &frame).unwrap();
    drop(sink);

    assert!(!out.exists());
    let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().flatten().collect();
    assert!(
        leftovers.is_empty(),
        "partial files left behind: {leftovers:?}"
    );
}

struct FixedScriptSource;

impl ScriptSource for FixedScriptSource {
    fn generate_script(&mut self, topic: Option<&str>) -> ReelResult<Script> {
        Ok(Script::from_parts(
            topic.unwrap_or("Ocean and Marine Life"),
            "The ocean hides a secret.",
            "It covers seventy percent of Earth.",
            "And it holds almost all of the planet's water.",
            "Follow for more facts!",
        ))
    }
}

/// Stand-in speech source: renders a sine tone sized to the script length.
struct ToneSpeechSource;

impl SpeechSource for ToneSpeechSource {
    fn synthesize(
        &mut self,
        script_text: &str,
        _voice_id: &str,
        out_dir: &Path,
    ) -> ReelResult<NarrationAudio> {
        let words = script_text.split_whitespace().count();
        let duration_sec = (words as f64 * 0.1).max(1.0);
        let path = out_dir.join("temp_speech.wav");
        synth_tone(&path, duration_sec)
            .map_err(|e| reelsmith::ReelError::Synthesis(e.to_string()))?;
        NarrationAudio::probe(&path)
    }
}

#[test]
fn pipeline_runs_end_to_end_with_mock_sources() {
    if !ffmpeg_tools_available() {
        eprintln!("skipping: ffmpeg/ffprobe not available");
        return;
    }
    if test_font().is_none() {
        eprintln!("skipping: no system font found");
        return;
    }

    let dir = test_dir("pipeline_run");
    let input = dir.join("input");
    std::fs::create_dir_all(&input).unwrap();
    synth_clip(&input.join("background.mp4"), 2.0).unwrap();

    let config = PipelineConfig {
        input_folder: input,
        output_folder: dir.join("output"),
        background_video_name: "random".to_string(),
        topic: Some("Ocean and Marine Life".to_string()),
        canvas: TEST_CANVAS,
        ..PipelineConfig::default()
    };

    let mut pipeline = Pipeline::new(config, FixedScriptSource, ToneSpeechSource);
    let mut rng = StdRng::seed_from_u64(5);
    let out = pipeline.run(&mut rng).unwrap();

    assert!(out.is_file());
    let name = out.file_name().unwrap().to_string_lossy().to_string();
    assert!(
        name.starts_with("ocean_and_marine_life_"),
        "unexpected output name {name}"
    );

    let produced = probe_video(&out).unwrap();
    assert!(produced.has_audio);
    assert!(produced.width as u64 * 16 == produced.height as u64 * 9);

    // The synthesized working audio was cleaned up after publishing.
    assert!(!dir.join("output").join("temp_speech.wav").exists());
}
