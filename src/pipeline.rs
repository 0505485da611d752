//! End-to-end run: script, narration, background, composition, publish.

use std::path::PathBuf;

use chrono::Local;
use rand::Rng;

use crate::compose::{ComposeOpts, Compositor};
use crate::config::PipelineConfig;
use crate::error::{ReelError, ReelResult};
use crate::media::probe_video;
use crate::sources::{
    BackgroundLibrary, ScriptSource, SpeechSource, output_file_name, random_topic,
};
use crate::style;
use crate::subtitle::find_fallback_font;
use crate::timeline;

/// One configured production pipeline over pluggable script and speech
/// sources.
///
/// The pipeline holds no process-wide state; running several pipelines
/// concurrently is safe as long as they write to different output folders.
pub struct Pipeline<S: ScriptSource, T: SpeechSource> {
    config: PipelineConfig,
    scripts: S,
    speech: T,
}

impl<S: ScriptSource, T: SpeechSource> Pipeline<S, T> {
    pub fn new(config: PipelineConfig, scripts: S, speech: T) -> Self {
        Self {
            config,
            scripts,
            speech,
        }
    }

    /// Produce one finished video and return its published path.
    #[tracing::instrument(skip(self, rng))]
    pub fn run<R: Rng>(&mut self, rng: &mut R) -> ReelResult<PathBuf> {
        self.config.validate()?;
        let style = style::resolve(&self.config.subtitle_style)?;

        let topic = match self.config.topic.as_deref() {
            Some(t) => t.to_string(),
            None => random_topic(rng).to_string(),
        };
        tracing::info!(%topic, "pipeline: generating script");
        let script = self.scripts.generate_script(Some(&topic))?;

        tracing::info!(words = script.word_count, "pipeline: synthesizing speech");
        std::fs::create_dir_all(&self.config.output_folder).map_err(|e| {
            ReelError::invalid_input(format!(
                "cannot create output folder '{}': {e}",
                self.config.output_folder.display()
            ))
        })?;
        let narration = self.speech.synthesize(
            &script.full_script,
            &self.config.voice,
            &self.config.output_folder,
        )?;

        let library = BackgroundLibrary::scan(&self.config.input_folder)?;
        let clip_path = library.select(&self.config.background_video_name, rng)?;
        tracing::info!(clip = %clip_path.display(), "pipeline: selected background");
        let background = probe_video(&clip_path)?;

        let chunks = timeline::segment(&script.full_script, narration.duration_sec)?;

        let font_bytes = load_font(&self.config)?;
        let mut compositor = Compositor::new(
            ComposeOpts {
                canvas: self.config.canvas,
                fps: self.config.fps,
                ..ComposeOpts::default()
            },
            font_bytes,
        )?;

        let out_path = self
            .config
            .output_folder
            .join(output_file_name(&script.topic, Local::now()));
        compositor.compose(&narration, &background, chunks, &style, &out_path, rng)?;

        // The synthesized narration was a working file; the published video
        // carries the audio now.
        let _ = std::fs::remove_file(&narration.source_path);

        Ok(out_path)
    }
}

/// Load the configured subtitle font, falling back to a system font.
pub fn load_font(config: &PipelineConfig) -> ReelResult<Vec<u8>> {
    let path = match &config.subtitle_font {
        Some(p) => p.clone(),
        None => find_fallback_font().ok_or_else(|| {
            ReelError::invalid_input(
                "no subtitle font configured and no system font found; set subtitle_font",
            )
        })?,
    };
    std::fs::read(&path).map_err(|e| {
        ReelError::invalid_input(format!("cannot read subtitle font '{}': {e}", path.display()))
    })
}
