//! Immutable pipeline configuration.
//!
//! Loaded once at startup and passed into the pipeline by value; nothing in
//! the engine reads ambient global state, so test runs stay deterministic and
//! parallel runs independent.

use std::path::{Path, PathBuf};

use crate::core::{Canvas, Fps};
use crate::error::{ReelError, ReelResult};
use crate::style;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Folder scanned for background clips.
    pub input_folder: PathBuf,
    /// Folder that receives finished videos.
    pub output_folder: PathBuf,
    /// Background clip file name, or `"random"` to pick from the folder.
    pub background_video_name: String,
    /// Fact topic; `None` picks a random built-in topic.
    pub topic: Option<String>,
    /// Subtitle style preset name.
    pub subtitle_style: String,
    /// Voice id passed through to the speech source.
    pub voice: String,
    /// Subtitle font file; `None` falls back to a system font.
    pub subtitle_font: Option<PathBuf>,
    /// Output canvas; must be 9:16.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_folder: PathBuf::from("input_videos"),
            output_folder: PathBuf::from("output_videos"),
            background_video_name: "random".to_string(),
            topic: None,
            subtitle_style: "ultra_vibrant".to_string(),
            voice: "en-US-AriaNeural".to_string(),
            subtitle_font: None,
            canvas: Canvas::SHORTS,
            fps: Fps { num: 30, den: 1 },
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file, merging user keys over the defaults.
    ///
    /// A missing file yields the defaults. Top-level keys starting with `_`
    /// are treated as comments and ignored.
    pub fn load_or_default(path: &Path) -> ReelResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReelError::serde(format!("cannot read config '{}': {e}", path.display()))
        })?;
        let mut user: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            ReelError::serde(format!("invalid config json '{}': {e}", path.display()))
        })?;

        if let Some(map) = user.as_object_mut() {
            map.retain(|k, _| !k.starts_with('_'));
        } else {
            return Err(ReelError::serde(format!(
                "config '{}' must be a json object",
                path.display()
            )));
        }

        let mut merged = serde_json::to_value(Self::default())
            .map_err(|e| ReelError::serde(format!("config defaults did not serialize: {e}")))?;
        if let (Some(dst), Some(src)) = (merged.as_object_mut(), user.as_object()) {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }

        serde_json::from_value(merged)
            .map_err(|e| ReelError::serde(format!("invalid config '{}': {e}", path.display())))
    }

    /// Validate before any pipeline work, including one-shot resolution of
    /// the subtitle style name.
    pub fn validate(&self) -> ReelResult<()> {
        if self.background_video_name.trim().is_empty() {
            return Err(ReelError::invalid_input(
                "background_video_name must not be empty",
            ));
        }
        if !self.canvas.is_nine_by_sixteen() {
            return Err(ReelError::invalid_input(format!(
                "canvas must be 9:16, got {}x{}",
                self.canvas.width, self.canvas.height
            )));
        }
        if self.fps.num == 0 || self.fps.den == 0 {
            return Err(ReelError::invalid_input("fps must be non-zero"));
        }
        style::resolve(&self.subtitle_style)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = PipelineConfig::load_or_default(Path::new("target/no_such_config.json")).unwrap();
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn user_keys_override_defaults_and_comments_are_ignored() {
        let dir = PathBuf::from("target").join("config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{
                "_comment": "pick a calm clip",
                "background_video_name": "calm.mp4",
                "subtitle_style": "neon_pop",
                "topic": "Ocean and Marine Life"
            }"#,
        )
        .unwrap();

        let cfg = PipelineConfig::load_or_default(&path).unwrap();
        assert_eq!(cfg.background_video_name, "calm.mp4");
        assert_eq!(cfg.subtitle_style, "neon_pop");
        assert_eq!(cfg.topic.as_deref(), Some("Ocean and Marine Life"));
        assert_eq!(cfg.input_folder, PathBuf::from("input_videos"));
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_style_name_fails_validation_up_front() {
        let cfg = PipelineConfig {
            subtitle_style: "unknown_style".to_string(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ReelError::UnknownStyle(_))
        ));
    }

    #[test]
    fn non_vertical_canvas_is_rejected() {
        let cfg = PipelineConfig {
            canvas: Canvas {
                width: 1920,
                height: 1080,
            },
            ..PipelineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
