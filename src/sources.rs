//! Collaborator seams around the composition core: script generation, speech
//! synthesis, and the local background clip library.
//!
//! Script and speech sources wrap network services and stay behind traits;
//! their failures propagate untouched. The background library is plain local
//! IO and is implemented here.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use rand::Rng;
use rand::seq::SliceRandom as _;

use crate::error::{ReelError, ReelResult};
use crate::media::NarrationAudio;

/// A generated fact script in the hook/fact/explanation/cta shape.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Script {
    pub topic: String,
    pub hook: String,
    pub fact: String,
    pub explanation: String,
    pub cta: String,
    pub full_script: String,
    pub word_count: usize,
}

impl Script {
    /// Assemble a script from its four parts.
    pub fn from_parts(topic: &str, hook: &str, fact: &str, explanation: &str, cta: &str) -> Self {
        let full_script = [hook, fact, explanation, cta]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let word_count = full_script.split_whitespace().count();
        Self {
            topic: topic.to_string(),
            hook: hook.to_string(),
            fact: fact.to_string(),
            explanation: explanation.to_string(),
            cta: cta.to_string(),
            full_script,
            word_count,
        }
    }
}

/// Produces a fact script for a topic (`None` lets the source pick).
///
/// Implementations typically call an LLM API; failures surface as
/// [`ReelError::ContentGeneration`] and are not retried by the core.
pub trait ScriptSource {
    fn generate_script(&mut self, topic: Option<&str>) -> ReelResult<Script>;
}

/// Renders narration audio for a script string.
///
/// Implementations write the audio file somewhere under `out_dir` and return
/// it probed; failures surface as [`ReelError::Synthesis`].
pub trait SpeechSource {
    fn synthesize(
        &mut self,
        script_text: &str,
        voice_id: &str,
        out_dir: &Path,
    ) -> ReelResult<NarrationAudio>;
}

/// Topics used when the configuration leaves the topic unset.
pub const AVAILABLE_TOPICS: [&str; 20] = [
    "Space and Astronomy",
    "Ocean and Marine Life",
    "Human Body",
    "Ancient History",
    "Technology",
    "Animals",
    "Food and Nutrition",
    "Psychology",
    "Geography",
    "Science Discoveries",
    "Art and Culture",
    "Sports",
    "Music",
    "Weather and Climate",
    "Inventions",
    "Amazing Nature Facts",
    "Mind-Blowing Physics",
    "Historical Mysteries",
    "Future Technology",
    "Bizarre World Records",
];

/// Pick a topic uniformly from [`AVAILABLE_TOPICS`].
pub fn random_topic<R: Rng>(rng: &mut R) -> &'static str {
    AVAILABLE_TOPICS
        .choose(rng)
        .copied()
        .unwrap_or(AVAILABLE_TOPICS[0])
}

/// File extensions recognized as background clips.
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "avi", "mov", "mkv", "wmv"];

/// The scanned set of candidate background clips in one folder.
#[derive(Clone, Debug)]
pub struct BackgroundLibrary {
    root: PathBuf,
    clips: Vec<PathBuf>,
}

impl BackgroundLibrary {
    /// Scan `root` for clip files. The listing is sorted so selection is
    /// deterministic for a given rng seed.
    pub fn scan(root: &Path) -> ReelResult<Self> {
        let entries = std::fs::read_dir(root).map_err(|e| {
            ReelError::no_background(format!(
                "cannot read input folder '{}': {e}",
                root.display()
            ))
        })?;

        let mut clips: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|ext| {
                            VIDEO_EXTENSIONS
                                .iter()
                                .any(|v| ext.eq_ignore_ascii_case(v))
                        })
            })
            .collect();
        clips.sort();

        Ok(Self {
            root: root.to_path_buf(),
            clips,
        })
    }

    pub fn clips(&self) -> &[PathBuf] {
        &self.clips
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Select a clip by name, or uniformly at random for `"random"`.
    ///
    /// A named clip that is missing is retried with each recognized
    /// extension against its stem before giving up.
    pub fn select<R: Rng>(&self, name: &str, rng: &mut R) -> ReelResult<PathBuf> {
        if name.eq_ignore_ascii_case("random") {
            return self
                .clips
                .choose(rng)
                .cloned()
                .ok_or_else(|| {
                    ReelError::no_background(format!(
                        "no video files found in '{}'",
                        self.root.display()
                    ))
                });
        }

        let direct = self.root.join(name);
        if direct.is_file() {
            return Ok(direct);
        }

        let stem = Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name);
        for ext in VIDEO_EXTENSIONS {
            let candidate = self.root.join(format!("{stem}.{ext}"));
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        Err(ReelError::no_background(format!(
            "video not found: '{}'",
            direct.display()
        )))
    }
}

/// Lowercase a topic and replace whitespace runs with underscores.
pub fn slugify(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for word in topic.split_whitespace() {
        if !slug.is_empty() {
            slug.push('_');
        }
        for c in word.chars().filter(|c| c.is_alphanumeric()) {
            slug.extend(c.to_lowercase());
        }
    }
    if slug.is_empty() {
        slug.push_str("short");
    }
    slug
}

/// Conventional output file name: `{topic_slug}_{timestamp}.mp4`.
pub fn output_file_name(topic: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.mp4", slugify(topic), now.format("%Y%m%d_%H%M%S"))
}
