//! Splits narration text into subtitle chunks and locks their display
//! windows to the narration duration.

use crate::error::{ReelError, ReelResult};

/// One subtitle display unit: a span of text shown for `[start_sec, end_sec)`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SubtitleChunk {
    pub text: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

impl SubtitleChunk {
    pub fn duration_sec(&self) -> f64 {
        self.end_sec - self.start_sec
    }

    /// True when `t` falls inside the chunk's half-open display window.
    pub fn active_at(&self, t: f64) -> bool {
        self.start_sec <= t && t < self.end_sec
    }
}

/// Close a word group at this many words regardless of punctuation.
const MAX_WORDS_PER_CHUNK: usize = 7;
/// Close a word group early at sentence punctuation once it holds this many.
const PUNCT_BREAK_MIN_WORDS: usize = 4;

/// Split `script_text` into display chunks and distribute
/// `narration_duration_sec` across them proportionally to word count.
///
/// Guarantees for non-empty scripts: chunks are ordered, non-overlapping,
/// cover `[0, narration_duration_sec]` with shared boundaries (no gaps), and
/// the final chunk ends at exactly `narration_duration_sec`.
///
/// An empty script yields an empty sequence; the compositor then produces an
/// un-subtitled output.
pub fn segment(script_text: &str, narration_duration_sec: f64) -> ReelResult<Vec<SubtitleChunk>> {
    if !narration_duration_sec.is_finite() || narration_duration_sec <= 0.0 {
        return Err(ReelError::invalid_duration(format!(
            "narration duration must be > 0, got {narration_duration_sec}"
        )));
    }

    let words: Vec<&str> = script_text.split_whitespace().collect();
    if words.is_empty() {
        return Ok(Vec::new());
    }

    let groups = group_words(&words);
    let total_words = words.len() as f64;

    // Chunk boundaries are cumulative word-count fractions of the narration
    // duration, so adjacent chunks share an exact boundary and the last chunk
    // ends at exactly the narration duration.
    let mut chunks = Vec::with_capacity(groups.len());
    let mut consumed = 0usize;
    for group in groups {
        let start_sec = narration_duration_sec * (consumed as f64 / total_words);
        consumed += group.len();
        let end_sec = narration_duration_sec * (consumed as f64 / total_words);
        chunks.push(SubtitleChunk {
            text: group.join(" "),
            start_sec,
            end_sec,
        });
    }

    Ok(chunks)
}

/// Group words for on-screen readability, preserving order.
fn group_words<'a>(words: &[&'a str]) -> Vec<Vec<&'a str>> {
    let mut groups = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for &word in words {
        current.push(word);

        if current.len() >= MAX_WORDS_PER_CHUNK {
            groups.push(std::mem::take(&mut current));
        } else if current.len() >= PUNCT_BREAK_MIN_WORDS
            && word.ends_with(['.', '!', '?', ','])
        {
            groups.push(std::mem::take(&mut current));
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_cover(chunks: &[SubtitleChunk], duration: f64) {
        assert!((chunks[0].start_sec - 0.0).abs() < EPS);
        for pair in chunks.windows(2) {
            assert!(pair[0].end_sec <= pair[1].start_sec + EPS, "overlap");
            assert!(
                (pair[1].start_sec - pair[0].end_sec).abs() < EPS,
                "gap between chunks"
            );
        }
        assert_eq!(chunks.last().unwrap().end_sec, duration);
    }

    #[test]
    fn empty_script_yields_no_chunks() {
        assert!(segment("", 10.0).unwrap().is_empty());
        assert!(segment("   \n\t ", 10.0).unwrap().is_empty());
    }

    #[test]
    fn single_word_spans_full_duration() {
        let chunks = segment("Wow", 4.5).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Wow");
        assert_eq!(chunks[0].start_sec, 0.0);
        assert_eq!(chunks[0].end_sec, 4.5);
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert!(matches!(
            segment("some words", 0.0),
            Err(ReelError::InvalidDuration(_))
        ));
        assert!(matches!(
            segment("some words", -1.0),
            Err(ReelError::InvalidDuration(_))
        ));
        assert!(matches!(
            segment("some words", f64::NAN),
            Err(ReelError::InvalidDuration(_))
        ));
    }

    #[test]
    fn chunks_cover_duration_without_gaps() {
        let script = "One two three four five six seven eight nine ten \
                      eleven twelve thirteen fourteen fifteen sixteen";
        let chunks = segment(script, 9.0).unwrap();
        assert!(chunks.len() > 1);
        assert_cover(&chunks, 9.0);

        // Proportionality: equal-sized groups get equal display time.
        for c in &chunks[..chunks.len() - 1] {
            let words = c.text.split_whitespace().count();
            let expected = 9.0 * words as f64 / 16.0;
            assert!((c.duration_sec() - expected).abs() < EPS);
        }
    }

    #[test]
    fn punctuation_breaks_groups_after_four_words() {
        let chunks = segment("A short first sentence. Then the rest follows here", 8.0).unwrap();
        assert_eq!(chunks[0].text, "A short first sentence.");
        assert_cover(&chunks, 8.0);
    }

    #[test]
    fn ocean_scenario_allocates_time_by_word_count() {
        let script = "The ocean covers seventy percent of Earth. \
                      It holds ninety seven percent of the planet's water.";
        let chunks = segment(script, 12.0).unwrap();
        assert_cover(&chunks, 12.0);

        // First sentence is 7 words of 16 total, so its chunk ends at
        // 12.0 * 7/16 = 5.25s.
        assert_eq!(chunks[0].text, "The ocean covers seventy percent of Earth.");
        assert!((chunks[0].end_sec - 5.25).abs() < EPS);
        for c in &chunks {
            assert!(c.start_sec >= 0.0 && c.end_sec <= 12.0);
            assert!(c.start_sec < c.end_sec);
        }
    }

    #[test]
    fn word_order_is_preserved() {
        let script = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = segment(script, 5.0).unwrap();
        let rejoined: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        assert_eq!(rejoined.join(" "), script);
    }
}
