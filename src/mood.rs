use serde::{Deserialize, Serialize};

use crate::dataset::MoodTable;

pub const DEFAULT_MOOD: &str = "neutral";
pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;
const DEFAULT_SCORE: u8 = 5;

/// The evolving record of a user's detected mood within one session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoodState {
    pub current_mood: String,
    /// Always within `MIN_SCORE..=MAX_SCORE`.
    pub mood_score: u8,
    pub conversation_keywords: Vec<String>,
}

impl Default for MoodState {
    fn default() -> Self {
        Self {
            current_mood: DEFAULT_MOOD.to_string(),
            mood_score: DEFAULT_SCORE,
            conversation_keywords: Vec::new(),
        }
    }
}

impl MoodState {
    fn raise(&mut self) {
        self.mood_score = (self.mood_score + 1).min(MAX_SCORE);
    }

    fn lower(&mut self) {
        self.mood_score = self.mood_score.saturating_sub(1).max(MIN_SCORE);
    }
}

/// Detects mood from keyword cues in the mood table.
#[derive(Debug, Clone, Copy)]
pub struct MoodTracker<'a> {
    moods: &'a MoodTable,
}

impl<'a> MoodTracker<'a> {
    pub fn new(moods: &'a MoodTable) -> Self {
        Self { moods }
    }

    /// Records the message and applies the first mood whose keywords appear in it.
    ///
    /// Indicators are tested in table order; an earlier indicator wins even if a
    /// later one matches more keywords.
    pub fn update(&self, state: &mut MoodState, message: &str) {
        let lower = message.to_lowercase();
        state.conversation_keywords.push(lower.clone());

        let detected = self.moods.indicators.iter().find(|(_, indicator)| {
            indicator
                .keywords
                .iter()
                .any(|keyword| lower.contains(keyword.as_str()))
        });

        if let Some((mood, _)) = detected {
            log::debug!("Detected mood '{}'", mood);
            state.current_mood = mood.clone();
            match mood.as_str() {
                "positive" => state.raise(),
                "sad" => state.lower(),
                _ => {}
            }
        }
    }
}
