//! Intent corpus, mood indicators and time-of-day greetings.
//!
//! All three are loaded once at startup and never mutated afterwards. Order
//! matters everywhere: intents are searched in file order (conversation corpus
//! first, then exercises) and mood indicators are tested in the order they
//! appear in `mood.json`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::mood::DEFAULT_MOOD;

/// Period whose messages are used when no other period covers the hour.
pub const FALLBACK_PERIOD: &str = "day";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid dataset: {0}")]
    Invalid(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Intent {
    pub tag: String,
    pub patterns: Vec<String>,
    pub responses: Vec<String>,
}

#[derive(Deserialize)]
struct IntentFile {
    intents: Vec<Intent>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MoodIndicator {
    pub keywords: Vec<String>,
    pub motivation: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimeGreeting {
    /// `[start, end)` in 24h clock; `start > end` wraps past midnight.
    pub hours: (u32, u32),
    pub messages: Vec<String>,
}

impl TimeGreeting {
    pub fn covers(&self, hour: u32) -> bool {
        let (start, end) = self.hours;
        if start <= end {
            start <= hour && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

#[derive(Deserialize)]
struct MoodFile {
    mood_indicators: serde_json::Map<String, serde_json::Value>,
    time_greetings: serde_json::Map<String, serde_json::Value>,
}

/// The searchable intent corpus: conversation intents followed by exercises.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    conversation: Vec<Intent>,
    exercises: Vec<Intent>,
}

impl Corpus {
    pub fn new(conversation: Vec<Intent>, exercises: Vec<Intent>) -> Self {
        Self {
            conversation,
            exercises,
        }
    }

    /// Every intent, in load order.
    pub fn iter(&self) -> impl Iterator<Item = &Intent> {
        self.conversation.iter().chain(self.exercises.iter())
    }

    pub fn exercises(&self) -> &[Intent] {
        &self.exercises
    }

    pub fn len(&self) -> usize {
        self.conversation.len() + self.exercises.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mood indicators and time greetings, both kept in file order.
#[derive(Debug, Clone, Default)]
pub struct MoodTable {
    pub indicators: Vec<(String, MoodIndicator)>,
    pub greetings: Vec<(String, TimeGreeting)>,
}

impl MoodTable {
    pub fn indicator(&self, mood: &str) -> Option<&MoodIndicator> {
        self.indicators
            .iter()
            .find(|(label, _)| label == mood)
            .map(|(_, indicator)| indicator)
    }

    pub fn greeting(&self, period: &str) -> Option<&TimeGreeting> {
        self.greetings
            .iter()
            .find(|(label, _)| label == period)
            .map(|(_, greeting)| greeting)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPaths {
    pub intents_file: PathBuf,
    pub exercises_file: PathBuf,
    pub mood_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub corpus: Corpus,
    pub moods: MoodTable,
}

impl Dataset {
    /// Reads and validates all three dataset files. Any failure is fatal.
    pub fn load(paths: &DataPaths) -> Result<Self, DatasetError> {
        let conversation: IntentFile = read_json(&paths.intents_file)?;
        log::info!(
            "Loaded {} intents from {:?}",
            conversation.intents.len(),
            paths.intents_file
        );
        let exercises: IntentFile = read_json(&paths.exercises_file)?;
        log::info!(
            "Loaded {} intents from {:?}",
            exercises.intents.len(),
            paths.exercises_file
        );
        let mood_file: MoodFile = read_json(&paths.mood_file)?;
        let moods = MoodTable {
            indicators: ordered_entries(mood_file.mood_indicators, &paths.mood_file)?,
            greetings: ordered_entries(mood_file.time_greetings, &paths.mood_file)?,
        };

        let dataset = Self::new(
            Corpus::new(conversation.intents, exercises.intents),
            moods,
        )?;
        log::info!("Total intents loaded: {}", dataset.corpus.len());
        Ok(dataset)
    }

    pub fn new(corpus: Corpus, moods: MoodTable) -> Result<Self, DatasetError> {
        if corpus.is_empty() {
            return Err(DatasetError::Invalid("intent corpus is empty".into()));
        }
        if let Some(intent) = corpus.iter().find(|i| i.responses.is_empty()) {
            return Err(DatasetError::Invalid(format!(
                "intent '{}' has no responses",
                intent.tag
            )));
        }
        if moods.indicator(DEFAULT_MOOD).is_none() {
            return Err(DatasetError::Invalid(format!(
                "mood indicators must define '{DEFAULT_MOOD}'"
            )));
        }
        match moods.greeting(FALLBACK_PERIOD) {
            Some(day) if !day.messages.is_empty() => {}
            _ => {
                return Err(DatasetError::Invalid(format!(
                    "time greetings must define '{FALLBACK_PERIOD}' with at least one message"
                )))
            }
        }
        if let Some((period, _)) = moods
            .greetings
            .iter()
            .find(|(_, g)| g.hours.0 > 24 || g.hours.1 > 24)
        {
            return Err(DatasetError::Invalid(format!(
                "time greeting '{period}' has hours outside 0..=24"
            )));
        }
        Ok(Self { corpus, moods })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, DatasetError> {
    let content = read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| DatasetError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Converts a JSON object into `(key, value)` pairs without losing key order.
fn ordered_entries<T: DeserializeOwned>(
    map: serde_json::Map<String, serde_json::Value>,
    path: &Path,
) -> Result<Vec<(String, T)>, DatasetError> {
    map.into_iter()
        .map(|(key, value)| {
            serde_json::from_value(value)
                .map(|parsed| (key, parsed))
                .map_err(|source| DatasetError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
        })
        .collect()
}
