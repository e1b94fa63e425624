use chrono::Timelike;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::sync::Arc;

use crate::dataset::{Dataset, Intent};
use crate::farewell::FarewellGenerator;
use crate::fallback::FallbackResponder;
use crate::mood::{MoodState, MoodTracker};
use crate::text::{contains_any, normalize, similarity};

pub const SLEEP_DEFAULT_REPLY: &str = "I understand you might be having trouble with sleep. \
Can you tell me more about your sleep patterns? For example, are you having trouble falling \
asleep, staying asleep, or waking up too early?";
pub const DEFAULT_REPLY: &str =
    "I'm sorry, I couldn't understand that properly. Could you rephrase your question or concern?";

/// Tunable constants of the matching pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Minimum score (exclusive) for ordinary input.
    pub threshold: f64,
    /// Minimum score (exclusive) when the input mentions sleep.
    pub sleep_threshold: f64,
    /// Added to patterns of sleep-tagged intents when the input mentions sleep.
    pub sleep_boost: f64,
    pub sleep_tag: String,
    pub sleep_keywords: Vec<String>,
    pub farewell_keywords: Vec<String>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        let strings =
            |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            threshold: 0.4,
            sleep_threshold: 0.3,
            sleep_boost: 0.2,
            sleep_tag: "sleep".to_string(),
            sleep_keywords: strings(&[
                "sleep", "slept", "sleeping", "insomnia", "bed", "night", "rest", "tired", "dreams",
            ]),
            farewell_keywords: strings(&[
                "bye",
                "goodbye",
                "see you",
                "talk to you later",
                "until next time",
            ]),
        }
    }
}

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Farewell,
    Exact,
    Similar,
    Generated,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
    /// Tag of the intent the reply was drawn from, if any.
    pub tag: Option<String>,
}

impl Reply {
    fn new(text: impl Into<String>, source: ReplySource, tag: Option<&str>) -> Self {
        Self {
            text: text.into(),
            source,
            tag: tag.map(str::to_string),
        }
    }
}

enum Local {
    Answered(Reply),
    Unmatched { sleep_related: bool },
}

/// Answers one user utterance against the intent corpus.
#[derive(Clone)]
pub struct IntentMatcher {
    dataset: Arc<Dataset>,
    policy: MatchPolicy,
    fallback: FallbackResponder,
}

impl IntentMatcher {
    pub fn new(dataset: Arc<Dataset>, policy: MatchPolicy, fallback: FallbackResponder) -> Self {
        Self {
            dataset,
            policy,
            fallback,
        }
    }

    /// Replies using the local clock and a freshly seeded RNG.
    pub async fn respond(&self, message: &str, state: &mut MoodState) -> Reply {
        let hour = chrono::Local::now().hour();
        let mut rng = StdRng::from_entropy();
        self.respond_with(message, state, hour, &mut rng).await
    }

    pub async fn respond_with<R: Rng + ?Sized>(
        &self,
        message: &str,
        state: &mut MoodState,
        hour: u32,
        rng: &mut R,
    ) -> Reply {
        let local = self.match_local(message, state, hour, rng);
        self.finish(message, local).await
    }

    /// Everything that can be answered from the datasets alone.
    fn match_local<R: Rng + ?Sized>(
        &self,
        message: &str,
        state: &mut MoodState,
        hour: u32,
        rng: &mut R,
    ) -> Local {
        let lower = message.to_lowercase();
        if contains_any(&lower, &self.policy.farewell_keywords) {
            let text = FarewellGenerator::new(&self.dataset).generate_at(state, hour, rng);
            return Local::Answered(Reply::new(text, ReplySource::Farewell, None));
        }

        let processed = normalize(message);
        log::debug!("Processing user input: {}", processed);
        MoodTracker::new(&self.dataset.moods).update(state, message);

        if let Some(intent) = self.exact_match(&processed) {
            log::debug!("Found exact match in tag: {}", intent.tag);
            return Local::Answered(Self::pick(intent, ReplySource::Exact, rng));
        }

        let sleep_related = contains_any(&processed, &self.policy.sleep_keywords);
        let threshold = if sleep_related {
            self.policy.sleep_threshold
        } else {
            self.policy.threshold
        };

        match self.best_match(&processed, sleep_related) {
            Some((intent, score)) if score > threshold => {
                log::debug!("Best match tag: {} with similarity: {}", intent.tag, score);
                return Local::Answered(Self::pick(intent, ReplySource::Similar, rng));
            }
            Some((intent, score)) => log::debug!(
                "Best match tag: {} scored {} which does not clear {}",
                intent.tag,
                score,
                threshold
            ),
            None => log::debug!("No pattern shares a word with the input"),
        }
        Local::Unmatched { sleep_related }
    }

    async fn finish(&self, message: &str, local: Local) -> Reply {
        let sleep_related = match local {
            Local::Answered(reply) => return reply,
            Local::Unmatched { sleep_related } => sleep_related,
        };

        log::info!("No match found in datasets, trying generative model");
        if let Some(text) = self.fallback.respond(message).await {
            return Reply::new(text, ReplySource::Generated, None);
        }

        let text = if sleep_related {
            SLEEP_DEFAULT_REPLY
        } else {
            DEFAULT_REPLY
        };
        Reply::new(text, ReplySource::Default, None)
    }

    /// First intent, in corpus order, with a pattern equal to the input.
    fn exact_match(&self, processed: &str) -> Option<&Intent> {
        self.dataset
            .corpus
            .iter()
            .find(|intent| intent.patterns.iter().any(|p| normalize(p) == processed))
    }

    /// Highest scoring intent; ties keep the earliest pattern in corpus order.
    fn best_match(&self, processed: &str, sleep_related: bool) -> Option<(&Intent, f64)> {
        let mut best: Option<(&Intent, f64)> = None;
        let mut highest = 0.0;

        for intent in self.dataset.corpus.iter() {
            let boosted = sleep_related
                && intent
                    .tag
                    .to_lowercase()
                    .contains(&self.policy.sleep_tag.to_lowercase());

            for pattern in &intent.patterns {
                let mut score = similarity(processed, &normalize(pattern));
                if boosted {
                    score += self.policy.sleep_boost;
                }
                if score > highest {
                    highest = score;
                    best = Some((intent, score));
                }
            }
        }
        best
    }

    fn pick<R: Rng + ?Sized>(intent: &Intent, source: ReplySource, rng: &mut R) -> Reply {
        let text = intent
            .responses
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default();
        Reply::new(text, source, Some(&intent.tag))
    }
}
