use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::{Dataset, FALLBACK_PERIOD};
use crate::mood::MoodState;

/// Builds the closing message shown when the user says goodbye.
#[derive(Debug, Clone, Copy)]
pub struct FarewellGenerator<'a> {
    dataset: &'a Dataset,
}

impl<'a> FarewellGenerator<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    /// Composes the farewell for the given hour of the day (0-23).
    pub fn generate_at<R: Rng + ?Sized>(&self, state: &MoodState, hour: u32, rng: &mut R) -> String {
        let mood = state.current_mood.as_str();
        let motivation = self
            .dataset
            .moods
            .indicator(mood)
            .and_then(|indicator| indicator.motivation.choose(rng))
            .map(String::as_str)
            .unwrap_or_default();
        let time_greeting = self.time_greeting(hour, rng);
        let exercise = self.exercise_for(mood, rng);

        let mut farewell = format!("Today your mood seems {mood}, but remember: {motivation}\n");
        if let Some(exercise) = exercise {
            farewell.push_str(&format!("\nHere's something you can try:\n{exercise}\n"));
        }
        farewell.push_str(&format!("\n{time_greeting}"));
        farewell
    }

    fn time_greeting<R: Rng + ?Sized>(&self, hour: u32, rng: &mut R) -> &'a str {
        let dataset: &'a Dataset = self.dataset;
        let moods = &dataset.moods;
        let period = moods
            .greetings
            .iter()
            .find(|(_, greeting)| greeting.covers(hour))
            .map(|(_, greeting)| greeting)
            .or_else(|| moods.greeting(FALLBACK_PERIOD));

        period
            .and_then(|greeting| greeting.messages.choose(rng))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// First exercise whose tag mentions the mood, answered with a random response.
    fn exercise_for<R: Rng + ?Sized>(&self, mood: &str, rng: &mut R) -> Option<&'a str> {
        let dataset: &'a Dataset = self.dataset;
        let mood = mood.to_lowercase();
        dataset
            .corpus
            .exercises()
            .iter()
            .find(|intent| intent.tag.to_lowercase().contains(&mood))
            .and_then(|intent| intent.responses.choose(rng))
            .map(String::as_str)
    }
}
