//! Points for one scored artifact.

use std::collections::BTreeMap;

use crate::state::{ActiveRound, PlayerId};

/// Points the creator earns per correct guess on their artifact.
pub const CREATOR_POINTS_PER_CORRECT: i64 = 5;

/// Points a player earns for guessing the real prompt.
pub const CORRECT_GUESS_POINTS: i64 = 5;

/// Points a fake prompt's author earns per guess it attracts.
pub const FOOLED_POINTS_PER_GUESS: i64 = 3;

/// Points earned by each player for one finished round.
///
/// Players who earned nothing are absent from the map.
pub fn score_round(round: &ActiveRound, creator: &PlayerId) -> BTreeMap<PlayerId, i64> {
    let mut points: BTreeMap<PlayerId, i64> = BTreeMap::new();

    for guess in &round.guesses {
        if guess.is_correct {
            *points.entry(creator.clone()).or_default() += CREATOR_POINTS_PER_CORRECT;
            *points.entry(guess.player_id.clone()).or_default() += CORRECT_GUESS_POINTS;
        } else if let Some(fake) = round.fake_prompts.iter().find(|f| f.id == guess.prompt_id) {
            *points.entry(fake.author_id.clone()).or_default() += FOOLED_POINTS_PER_GUESS;
        }
    }

    points
}
