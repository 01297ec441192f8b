//! End-of-game awards computed in one pass over the round history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::state::{ActiveRound, Artifact, ArtifactContent, Player, PlayerId};

/// Award categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementKind {
    /// Most correct guesses.
    MostAccurate,
    /// Most guesses attracted by one's fake prompts.
    BestBullshitter,
    /// Most uneven vote spread across one's fake prompts.
    TheChaotician,
    /// Most correct guesses on one's text artifacts.
    TheWriter,
    /// Most correct guesses on one's image artifacts.
    ThePainter,
}

/// One award and everyone tied for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub kind: AchievementKind,
    pub player_ids: Vec<PlayerId>,
    pub score: f64,
}

#[derive(Debug, Default)]
struct Tally {
    correct_guesses: u32,
    votes_received: u32,
    votes_per_fake: Vec<u32>,
    text_correct_received: u32,
    image_correct_received: u32,
}

impl Tally {
    fn chaos(&self) -> f64 {
        if self.votes_per_fake.is_empty() {
            return 0.0;
        }
        let n = self.votes_per_fake.len() as f64;
        let mean = self.votes_per_fake.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        if mean == 0.0 {
            return 0.0;
        }
        let variance = self
            .votes_per_fake
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        variance / mean
    }
}

const TIE_EPSILON: f64 = 1e-9;

/// Compute every award for a finished game.
///
/// Within a category all players tied at the best score win it. A category
/// whose best score is zero is not awarded.
pub fn compute(
    history: &[ActiveRound],
    players: &BTreeMap<PlayerId, Player>,
    artifacts: &BTreeMap<String, Artifact>,
) -> Vec<Achievement> {
    let mut tallies: BTreeMap<&PlayerId, Tally> =
        players.keys().map(|id| (id, Tally::default())).collect();

    for round in history {
        let artifact = artifacts.get(&round.artifact_id);

        for guess in &round.guesses {
            if let Some(tally) = tallies.get_mut(&guess.player_id)
                && guess.is_correct
            {
                tally.correct_guesses += 1;
            }
        }

        for fake in &round.fake_prompts {
            let votes = round.votes_for(&fake.id) as u32;
            if let Some(tally) = tallies.get_mut(&fake.author_id) {
                tally.votes_received += votes;
                tally.votes_per_fake.push(votes);
            }
        }

        if let Some(artifact) = artifact
            && let Some(tally) = tallies.get_mut(&artifact.creator_id)
        {
            let correct = round.guesses.iter().filter(|g| g.is_correct).count() as u32;
            match artifact.content {
                Some(ArtifactContent::Image(_)) => tally.image_correct_received += correct,
                Some(ArtifactContent::Text(_)) | None => tally.text_correct_received += correct,
            }
        }
    }

    let categories: [(AchievementKind, fn(&Tally) -> f64); 5] = [
        (AchievementKind::MostAccurate, |t| f64::from(t.correct_guesses)),
        (AchievementKind::BestBullshitter, |t| f64::from(t.votes_received)),
        (AchievementKind::TheChaotician, Tally::chaos),
        (AchievementKind::TheWriter, |t| f64::from(t.text_correct_received)),
        (AchievementKind::ThePainter, |t| f64::from(t.image_correct_received)),
    ];

    categories
        .into_iter()
        .filter_map(|(kind, score_of)| {
            let scores: Vec<(&PlayerId, f64)> =
                tallies.iter().map(|(id, t)| (*id, score_of(t))).collect();
            let best = scores.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
            if best <= 0.0 {
                return None;
            }
            let player_ids = scores
                .into_iter()
                .filter(|(_, s)| (best - s).abs() < TIE_EPSILON)
                .map(|(id, _)| id.clone())
                .collect();
            Some(Achievement {
                kind,
                player_ids,
                score: best,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ArtifactStatus, FakePrompt, Guess, REAL_PROMPT_ID};

    fn players(ids: &[&str]) -> BTreeMap<PlayerId, Player> {
        ids.iter()
            .map(|id| {
                (
                    PlayerId::from(*id),
                    Player {
                        id: PlayerId::from(*id),
                        name: id.to_uppercase(),
                        avatar_url: None,
                        connected: true,
                        points: 0,
                        last_seen: 0,
                    },
                )
            })
            .collect()
    }

    fn artifact(id: &str, creator: &str, content: ArtifactContent) -> (String, Artifact) {
        (
            id.to_string(),
            Artifact {
                id: id.to_string(),
                creator_id: PlayerId::from(creator),
                prompt: "a cat".to_string(),
                content: Some(content),
                status: ArtifactStatus::Complete,
                round_index: 0,
                timestamp: 0,
            },
        )
    }

    fn round(artifact_id: &str, fakes: &[&str], guesses: &[(&str, &str)]) -> ActiveRound {
        ActiveRound {
            artifact_id: artifact_id.to_string(),
            fake_prompts: fakes
                .iter()
                .map(|author| FakePrompt {
                    id: format!("fake-{artifact_id}-{author}"),
                    artifact_id: artifact_id.to_string(),
                    author_id: PlayerId::from(*author),
                    text: "decoy".to_string(),
                })
                .collect(),
            guesses: guesses
                .iter()
                .map(|(player, prompt_id)| Guess {
                    player_id: PlayerId::from(*player),
                    artifact_id: artifact_id.to_string(),
                    prompt_id: prompt_id.to_string(),
                    is_correct: *prompt_id == REAL_PROMPT_ID,
                })
                .collect(),
        }
    }

    fn find(list: &[Achievement], kind: AchievementKind) -> Option<&Achievement> {
        list.iter().find(|a| a.kind == kind)
    }

    #[test]
    fn test_ties_at_max_all_win() {
        let players = players(&["p1", "p2", "p3"]);
        let artifacts = BTreeMap::from([
            artifact("a", "p1", ArtifactContent::Text("t".into())),
            artifact("b", "p2", ArtifactContent::Text("t".into())),
        ]);
        let history = vec![
            round("a", &["p2", "p3"], &[("p2", REAL_PROMPT_ID), ("p3", "fake-a-p2")]),
            round("b", &["p1", "p3"], &[("p3", REAL_PROMPT_ID), ("p1", "fake-b-p3")]),
        ];

        let awards = compute(&history, &players, &artifacts);

        let accurate = find(&awards, AchievementKind::MostAccurate).unwrap();
        assert_eq!(
            accurate.player_ids,
            vec![PlayerId::from("p2"), PlayerId::from("p3")]
        );
        let bullshitter = find(&awards, AchievementKind::BestBullshitter).unwrap();
        assert_eq!(
            bullshitter.player_ids,
            vec![PlayerId::from("p2"), PlayerId::from("p3")]
        );
        let writer = find(&awards, AchievementKind::TheWriter).unwrap();
        assert_eq!(
            writer.player_ids,
            vec![PlayerId::from("p1"), PlayerId::from("p2")]
        );
        assert!(find(&awards, AchievementKind::ThePainter).is_none());
    }

    #[test]
    fn test_chaotician_rewards_uneven_votes() {
        let players = players(&["p1", "p2", "p3", "p4"]);
        let artifacts = BTreeMap::from([
            artifact("a", "p1", ArtifactContent::Image(vec![1])),
            artifact("b", "p1", ArtifactContent::Image(vec![2])),
        ]);
        // p2: 2 votes then 0 votes, mean 1, variance 1. p3: 1 and 1, variance 0.
        let history = vec![
            round(
                "a",
                &["p2", "p3"],
                &[("p3", "fake-a-p2"), ("p4", "fake-a-p2"), ("p2", "fake-a-p3")],
            ),
            round("b", &["p2", "p3"], &[("p4", "fake-b-p3"), ("p2", REAL_PROMPT_ID)]),
        ];

        let awards = compute(&history, &players, &artifacts);

        let chaos = find(&awards, AchievementKind::TheChaotician).unwrap();
        assert_eq!(chaos.player_ids, vec![PlayerId::from("p2")]);
        assert!((chaos.score - 1.0).abs() < 1e-9);
        let painter = find(&awards, AchievementKind::ThePainter).unwrap();
        assert_eq!(painter.player_ids, vec![PlayerId::from("p1")]);
    }

    #[test]
    fn test_nothing_awarded_for_zero_scores() {
        let players = players(&["p1", "p2"]);
        let artifacts = BTreeMap::from([artifact("a", "p1", ArtifactContent::Text("t".into()))]);
        let history = vec![round("a", &[], &[])];

        assert!(compute(&history, &players, &artifacts).is_empty());
    }
}
