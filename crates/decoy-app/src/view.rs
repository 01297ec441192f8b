//! Plain-text rendering of the game for the terminal.

use std::fmt::Write as _;

use decoy_game::{ArtifactContent, GameState, PlayerId, REAL_PROMPT_ID, Stage};
use rand::seq::SliceRandom;

/// The guessing options as shown to one player, in shuffled order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub artifact_id: String,
    /// `(prompt id, text)` pairs.
    pub options: Vec<(String, String)>,
}

impl Ballot {
    /// Options for the active artifact, or `None` outside GUESSING.
    pub fn from_state(state: &GameState) -> Option<Self> {
        if state.stage != Stage::Guessing {
            return None;
        }
        let round = state.active_round.as_ref()?;
        let artifact = state.active_artifact()?;
        let mut options: Vec<(String, String)> = round
            .fake_prompts
            .iter()
            .map(|f| (f.id.clone(), f.text.clone()))
            .collect();
        options.push((REAL_PROMPT_ID.to_string(), artifact.prompt.clone()));
        options.shuffle(&mut rand::rng());
        Some(Self {
            artifact_id: round.artifact_id.clone(),
            options,
        })
    }

    /// Prompt id behind option `n`, counting from 1.
    pub fn prompt_id(&self, n: usize) -> Option<&str> {
        let index = n.checked_sub(1)?;
        self.options.get(index).map(|(id, _)| id.as_str())
    }
}

/// What identifies a screen; the view is reprinted whenever it changes.
pub type ScreenKey = (Stage, u32, Option<String>, usize);

pub fn screen_key(state: &GameState) -> ScreenKey {
    (
        state.stage,
        state.current_round,
        state.active_round.as_ref().map(|r| r.artifact_id.clone()),
        state.connected_players().count(),
    )
}

/// Terminal output for one player.
#[derive(Debug)]
pub struct Terminal {
    me: PlayerId,
    screen: Option<ScreenKey>,
    ballot: Option<Ballot>,
}

impl Terminal {
    pub fn new(me: PlayerId) -> Self {
        Self {
            me,
            screen: None,
            ballot: None,
        }
    }

    pub fn me(&self) -> &PlayerId {
        &self.me
    }

    /// Options last shown for guessing.
    pub fn ballot(&self) -> Option<&Ballot> {
        self.ballot.as_ref()
    }

    /// Print the view when the screen changed. Returns whether it did.
    pub fn observe(&mut self, state: &GameState) -> bool {
        let key = screen_key(state);
        if self.screen.as_ref() == Some(&key) {
            return false;
        }
        // Reshuffling mid-vote would renumber the options under the player.
        let same_vote = key.0 == Stage::Guessing
            && self.ballot.as_ref().map(|b| &b.artifact_id) == key.2.as_ref();
        if !same_vote {
            self.ballot = Ballot::from_state(state);
        }
        self.screen = Some(key);
        self.show(state);
        true
    }

    pub fn show(&self, state: &GameState) {
        print!("{}", render(state, &self.me, self.ballot.as_ref()));
    }

    pub fn say(&self, text: &str) {
        println!("! {text}");
    }
}

fn content_text(content: Option<&ArtifactContent>) -> String {
    match content {
        Some(ArtifactContent::Text(text)) => text.clone(),
        Some(ArtifactContent::Image(bytes)) => format!("[image, {} bytes]", bytes.len()),
        None => "[still generating]".to_string(),
    }
}

fn name_of(state: &GameState, id: &PlayerId) -> String {
    state
        .players
        .get(id)
        .map(|p| p.name.clone())
        .unwrap_or_else(|| id.to_string())
}

fn scoreboard(state: &GameState, out: &mut String) {
    let mut players: Vec<_> = state.players.values().collect();
    players.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
    for p in players {
        let away = if p.connected { "" } else { " (left)" };
        let _ = writeln!(out, "  {:>4}  {}{away}", p.points, p.name);
    }
}

/// Describe the current screen for `me`.
pub fn render(state: &GameState, me: &PlayerId, ballot: Option<&Ballot>) -> String {
    let mut out = String::new();
    let round = state.current_round + 1;
    let rounds = state.config.round_count;

    match state.stage {
        Stage::Lobby => {
            let names: Vec<_> = state.connected_players().map(|p| p.name.as_str()).collect();
            let _ = writeln!(out, "== Lobby: {} ==", names.join(", "));
            let _ = writeln!(out, "Type `start` once everyone is here.");
        }
        Stage::Prompting => {
            let _ = writeln!(out, "== Round {round}/{rounds}: prompting ==");
            let mine = state
                .current_round_artifacts()
                .iter()
                .filter_map(|id| state.artifacts.get(id))
                .find(|a| &a.creator_id == me);
            match mine {
                Some(a) => {
                    let _ = writeln!(out, "Your prompt: {:?} ({:?})", a.prompt, a.status);
                }
                None => {
                    let _ = writeln!(out, "Describe something with `prompt <text>`.");
                }
            }
        }
        Stage::Fooling => {
            if let Some(artifact) = state.active_artifact() {
                let _ = writeln!(out, "== Round {round}/{rounds}: fooling ==");
                let _ = writeln!(out, "{}", content_text(artifact.content.as_ref()));
                if &artifact.creator_id == me {
                    let _ = writeln!(out, "This one is yours. Wait for the fakes.");
                } else {
                    let _ = writeln!(out, "Invent a believable prompt with `fake <text>`.");
                }
            }
        }
        Stage::Guessing => {
            if let Some(artifact) = state.active_artifact() {
                let _ = writeln!(out, "== Round {round}/{rounds}: guessing ==");
                let _ = writeln!(out, "{}", content_text(artifact.content.as_ref()));
                if let Some(ballot) = ballot {
                    for (n, (_, text)) in ballot.options.iter().enumerate() {
                        let _ = writeln!(out, "  {}. {text}", n + 1);
                    }
                }
                if &artifact.creator_id == me {
                    let _ = writeln!(out, "This one is yours. Wait for the guesses.");
                } else {
                    let _ = writeln!(out, "Pick the real prompt with `guess <n>`.");
                }
            }
        }
        Stage::Scoring => {
            if let (Some(artifact), Some(round)) = (state.active_artifact(), &state.active_round)
            {
                let _ = writeln!(out, "== Scores ==");
                let _ = writeln!(out, "The real prompt was {:?}.", artifact.prompt);
                for guess in &round.guesses {
                    let picked = if guess.is_correct {
                        "the real prompt".to_string()
                    } else {
                        round
                            .fake_prompts
                            .iter()
                            .find(|f| f.id == guess.prompt_id)
                            .map(|f| format!("{}'s fake", name_of(state, &f.author_id)))
                            .unwrap_or_else(|| guess.prompt_id.clone())
                    };
                    let _ = writeln!(out, "  {} picked {picked}", name_of(state, &guess.player_id));
                }
            }
            scoreboard(state, &mut out);
        }
        Stage::GameOver => {
            let _ = writeln!(out, "== Game over ==");
            scoreboard(state, &mut out);
            for award in &state.achievements {
                let names: Vec<_> = award.player_ids.iter().map(|id| name_of(state, id)).collect();
                let _ = writeln!(out, "  {:?}: {}", award.kind, names.join(", "));
            }
        }
    }
    out
}
