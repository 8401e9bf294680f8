//! Round results: games, outcomes, and the results expression parser.
//!
//! A results expression is a comma-separated list of entries:
//!
//! ```text
//! entry  := [pair WS] scores
//! pair   := start_no ":" (start_no | "bye")
//! scores := score "-" score | score
//! ```
//!
//! Two-sided scores must add up to one point. A single score is only
//! meaningful for a bye. Either every entry names its pairing or none does;
//! entries without a pairing are applied positionally to an existing round.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Score, TournamentError};

/// The result of one game.
///
/// Stored as an array: `[white, black]` for a played game, `[score]` for a bye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Score>", into = "Vec<Score>")]
pub enum Outcome {
    /// Both sides played; the scores add up to one point.
    Played { white: Score, black: Score },
    /// A single player had no opponent.
    Bye(Score),
}

impl Outcome {
    /// Builds a two-sided outcome, rejecting pairs that do not sum to one.
    pub fn played(white: Score, black: Score) -> Result<Self, TournamentError> {
        if white.halves() + black.halves() != 2 {
            return Err(TournamentError::validation(format!(
                "scores {}-{} do not add up to one point",
                white, black
            )));
        }
        Ok(Outcome::Played { white, black })
    }

    /// Returns `true` for a single-sided (bye) outcome.
    pub fn is_bye(&self) -> bool {
        matches!(self, Outcome::Bye(_))
    }
}

impl TryFrom<Vec<Score>> for Outcome {
    type Error = TournamentError;

    fn try_from(scores: Vec<Score>) -> Result<Self, Self::Error> {
        match scores.as_slice() {
            [single] => Ok(Outcome::Bye(*single)),
            [white, black] => Outcome::played(*white, *black),
            other => Err(TournamentError::validation(format!(
                "expected one or two scores, got {}",
                other.len()
            ))),
        }
    }
}

impl From<Outcome> for Vec<Score> {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Played { white, black } => vec![white, black],
            Outcome::Bye(score) => vec![score],
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Played { white, black } => write!(f, "{}-{}", white, black),
            Outcome::Bye(score) => write!(f, "{}", score),
        }
    }
}

/// One game of a round.
///
/// A game with both participants is a regular pairing, a game with only
/// `white` is a bye, and a game with neither was recorded without naming
/// its players. `score` is `None` while the game is still being played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    #[serde(default)]
    pub white: Option<u32>,
    #[serde(default)]
    pub black: Option<u32>,
    #[serde(default)]
    pub score: Option<Outcome>,
}

impl Game {
    /// Creates a pending game between two players.
    pub fn pairing(white: u32, black: u32) -> Self {
        Self {
            white: Some(white),
            black: Some(black),
            score: None,
        }
    }

    /// Creates a pending bye for a single player.
    pub fn bye(player: u32) -> Self {
        Self {
            white: Some(player),
            black: None,
            score: None,
        }
    }

    /// Returns `true` if this game is a bye slot.
    pub fn is_bye(&self) -> bool {
        match (self.white, self.black) {
            (Some(_), None) => true,
            (None, None) => self.score.map(|s| s.is_bye()).unwrap_or(false),
            _ => false,
        }
    }

    /// Start numbers of the players taking part in this game.
    pub fn participants(&self) -> impl Iterator<Item = u32> + '_ {
        self.white.into_iter().chain(self.black)
    }

    /// Checks that the participants and the score agree with each other.
    pub(crate) fn check_shape(&self) -> Result<(), TournamentError> {
        match (self.white, self.black) {
            (None, Some(black)) => Err(TournamentError::validation(format!(
                "player {} has no opponent on the white side",
                black
            ))),
            (Some(white), Some(black)) if white == black => Err(TournamentError::validation(
                format!("player {} is paired against themselves", white),
            )),
            (Some(white), Some(black)) if self.score.map_or(false, |s| s.is_bye()) => {
                Err(TournamentError::validation(format!(
                    "game {}:{} needs a two-sided score",
                    white, black
                )))
            }
            (Some(white), None) if self.score.map_or(false, |s| !s.is_bye()) => {
                Err(TournamentError::validation(format!(
                    "bye for player {} takes a single score",
                    white
                )))
            }
            _ => Ok(()),
        }
    }
}

/// A parsed results-expression entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// `(white, black)` when the entry names its pairing; `black` is `None` for a bye.
    pub pair: Option<(u32, Option<u32>)>,
    pub outcome: Outcome,
}

impl Entry {
    /// Converts the entry into a finished game.
    pub fn into_game(self) -> Game {
        let (white, black) = match self.pair {
            Some((white, black)) => (Some(white), black),
            None => (None, None),
        };
        Game {
            white,
            black,
            score: Some(self.outcome),
        }
    }
}

/// Parses a results expression such as `"1-0, 0.5-0.5"` or `"1:4 1-0, 5:bye 1"`.
pub fn parse_results(expr: &str) -> Result<Vec<Entry>, TournamentError> {
    if expr.trim().is_empty() {
        return Err(TournamentError::validation("results expression is empty"));
    }

    let mut entries = Vec::new();
    for (i, part) in expr.split(',').enumerate() {
        entries.push(parse_entry(i + 1, part)?);
    }

    let named = entries.iter().filter(|e| e.pair.is_some()).count();
    if named != 0 && named != entries.len() {
        return Err(TournamentError::validation(
            "either every entry names its pairing or none does",
        ));
    }

    Ok(entries)
}

fn parse_entry(index: usize, part: &str) -> Result<Entry, TournamentError> {
    let tokens: Vec<&str> = part.split_whitespace().collect();
    let (pair, scores) = match tokens.as_slice() {
        [scores] => (None, *scores),
        [pair, scores] => (Some(parse_pair(index, pair)?), *scores),
        [] => {
            return Err(TournamentError::validation(format!(
                "entry {} is empty",
                index
            )))
        }
        _ => {
            return Err(TournamentError::validation(format!(
                "entry {}: expected '[white:black] score', got '{}'",
                index,
                part.trim()
            )))
        }
    };

    let outcome = match scores.split_once('-') {
        Some((white, black)) => Outcome::played(Score::parse(white)?, Score::parse(black)?)?,
        None => Outcome::Bye(Score::parse(scores)?),
    };

    if let Some((_, black)) = pair {
        if black.is_none() != outcome.is_bye() {
            return Err(TournamentError::validation(format!(
                "entry {}: a bye takes a single score, a pairing takes two",
                index
            )));
        }
    }

    Ok(Entry { pair, outcome })
}

fn parse_pair(index: usize, token: &str) -> Result<(u32, Option<u32>), TournamentError> {
    let malformed = || {
        TournamentError::validation(format!(
            "entry {}: invalid pairing '{}', expected 'white:black' or 'white:bye'",
            index, token
        ))
    };

    let (white, black) = token.split_once(':').ok_or_else(malformed)?;
    let white = parse_start_no(white).ok_or_else(malformed)?;
    let black = if black.eq_ignore_ascii_case("bye") {
        None
    } else {
        Some(parse_start_no(black).ok_or_else(malformed)?)
    };
    Ok((white, black))
}

fn parse_start_no(token: &str) -> Option<u32> {
    token.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Accepts the structured form and the free-text form written by older tools.
pub(crate) fn deserialize_games<'de, D>(deserializer: D) -> Result<Vec<Game>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoredResults {
        Games(Vec<Game>),
        Text(String),
    }

    match StoredResults::deserialize(deserializer)? {
        StoredResults::Games(games) => Ok(games),
        StoredResults::Text(text) => parse_results(&text)
            .map(|entries| entries.into_iter().map(Entry::into_game).collect())
            .map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_unnamed_entries() {
        let entries = parse_results("1-0, 0.5-0.5").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pair, None);
        assert_eq!(
            entries[0].outcome,
            Outcome::Played {
                white: Score::One,
                black: Score::Zero
            }
        );
        assert_eq!(
            entries[1].outcome,
            Outcome::Played {
                white: Score::Half,
                black: Score::Half
            }
        );
    }

    #[test]
    fn parse_named_entries_with_bye() {
        let entries = parse_results("1:4 0-1, 2:3 ½-½, 5:bye 1").unwrap();
        assert_eq!(entries[0].pair, Some((1, Some(4))));
        assert_eq!(entries[1].pair, Some((2, Some(3))));
        assert_eq!(entries[2].pair, Some((5, None)));
        assert_eq!(entries[2].outcome, Outcome::Bye(Score::One));
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let entries = parse_results("  1-0 ,0-1  ").unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn parse_rejects_bad_tokens() {
        for expr in ["", "   ", "1-0,", "2-0", "1-1", "0-0", "x-y", "1:2 1-0 extra", "a:2 1-0"] {
            assert!(
                matches!(parse_results(expr), Err(TournamentError::Validation(_))),
                "expression {:?} should be rejected",
                expr
            );
        }
    }

    #[test]
    fn parse_rejects_mixed_naming() {
        let err = parse_results("1:2 1-0, 0-1").unwrap_err();
        assert!(err.to_string().contains("every entry"));
    }

    #[test]
    fn parse_rejects_score_shape_mismatch() {
        assert!(parse_results("1:bye 1-0").is_err());
        assert!(parse_results("1:2 1").is_err());
        assert!(parse_results("0:2 1-0").is_err());
    }

    #[test]
    fn outcome_serializes_as_array() {
        let played = Outcome::played(Score::Zero, Score::One).unwrap();
        assert_eq!(serde_json::to_string(&played).unwrap(), "[0,1]");
        assert_eq!(
            serde_json::to_string(&Outcome::Bye(Score::Half)).unwrap(),
            "[0.5]"
        );
    }

    #[test]
    fn outcome_rejects_invalid_arrays() {
        assert!(serde_json::from_str::<Outcome>("[1, 1]").is_err());
        assert!(serde_json::from_str::<Outcome>("[]").is_err());
        assert!(serde_json::from_str::<Outcome>("[1, 0, 0]").is_err());
    }

    #[test]
    fn game_shape_checks() {
        assert!(Game::pairing(1, 2).check_shape().is_ok());
        assert!(Game::bye(3).check_shape().is_ok());
        assert!(Game::pairing(2, 2).check_shape().is_err());

        let orphan = Game {
            white: None,
            black: Some(2),
            score: None,
        };
        assert!(orphan.check_shape().is_err());

        let mut bye = Game::bye(3);
        bye.score = Some(Outcome::played(Score::One, Score::Zero).unwrap());
        assert!(bye.check_shape().is_err());
    }

    #[test]
    fn game_participants_and_bye() {
        assert_eq!(Game::pairing(1, 2).participants().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(Game::bye(7).participants().collect::<Vec<_>>(), vec![7]);
        assert!(Game::bye(7).is_bye());
        assert!(!Game::pairing(1, 2).is_bye());
    }

    #[test]
    fn deserialize_legacy_text_results() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_games")]
            results: Vec<Game>,
        }

        let w: Wrapper = serde_json::from_str(r#"{"results": "1-0, 0.5-0.5"}"#).unwrap();
        assert_eq!(w.results.len(), 2);
        assert_eq!(w.results[0].white, None);

        assert!(serde_json::from_str::<Wrapper>(r#"{"results": "garbage"}"#).is_err());
    }
}
