//! Per-side game scores.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::TournamentError;

/// The score one side earns from a single game.
///
/// On disk a score is a plain number: `0`, `0.5` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Score {
    Zero,
    Half,
    One,
}

impl Score {
    /// Parses a score token as typed by an operator.
    ///
    /// Accepts `0`, `1`, `0.5` and the usual spellings of a half point
    /// (`.5`, `1/2`, `½`).
    pub fn parse(token: &str) -> Result<Self, TournamentError> {
        match token.trim() {
            "0" | "0.0" => Ok(Score::Zero),
            "0.5" | ".5" | "1/2" | "½" => Ok(Score::Half),
            "1" | "1.0" => Ok(Score::One),
            other => Err(TournamentError::validation(format!(
                "invalid score token '{}'",
                other
            ))),
        }
    }

    /// Returns the score from its numeric value, if it is one of 0, 0.5, 1.
    pub fn from_points(points: f64) -> Option<Self> {
        if points == 0.0 {
            Some(Score::Zero)
        } else if points == 0.5 {
            Some(Score::Half)
        } else if points == 1.0 {
            Some(Score::One)
        } else {
            None
        }
    }

    /// Returns the numeric value of the score.
    pub const fn points(self) -> f64 {
        match self {
            Score::Zero => 0.0,
            Score::Half => 0.5,
            Score::One => 1.0,
        }
    }

    /// Returns the score counted in half points.
    #[inline]
    pub(crate) const fn halves(self) -> u8 {
        match self {
            Score::Zero => 0,
            Score::Half => 1,
            Score::One => 2,
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Score::Zero => write!(f, "0"),
            Score::Half => write!(f, "0.5"),
            Score::One => write!(f, "1"),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Zero => serializer.serialize_u8(0),
            Score::Half => serializer.serialize_f64(0.5),
            Score::One => serializer.serialize_u8(1),
        }
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let points = f64::deserialize(deserializer)?;
        Score::from_points(points)
            .ok_or_else(|| D::Error::custom(format!("score must be 0, 0.5 or 1, got {}", points)))
    }
}
