//! Line protocol spoken with game-engine processes.
//!
//! Engines write one UTF-8 line per decision point. A protocol line is a JSON object:
//!
//! ```text
//! {"state": [0.0, 2.0, 4.0], "current_phase": 0, "reward": 1.5, "done": 0, "score": [12.0, 9.0]}
//! ```
//!
//! `state` is the observation fed to the policy, `current_phase` selects the policy
//! sub-network, and a truthy `done` ends the episode with the per-player `score` list
//! (agent first). Engines that terminate in plain text instead print a line containing a
//! marker such as `RACED DISTANCE: 1234.5`; the number after the last `:` or `=` is the
//! score.
//!
//! Scores and rewards must be finite; `NaN` or `inf` makes the line noise.
//!
//! Anything else is console noise. Engines routinely print diagnostics before their
//! first JSON line, so [`LineDecoder::decode`] returns `None` for such lines instead of
//! failing.
//!
//! The controller answers each observation with one line of whitespace-separated
//! numbers, one per output of the current phase (see [`encode_action`]).

use serde::Deserialize;

/// Game state reported by an engine at one decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Flattened state vector fed to the policy.
    pub state: Vec<f64>,
    /// Active game phase; selects the policy sub-network and output size.
    pub phase: usize,
    /// Reward for the previous action, when the engine reports one.
    pub reward: Option<f64>,
}

/// A well-formed line received from an engine.
#[derive(Debug, Clone, PartialEq, derive_more::IsVariant)]
pub enum Record {
    /// The engine waits for an action.
    Observation(Observation),
    /// The episode is over. Scores are per player, agent first.
    Terminal { scores: Vec<f64> },
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    state: Option<Vec<f64>>,
    current_phase: Option<usize>,
    reward: Option<f64>,
    done: Option<WireFlag>,
    score: Option<WireScore>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireFlag {
    Bool(bool),
    Number(f64),
}

impl WireFlag {
    fn is_set(&self) -> bool {
        match self {
            WireFlag::Bool(b) => *b,
            WireFlag::Number(n) => *n != 0.0,
        }
    }
}

// Some engines serialize numbers as strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireNumber {
    Number(f64),
    Text(String),
}

impl WireNumber {
    fn value(&self) -> Option<f64> {
        match self {
            WireNumber::Number(n) => Some(*n).filter(|n| n.is_finite()),
            WireNumber::Text(s) => parse_finite(s),
        }
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireScore {
    One(WireNumber),
    Many(Vec<WireNumber>),
}

impl WireScore {
    fn values(&self) -> Option<Vec<f64>> {
        match self {
            WireScore::One(n) => n.value().map(|v| vec![v]),
            WireScore::Many(ns) => ns.iter().map(WireNumber::value).collect(),
        }
    }
}

impl WireRecord {
    fn into_record(self) -> Option<Record> {
        if self.done.as_ref().is_some_and(WireFlag::is_set) {
            let scores = match &self.score {
                Some(score) => score.values()?,
                None => vec![],
            };
            return Some(Record::Terminal { scores });
        }
        Some(Record::Observation(Observation {
            state: self.state?,
            phase: self.current_phase.unwrap_or(0),
            reward: self.reward,
        }))
    }
}

/// Decodes engine output lines into [`Record`]s.
///
/// Holds the plain-text terminal markers of one game (may be empty for engines that
/// only terminate through the JSON `done` flag).
#[derive(Debug, Clone, Default)]
pub struct LineDecoder {
    terminal_markers: Vec<String>,
}

impl LineDecoder {
    /// Creates a decoder recognizing the given plain-text terminal markers.
    pub fn new<I>(terminal_markers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            terminal_markers: terminal_markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the plain-text terminal markers.
    #[must_use]
    pub fn terminal_markers(&self) -> &[String] {
        &self.terminal_markers
    }

    /// Decodes one line, returning `None` for console noise.
    ///
    /// # Examples
    ///
    /// ```
    /// use evoplay_engine::protocol::{LineDecoder, Record};
    ///
    /// let decoder = LineDecoder::new(["RACED DISTANCE"]);
    /// assert_eq!(
    ///     decoder.decode("RACED DISTANCE: 1200.5"),
    ///     Some(Record::Terminal { scores: vec![1200.5] }),
    /// );
    /// assert_eq!(decoder.decode("loading track..."), None);
    /// ```
    #[must_use]
    pub fn decode(&self, line: &str) -> Option<Record> {
        let line = line.trim();
        if line.starts_with('{')
            && let Some(record) = serde_json::from_str::<WireRecord>(line)
                .ok()
                .and_then(WireRecord::into_record)
        {
            return Some(record);
        }
        self.decode_marker(line)
    }

    fn decode_marker(&self, line: &str) -> Option<Record> {
        if !self
            .terminal_markers
            .iter()
            .any(|marker| line.contains(marker.as_str()))
        {
            return None;
        }
        let score = parse_finite(line.rsplit([':', '=']).next()?)?;
        Some(Record::Terminal {
            scores: vec![score],
        })
    }
}

/// Encodes an action vector as one protocol line (without the trailing newline).
///
/// # Examples
///
/// ```
/// use evoplay_engine::protocol::encode_action;
///
/// assert_eq!(encode_action(&[0.5, 1.0, -2.25]), "0.5 1 -2.25");
/// ```
#[must_use]
pub fn encode_action(action: &[f64]) -> String {
    action
        .iter()
        .map(f64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
