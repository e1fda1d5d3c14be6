//! Run configuration file.
//!
//! ```text
//! {
//!   "game": {"kind": "torcs", "io": {...}, "command": {"program": "./race.sh", "args": ["{port}"]}},
//!   "model": {"type": "mlp", "hidden_layers": [16], "activation": "tanh"},
//!   "algorithm": {"type": "genetic", ...},
//!   "max_workers": 8,
//!   "logs_every": 10,
//!   "seed": 42
//! }
//! ```

use std::{num::NonZero, path::Path, thread};

use evoplay_engine::GameConfig;
use evoplay_evaluator::ModelSpec;
use evoplay_training::Algorithm;
use serde::{Deserialize, Serialize};

use crate::util;

fn default_max_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZero::get)
}

const fn default_logs_every() -> usize {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RunConfig {
    pub game: GameConfig,
    pub model: ModelSpec,
    /// Search algorithm, tagged by `type`.
    pub algorithm: Algorithm,
    /// Evaluations running at once. Engines beyond the game's slot count wait for a slot.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Checkpoint period in generations; `0` only writes the final checkpoint.
    #[serde(default = "default_logs_every")]
    pub logs_every: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RunConfig {
    pub fn open<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        util::read_json_file("run configuration", path)
    }
}
