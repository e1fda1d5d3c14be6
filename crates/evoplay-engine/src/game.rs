//! Closed registry of supported games.
//!
//! A game is identified by a [`GameKind`] and resolved once, at configuration time, into
//! a [`GameSpec`]: the engine [`CommandTemplate`], the per-phase input/output schema
//! ([`GameIo`]), and the [`GameProfile`] defaults (terminal markers, slot pool, base
//! port, score selection), possibly overridden by the run configuration.
//!
//! # Command templates
//!
//! Engine command lines are engine specific. A template lists the program and its
//! arguments with placeholders substituted per episode:
//!
//! | Placeholder | Value                                              |
//! |-------------|----------------------------------------------------|
//! | `{slot}`    | leased slot index                                  |
//! | `{port}`    | `base_port + slot`                                 |
//! | `{seed}`    | episode seed                                       |
//! | `{model}`   | path of a model file describing the current policy |
//!
//! The slot index is the only per-process discriminator, so a template for an engine that
//! binds a network port or writes per-instance files must reference `{slot}` or `{port}`.
//! [`GameConfig::resolve`] rejects a template that references neither when the game has a
//! base port or more than one slot.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{process::EngineCommand, protocol::LineDecoder};

/// Supported games.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum GameKind {
    /// Tile-merging puzzle.
    #[serde(rename = "game-2048")]
    #[display("game-2048")]
    Game2048,
    /// Side-scrolling platformer.
    #[serde(rename = "mario")]
    #[display("mario")]
    Mario,
    /// Racing simulator; every instance binds its own UDP port.
    #[serde(rename = "torcs")]
    #[display("torcs")]
    Torcs,
    /// Multi-phase tile-laying board game.
    #[serde(rename = "alhambra")]
    #[display("alhambra")]
    Alhambra,
}

impl GameKind {
    pub const ALL: [GameKind; 4] = [
        GameKind::Game2048,
        GameKind::Mario,
        GameKind::Torcs,
        GameKind::Alhambra,
    ];

    /// Returns the built-in defaults of this game.
    #[must_use]
    pub fn profile(self) -> GameProfile {
        match self {
            GameKind::Game2048 => GameProfile {
                terminal_markers: &["SCORE"],
                default_slots: 16,
                base_port: None,
                score_selection: ScoreSelection::FirstPlayer,
            },
            GameKind::Mario => GameProfile {
                terminal_markers: &["passed_distance"],
                default_slots: 16,
                base_port: None,
                score_selection: ScoreSelection::FirstPlayer,
            },
            GameKind::Torcs => GameProfile {
                terminal_markers: &["RACED DISTANCE"],
                default_slots: 10,
                base_port: Some(3001),
                score_selection: ScoreSelection::FirstPlayer,
            },
            GameKind::Alhambra => GameProfile {
                terminal_markers: &[],
                default_slots: 16,
                base_port: None,
                score_selection: ScoreSelection::FirstPlayer,
            },
        }
    }
}

/// Built-in defaults of a [`GameKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameProfile {
    /// Plain-text terminal markers printed by the engine.
    pub terminal_markers: &'static [&'static str],
    /// Number of engines that may run at once.
    pub default_slots: usize,
    /// First port of the engine's port range, for engines that bind one.
    pub base_port: Option<u16>,
    pub score_selection: ScoreSelection,
}

/// How the per-player score vector of an episode becomes a scalar fitness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScoreSelection {
    /// The agent's own score (the first entry).
    #[default]
    FirstPlayer,
    /// Arithmetic mean over all players.
    MeanOfPlayers,
}

impl ScoreSelection {
    /// Reduces per-player scores to one number; `None` if there are no scores.
    #[must_use]
    pub fn select(self, scores: &[f64]) -> Option<f64> {
        match self {
            ScoreSelection::FirstPlayer => scores.first().copied(),
            ScoreSelection::MeanOfPlayers => {
                #[expect(clippy::cast_precision_loss)]
                let n = scores.len() as f64;
                (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / n)
            }
        }
    }
}

/// Per-phase input and output sizes of a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameIo {
    pub game_phases: usize,
    pub input_sizes: Vec<usize>,
    pub output_sizes: Vec<usize>,
}

impl GameIo {
    /// Single-phase schema.
    #[must_use]
    pub fn single(input_size: usize, output_size: usize) -> Self {
        Self {
            game_phases: 1,
            input_sizes: vec![input_size],
            output_sizes: vec![output_size],
        }
    }

    pub fn validate(&self) -> Result<(), GameConfigError> {
        if self.game_phases == 0 {
            return Err(GameConfigError::NoPhases);
        }
        if self.input_sizes.len() != self.game_phases
            || self.output_sizes.len() != self.game_phases
        {
            return Err(GameConfigError::PhaseCount {
                phases: self.game_phases,
                inputs: self.input_sizes.len(),
                outputs: self.output_sizes.len(),
            });
        }
        if let Some(phase) = (0..self.game_phases)
            .find(|&p| self.input_sizes[p] == 0 || self.output_sizes[p] == 0)
        {
            return Err(GameConfigError::EmptyPhase { phase });
        }
        Ok(())
    }

    #[must_use]
    pub fn phases(&self) -> usize {
        self.game_phases
    }

    #[must_use]
    pub fn input_size(&self, phase: usize) -> Option<usize> {
        self.input_sizes.get(phase).copied()
    }

    #[must_use]
    pub fn output_size(&self, phase: usize) -> Option<usize> {
        self.output_sizes.get(phase).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum TemplateError {
    #[display("engine command references {{port}} but the game has no base port")]
    MissingPort,
    #[display("engine command references {{model}} but no model file was provided")]
    MissingModel,
    #[display("port {base} + slot {slot} exceeds the port range")]
    PortOverflow { base: u16, slot: usize },
}

/// Per-episode values substituted into a [`CommandTemplate`].
#[derive(Debug, Clone, Copy)]
pub struct InvocationContext<'a> {
    pub slot: usize,
    pub port: Option<u16>,
    pub seed: u64,
    pub model_path: Option<&'a Path>,
}

/// Engine command line with `{slot}`, `{port}`, `{seed}` and `{model}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_dir: Option<PathBuf>,
}

impl CommandTemplate {
    fn parts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Returns `true` if the engine needs a model file.
    #[must_use]
    pub fn references_model(&self) -> bool {
        self.parts().any(|part| part.contains("{model}"))
    }

    #[must_use]
    pub fn references_port(&self) -> bool {
        self.parts().any(|part| part.contains("{port}"))
    }

    /// Returns `true` if concurrent engines get distinct command lines.
    #[must_use]
    pub fn references_slot_or_port(&self) -> bool {
        self.references_port() || self.parts().any(|part| part.contains("{slot}"))
    }

    /// Substitutes the placeholders.
    ///
    /// # Examples
    ///
    /// ```
    /// use evoplay_engine::game::{CommandTemplate, InvocationContext};
    ///
    /// let template = CommandTemplate {
    ///     program: "./race.sh".to_owned(),
    ///     args: vec!["{port}".to_owned(), "race_config_{port}.xml".to_owned()],
    ///     current_dir: None,
    /// };
    /// let ctx = InvocationContext { slot: 2, port: Some(3003), seed: 7, model_path: None };
    /// let command = template.resolve(&ctx).unwrap();
    /// assert_eq!(command.args, ["3003", "race_config_3003.xml"]);
    /// ```
    pub fn resolve(&self, ctx: &InvocationContext<'_>) -> Result<EngineCommand, TemplateError> {
        let port = match ctx.port {
            Some(port) => Some(port.to_string()),
            None if self.references_port() => return Err(TemplateError::MissingPort),
            None => None,
        };
        let model = match ctx.model_path {
            Some(path) => Some(path.display().to_string()),
            None if self.references_model() => return Err(TemplateError::MissingModel),
            None => None,
        };
        let slot = ctx.slot.to_string();
        let seed = ctx.seed.to_string();

        let substitute = |part: &str| {
            let mut part = part.replace("{slot}", &slot).replace("{seed}", &seed);
            if let Some(port) = &port {
                part = part.replace("{port}", port);
            }
            if let Some(model) = &model {
                part = part.replace("{model}", model);
            }
            part
        };

        Ok(EngineCommand {
            program: substitute(&self.program),
            args: self.args.iter().map(|arg| substitute(arg)).collect(),
            current_dir: self.current_dir.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum GameConfigError {
    #[display("game must have at least one phase")]
    NoPhases,
    #[display(
        "game has {phases} phase(s) but {inputs} input size(s) and {outputs} output size(s)"
    )]
    PhaseCount {
        phases: usize,
        inputs: usize,
        outputs: usize,
    },
    #[display("phase {phase} has an empty input or output")]
    EmptyPhase { phase: usize },
    #[display("game needs at least one engine slot")]
    NoSlots,
    #[display("episode timeout must be positive")]
    ZeroTimeout,
    #[display("max_episode_attempts must be at least 1")]
    NoAttempts,
    #[display("{slots} slot(s) starting at port {base} exceed the port range")]
    PortRange { base: u16, slots: usize },
    #[display(
        "engine command must reference {{slot}} or {{port}} ({slots} slot(s), port {base_port:?})"
    )]
    IndistinctCommand {
        slots: usize,
        base_port: Option<u16>,
    },
}

const fn default_episode_timeout_secs() -> f64 {
    600.0
}

const fn default_max_episode_attempts() -> usize {
    3
}

/// Game section of a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub kind: GameKind,
    pub io: GameIo,
    pub command: CommandTemplate,
    /// Overrides the profile's slot count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<usize>,
    /// Overrides the profile's base port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_port: Option<u16>,
    /// Overrides the profile's terminal markers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal_markers: Option<Vec<String>>,
    /// Overrides the profile's score selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_selection: Option<ScoreSelection>,
    #[serde(default = "default_episode_timeout_secs")]
    pub episode_timeout_secs: f64,
    #[serde(default = "default_max_episode_attempts")]
    pub max_episode_attempts: usize,
}

impl GameConfig {
    /// Creates a configuration using every default of `kind`.
    #[must_use]
    pub fn new(kind: GameKind, io: GameIo, command: CommandTemplate) -> Self {
        Self {
            kind,
            io,
            command,
            slots: None,
            base_port: None,
            terminal_markers: None,
            score_selection: None,
            episode_timeout_secs: default_episode_timeout_secs(),
            max_episode_attempts: default_max_episode_attempts(),
        }
    }

    /// Applies the game profile and validates the result.
    pub fn resolve(&self) -> Result<GameSpec, GameConfigError> {
        self.io.validate()?;
        let profile = self.kind.profile();

        let slots = self.slots.unwrap_or(profile.default_slots);
        if slots == 0 {
            return Err(GameConfigError::NoSlots);
        }
        let base_port = self.base_port.or(profile.base_port);
        if let Some(base) = base_port {
            let last = u16::try_from(slots - 1)
                .ok()
                .and_then(|offset| base.checked_add(offset));
            if last.is_none() {
                return Err(GameConfigError::PortRange { base, slots });
            }
        }
        if self.max_episode_attempts == 0 {
            return Err(GameConfigError::NoAttempts);
        }
        let episode_timeout = Duration::try_from_secs_f64(self.episode_timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or(GameConfigError::ZeroTimeout)?;
        if (base_port.is_some() || slots > 1) && !self.command.references_slot_or_port() {
            return Err(GameConfigError::IndistinctCommand { slots, base_port });
        }

        let terminal_markers = self.terminal_markers.clone().unwrap_or_else(|| {
            profile
                .terminal_markers
                .iter()
                .map(|&marker| marker.to_owned())
                .collect()
        });

        Ok(GameSpec {
            kind: self.kind,
            io: self.io.clone(),
            command: self.command.clone(),
            terminal_markers,
            slots,
            base_port,
            score_selection: self.score_selection.unwrap_or(profile.score_selection),
            episode_timeout,
            max_episode_attempts: self.max_episode_attempts,
        })
    }
}

/// A fully resolved game: everything needed to launch and score its engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSpec {
    pub kind: GameKind,
    pub io: GameIo,
    pub command: CommandTemplate,
    pub terminal_markers: Vec<String>,
    pub slots: usize,
    pub base_port: Option<u16>,
    pub score_selection: ScoreSelection,
    pub episode_timeout: Duration,
    pub max_episode_attempts: usize,
}

impl GameSpec {
    #[must_use]
    pub fn decoder(&self) -> LineDecoder {
        LineDecoder::new(self.terminal_markers.iter().cloned())
    }

    /// Returns the port bound to `slot`, if the game uses ports.
    pub fn port(&self, slot: usize) -> Result<Option<u16>, TemplateError> {
        let Some(base) = self.base_port else {
            return Ok(None);
        };
        u16::try_from(slot)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .map(Some)
            .ok_or(TemplateError::PortOverflow { base, slot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(args: &[&str]) -> CommandTemplate {
        CommandTemplate {
            program: "engine".to_owned(),
            args: args.iter().map(|&a| a.to_owned()).collect(),
            current_dir: None,
        }
    }

    #[test]
    fn test_kind_serde_names() {
        for kind in GameKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(serde_json::from_str::<GameKind>(&json).unwrap(), kind);
        }
    }

    #[test]
    fn test_score_selection() {
        assert_eq!(ScoreSelection::FirstPlayer.select(&[3.0, 9.0]), Some(3.0));
        assert_eq!(ScoreSelection::MeanOfPlayers.select(&[3.0, 9.0]), Some(6.0));
        assert_eq!(ScoreSelection::FirstPlayer.select(&[]), None);
        assert_eq!(ScoreSelection::MeanOfPlayers.select(&[]), None);
    }

    #[test]
    fn test_io_validation() {
        assert!(GameIo::single(4, 2).validate().is_ok());
        let io = GameIo {
            game_phases: 2,
            input_sizes: vec![4],
            output_sizes: vec![2, 3],
        };
        assert!(matches!(
            io.validate(),
            Err(GameConfigError::PhaseCount { .. })
        ));
        assert_eq!(
            GameIo::single(0, 2).validate(),
            Err(GameConfigError::EmptyPhase { phase: 0 })
        );
    }

    #[test]
    fn test_resolve_all_placeholders() {
        let template = template(&["--slot={slot}", "{port}", "{seed}", "{model}"]);
        let model = Path::new("/tmp/model.json");
        let ctx = InvocationContext {
            slot: 4,
            port: Some(3005),
            seed: 99,
            model_path: Some(model),
        };
        let command = template.resolve(&ctx).unwrap();
        assert_eq!(command.program, "engine");
        assert_eq!(
            command.args,
            ["--slot=4", "3005", "99", "/tmp/model.json"]
        );
    }

    #[test]
    fn test_resolve_missing_values() {
        let ctx = InvocationContext {
            slot: 0,
            port: None,
            seed: 0,
            model_path: None,
        };
        assert_eq!(
            template(&["{port}"]).resolve(&ctx),
            Err(TemplateError::MissingPort)
        );
        assert_eq!(
            template(&["{model}"]).resolve(&ctx),
            Err(TemplateError::MissingModel)
        );
        assert!(template(&["{slot}"]).resolve(&ctx).is_ok());
    }

    #[test]
    fn test_profile_defaults_and_overrides() {
        let config = GameConfig::new(
            GameKind::Torcs,
            GameIo::single(29, 3),
            template(&["{port}"]),
        );
        let spec = config.resolve().unwrap();
        assert_eq!(spec.slots, 10);
        assert_eq!(spec.base_port, Some(3001));
        assert_eq!(spec.port(2).unwrap(), Some(3003));
        assert_eq!(spec.terminal_markers, ["RACED DISTANCE"]);
        assert_eq!(spec.max_episode_attempts, 3);

        let config = GameConfig {
            slots: Some(2),
            terminal_markers: Some(vec!["FINISHED".to_owned()]),
            score_selection: Some(ScoreSelection::MeanOfPlayers),
            ..GameConfig::new(GameKind::Alhambra, GameIo::single(10, 4), template(&["{slot}"]))
        };
        let spec = config.resolve().unwrap();
        assert_eq!(spec.slots, 2);
        assert_eq!(spec.base_port, None);
        assert_eq!(spec.port(1).unwrap(), None);
        assert_eq!(spec.terminal_markers, ["FINISHED"]);
        assert_eq!(spec.score_selection, ScoreSelection::MeanOfPlayers);
    }

    #[test]
    fn test_invalid_configs() {
        let base = GameConfig::new(GameKind::Mario, GameIo::single(8, 5), template(&[]));
        let config = GameConfig {
            slots: Some(0),
            ..base.clone()
        };
        assert_eq!(config.resolve(), Err(GameConfigError::NoSlots));

        let config = GameConfig {
            episode_timeout_secs: 0.0,
            ..base.clone()
        };
        assert_eq!(config.resolve(), Err(GameConfigError::ZeroTimeout));

        let config = GameConfig {
            max_episode_attempts: 0,
            ..base.clone()
        };
        assert_eq!(config.resolve(), Err(GameConfigError::NoAttempts));

        let config = GameConfig {
            base_port: Some(65_535),
            slots: Some(2),
            ..base
        };
        assert!(matches!(
            config.resolve(),
            Err(GameConfigError::PortRange { .. })
        ));
    }

    #[test]
    fn test_concurrent_engines_need_distinct_commands() {
        let base = GameConfig::new(GameKind::Mario, GameIo::single(8, 5), template(&["run"]));
        assert_eq!(
            base.resolve(),
            Err(GameConfigError::IndistinctCommand {
                slots: 16,
                base_port: None
            })
        );

        let config = GameConfig {
            slots: Some(1),
            base_port: Some(4000),
            ..base.clone()
        };
        assert_eq!(
            config.resolve(),
            Err(GameConfigError::IndistinctCommand {
                slots: 1,
                base_port: Some(4000)
            })
        );

        let single = GameConfig {
            slots: Some(1),
            ..base.clone()
        };
        assert!(single.resolve().is_ok());

        for arg in ["--slot={slot}", "config_{port}.xml"] {
            let config = GameConfig {
                command: template(&[arg]),
                base_port: Some(4000),
                ..base.clone()
            };
            assert!(config.resolve().is_ok(), "{arg}");
        }
    }

    #[test]
    fn test_game_config_from_json() {
        let json = r#"{
            "kind": "torcs",
            "io": {"game_phases": 1, "input_sizes": [29], "output_sizes": [3]},
            "command": {"program": "./torcs.sh", "args": ["{port}", "{model}"]},
            "episode_timeout_secs": 120
        }"#;
        let config: GameConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.kind, GameKind::Torcs);
        assert!(config.command.references_model());
        let spec = config.resolve().unwrap();
        assert_eq!(spec.episode_timeout, Duration::from_secs(120));
    }
}
