//! Scoring gene vectors by playing the target game.
//!
//! [`EvaluateFitness`] is the seam between the search and the game: the evolutionary
//! driver only knows how many genes an individual has and how to turn `(genes, seed)`
//! into a fitness. [`FitnessEvaluator`] implements it on top of real engine processes.
//!
//! # Evaluation
//!
//! For one call, [`FitnessEvaluator`]:
//!
//! 1. builds a fresh [`PhasedPolicy`](crate::network::PhasedPolicy) from the genes
//! 2. writes a temporary model file if the engine command references `{model}`
//! 3. plays `batch_size` episodes seeded `seed, seed + 1, ...`, one engine per episode
//! 4. averages the per-player scores and reduces them with the game's
//!    [`ScoreSelection`](evoplay_engine::ScoreSelection)
//!
//! A fitness that is not a finite number is an error, never a ranking value.
//!
//! The temporary model file is deleted once the batch is over.
//!
//! Evaluators are shared by all worker threads. The only shared mutable state is the
//! [`SlotAllocator`], which is internally synchronized.

use std::{
    io::{self, BufWriter, Write as _},
    sync::Arc,
};

use evoplay_engine::{
    GameSession, GameSpec, ProcessLauncher, SessionError, SessionOptions, SessionReport,
    SlotAllocator,
};
use log::debug;
use tempfile::NamedTempFile;

use crate::{
    model::{ModelError, ModelSpec},
    model_file::ModelFile,
};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum EvaluationError {
    #[display("{_0}")]
    #[from]
    Model(ModelError),
    #[display("{_0}")]
    #[from]
    Session(SessionError),
    #[display("failed to write temporary model file: {source}")]
    ModelFile { source: io::Error },
    #[display("episodes reported no score for the agent")]
    NoScore,
    #[display("batch size must be at least 1")]
    EmptyBatch,
    #[display("episodes produced a non-finite fitness ({value})")]
    NonFiniteFitness { value: f64 },
}

/// Turns a gene vector into a fitness value.
///
/// Implementations must be pure functions of `(genes, seed)` up to the noise of the game
/// itself, and must not mutate shared state other than through internal
/// synchronization: evaluations of one generation run concurrently.
pub trait EvaluateFitness: Sync {
    /// Length of the gene vectors this evaluator accepts.
    fn parameter_count(&self) -> usize;

    /// Episodes averaged by one evaluation.
    fn batch_size(&self) -> usize;

    fn evaluate(&self, genes: &[f64], seed: u64) -> Result<f64, EvaluationError>;
}

/// Evaluates gene vectors against external game engines.
#[derive(Debug, Clone)]
pub struct FitnessEvaluator {
    game: GameSpec,
    model: ModelSpec,
    slots: Arc<SlotAllocator>,
    batch_size: usize,
    parameter_count: usize,
}

impl FitnessEvaluator {
    pub fn new(
        game: GameSpec,
        model: ModelSpec,
        slots: Arc<SlotAllocator>,
        batch_size: usize,
    ) -> Result<Self, EvaluationError> {
        if batch_size == 0 {
            return Err(EvaluationError::EmptyBatch);
        }
        let parameter_count = model.parameter_count(&game.io)?;
        Ok(Self {
            game,
            model,
            slots,
            batch_size,
            parameter_count,
        })
    }

    #[must_use]
    pub fn game(&self) -> &GameSpec {
        &self.game
    }

    #[must_use]
    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Plays a batch and returns the per-player scores (advanced results).
    pub fn evaluate_scores(
        &self,
        genes: &[f64],
        seed: u64,
    ) -> Result<SessionReport, EvaluationError> {
        let mut policy = self.model.build(genes, &self.game.io)?;
        let model_file = if self.game.command.references_model() {
            Some(self.write_model_file(genes)?)
        } else {
            None
        };

        let mut launcher = ProcessLauncher::new(&self.game);
        if let Some(file) = &model_file {
            launcher = launcher.with_model_path(file.path());
        }
        let options = SessionOptions::for_game(&self.game, self.batch_size);
        let session = GameSession::new(launcher, &self.slots, options);
        let report = session.play(&mut policy, seed)?;
        debug!(
            "seed {seed}: scores {:?} ({} retries)",
            report.scores, report.retries
        );
        Ok(report)
    }

    fn write_model_file(&self, genes: &[f64]) -> Result<NamedTempFile, EvaluationError> {
        let model_error = |source| EvaluationError::ModelFile { source };
        let mut file = tempfile::Builder::new()
            .prefix("evoplay-model-")
            .suffix(".json")
            .tempfile()
            .map_err(model_error)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            ModelFile::new(self.model.clone(), genes.to_vec())
                .write_to(&mut writer)
                .map_err(|e| model_error(e.into()))?;
            writer.flush().map_err(model_error)?;
        }
        Ok(file)
    }
}

impl EvaluateFitness for FitnessEvaluator {
    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn evaluate(&self, genes: &[f64], seed: u64) -> Result<f64, EvaluationError> {
        let report = self.evaluate_scores(genes, seed)?;
        let fitness = self
            .game
            .score_selection
            .select(&report.scores)
            .ok_or(EvaluationError::NoScore)?;
        if !fitness.is_finite() {
            return Err(EvaluationError::NonFiniteFitness { value: fitness });
        }
        Ok(fitness)
    }
}
