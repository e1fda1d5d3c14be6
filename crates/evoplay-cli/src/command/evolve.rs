use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use evoplay_engine::SlotAllocator;
use evoplay_evaluator::{EvaluateFitness as _, FitnessEvaluator};
use evoplay_training::{Individual, PopulationFile, Search};
use log::info;

use crate::{checkpoint::CheckpointWriter, config::RunConfig};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct EvolveArg {
    /// Run configuration file
    #[arg(long)]
    config: PathBuf,
    /// Initial population file; a random population is used if omitted
    #[arg(long)]
    population: Option<PathBuf>,
    /// Directory in which the checkpoint directory is created
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Overrides the seed of the configuration
    #[arg(long)]
    seed: Option<u64>,
    /// Overrides the worker count of the configuration
    #[arg(long)]
    max_workers: Option<usize>,
}

pub(crate) fn run(arg: &EvolveArg) -> anyhow::Result<()> {
    let EvolveArg {
        config: config_path,
        population,
        output_dir,
        seed,
        max_workers,
    } = arg;

    let mut config = RunConfig::open(config_path)?;
    if let Some(seed) = seed {
        config.seed = Some(*seed);
    }
    if let Some(max_workers) = max_workers {
        config.max_workers = *max_workers;
    }

    let game = config
        .game
        .resolve()
        .with_context(|| format!("Invalid game section in {}", config_path.display()))?;
    info!(
        "game {}: {} slot(s), {} worker(s)",
        game.kind, game.slots, config.max_workers
    );
    let slots = Arc::new(SlotAllocator::new(game.slots)?);
    let evaluator = FitnessEvaluator::new(
        game,
        config.model.clone(),
        slots,
        config.algorithm.batch_size(),
    )
    .context("Failed to set up the fitness evaluator")?;
    info!(
        "model {}: {} parameter(s)",
        config.model.name(),
        evaluator.parameter_count()
    );

    let mut search = Search::new(
        config.algorithm.clone(),
        &evaluator,
        config.max_workers,
        config.seed,
    )?;
    config.seed = Some(search.seed());

    let initial = match population {
        Some(path) => PopulationFile::load(path, search.pop_size())?,
        None => search.random_population(),
    };

    let mut checkpoint = CheckpointWriter::create(output_dir, &config)?;
    let outcome = search.run(initial, &mut checkpoint)?;

    let best = outcome
        .hall_of_fame
        .best()
        .or_else(|| outcome.population.best());
    if let Some(best) = best.and_then(Individual::fitness) {
        eprintln!("Best fitness: {best:.4}");
    }
    eprintln!("Generations: {}", outcome.logbook.records().len());
    eprintln!("Checkpoint: {}", checkpoint.dir().display());

    Ok(())
}
