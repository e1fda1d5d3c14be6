use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use evoplay_engine::SlotAllocator;
use evoplay_evaluator::{FitnessEvaluator, ModelFile};

use crate::config::RunConfig;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PlayArg {
    /// Run configuration file; only its game section is used
    #[arg(long)]
    config: PathBuf,
    /// Model file to play
    #[arg(long)]
    model: PathBuf,
    /// Number of episodes
    #[arg(long, default_value_t = 1)]
    episodes: usize,
    /// Seed of the first episode
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

pub(crate) fn run(arg: &PlayArg) -> anyhow::Result<()> {
    let PlayArg {
        config: config_path,
        model,
        episodes,
        seed,
    } = arg;

    let config = RunConfig::open(config_path)?;
    let game = config
        .game
        .resolve()
        .with_context(|| format!("Invalid game section in {}", config_path.display()))?;
    let model_file = ModelFile::open(model, &game.io)
        .with_context(|| format!("Failed to load model file: {}", model.display()))?;

    let slots = Arc::new(SlotAllocator::new(game.slots)?);
    let score_selection = game.score_selection;
    let evaluator = FitnessEvaluator::new(game, model_file.model.clone(), slots, *episodes)
        .context("Failed to set up the evaluator")?;
    let report = evaluator.evaluate_scores(&model_file.weights, *seed)?;

    for (i, scores) in report.episode_scores.iter().enumerate() {
        println!("episode {i:3} (seed {}): {scores:?}", seed.wrapping_add(i as u64));
    }
    println!("mean scores: {:?}", report.scores);
    if let Some(fitness) = score_selection.select(&report.scores) {
        println!("fitness: {fitness}");
    }
    if report.retries > 0 {
        eprintln!("{} episode(s) were restarted", report.retries);
    }

    Ok(())
}
