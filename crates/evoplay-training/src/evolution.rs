//! The generational loop of the genetic algorithm.
//!
//! [`Evolution::run`] evaluates the initial population (generation `0`), then performs
//! `ngen` generation steps. Each step breeds offspring from the current population (see
//! [`genetic::breed`]), evaluates them through the [`EvaluationPool`], updates the hall of
//! fame, replaces the population and records the fitness statistics.
//!
//! The evaluation, validation and reporting steps are shared with
//! [`DifferentialEvolution`](crate::differential::DifferentialEvolution).
//!
//! # Consistency
//!
//! A generation is committed only when every evaluation of that generation succeeded.
//! The first failure (in population order) aborts the run with
//! [`EvolutionError::Evaluation`], naming the generation and the individual; nothing is
//! scored as zero.
//!
//! The population and the hall of fame are only touched by the thread running the loop.
//! Workers compute fitness values and return them; results are applied afterwards.
//!
//! # Randomness
//!
//! All randomness of the driver (selection, variation, per-evaluation seeds) comes from
//! one PCG stream seeded with the run seed. Each evaluation receives its own seed drawn
//! from that stream, so a run is reproducible given the seed and a deterministic game.

use std::io;

use evoplay_evaluator::{EvaluateFitness, EvaluationError};
use log::{debug, info};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg64;
use rayon::ThreadPoolBuildError;

use crate::{
    genetic::{self, Population},
    hall_of_fame::HallOfFame,
    logbook::{GenerationRecord, Logbook},
    params::{EvolutionParams, ParamsError},
    pool::EvaluationPool,
};

/// Evaluation seeds are drawn from `0..EVALUATION_SEED_RANGE`; engines commonly take
/// 16-bit seeds.
pub const EVALUATION_SEED_RANGE: u64 = 1 << 16;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum EvolutionError {
    #[display("invalid evolution parameters: {_0}")]
    #[from]
    Params(ParamsError),
    #[display("failed to start evaluation workers: {source}")]
    Pool { source: ThreadPoolBuildError },
    #[display("evaluator plays {found} episode(s) per evaluation, parameters ask for {expected}")]
    BatchSize { expected: usize, found: usize },
    #[display("population has {found} individual(s), expected {expected}")]
    PopulationSize { expected: usize, found: usize },
    #[display("individual {index} has {found} gene(s), the policy needs {expected}")]
    GeneLength {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[display("generation {generation}: evaluation of individual {index} failed: {source}")]
    Evaluation {
        generation: usize,
        index: usize,
        source: EvaluationError,
    },
    #[display("generation {generation}: individual {index} has no fitness")]
    Unevaluated { generation: usize, index: usize },
    #[display("generation {generation}: observer failed: {source}")]
    Observer { generation: usize, source: io::Error },
}

/// State of the run after a generation was committed.
#[derive(Debug)]
pub struct GenerationProgress<'a> {
    pub record: &'a GenerationRecord,
    /// Current population, sorted by fitness, best first.
    pub population: &'a Population,
    pub hall_of_fame: &'a HallOfFame,
    pub logbook: &'a Logbook,
    /// `true` for the last generation of the run.
    pub is_final: bool,
}

/// Receives every committed generation, for reporting and checkpointing.
pub trait GenerationObserver {
    fn on_generation(&mut self, progress: &GenerationProgress<'_>) -> io::Result<()>;
}

impl GenerationObserver for () {
    fn on_generation(&mut self, _progress: &GenerationProgress<'_>) -> io::Result<()> {
        Ok(())
    }
}

/// Final state of a run.
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    /// Last population, sorted by fitness, best first.
    pub population: Population,
    pub hall_of_fame: HallOfFame,
    pub logbook: Logbook,
}

/// Evaluation, bookkeeping and reporting shared by the search drivers.
#[derive(Debug)]
pub(crate) struct SearchContext<'a, E>
where
    E: ?Sized,
{
    evaluator: &'a E,
    pool: EvaluationPool,
    pub(crate) rng: Pcg64,
    seed: u64,
    ngen: usize,
}

impl<'a, E> SearchContext<'a, E>
where
    E: EvaluateFitness + ?Sized,
{
    pub(crate) fn new(
        evaluator: &'a E,
        batch_size: usize,
        ngen: usize,
        max_workers: usize,
        seed: Option<u64>,
    ) -> Result<Self, EvolutionError> {
        if evaluator.batch_size() != batch_size {
            return Err(EvolutionError::BatchSize {
                expected: batch_size,
                found: evaluator.batch_size(),
            });
        }
        let pool =
            EvaluationPool::new(max_workers).map_err(|source| EvolutionError::Pool { source })?;
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        info!("evolution seed: {seed}");
        Ok(Self {
            evaluator,
            pool,
            rng: Pcg64::seed_from_u64(seed),
            seed,
            ngen,
        })
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn random_population(&mut self, pop_size: usize) -> Population {
        Population::random(&mut self.rng, pop_size, self.evaluator.parameter_count())
    }

    pub(crate) fn check_population(
        &self,
        population: &Population,
        pop_size: usize,
    ) -> Result<(), EvolutionError> {
        if population.len() != pop_size {
            return Err(EvolutionError::PopulationSize {
                expected: pop_size,
                found: population.len(),
            });
        }
        let expected = self.evaluator.parameter_count();
        if let Some((index, ind)) = population
            .individuals()
            .iter()
            .enumerate()
            .find(|(_, ind)| ind.genes().len() != expected)
        {
            return Err(EvolutionError::GeneLength {
                index,
                expected,
                found: ind.genes().len(),
            });
        }
        Ok(())
    }

    /// Evaluates the individuals needing it (all of them if `all`), returning the number
    /// of evaluations. Fitness values are applied only if every evaluation succeeded.
    pub(crate) fn evaluate(
        &mut self,
        population: &mut Population,
        generation: usize,
        all: bool,
    ) -> Result<usize, EvolutionError> {
        let jobs: Vec<(usize, u64)> = population
            .individuals()
            .iter()
            .enumerate()
            .filter(|(_, ind)| all || !ind.is_evaluated())
            .map(|(index, _)| (index, self.rng.random_range(0..EVALUATION_SEED_RANGE)))
            .collect();
        debug!(
            "generation {generation}: evaluating {} individual(s) on {} worker(s)",
            jobs.len(),
            self.pool.max_workers()
        );

        let evaluator = self.evaluator;
        let individuals = population.individuals();
        let results = self.pool.map(&jobs, |&(index, seed)| {
            evaluator.evaluate(individuals[index].genes(), seed)
        });

        let mut fitness = Vec::with_capacity(jobs.len());
        for (&(index, _), result) in jobs.iter().zip(results) {
            let value = result.map_err(|source| EvolutionError::Evaluation {
                generation,
                index,
                source,
            })?;
            fitness.push(value);
        }

        let individuals = population.individuals_mut();
        for (&(index, _), value) in jobs.iter().zip(fitness) {
            individuals[index].set_fitness(value);
        }
        Ok(jobs.len())
    }

    /// Records a fully evaluated generation and hands it to the observer.
    pub(crate) fn commit<O>(
        &self,
        generation: usize,
        evaluations: usize,
        population: &Population,
        hall_of_fame: &HallOfFame,
        logbook: &mut Logbook,
        observer: &mut O,
    ) -> Result<(), EvolutionError>
    where
        O: GenerationObserver + ?Sized,
    {
        let unevaluated = |index| EvolutionError::Unevaluated { generation, index };
        if let Some(index) = population.first_unevaluated() {
            return Err(unevaluated(index));
        }
        let record = GenerationRecord::new(generation, evaluations, population)
            .ok_or_else(|| unevaluated(0))?;
        info!("{record}");
        logbook.push(record.clone());

        let progress = GenerationProgress {
            record: &record,
            population,
            hall_of_fame,
            logbook: &*logbook,
            is_final: generation == self.ngen,
        };
        observer
            .on_generation(&progress)
            .map_err(|source| EvolutionError::Observer { generation, source })
    }
}

/// Drives the genetic algorithm.
#[derive(Debug)]
pub struct Evolution<'a, E>
where
    E: ?Sized,
{
    params: EvolutionParams,
    ctx: SearchContext<'a, E>,
}

impl<'a, E> Evolution<'a, E>
where
    E: EvaluateFitness + ?Sized,
{
    /// Creates a driver running at most `max_workers` evaluations at once.
    ///
    /// Without a `seed`, one is drawn from the OS and logged so the run can be replayed.
    pub fn new(
        params: EvolutionParams,
        evaluator: &'a E,
        max_workers: usize,
        seed: Option<u64>,
    ) -> Result<Self, EvolutionError> {
        params.validate()?;
        let ctx = SearchContext::new(
            evaluator,
            params.batch_size,
            params.ngen,
            max_workers,
            seed,
        )?;
        Ok(Self { params, ctx })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.ctx.seed()
    }

    #[must_use]
    pub fn params(&self) -> &EvolutionParams {
        &self.params
    }

    /// Creates `pop_size` individuals with random genes in `[0, 1)`.
    pub fn random_population(&mut self) -> Population {
        self.ctx.random_population(self.params.pop_size)
    }

    /// Runs generation `0` and `ngen` generation steps starting from `initial`.
    pub fn run<O>(
        &mut self,
        initial: Population,
        observer: &mut O,
    ) -> Result<EvolutionOutcome, EvolutionError>
    where
        O: GenerationObserver + ?Sized,
    {
        self.ctx.check_population(&initial, self.params.pop_size)?;

        let mut population = initial;
        let mut hall_of_fame = HallOfFame::new(self.params.hof_size);
        let mut logbook = Logbook::new();

        let evaluations = self.ctx.evaluate(&mut population, 0, true)?;
        hall_of_fame.update(population.individuals());
        population.sort_by_fitness();
        self.ctx.commit(
            0,
            evaluations,
            &population,
            &hall_of_fame,
            &mut logbook,
            observer,
        )?;

        for generation in 1..=self.params.ngen {
            let mut offspring = genetic::breed(&population, &self.params, &mut self.ctx.rng);
            let all = self.params.reevaluate_all;
            let evaluations = self.ctx.evaluate(&mut offspring, generation, all)?;
            hall_of_fame.update(offspring.individuals());
            population = offspring;
            population.sort_by_fitness();
            self.ctx.commit(
                generation,
                evaluations,
                &population,
                &hall_of_fame,
                &mut logbook,
                observer,
            )?;
        }

        Ok(EvolutionOutcome {
            population,
            hall_of_fame,
            logbook,
        })
    }
}
