//! Differential evolution (DE/rand/1/bin).
//!
//! Generation `0` evaluates the initial population. Each later generation builds one
//! trial vector per agent from three donors drawn uniformly with replacement from the
//! current population (see [`genes::differential_trial`]). The trials of a generation
//! are evaluated together on the [`EvaluationPool`](crate::pool::EvaluationPool), then
//! every agent whose trial is strictly fitter is replaced by it.
//!
//! Agents keep their fitness from the generation that admitted them; only trials are
//! evaluated, so every generation costs `pop_size` evaluations. Genes are not clamped to
//! `[0, 1)`.
//!
//! Failure handling, seeding and reporting are the same as for the genetic algorithm
//! (see [`evolution`](crate::evolution)).

use evoplay_evaluator::EvaluateFitness;
use rand::Rng as _;

use crate::{
    evolution::{EvolutionError, EvolutionOutcome, GenerationObserver, SearchContext},
    genes,
    genetic::{Individual, Population},
    hall_of_fame::HallOfFame,
    logbook::Logbook,
    params::DifferentialEvolutionParams,
};

/// Drives differential evolution.
#[derive(Debug)]
pub struct DifferentialEvolution<'a, E>
where
    E: ?Sized,
{
    params: DifferentialEvolutionParams,
    ctx: SearchContext<'a, E>,
}

impl<'a, E> DifferentialEvolution<'a, E>
where
    E: EvaluateFitness + ?Sized,
{
    /// Creates a driver running at most `max_workers` evaluations at once.
    pub fn new(
        params: DifferentialEvolutionParams,
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
    pub fn params(&self) -> &DifferentialEvolutionParams {
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
            let mut trials = self.trials(&population);
            let evaluations = self.ctx.evaluate(&mut trials, generation, true)?;
            population = keep_fitter(population, trials);
            hall_of_fame.update(population.individuals());
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

    /// Builds one unevaluated trial per agent, in population order.
    fn trials(&mut self, population: &Population) -> Population {
        let DifferentialEvolutionParams { cr, f, .. } = self.params;
        let agents = population.individuals();
        let rng = &mut self.ctx.rng;
        let mut trials = Vec::with_capacity(agents.len());
        for agent in agents {
            let donors = [(); 3].map(|()| agents[rng.random_range(0..agents.len())].genes());
            let genes = genes::differential_trial(agent.genes(), donors, cr, f, rng);
            trials.push(Individual::new(genes));
        }
        Population::new(trials)
    }
}

/// Replaces each agent by its trial if the trial is strictly fitter.
fn keep_fitter(agents: Population, trials: Population) -> Population {
    Population::new(
        agents
            .into_individuals()
            .into_iter()
            .zip(trials.into_individuals())
            .map(|(agent, trial)| {
                if trial.is_fitter_than(&agent) {
                    trial
                } else {
                    agent
                }
            })
            .collect(),
    )
}
