//! Runs the search algorithm named by an [`Algorithm`].

use evoplay_evaluator::EvaluateFitness;

use crate::{
    differential::DifferentialEvolution,
    evolution::{Evolution, EvolutionError, EvolutionOutcome, GenerationObserver},
    genetic::Population,
    params::Algorithm,
};

/// A search driver chosen at run time.
#[derive(Debug)]
pub enum Search<'a, E>
where
    E: ?Sized,
{
    Genetic(Evolution<'a, E>),
    DifferentialEvolution(DifferentialEvolution<'a, E>),
}

impl<'a, E> Search<'a, E>
where
    E: EvaluateFitness + ?Sized,
{
    pub fn new(
        algorithm: Algorithm,
        evaluator: &'a E,
        max_workers: usize,
        seed: Option<u64>,
    ) -> Result<Self, EvolutionError> {
        Ok(match algorithm {
            Algorithm::Genetic(params) => {
                Search::Genetic(Evolution::new(params, evaluator, max_workers, seed)?)
            }
            Algorithm::DifferentialEvolution(params) => Search::DifferentialEvolution(
                DifferentialEvolution::new(params, evaluator, max_workers, seed)?,
            ),
        })
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        match self {
            Search::Genetic(driver) => driver.seed(),
            Search::DifferentialEvolution(driver) => driver.seed(),
        }
    }

    #[must_use]
    pub fn pop_size(&self) -> usize {
        match self {
            Search::Genetic(driver) => driver.params().pop_size,
            Search::DifferentialEvolution(driver) => driver.params().pop_size,
        }
    }

    pub fn random_population(&mut self) -> Population {
        match self {
            Search::Genetic(driver) => driver.random_population(),
            Search::DifferentialEvolution(driver) => driver.random_population(),
        }
    }

    pub fn run<O>(
        &mut self,
        initial: Population,
        observer: &mut O,
    ) -> Result<EvolutionOutcome, EvolutionError>
    where
        O: GenerationObserver + ?Sized,
    {
        match self {
            Search::Genetic(driver) => driver.run(initial, observer),
            Search::DifferentialEvolution(driver) => driver.run(initial, observer),
        }
    }
}
