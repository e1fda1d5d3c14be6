//! Evolutionary search over policy weights.
//!
//! This crate evolves a population of flat weight vectors so that the policies they
//! describe score well in a game. Scoring is delegated to an
//! [`EvaluateFitness`](evoplay_evaluator::EvaluateFitness) implementation; this crate
//! only knows gene vectors and fitness values.
//!
//! # How a Run Works
//!
//! 1. **Init** - random genes in `[0, 1)`, or a population loaded from a
//!    [`PopulationFile`] whose size must match `pop_size`
//! 2. **Evaluate** - every individual is scored in parallel on the [`EvaluationPool`],
//!    each with its own seed
//! 3. **Breed** - selection, uniform crossover, uniform mutation and elitism produce the
//!    next generation ([`genetic`])
//! 4. **Record** - the [`HallOfFame`] and the [`Logbook`] are updated and a
//!    [`GenerationObserver`] sees the committed generation
//! 5. **Repeat** steps 2-4 `ngen` times
//!
//! That is the genetic algorithm ([`Evolution`]). [`DifferentialEvolution`] replaces
//! step 3 with differential trial vectors and greedy per-agent replacement. [`Search`]
//! picks one of them from an [`Algorithm`].
//!
//! # Architecture
//!
//! ```text
//! Evolution / DifferentialEvolution (driver thread: population, hall of fame, logbook, RNG)
//!     ↓ jobs (genes, seed)
//! EvaluationPool (max_workers threads)
//!     ↓ calls
//! EvaluateFitness (e.g. FitnessEvaluator → game engine processes)
//!     ↓ returns
//! fitness values, applied by the driver once the whole generation succeeded
//! ```
//!
//! # Invariants
//!
//! - The population size is `pop_size` after every generation.
//! - Genes of the genetic algorithm stay in `[0, 1)`.
//! - Crossover and mutation clear the fitness of the individuals they touch.
//! - The `elite` best individuals of a generation are copied unchanged into the next one
//!   (genetic algorithm).
//! - A failed evaluation aborts the run; no partial generation is committed.

pub use self::{
    differential::*, evolution::*, genetic::*, hall_of_fame::*, logbook::*, params::*,
    pool::*, population_file::*, search::*,
};

pub mod differential;
pub mod evolution;
pub mod genes;
pub mod genetic;
pub mod hall_of_fame;
pub mod logbook;
pub mod params;
pub mod pool;
pub mod population_file;
pub mod search;
