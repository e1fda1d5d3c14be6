//! Individuals, populations and the generational operators.
//!
//! # Breeding
//!
//! [`breed`] produces the next generation from a population sorted by fitness:
//!
//! 1. **Selection** - `pop_size - elite` survivors are cloned from the parents, either by
//!    tournament or by taking the best ones ([`Selection`])
//! 2. **Crossover** - each adjacent pair `(2i, 2i + 1)` is recombined with probability
//!    `cxpb` by uniform crossover
//! 3. **Mutation** - each survivor is mutated with probability `mutation.pb` by uniform
//!    gene replacement
//! 4. **Elitism** - unmodified clones of the `elite` best parents are appended
//!
//! An individual touched by crossover or mutation loses its fitness and must be
//! evaluated again before it can be selected. Untouched survivors and elites keep the
//! fitness they were cloned with.
//!
//! Fitness values are compared with [`cmp_fitness`]: the ordering is total, and a NaN
//! ranks below every number, so it never wins a tournament.

use std::cmp::Ordering;

use rand::Rng;

use crate::{
    genes,
    params::{EvolutionParams, Selection},
};

/// A candidate weight vector and its fitness, once evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    genes: Vec<f64>,
    fitness: Option<f64>,
}

impl Individual {
    #[must_use]
    pub fn new(genes: Vec<f64>) -> Self {
        Self {
            genes,
            fitness: None,
        }
    }

    pub fn random<R>(rng: &mut R, len: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(genes::random(rng, len))
    }

    #[must_use]
    pub fn genes(&self) -> &[f64] {
        &self.genes
    }

    /// Returns the fitness, or `None` if the individual has not been evaluated since its
    /// genes last changed.
    #[must_use]
    pub fn fitness(&self) -> Option<f64> {
        self.fitness
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = Some(fitness);
    }

    pub fn invalidate(&mut self) {
        self.fitness = None;
    }

    /// Recombines two individuals and invalidates both.
    pub fn crossover<R>(&mut self, other: &mut Self, indpb: f64, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        genes::uniform_crossover(&mut self.genes, &mut other.genes, indpb, rng);
        self.invalidate();
        other.invalidate();
    }

    /// Mutates the individual and invalidates it.
    pub fn mutate<R>(&mut self, indpb: f64, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        genes::mutate_uniform(&mut self.genes, indpb, rng);
        self.invalidate();
    }

    /// Returns `true` if `self` ranks strictly before `other`.
    pub(crate) fn is_fitter_than(&self, other: &Self) -> bool {
        self.cmp_fitness_desc(other) == Ordering::Less
    }

    /// Orders by fitness, best first. Unevaluated individuals come last.
    fn cmp_fitness_desc(&self, other: &Self) -> Ordering {
        match (self.fitness, other.fitness) {
            (Some(a), Some(b)) => cmp_fitness(b, a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Total order on fitness values where NaN is the worst value.
#[must_use]
pub fn cmp_fitness(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.total_cmp(&b),
    }
}

/// An ordered collection of individuals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    #[must_use]
    pub fn new(individuals: Vec<Individual>) -> Self {
        Self { individuals }
    }

    /// Creates `size` individuals with random genes in `[0, 1)`.
    pub fn random<R>(rng: &mut R, size: usize, gene_count: usize) -> Self
    where
        R: Rng + ?Sized,
    {
        Self::new(
            (0..size)
                .map(|_| Individual::random(rng, gene_count))
                .collect(),
        )
    }

    /// Creates unevaluated individuals from gene vectors.
    #[must_use]
    pub fn from_genes(genes: Vec<Vec<f64>>) -> Self {
        Self::new(genes.into_iter().map(Individual::new).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn individuals_mut(&mut self) -> &mut [Individual] {
        &mut self.individuals
    }

    #[must_use]
    pub fn into_individuals(self) -> Vec<Individual> {
        self.individuals
    }

    /// Returns the gene vectors, in population order.
    #[must_use]
    pub fn genes(&self) -> Vec<Vec<f64>> {
        self.individuals.iter().map(|ind| ind.genes.clone()).collect()
    }

    /// Returns the index of the first unevaluated individual.
    #[must_use]
    pub fn first_unevaluated(&self) -> Option<usize> {
        self.individuals.iter().position(|ind| !ind.is_evaluated())
    }

    /// Sorts by fitness, best first. The sort is stable: equal fitness keeps the
    /// current order.
    pub fn sort_by_fitness(&mut self) {
        self.individuals.sort_by(Individual::cmp_fitness_desc);
    }

    /// Returns the best evaluated individual.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter(|ind| ind.is_evaluated())
            .reduce(|best, ind| {
                if ind.cmp_fitness_desc(best) == Ordering::Less {
                    ind
                } else {
                    best
                }
            })
    }
}

/// Selects `count` survivors (cloned) from `parents`.
///
/// `parents` must be sorted by fitness, best first, and fully evaluated.
pub fn select<R>(
    parents: &[Individual],
    count: usize,
    selection: Selection,
    rng: &mut R,
) -> Vec<Individual>
where
    R: Rng + ?Sized,
{
    match selection {
        Selection::Tournament { size } => (0..count)
            .filter_map(|_| tournament(parents, size, rng).cloned())
            .collect(),
        Selection::SelectBest => parents.iter().cycle().take(count).cloned().collect(),
    }
}

/// Draws `size` individuals uniformly with replacement and returns the fittest.
/// Ties go to the earliest draw.
fn tournament<'a, R>(parents: &'a [Individual], size: usize, rng: &mut R) -> Option<&'a Individual>
where
    R: Rng + ?Sized,
{
    if parents.is_empty() {
        return None;
    }
    (0..size)
        .map(|_| &parents[rng.random_range(0..parents.len())])
        .reduce(|best, candidate| {
            if candidate.cmp_fitness_desc(best) == Ordering::Less {
                candidate
            } else {
                best
            }
        })
}

/// Applies crossover and mutation in place.
pub fn vary<R>(offspring: &mut [Individual], params: &EvolutionParams, rng: &mut R)
where
    R: Rng + ?Sized,
{
    for i in (1..offspring.len()).step_by(2) {
        if rng.random_bool(params.cxpb) {
            let (left, right) = offspring.split_at_mut(i);
            left[i - 1].crossover(&mut right[0], params.cxindpb, rng);
        }
    }
    for ind in offspring {
        if rng.random_bool(params.mutation.pb) {
            ind.mutate(params.mutation.indpb, rng);
        }
    }
}

/// Produces the next generation from `parents` (sorted by fitness, best first).
///
/// The result has exactly `parents.len()` individuals when `parents.len()` equals
/// `params.pop_size`; the elites are the last `params.elite` entries.
pub fn breed<R>(parents: &Population, params: &EvolutionParams, rng: &mut R) -> Population
where
    R: Rng + ?Sized,
{
    let elite = params.elite.min(parents.len());
    let mut offspring = select(
        parents.individuals(),
        parents.len() - elite,
        params.selection,
        rng,
    );
    vary(&mut offspring, params, rng);
    offspring.extend(parents.individuals()[..elite].iter().cloned());
    Population::new(offspring)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::params::MutationParams;

    fn evaluated(genes: Vec<f64>, fitness: f64) -> Individual {
        let mut ind = Individual::new(genes);
        ind.set_fitness(fitness);
        ind
    }

    fn sorted_population(n: usize) -> Population {
        // Fitness n-1, n-2, ..., 0; genes encode the original rank.
        #[expect(clippy::cast_precision_loss)]
        let individuals = (0..n)
            .map(|i| evaluated(vec![i as f64 / n as f64; 4], (n - 1 - i) as f64))
            .collect();
        Population::new(individuals)
    }

    fn params(selection: Selection) -> EvolutionParams {
        EvolutionParams {
            pop_size: 10,
            cxpb: 0.5,
            cxindpb: 0.5,
            mutation: MutationParams { pb: 0.5, indpb: 0.5 },
            ngen: 1,
            elite: 2,
            hof_size: 0,
            selection,
            batch_size: 1,
            reevaluate_all: true,
        }
    }

    #[test]
    fn test_sort_is_stable_and_puts_unevaluated_last() {
        let mut population = Population::new(vec![
            Individual::new(vec![0.0]),
            evaluated(vec![0.1], 1.0),
            evaluated(vec![0.2], 3.0),
            evaluated(vec![0.3], 1.0),
        ]);
        population.sort_by_fitness();
        let genes: Vec<f64> = population.individuals().iter().map(|i| i.genes()[0]).collect();
        assert_eq!(genes, vec![0.2, 0.1, 0.3, 0.0]);
        assert_eq!(population.first_unevaluated(), Some(3));
        assert_eq!(population.best().unwrap().fitness(), Some(3.0));
    }

    #[test]
    fn test_nan_fitness_ranks_last() {
        let mut population = Population::new(vec![
            evaluated(vec![0.1], f64::NAN),
            evaluated(vec![0.2], 100.0),
            evaluated(vec![0.3], f64::NEG_INFINITY),
        ]);
        population.sort_by_fitness();
        let genes: Vec<f64> = population.individuals().iter().map(|i| i.genes()[0]).collect();
        assert_eq!(genes, vec![0.2, 0.3, 0.1]);
        assert_eq!(population.best().unwrap().fitness(), Some(100.0));

        assert_eq!(cmp_fitness(f64::NAN, f64::NEG_INFINITY), Ordering::Less);
        assert_eq!(cmp_fitness(f64::NAN, f64::NAN), Ordering::Equal);
        let nan = evaluated(vec![0.4], f64::NAN);
        let low = evaluated(vec![0.5], -1.0);
        assert_eq!(nan.cmp_fitness_desc(&low), Ordering::Greater);
        assert_eq!(low.cmp_fitness_desc(&nan), Ordering::Less);
    }

    #[test]
    fn test_best_prefers_first_of_equals() {
        let population = Population::new(vec![
            evaluated(vec![0.1], 2.0),
            evaluated(vec![0.2], 2.0),
        ]);
        assert_eq!(population.best().unwrap().genes(), &[0.1]);
    }

    #[test]
    fn test_crossover_and_mutation_invalidate_fitness() {
        let mut rng = Pcg64::seed_from_u64(5);
        let mut a = evaluated(vec![0.1; 3], 1.0);
        let mut b = evaluated(vec![0.9; 3], 2.0);
        a.crossover(&mut b, 0.0, &mut rng);
        assert_eq!(a.fitness(), None);
        assert_eq!(b.fitness(), None);

        let mut c = evaluated(vec![0.5; 3], 1.0);
        c.mutate(0.0, &mut rng);
        assert_eq!(c.fitness(), None);
        assert_eq!(c.genes(), &[0.5; 3]);
    }

    #[test]
    fn test_select_best_takes_top() {
        let mut rng = Pcg64::seed_from_u64(6);
        let population = sorted_population(6);
        let survivors = select(population.individuals(), 3, Selection::SelectBest, &mut rng);
        let fitness: Vec<_> = survivors.iter().map(|i| i.fitness().unwrap()).collect();
        assert_eq!(fitness, vec![5.0, 4.0, 3.0]);
    }

    #[test]
    fn test_tournament_pressure() {
        let mut rng = Pcg64::seed_from_u64(7);
        let population = sorted_population(10);
        let survivors = select(
            population.individuals(),
            200,
            Selection::Tournament { size: 10 },
            &mut rng,
        );
        assert_eq!(survivors.len(), 200);
        #[expect(clippy::cast_precision_loss)]
        let mean = survivors.iter().map(|i| i.fitness().unwrap()).sum::<f64>() / 200.0;
        // Expected best of 10 draws from 0..=9 is well above the population mean of 4.5.
        assert!(mean > 6.0, "mean survivor fitness {mean}");

        let single = select(
            population.individuals(),
            50,
            Selection::Tournament { size: 1 },
            &mut rng,
        );
        assert_eq!(single.len(), 50);
    }

    #[test]
    fn test_breed_keeps_size_and_elites() {
        let mut rng = Pcg64::seed_from_u64(8);
        let parents = sorted_population(10);
        for selection in [Selection::Tournament { size: 3 }, Selection::SelectBest] {
            let params = params(selection);
            let next = breed(&parents, &params, &mut rng);
            assert_eq!(next.len(), 10);
            let elites = &next.individuals()[8..];
            assert_eq!(elites, &parents.individuals()[..2]);
            assert!(
                next.individuals()
                    .iter()
                    .flat_map(Individual::genes)
                    .all(|g| (0.0..1.0).contains(g))
            );
        }
    }

    #[test]
    fn test_untouched_survivors_keep_fitness() {
        let mut rng = Pcg64::seed_from_u64(9);
        let parents = sorted_population(6);
        let params = EvolutionParams {
            cxpb: 0.0,
            mutation: MutationParams { pb: 0.0, indpb: 1.0 },
            ..params(Selection::SelectBest)
        };
        let next = breed(&parents, &params, &mut rng);
        assert!(next.individuals().iter().all(Individual::is_evaluated));

        let params = EvolutionParams {
            cxpb: 1.0,
            ..params
        };
        let next = breed(&parents, &params, &mut rng);
        // Four survivors, all recombined; two elites untouched.
        let evaluated: Vec<_> = next.individuals().iter().map(Individual::is_evaluated).collect();
        assert_eq!(evaluated, vec![false, false, false, false, true, true]);
    }
}
