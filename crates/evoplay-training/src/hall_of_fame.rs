//! Best individuals seen over a whole run.
//!
//! The hall of fame is independent of the current population: an individual enters when
//! there is room or when it is strictly better than the worst entry, and stays until
//! something strictly better pushes it out. Entries are kept sorted by fitness, best
//! first; among equal fitness the earlier entry ranks first. Individuals whose genes
//! are identical to an entry's are not admitted twice. A NaN fitness is never admitted.

use crate::genetic::{Individual, cmp_fitness};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HallOfFame {
    capacity: usize,
    entries: Vec<Individual>,
}

impl HallOfFame {
    /// Creates a hall of fame holding at most `capacity` individuals. A capacity of `0`
    /// keeps nothing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    #[must_use]
    pub fn entries(&self) -> &[Individual] {
        &self.entries
    }

    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.entries.first()
    }

    /// Offers evaluated individuals, in order. Unevaluated ones are ignored.
    pub fn update<'a, I>(&mut self, individuals: I)
    where
        I: IntoIterator<Item = &'a Individual>,
    {
        if self.capacity == 0 {
            return;
        }
        for ind in individuals {
            let Some(fitness) = ind.fitness().filter(|f| !f.is_nan()) else {
                continue;
            };
            let full = self.entries.len() >= self.capacity;
            if full && !self.beats_worst(fitness) {
                continue;
            }
            if self.entries.iter().any(|e| e.genes() == ind.genes()) {
                continue;
            }
            if full {
                self.entries.pop();
            }
            // After every entry with fitness >= the newcomer.
            let pos = self
                .entries
                .partition_point(|e| e.fitness().is_some_and(|f| cmp_fitness(f, fitness).is_ge()));
            self.entries.insert(pos, ind.clone());
        }
    }

    fn beats_worst(&self, fitness: f64) -> bool {
        self.entries
            .last()
            .and_then(Individual::fitness)
            .is_none_or(|worst| cmp_fitness(fitness, worst).is_gt())
    }
}
