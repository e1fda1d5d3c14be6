//! Per-generation fitness statistics.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::genetic::Population;

/// Fitness statistics of one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    /// Fitness evaluations performed for this generation.
    pub evaluations: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

impl GenerationRecord {
    /// Computes the statistics of the evaluated individuals of `population`.
    ///
    /// Returns `None` if no individual is evaluated.
    #[must_use]
    pub fn new(generation: usize, evaluations: usize, population: &Population) -> Option<Self> {
        let fitness: Vec<f64> = population
            .individuals()
            .iter()
            .filter_map(|ind| ind.fitness())
            .collect();
        if fitness.is_empty() {
            return None;
        }
        #[expect(clippy::cast_precision_loss)]
        let n = fitness.len() as f64;
        let mean = fitness.iter().sum::<f64>() / n;
        let variance = fitness.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            generation,
            evaluations,
            mean,
            min: fitness.iter().copied().fold(f64::INFINITY, f64::min),
            max: fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: variance.sqrt(),
        })
    }
}

impl fmt::Display for GenerationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gen {:>4}  evals {:>4}  mean {:>12.4}  min {:>12.4}  max {:>12.4}  std {:>10.4}",
            self.generation, self.evaluations, self.mean, self.min, self.max, self.std_dev
        )
    }
}

/// Records of every generation, in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Logbook {
    records: Vec<GenerationRecord>,
}

impl Logbook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: GenerationRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    #[must_use]
    pub fn last(&self) -> Option<&GenerationRecord> {
        self.records.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::Individual;

    fn population(fitness: &[f64]) -> Population {
        Population::new(
            fitness
                .iter()
                .map(|&f| {
                    let mut ind = Individual::new(vec![0.0]);
                    ind.set_fitness(f);
                    ind
                })
                .collect(),
        )
    }

    #[test]
    fn test_statistics() {
        let record = GenerationRecord::new(3, 4, &population(&[2.0, 4.0, 4.0, 6.0])).unwrap();
        assert_eq!(record.generation, 3);
        assert_eq!(record.evaluations, 4);
        assert!((record.mean - 4.0).abs() < 1e-12);
        assert!((record.min - 2.0).abs() < 1e-12);
        assert!((record.max - 6.0).abs() < 1e-12);
        assert!((record.std_dev - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_unevaluated_population_has_no_record() {
        let population = Population::from_genes(vec![vec![0.5]]);
        assert!(GenerationRecord::new(0, 0, &population).is_none());
    }

    #[test]
    fn test_logbook_json() {
        let mut logbook = Logbook::new();
        logbook.push(GenerationRecord::new(0, 2, &population(&[1.0, 3.0])).unwrap());
        let json = serde_json::to_value(&logbook).unwrap();
        assert_eq!(json["records"][0]["mean"], 2.0);
        let back: Logbook = serde_json::from_value(json).unwrap();
        assert_eq!(back, logbook);
    }
}
