//! Search parameters.
//!
//! The search algorithm is chosen by the `type` tag of [`Algorithm`]. The genetic
//! algorithm takes [`EvolutionParams`]:
//!
//! ```text
//! {
//!   "type": "genetic",
//!   "pop_size": 50, "cxpb": 0.5, "cxindpb": 0.1,
//!   "mutation": {"pb": 0.2, "indpb": 0.05},
//!   "ngen": 100, "elite": 2, "hof_size": 5,
//!   "selection": {"type": "tournament", "size": 3},
//!   "batch_size": 3
//! }
//! ```
//!
//! Differential evolution takes [`DifferentialEvolutionParams`]:
//!
//! ```text
//! {"type": "differential-evolution", "pop_size": 10, "ngen": 350, "hof_size": 5,
//!  "cr": 0.25, "f": 1.0, "batch_size": 1}
//! ```

use serde::{Deserialize, Serialize};

/// Parent selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Selection {
    /// Best of `size` individuals drawn uniformly with replacement, once per survivor.
    Tournament { size: usize },
    /// The best individuals by fitness.
    SelectBest,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MutationParams {
    /// Probability that an individual is mutated.
    pub pb: f64,
    /// Probability that a gene of a mutated individual is replaced.
    pub indpb: f64,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionParams {
    pub pop_size: usize,
    /// Probability that an adjacent pair of survivors is recombined.
    pub cxpb: f64,
    /// Probability that a gene is swapped during recombination.
    pub cxindpb: f64,
    pub mutation: MutationParams,
    /// Number of generations after the initial evaluation.
    pub ngen: usize,
    /// Individuals copied unchanged into the next generation.
    pub elite: usize,
    /// Hall of fame capacity; `0` disables it.
    pub hof_size: usize,
    pub selection: Selection,
    /// Episodes played per fitness evaluation. The evaluator must be built with the same
    /// value; drivers reject a mismatch.
    pub batch_size: usize,
    /// Re-evaluates unchanged individuals every generation instead of keeping their
    /// fitness. Game scores are noisy, so this is the default.
    #[serde(default = "default_true")]
    pub reevaluate_all: bool,
}

/// Parameters of differential evolution (DE/rand/1/bin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifferentialEvolutionParams {
    pub pop_size: usize,
    pub ngen: usize,
    /// Hall of fame capacity; `0` disables it.
    pub hof_size: usize,
    /// Probability that a gene is taken from the mutant vector.
    pub cr: f64,
    /// Differential weight applied to `b - c`.
    pub f: f64,
    /// Episodes played per fitness evaluation.
    pub batch_size: usize,
}

impl DifferentialEvolutionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.pop_size == 0 {
            return Err(ParamsError::EmptyPopulation);
        }
        if !(0.0..=1.0).contains(&self.cr) {
            return Err(ParamsError::Probability {
                name: "cr",
                value: self.cr,
            });
        }
        if !(self.f.is_finite() && self.f >= 0.0) {
            return Err(ParamsError::DifferentialWeight { value: self.f });
        }
        if self.batch_size == 0 {
            return Err(ParamsError::EmptyBatch);
        }
        Ok(())
    }
}

/// Search algorithm and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Algorithm {
    /// Selection, crossover, mutation and elitism.
    Genetic(EvolutionParams),
    /// Greedy per-agent replacement by differential trial vectors.
    DifferentialEvolution(DifferentialEvolutionParams),
}

impl Algorithm {
    pub fn validate(&self) -> Result<(), ParamsError> {
        match self {
            Algorithm::Genetic(params) => params.validate(),
            Algorithm::DifferentialEvolution(params) => params.validate(),
        }
    }

    #[must_use]
    pub fn pop_size(&self) -> usize {
        match self {
            Algorithm::Genetic(params) => params.pop_size,
            Algorithm::DifferentialEvolution(params) => params.pop_size,
        }
    }

    #[must_use]
    pub fn ngen(&self) -> usize {
        match self {
            Algorithm::Genetic(params) => params.ngen,
            Algorithm::DifferentialEvolution(params) => params.ngen,
        }
    }

    /// Episodes per fitness evaluation. The evaluator must be built with this value.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        match self {
            Algorithm::Genetic(params) => params.batch_size,
            Algorithm::DifferentialEvolution(params) => params.batch_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ParamsError {
    #[display("population size must be at least 1")]
    EmptyPopulation,
    #[display("elite count {elite} exceeds population size {pop_size}")]
    TooManyElites { elite: usize, pop_size: usize },
    #[display("{name} must be a probability, got {value}")]
    Probability { name: &'static str, value: f64 },
    #[display("tournament size must be at least 1")]
    EmptyTournament,
    #[display("batch size must be at least 1")]
    EmptyBatch,
    #[display("differential weight must be finite and non-negative, got {value}")]
    DifferentialWeight { value: f64 },
}

impl EvolutionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.pop_size == 0 {
            return Err(ParamsError::EmptyPopulation);
        }
        if self.elite > self.pop_size {
            return Err(ParamsError::TooManyElites {
                elite: self.elite,
                pop_size: self.pop_size,
            });
        }
        for (name, value) in [
            ("cxpb", self.cxpb),
            ("cxindpb", self.cxindpb),
            ("mutation.pb", self.mutation.pb),
            ("mutation.indpb", self.mutation.indpb),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ParamsError::Probability { name, value });
            }
        }
        if self.selection == (Selection::Tournament { size: 0 }) {
            return Err(ParamsError::EmptyTournament);
        }
        if self.batch_size == 0 {
            return Err(ParamsError::EmptyBatch);
        }
        Ok(())
    }

    /// Number of individuals produced by selection and variation each generation.
    #[must_use]
    pub fn offspring_count(&self) -> usize {
        self.pop_size - self.elite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> EvolutionParams {
        EvolutionParams {
            pop_size: 10,
            cxpb: 0.5,
            cxindpb: 0.1,
            mutation: MutationParams {
                pb: 0.2,
                indpb: 0.05,
            },
            ngen: 5,
            elite: 2,
            hof_size: 3,
            selection: Selection::Tournament { size: 3 },
            batch_size: 1,
            reevaluate_all: true,
        }
    }

    #[test]
    fn test_valid_params() {
        assert_eq!(params().validate(), Ok(()));
        assert_eq!(params().offspring_count(), 8);
    }

    #[test]
    fn test_invalid_params() {
        let p = EvolutionParams {
            pop_size: 0,
            elite: 0,
            ..params()
        };
        assert_eq!(p.validate(), Err(ParamsError::EmptyPopulation));

        let p = EvolutionParams {
            elite: 11,
            ..params()
        };
        assert!(matches!(
            p.validate(),
            Err(ParamsError::TooManyElites { .. })
        ));

        let p = EvolutionParams {
            cxpb: 1.5,
            ..params()
        };
        assert!(matches!(
            p.validate(),
            Err(ParamsError::Probability { name: "cxpb", .. })
        ));

        let p = EvolutionParams {
            selection: Selection::Tournament { size: 0 },
            ..params()
        };
        assert_eq!(p.validate(), Err(ParamsError::EmptyTournament));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "pop_size": 4, "cxpb": 0.5, "cxindpb": 0.1,
            "mutation": {"pb": 0.2, "indpb": 0.05},
            "ngen": 3, "elite": 1, "hof_size": 2,
            "selection": {"type": "select-best"},
            "batch_size": 2
        }"#;
        let p: EvolutionParams = serde_json::from_str(json).unwrap();
        assert_eq!(p.selection, Selection::SelectBest);
        assert!(p.reevaluate_all);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_algorithm_from_json() {
        let json = r#"{
            "type": "differential-evolution",
            "pop_size": 10, "ngen": 350, "hof_size": 5,
            "cr": 0.25, "f": 1.0, "batch_size": 1
        }"#;
        let algorithm: Algorithm = serde_json::from_str(json).unwrap();
        let Algorithm::DifferentialEvolution(de) = &algorithm else {
            panic!("expected differential evolution");
        };
        assert_eq!(de.cr, 0.25);
        assert_eq!(algorithm.pop_size(), 10);
        assert_eq!(algorithm.ngen(), 350);
        assert_eq!(algorithm.batch_size(), 1);
        assert_eq!(algorithm.validate(), Ok(()));

        let json = r#"{
            "type": "genetic",
            "pop_size": 4, "cxpb": 0.5, "cxindpb": 0.1,
            "mutation": {"pb": 0.2, "indpb": 0.05},
            "ngen": 3, "elite": 1, "hof_size": 2,
            "selection": {"type": "tournament", "size": 2},
            "batch_size": 2
        }"#;
        let algorithm: Algorithm = serde_json::from_str(json).unwrap();
        assert!(matches!(algorithm, Algorithm::Genetic(_)));
        assert_eq!(algorithm.batch_size(), 2);
    }

    #[test]
    fn test_invalid_differential_params() {
        let params = DifferentialEvolutionParams {
            pop_size: 10,
            ngen: 5,
            hof_size: 0,
            cr: 0.5,
            f: 0.8,
            batch_size: 1,
        };
        assert_eq!(params.validate(), Ok(()));
        assert!(matches!(
            DifferentialEvolutionParams { cr: -0.1, ..params.clone() }.validate(),
            Err(ParamsError::Probability { name: "cr", .. })
        ));
        assert!(matches!(
            DifferentialEvolutionParams { f: f64::NAN, ..params.clone() }.validate(),
            Err(ParamsError::DifferentialWeight { .. })
        ));
        assert_eq!(
            DifferentialEvolutionParams { batch_size: 0, ..params }.validate(),
            Err(ParamsError::EmptyBatch)
        );
    }
}
