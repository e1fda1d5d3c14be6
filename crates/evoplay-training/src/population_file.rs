//! Saved populations.
//!
//! A saved population is `{"population": [[gene, ...], ...]}`. Loading only accepts a
//! file holding exactly the configured number of individuals; a mismatch is a
//! configuration error, not something to pad or truncate.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write as _},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::genetic::Population;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationFile {
    pub population: Vec<Vec<f64>>,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PopulationFileError {
    #[display("failed to access population file {path}: {source}")]
    Io { path: String, source: io::Error },
    #[display("malformed population file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[display("population file {path} holds {found} individual(s), expected {expected}")]
    SizeMismatch {
        path: String,
        expected: usize,
        found: usize,
    },
}

impl PopulationFile {
    #[must_use]
    pub fn from_population(population: &Population) -> Self {
        Self {
            population: population.genes(),
        }
    }

    pub fn save<P>(&self, path: P) -> Result<(), PopulationFileError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let io_error = |source| PopulationFileError::Io {
            path: path.display().to_string(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        serde_json::to_writer(&mut writer, self).map_err(|source| PopulationFileError::Json {
            path: path.display().to_string(),
            source,
        })?;
        writer.flush().map_err(io_error)
    }

    pub fn open<P>(path: P) -> Result<Self, PopulationFileError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PopulationFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| PopulationFileError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads a population of exactly `pop_size` unevaluated individuals.
    pub fn load<P>(path: P, pop_size: usize) -> Result<Population, PopulationFileError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = Self::open(path)?;
        if file.population.len() != pop_size {
            return Err(PopulationFileError::SizeMismatch {
                path: path.display().to_string(),
                expected: pop_size,
                found: file.population.len(),
            });
        }
        Ok(Population::from_genes(file.population))
    }
}
