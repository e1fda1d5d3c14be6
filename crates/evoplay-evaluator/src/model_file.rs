//! Model files: a policy architecture together with its weights.
//!
//! ```text
//! {"model_name": "mlp", "model": {"type": "mlp", "hidden_layers": [8], "activation": "relu"}, "weights": [0.1, ...]}
//! ```
//!
//! Loading checks that the weight count matches the architecture for the target game;
//! a mismatch is reported, never padded or truncated.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use evoplay_engine::GameIo;
use serde::{Deserialize, Serialize};

use crate::{
    model::{ModelError, ModelSpec},
    network::PhasedPolicy,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub model_name: String,
    pub model: ModelSpec,
    pub weights: Vec<f64>,
}

impl ModelFile {
    #[must_use]
    pub fn new(model: ModelSpec, weights: Vec<f64>) -> Self {
        Self {
            model_name: model.name().to_owned(),
            model,
            weights,
        }
    }

    /// Checks the model name and the weight count against `io`.
    pub fn validate(&self, io: &GameIo) -> Result<(), ModelError> {
        if self.model_name != self.model.name() {
            return Err(ModelError::NameMismatch {
                expected: self.model.name().to_owned(),
                found: self.model_name.clone(),
            });
        }
        let expected = self.model.parameter_count(io)?;
        if self.weights.len() != expected {
            return Err(ModelError::WeightCount {
                expected,
                found: self.weights.len(),
            });
        }
        Ok(())
    }

    /// Reads and validates a model file.
    pub fn open<P>(path: P, io: &GameIo) -> Result<Self, ModelError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ModelError::File {
            path: path.display().to_string(),
            source,
        })?;
        let model: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| ModelError::Json {
                path: path.display().to_string(),
                source,
            })?;
        model.validate(io)?;
        Ok(model)
    }

    pub fn save<P>(&self, path: P) -> Result<(), ModelError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file_error = |source| ModelError::File {
            path: path.display().to_string(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(file_error)?);
        self.write_to(&mut writer)
            .map_err(|source| ModelError::Json {
                path: path.display().to_string(),
                source,
            })?;
        writer.flush().map_err(file_error)
    }

    /// Writes the JSON document to `writer`.
    pub fn write_to<W>(&self, writer: W) -> Result<(), serde_json::Error>
    where
        W: Write,
    {
        serde_json::to_writer(writer, self)
    }

    pub fn policy(&self, io: &GameIo) -> Result<PhasedPolicy, ModelError> {
        self.model.build(&self.weights, io)
    }
}
