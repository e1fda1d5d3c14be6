//! Policy architectures.
//!
//! A [`ModelSpec`] describes the hidden layers of a policy. Combined with a game's
//! [`GameIo`] it determines one [`NetworkShape`] per phase, and therefore the length of
//! the gene vector: the per-phase parameter counts summed over all phases. Phase `0` owns
//! the first slice of the genes, phase `1` the next one, and so on.
//!
//! Two families exist:
//!
//! - **feed-forward**: plain matrix chain, no bias and no activation
//! - **mlp**: bias on every layer, an activation after every layer, and an output
//!   min-max normalized to `[0, 1]`
//!
//! For a single-phase game with `n` inputs, hidden layers `h1, h2` and `m` outputs, an
//! mlp has `(n + 1) * h1 + (h1 + 1) * h2 + (h2 + 1) * m` parameters.

use evoplay_engine::{GameConfigError, GameIo};
use serde::{Deserialize, Serialize};

use crate::network::{Network, NetworkShape, PhasedPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Relu,
    Tanh,
    /// Logistic sigmoid.
    Logsig,
}

impl Activation {
    #[must_use]
    pub fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Logsig => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Architecture of a policy, independent of the game it plays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModelSpec {
    FeedForward {
        #[serde(default)]
        hidden_sizes: Vec<usize>,
    },
    Mlp {
        #[serde(default)]
        hidden_layers: Vec<usize>,
        activation: Activation,
    },
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum ModelError {
    #[display("invalid game schema: {_0}")]
    #[from]
    Schema(GameConfigError),
    #[display("hidden layer {layer} has no units")]
    EmptyLayer { layer: usize },
    #[display("model needs {expected} weights, found {found}")]
    WeightCount { expected: usize, found: usize },
    #[display("model file declares model `{found}` but its architecture is `{expected}`")]
    NameMismatch { expected: String, found: String },
    #[display("failed to access model file {path}: {source}")]
    File {
        path: String,
        source: std::io::Error,
    },
    #[display("malformed model file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

impl ModelSpec {
    /// Model family name stored in model files.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::FeedForward { .. } => "feed_forward",
            ModelSpec::Mlp { .. } => "mlp",
        }
    }

    #[must_use]
    pub fn hidden_sizes(&self) -> &[usize] {
        match self {
            ModelSpec::FeedForward { hidden_sizes } => hidden_sizes,
            ModelSpec::Mlp { hidden_layers, .. } => hidden_layers,
        }
    }

    pub fn validate(&self, io: &GameIo) -> Result<(), ModelError> {
        io.validate()?;
        if let Some(layer) = self.hidden_sizes().iter().position(|&size| size == 0) {
            return Err(ModelError::EmptyLayer { layer });
        }
        Ok(())
    }

    /// Returns the network shape of each phase.
    pub fn shapes(&self, io: &GameIo) -> Result<Vec<NetworkShape>, ModelError> {
        self.validate(io)?;
        let (bias, activation, normalize_output) = match self {
            ModelSpec::FeedForward { .. } => (false, None, false),
            ModelSpec::Mlp { activation, .. } => (true, Some(*activation), true),
        };
        Ok((0..io.phases())
            .map(|phase| {
                let mut sizes = vec![io.input_sizes[phase]];
                sizes.extend_from_slice(self.hidden_sizes());
                sizes.push(io.output_sizes[phase]);
                NetworkShape {
                    sizes,
                    bias,
                    activation,
                    normalize_output,
                }
            })
            .collect())
    }

    /// Number of genes a policy for `io` needs.
    pub fn parameter_count(&self, io: &GameIo) -> Result<usize, ModelError> {
        Ok(self
            .shapes(io)?
            .iter()
            .map(NetworkShape::parameter_count)
            .sum())
    }

    /// Builds a policy from a flat gene vector.
    pub fn build(&self, genes: &[f64], io: &GameIo) -> Result<PhasedPolicy, ModelError> {
        let shapes = self.shapes(io)?;
        let expected = shapes.iter().map(NetworkShape::parameter_count).sum();
        if genes.len() != expected {
            return Err(ModelError::WeightCount {
                expected,
                found: genes.len(),
            });
        }

        let mut rest = genes;
        let mut networks = Vec::with_capacity(shapes.len());
        for shape in &shapes {
            let (head, tail) = rest.split_at(shape.parameter_count());
            rest = tail;
            let network = Network::from_weights(shape, head).ok_or(ModelError::WeightCount {
                expected,
                found: genes.len(),
            })?;
            networks.push(network);
        }
        Ok(PhasedPolicy::new(networks))
    }
}
