//! Forward pass of the policy networks.
//!
//! A [`Network`] is a chain of dense layers. Layer weights are stored row-major as an
//! `inputs x outputs` matrix, followed by one extra bias row when the layer has a bias.
//! The genes of a network are the concatenation of its layer matrices, first layer first.

use evoplay_engine::{Policy, PolicyError};

use crate::model::Activation;

#[derive(Debug, Clone, PartialEq)]
struct Layer {
    inputs: usize,
    outputs: usize,
    bias: bool,
    weights: Vec<f64>,
}

impl Layer {
    fn parameter_count(inputs: usize, outputs: usize, bias: bool) -> usize {
        (inputs + usize::from(bias)) * outputs
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        debug_assert_eq!(input.len(), self.inputs);
        let mut output = if self.bias {
            self.weights[self.inputs * self.outputs..].to_vec()
        } else {
            vec![0.0; self.outputs]
        };
        for (x, row) in input.iter().zip(self.weights.chunks_exact(self.outputs)) {
            for (y, w) in output.iter_mut().zip(row) {
                *y += x * w;
            }
        }
        output
    }
}

/// Shape and post-processing of a [`Network`].
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkShape {
    /// Layer widths, input first, output last.
    pub sizes: Vec<usize>,
    pub bias: bool,
    /// Applied after every layer.
    pub activation: Option<Activation>,
    /// Min-max normalizes the output to `[0, 1]`.
    pub normalize_output: bool,
}

impl NetworkShape {
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.sizes
            .windows(2)
            .map(|w| Layer::parameter_count(w[0], w[1], self.bias))
            .sum()
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.sizes.first().copied().unwrap_or(0)
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.sizes.last().copied().unwrap_or(0)
    }
}

/// A dense feed-forward network.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    layers: Vec<Layer>,
    activation: Option<Activation>,
    normalize_output: bool,
}

impl Network {
    /// Builds a network from exactly [`NetworkShape::parameter_count`] weights.
    ///
    /// Returns `None` if the weight count does not match the shape.
    #[must_use]
    pub fn from_weights(shape: &NetworkShape, weights: &[f64]) -> Option<Self> {
        if weights.len() != shape.parameter_count() {
            return None;
        }
        let mut rest = weights;
        let layers = shape
            .sizes
            .windows(2)
            .map(|w| {
                let (inputs, outputs) = (w[0], w[1]);
                let (head, tail) =
                    rest.split_at(Layer::parameter_count(inputs, outputs, shape.bias));
                rest = tail;
                Layer {
                    inputs,
                    outputs,
                    bias: shape.bias,
                    weights: head.to_vec(),
                }
            })
            .collect();
        Some(Self {
            layers,
            activation: shape.activation,
            normalize_output: shape.normalize_output,
        })
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    /// Runs the forward pass. `input` must have [`Self::input_size`] elements.
    #[must_use]
    pub fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut values = input.to_vec();
        for layer in &self.layers {
            values = layer.forward(&values);
            if let Some(activation) = self.activation {
                values.iter_mut().for_each(|v| *v = activation.apply(*v));
            }
        }
        if self.normalize_output {
            min_max_normalize(&mut values);
        }
        values
    }
}

// Leaves the values untouched when they are all equal.
fn min_max_normalize(values: &mut [f64]) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range > 0.0 && range.is_finite() {
        values.iter_mut().for_each(|v| *v = (*v - min) / range);
    }
}

/// One network per game phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhasedPolicy {
    networks: Vec<Network>,
}

impl PhasedPolicy {
    #[must_use]
    pub fn new(networks: Vec<Network>) -> Self {
        Self { networks }
    }

    #[must_use]
    pub fn phases(&self) -> usize {
        self.networks.len()
    }

    #[must_use]
    pub fn network(&self, phase: usize) -> Option<&Network> {
        self.networks.get(phase)
    }
}

impl Policy for PhasedPolicy {
    fn evaluate(&mut self, state: &[f64], phase: usize) -> Result<Vec<f64>, PolicyError> {
        let network = self.networks.get(phase).ok_or(PolicyError::UnknownPhase {
            phase,
            phases: self.networks.len(),
        })?;
        if state.len() != network.input_size() {
            return Err(PolicyError::InputSize {
                phase,
                expected: network.input_size(),
                found: state.len(),
            });
        }
        Ok(network.forward(state))
    }
}
