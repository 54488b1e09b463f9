//! The fixed-topology feedforward controller and its snapshot format.

pub use layer::Layer;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod layer;

/// Errors raised while building or running a network.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("a network needs at least an input and an output size")]
    EmptyTopology,
    #[error("layer {layer} has zero width")]
    ZeroWidthLayer { layer: usize },
    #[error("layer {layer} takes {found} inputs but the previous layer has {expected} outputs")]
    LayerMismatch {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("layer {layer} row {row} has {found} weights, expected {expected}")]
    WeightRow {
        layer: usize,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("snapshot has {found} layers, expected {expected}")]
    LayerCount { expected: usize, found: usize },
    #[error("layer {layer} declares {found} outputs, expected {expected}")]
    OutputCount {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("layer {layer} has {found} weight rows, expected {expected}")]
    RowCount {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("layer {layer} has {found} biases, expected {expected}")]
    BiasCount {
        layer: usize,
        expected: usize,
        found: usize,
    },
    #[error("network expects {expected} inputs, got {found}")]
    InputSize { expected: usize, found: usize },
    #[error("network maps {found_inputs} -> {found_outputs}, expected {expected_inputs} -> {expected_outputs}")]
    Incompatible {
        expected_inputs: usize,
        expected_outputs: usize,
        found_inputs: usize,
        found_outputs: usize,
    },
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

/// A feedforward network producing binary outputs.
///
/// `Clone` produces a fully independent copy, which is what spawning relies
/// on before mutating.
#[derive(Clone, Debug, PartialEq)]
pub struct NeuralNetwork {
    layers: Vec<Layer>,
}

/// A serializable, self-describing copy of a [NeuralNetwork].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// The layer sizes, input first.
    pub topology: Vec<usize>,
    /// The layers, input side first.
    pub layers: Vec<Layer>,
}

impl NeuralNetwork {
    /// Creates a network with random weights for the given layer sizes,
    /// e.g. `[5, 6, 4]` for five inputs, six hidden neurons and four outputs.
    pub fn new(topology: &[usize], rng: &mut impl Rng) -> Result<Self, NetworkError> {
        check_topology(topology)?;
        let layers = topology
            .windows(2)
            .map(|pair| Layer::random(pair[0], pair[1], rng))
            .collect();
        Ok(Self { layers })
    }

    /// The layer sizes, input first.
    pub fn topology(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_size()];
        sizes.extend(self.layers.iter().map(|layer| layer.outputs));
        sizes
    }

    /// The number of inputs the network takes.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.inputs)
    }

    /// The number of outputs the network produces.
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.outputs)
    }

    /// The layers, input side first.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Feeds the inputs through every layer and returns the final outputs.
    pub fn feed_forward(&self, inputs: &[f64]) -> Result<Vec<f64>, NetworkError> {
        if inputs.len() != self.input_size() {
            return Err(NetworkError::InputSize {
                expected: self.input_size(),
                found: inputs.len(),
            });
        }
        let mut values = inputs.to_vec();
        for layer in &self.layers {
            values = layer.feed_forward(&values);
        }
        Ok(values)
    }

    /// Replaces every weight and bias `v` with `lerp(v, r, rate)`, where `r`
    /// is a fresh uniform sample from `[-1, 1]`.
    ///
    /// The rate is clamped into `[0, 1]`; `0` leaves the network untouched
    /// and `1` replaces it completely.
    pub fn mutate(&mut self, rate: f64, rng: &mut impl Rng) {
        let rate = rate.clamp(0.0, 1.0);
        for layer in &mut self.layers {
            layer.mutate(rate, rng);
        }
    }

    /// Checks that the network maps `inputs` values onto `outputs` values.
    pub fn ensure_shape(&self, inputs: usize, outputs: usize) -> Result<(), NetworkError> {
        if self.input_size() == inputs && self.output_size() == outputs {
            Ok(())
        } else {
            Err(NetworkError::Incompatible {
                expected_inputs: inputs,
                expected_outputs: outputs,
                found_inputs: self.input_size(),
                found_outputs: self.output_size(),
            })
        }
    }

    /// Takes a snapshot of the network.
    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            topology: self.topology(),
            layers: self.layers.clone(),
        }
    }

    /// Rebuilds a network from a snapshot, rejecting any inconsistency
    /// between the declared topology and the stored weights.
    pub fn from_snapshot(snapshot: NetworkSnapshot) -> Result<Self, NetworkError> {
        let NetworkSnapshot { topology, layers } = snapshot;
        check_topology(&topology)?;
        if layers.len() != topology.len() - 1 {
            return Err(NetworkError::LayerCount {
                expected: topology.len() - 1,
                found: layers.len(),
            });
        }
        for (idx, (layer, sizes)) in layers.iter().zip(topology.windows(2)).enumerate() {
            check_layer(idx, layer, sizes[0], sizes[1])?;
        }
        Ok(Self { layers })
    }

    /// Serializes the network as JSON.
    pub fn to_json(&self) -> Result<String, NetworkError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Parses and validates a network from JSON.
    pub fn from_json(json: &str) -> Result<Self, NetworkError> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }
}

fn check_topology(topology: &[usize]) -> Result<(), NetworkError> {
    if topology.len() < 2 {
        return Err(NetworkError::EmptyTopology);
    }
    match topology.iter().position(|size| *size == 0) {
        Some(layer) => Err(NetworkError::ZeroWidthLayer { layer }),
        None => Ok(()),
    }
}

fn check_layer(idx: usize, layer: &Layer, inputs: usize, outputs: usize) -> Result<(), NetworkError> {
    if layer.inputs != inputs {
        return Err(NetworkError::LayerMismatch {
            layer: idx,
            expected: inputs,
            found: layer.inputs,
        });
    }
    if layer.outputs != outputs {
        return Err(NetworkError::OutputCount {
            layer: idx,
            expected: outputs,
            found: layer.outputs,
        });
    }
    if layer.weights.len() != outputs {
        return Err(NetworkError::RowCount {
            layer: idx,
            expected: outputs,
            found: layer.weights.len(),
        });
    }
    if layer.biases.len() != outputs {
        return Err(NetworkError::BiasCount {
            layer: idx,
            expected: outputs,
            found: layer.biases.len(),
        });
    }
    match layer.weights.iter().position(|row| row.len() != inputs) {
        Some(row) => Err(NetworkError::WeightRow {
            layer: idx,
            row,
            expected: inputs,
            found: layer.weights[row].len(),
        }),
        None => Ok(()),
    }
}
