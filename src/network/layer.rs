use crate::math::lerp;
use rand::Rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// The range weights and biases are drawn from.
const WEIGHT_RANGE: (f64, f64) = (-1.0, 1.0);

/// A fully connected layer with hard threshold activation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// The number of inputs.
    pub(crate) inputs: usize,
    /// The number of outputs.
    pub(crate) outputs: usize,
    /// One row of `inputs` weights per output.
    pub(crate) weights: Vec<Vec<f64>>,
    /// One threshold per output.
    pub(crate) biases: Vec<f64>,
}

fn weight_distr() -> Uniform<f64> {
    Uniform::new_inclusive(WEIGHT_RANGE.0, WEIGHT_RANGE.1)
}

impl Layer {
    /// Creates a layer with weights and biases drawn uniformly from `[-1, 1]`.
    pub fn random(inputs: usize, outputs: usize, rng: &mut impl Rng) -> Self {
        let distr = weight_distr();
        let weights = (0..outputs)
            .map(|_| (0..inputs).map(|_| distr.sample(rng)).collect())
            .collect();
        let biases = (0..outputs).map(|_| distr.sample(rng)).collect();
        Self {
            inputs,
            outputs,
            weights,
            biases,
        }
    }

    /// The number of inputs.
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// The number of outputs.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// The weights, indexed by `[output][input]`.
    pub fn weights(&self) -> &[Vec<f64>] {
        &self.weights
    }

    /// The output thresholds.
    pub fn biases(&self) -> &[f64] {
        &self.biases
    }

    /// Computes the layer's outputs; each is `1` if the weighted sum
    /// of the inputs exceeds its bias and `0` otherwise.
    ///
    /// The caller guarantees `inputs.len() == self.inputs`.
    pub(crate) fn feed_forward(&self, inputs: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.biases)
            .map(|(row, bias)| {
                let sum: f64 = inputs.iter().zip(row).map(|(x, w)| x * w).sum();
                if sum > *bias {
                    1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Moves every weight and bias towards a fresh random value by `rate`.
    pub(crate) fn mutate(&mut self, rate: f64, rng: &mut impl Rng) {
        let distr = weight_distr();
        for bias in &mut self.biases {
            *bias = lerp(*bias, distr.sample(rng), rate);
        }
        for weight in self.weights.iter_mut().flatten() {
            *weight = lerp(*weight, distr.sample(rng), rate);
        }
    }
}
