//! Small fully-connected regression network trained with Adam on MSE.

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Relu,
    Linear,
}

impl Activation {
    fn apply(self, z: f64) -> f64 {
        match self {
            Self::Relu => z.max(0.0),
            Self::Linear => z,
        }
    }

    /// Derivative expressed in terms of the activation output.
    fn derivative(self, out: f64) -> f64 {
        match self {
            Self::Relu => {
                if out > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Linear => 1.0,
        }
    }
}

/// Dense layer. `weights` is row-major `outputs x inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl Layer {
    fn new<R: Rng>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        // He-uniform for ReLU, Glorot-uniform otherwise.
        let limit = match activation {
            Activation::Relu => (6.0 / inputs as f64).sqrt(),
            Activation::Linear => (6.0 / (inputs + outputs) as f64).sqrt(),
        };
        let weights = (0..inputs * outputs)
            .map(|_| rng.random_range(-limit..limit))
            .collect();
        Self {
            inputs,
            outputs,
            activation,
            weights,
            biases: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                let z: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>()
                    + self.biases[o];
                self.activation.apply(z)
            })
            .collect()
    }
}

/// Weight and bias gradients of one layer.
#[derive(Debug, Clone)]
struct LayerGrad {
    weights: Vec<f64>,
    biases: Vec<f64>,
}

/// Feed-forward network with ReLU hidden layers and one linear output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub layers: Vec<Layer>,
}

impl Network {
    /// Build `inputs -> hidden... -> 1` with randomly initialised weights.
    pub fn new<R: Rng>(inputs: usize, hidden: &[usize], rng: &mut R) -> Self {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut fan_in = inputs;
        for &units in hidden {
            layers.push(Layer::new(fan_in, units, Activation::Relu, rng));
            fan_in = units;
        }
        layers.push(Layer::new(fan_in, 1, Activation::Linear, rng));
        Self { layers }
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    pub fn predict(&self, input: &[f64]) -> f64 {
        let mut act = input.to_vec();
        for layer in &self.layers {
            act = layer.forward(&act);
        }
        act.first().copied().unwrap_or(0.0)
    }

    pub fn predict_many(&self, inputs: &[Vec<f64>]) -> Vec<f64> {
        inputs.iter().map(|x| self.predict(x)).collect()
    }

    /// Backpropagate one mini-batch and return `(mse, mae)` measured before
    /// the update, plus the accumulated gradients.
    fn batch_gradients(&self, inputs: &[&Vec<f64>], targets: &[f64]) -> (f64, f64, Vec<LayerGrad>) {
        let mut grads: Vec<LayerGrad> = self
            .layers
            .iter()
            .map(|l| LayerGrad {
                weights: vec![0.0; l.weights.len()],
                biases: vec![0.0; l.biases.len()],
            })
            .collect();
        let n = inputs.len().max(1) as f64;
        let mut sq = 0.0;
        let mut abs = 0.0;

        for (x, &y) in inputs.iter().zip(targets) {
            let mut activations = Vec::with_capacity(self.layers.len() + 1);
            activations.push(x.to_vec());
            for (li, layer) in self.layers.iter().enumerate() {
                let next = layer.forward(&activations[li]);
                activations.push(next);
            }

            let err = activations[self.layers.len()][0] - y;
            sq += err * err;
            abs += err.abs();

            let mut delta = vec![2.0 * err / n];
            for (li, layer) in self.layers.iter().enumerate().rev() {
                let out = &activations[li + 1];
                let input = &activations[li];
                for o in 0..layer.outputs {
                    delta[o] *= layer.activation.derivative(out[o]);
                }
                let grad = &mut grads[li];
                for o in 0..layer.outputs {
                    grad.biases[o] += delta[o];
                    let row = &mut grad.weights[o * layer.inputs..(o + 1) * layer.inputs];
                    for (g, xi) in row.iter_mut().zip(input) {
                        *g += delta[o] * xi;
                    }
                }
                if li > 0 {
                    let mut prev = vec![0.0; layer.inputs];
                    for o in 0..layer.outputs {
                        let row = &layer.weights[o * layer.inputs..(o + 1) * layer.inputs];
                        for (p, w) in prev.iter_mut().zip(row) {
                            *p += w * delta[o];
                        }
                    }
                    delta = prev;
                }
            }
        }

        (sq / n, abs / n, grads)
    }
}

/// Adam optimizer state for a [`Network`].
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<LayerGrad>,
    v: Vec<LayerGrad>,
}

impl Adam {
    pub fn new(network: &Network, learning_rate: f64) -> Self {
        let zeros: Vec<LayerGrad> = network
            .layers
            .iter()
            .map(|l| LayerGrad {
                weights: vec![0.0; l.weights.len()],
                biases: vec![0.0; l.biases.len()],
            })
            .collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    /// Run one optimisation step on a mini-batch and return the batch
    /// `(mse, mae)` measured before the update.
    pub fn train_batch(
        &mut self,
        network: &mut Network,
        inputs: &[&Vec<f64>],
        targets: &[f64],
    ) -> (f64, f64) {
        let (mse, mae, grads) = network.batch_gradients(inputs, targets);

        self.step += 1;
        let c1 = 1.0 - self.beta1.powi(self.step);
        let c2 = 1.0 - self.beta2.powi(self.step);
        let lr = self.learning_rate;
        let (b1, b2, eps) = (self.beta1, self.beta2, self.epsilon);

        let update = |params: &mut [f64], grad: &[f64], m: &mut [f64], v: &mut [f64]| {
            for i in 0..params.len() {
                m[i] = b1 * m[i] + (1.0 - b1) * grad[i];
                v[i] = b2 * v[i] + (1.0 - b2) * grad[i] * grad[i];
                let m_hat = m[i] / c1;
                let v_hat = v[i] / c2;
                params[i] -= lr * m_hat / (v_hat.sqrt() + eps);
            }
        };

        for (li, layer) in network.layers.iter_mut().enumerate() {
            let (m, v) = (&mut self.m[li], &mut self.v[li]);
            update(
                &mut layer.weights[..],
                &grads[li].weights[..],
                &mut m.weights[..],
                &mut v.weights[..],
            );
            update(
                &mut layer.biases[..],
                &grads[li].biases[..],
                &mut m.biases[..],
                &mut v.biases[..],
            );
        }

        (mse, mae)
    }
}
