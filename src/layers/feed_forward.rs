use ndarray::{Array1, Array2, Zip};
use rand::Rng;

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::layers::{Dropout, Phase, Propagate, WEIGHT_INIT_RANGE};
use crate::optimizer::Sgd;
use crate::tensor::{self, Vector};

#[derive(Debug, Clone)]
pub struct FeedForwardLayer {
    /// Dense weights shaped `[inputs, outputs]`; there is no bias.
    pub weights: Array2<f64>,
    pub activation: ActivationType,
    pub dropout: Option<Dropout>,
    input_cache: Option<Vector>,
    output_cache: Option<Vector>,
    keep_cache: Option<Vector>,
}

impl FeedForwardLayer {
    pub fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Result<Self> {
        let mut weights = Array2::zeros((inputs, outputs));
        tensor::randomize(&mut weights, -WEIGHT_INIT_RANGE, WEIGHT_INIT_RANGE, rng)?;

        Ok(FeedForwardLayer {
            weights,
            activation: ActivationType::Linear,
            dropout: None,
            input_cache: None,
            output_cache: None,
            keep_cache: None,
        })
    }

    pub fn with_weights(mut self, weights: Array2<f64>) -> Result<Self> {
        if weights.dim() != self.weights.dim() {
            return Err(NetworkError::InvalidConfig(format!(
                "expected {:?} weights, got {:?}",
                self.weights.dim(),
                weights.dim()
            )));
        }
        self.weights = weights;
        Ok(self)
    }

    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    pub fn inputs(&self) -> usize {
        self.weights.nrows()
    }

    pub fn outputs(&self) -> usize {
        self.weights.ncols()
    }
}

/// Max-subtracted softmax over the units whose `keep` entry is non-zero.
/// Dropped units come out as zero.
pub fn softmax(z: &Vector, keep: Option<&Vector>) -> Vector {
    let kept = |j: usize| keep.map_or(true, |k| k[j] != 0.0);

    let max = z
        .indexed_iter()
        .filter(|(j, _)| kept(*j))
        .fold(f64::NEG_INFINITY, |m, (_, &v)| m.max(v));
    let exp = Array1::from_shape_fn(z.len(), |j| if kept(j) { (z[j] - max).exp() } else { 0.0 });
    let sum = exp.sum();
    if sum > 0.0 {
        exp / sum
    } else {
        exp
    }
}

impl Propagate for FeedForwardLayer {
    type Input = Vector;
    type Output = Vector;

    fn forward(&mut self, input: &Vector, phase: &mut Phase<'_>) -> Vector {
        debug_assert_eq!(input.len(), self.inputs());

        let keep = match (&mut *phase, &self.dropout) {
            (Phase::Training(rng), Some(dropout)) => Some(dropout.sample_mask(self.outputs(), &mut **rng)),
            _ => None,
        };

        let z = input.dot(&self.weights);
        let output = match self.activation {
            ActivationType::Softmax => softmax(&z, keep.as_ref()),
            activation => {
                let mut a = z.mapv(|v| activation.apply(v));
                if let Some(keep) = &keep {
                    a *= keep;
                }
                a
            }
        };

        if phase.is_training() {
            self.input_cache = Some(input.clone());
            self.output_cache = Some(output.clone());
            self.keep_cache = keep;
        }
        output
    }

    fn backward(&mut self, grad_output: &Vector, optimizer: &Sgd) -> Result<Vector> {
        let input = self.input_cache.take().ok_or(NetworkError::MissingCache)?;
        let output = self.output_cache.take().ok_or(NetworkError::MissingCache)?;

        let activation = self.activation;
        let mut delta = Zip::from(grad_output)
            .and(&output)
            .map_collect(|&e, &y| e * activation.derivative_from_output(y));
        if let Some(keep) = self.keep_cache.take() {
            delta *= &keep;
        }

        let grad_input = self.weights.dot(&delta);
        let gradient = tensor::outer_product(&input, &delta);
        optimizer.step(self.weights.view_mut(), &gradient);

        Ok(grad_input)
    }

    fn parameter_count(&self) -> usize {
        self.weights.len()
    }
}
