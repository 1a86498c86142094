use std::fmt;

use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::block::Block;
use crate::error::{NetworkError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::layers::{Phase, Signal};
use crate::loss::Loss;
use crate::tensor::{self, Shape, Vector, Volume};

/// A trainable stack of blocks.
///
/// Built through [`crate::NetworkBuilder`]; owns every weight and the
/// generator that drives dropout and minibatch sampling.
#[derive(Debug, Clone)]
pub struct Network {
    blocks: Vec<Block>,
    hyperparameters: Hyperparameters,
    pub(crate) rng: StdRng,
}

impl Network {
    pub(crate) fn from_parts(blocks: Vec<Block>, hyperparameters: Hyperparameters, rng: StdRng) -> Self {
        Network {
            blocks,
            hyperparameters,
            rng,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn input_shape(&self) -> Shape {
        self.blocks[0].input_shape()
    }

    pub fn output_len(&self) -> usize {
        self.blocks[self.blocks.len() - 1].output_shape().len()
    }

    pub fn parameter_count(&self) -> usize {
        self.blocks.iter().map(Block::parameter_count).sum()
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.hyperparameters.batch_size = batch_size;
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.hyperparameters.learning_rate = learning_rate;
    }

    pub fn set_momentum(&mut self, momentum: f64) {
        self.hyperparameters.momentum = momentum;
    }

    pub fn set_loss(&mut self, loss: Loss) {
        self.hyperparameters.loss = loss;
    }

    fn check_input(&self, input: &Volume) -> Result<()> {
        let actual = Shape::of(input);
        let expected = self.input_shape();
        if actual != expected {
            return Err(NetworkError::ShapeMismatch { expected, actual });
        }
        Ok(())
    }

    pub(crate) fn check_label(&self, label: &Vector) -> Result<()> {
        let expected = self.output_len();
        if label.len() != expected {
            return Err(NetworkError::ShapeMismatch {
                expected: Shape::flat(expected),
                actual: Shape::flat(label.len()),
            });
        }
        Ok(())
    }

    fn propagate(&mut self, input: &Volume, training: bool) -> Result<Vector> {
        self.check_input(input)?;
        let mut phase = if training {
            Phase::Training(&mut self.rng)
        } else {
            Phase::Inference
        };
        let mut signal = Signal::Volume(input.clone());
        for block in self.blocks.iter_mut() {
            signal = block.forward(signal, &mut phase)?;
        }
        Ok(signal.into_flat())
    }

    /// Raw output vector for one input, without dropout.
    pub fn forward(&mut self, input: &Volume) -> Result<Vector> {
        self.propagate(input, false)
    }

    /// Index of the largest output.
    pub fn classify(&mut self, input: &Volume) -> Result<usize> {
        let output = self.forward(input)?;
        Ok(tensor::argmax(&output))
    }

    /// Training forward pass followed by backward, returning the prediction
    /// the weights were updated from.
    pub fn train_step(&mut self, input: &Volume, label: &Vector) -> Result<Vector> {
        self.check_label(label)?;
        let prediction = self.propagate(input, true)?;
        self.backward(&prediction, label)?;
        Ok(prediction)
    }

    /// Feeds the loss gradient for `prediction` back through every block.
    ///
    /// Must follow a training forward pass; each layer consumes its cache.
    pub fn backward(&mut self, prediction: &Vector, label: &Vector) -> Result<()> {
        self.check_label(label)?;
        let gradient = self.hyperparameters.loss.gradient(prediction, label);
        let optimizer = self.hyperparameters.optimizer();

        let mut grad = Signal::Flat(gradient);
        for block in self.blocks.iter_mut().rev() {
            grad = block.backward(grad, &optimizer)?;
        }
        Ok(())
    }

    /// Percentage of `inputs` whose predicted class matches the hot index of
    /// the corresponding label.
    pub fn test_accuracy(&mut self, inputs: &[Volume], labels: &[Vector]) -> Result<f64> {
        if inputs.len() != labels.len() {
            return Err(NetworkError::LabelMismatch {
                inputs: inputs.len(),
                labels: labels.len(),
            });
        }
        if inputs.is_empty() {
            return Err(NetworkError::EmptyDataset);
        }

        let mut correct = 0;
        for (input, label) in inputs.iter().zip(labels) {
            self.check_label(label)?;
            let output = self.forward(input)?;
            if output.iter().any(|v| !v.is_finite()) {
                warn!("non-finite network output during evaluation");
            }
            if tensor::argmax(&output) == tensor::argmax(label) {
                correct += 1;
            }
        }
        let accuracy = 100.0 * correct as f64 / inputs.len() as f64;
        info!(correct, total = inputs.len(), accuracy, "evaluation finished");
        Ok(accuracy)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Network architecture")?;
        writeln!(f, "  input {}", self.input_shape())?;
        for (b, block) in self.blocks.iter().enumerate() {
            writeln!(f, "  block {b}, burst multiplier {}", block.burst_mult())?;
            for (l, layer) in block.layers().iter().enumerate() {
                writeln!(
                    f,
                    "    {l:>2}  {:<40} x{:<3} {} -> {}",
                    layer.to_string(),
                    block.parallelism()[l],
                    block.shapes()[l],
                    block.shapes()[l + 1]
                )?;
            }
        }
        let hp = &self.hyperparameters;
        writeln!(f, "  parameters {}", self.parameter_count())?;
        write!(
            f,
            "  batch {}, learning rate {}, momentum {}, loss {}",
            hp.batch_size,
            hp.learning_rate,
            hp.momentum,
            hp.loss.name()
        )
    }
}
