use std::fmt;

use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result};
use crate::network::Network;
use crate::tensor::{self, Vector, Volume};

/// When [`Network::train`] stops; whichever condition holds first wins.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingGoals {
    /// Stop once more than this many passes over the data have been sampled.
    pub max_epochs: f64,
    /// Stop once the best minibatch mean loss is at or below this value.
    pub goal_error: f64,
    /// Stop once the best minibatch accuracy (percent) reaches this value.
    pub goal_accuracy: f64,
}

impl Default for TrainingGoals {
    fn default() -> Self {
        TrainingGoals {
            max_epochs: 10.0,
            goal_error: 0.0,
            goal_accuracy: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxEpochs,
    GoalError,
    GoalAccuracy,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::MaxEpochs => write!(f, "epoch limit reached"),
            StopReason::GoalError => write!(f, "error goal reached"),
            StopReason::GoalAccuracy => write!(f, "accuracy goal reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingReport {
    pub epochs: f64,
    pub minibatches: usize,
    pub last_error: f64,
    pub last_accuracy: f64,
    pub best_error: f64,
    pub best_accuracy: f64,
    pub stop_reason: StopReason,
}

impl TrainingGoals {
    fn reached(&self, epochs: f64, best_error: f64, best_accuracy: f64) -> Option<StopReason> {
        if epochs > self.max_epochs {
            Some(StopReason::MaxEpochs)
        } else if best_error <= self.goal_error {
            Some(StopReason::GoalError)
        } else if best_accuracy >= self.goal_accuracy {
            Some(StopReason::GoalAccuracy)
        } else {
            None
        }
    }
}

impl Network {
    /// Minibatch SGD over `inputs`.
    ///
    /// Each minibatch draws `batch_size` samples with replacement; every sample
    /// updates the weights immediately. Loss and accuracy come from an
    /// inference pass taken before the update, so dropout never skews the
    /// stop criteria.
    pub fn train(&mut self, inputs: &[Volume], labels: &[Vector], goals: &TrainingGoals) -> Result<TrainingReport> {
        if inputs.len() != labels.len() {
            return Err(NetworkError::LabelMismatch {
                inputs: inputs.len(),
                labels: labels.len(),
            });
        }
        if inputs.is_empty() {
            return Err(NetworkError::EmptyDataset);
        }
        let batch_size = self.hyperparameters().batch_size;
        if batch_size == 0 {
            return Err(NetworkError::InvalidConfig("batch size must be positive".into()));
        }

        let loss = self.hyperparameters().loss;
        let epoch_step = batch_size as f64 / inputs.len() as f64;
        info!(
            samples = inputs.len(),
            batch_size,
            learning_rate = self.hyperparameters().learning_rate,
            loss = loss.name(),
            "training started"
        );

        let mut epochs = 0.0;
        let mut minibatches = 0;
        let mut best_error = f64::INFINITY;
        let mut best_accuracy = 0.0;

        loop {
            let mut error_sum = 0.0;
            let mut correct = 0;
            for _ in 0..batch_size {
                let index = self.rng.random_range(0..inputs.len());
                let (input, label) = (&inputs[index], &labels[index]);

                self.check_label(label)?;
                let prediction = self.forward(input)?;
                error_sum += loss.calculate(&prediction, label);
                if tensor::argmax(&prediction) == tensor::argmax(label) {
                    correct += 1;
                }
                self.train_step(input, label)?;
            }

            minibatches += 1;
            epochs += epoch_step;
            let error = error_sum / batch_size as f64;
            let accuracy = 100.0 * correct as f64 / batch_size as f64;
            if !error.is_finite() {
                warn!(minibatch = minibatches, "non-finite training loss");
            }
            if error < best_error {
                best_error = error;
            }
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
            }
            debug!(minibatch = minibatches, epochs, error, accuracy, "minibatch");

            if let Some(stop_reason) = goals.reached(epochs, best_error, best_accuracy) {
                let report = TrainingReport {
                    epochs,
                    minibatches,
                    last_error: error,
                    last_accuracy: accuracy,
                    best_error,
                    best_accuracy,
                    stop_reason,
                };
                info!(
                    epochs,
                    minibatches,
                    best_error,
                    best_accuracy,
                    "training stopped: {stop_reason}"
                );
                return Ok(report);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_limit_wins_over_other_goals() {
        let goals = TrainingGoals {
            max_epochs: 1.0,
            goal_error: 0.5,
            goal_accuracy: 90.0,
        };
        assert_eq!(goals.reached(1.5, 0.1, 95.0), Some(StopReason::MaxEpochs));
        assert_eq!(goals.reached(0.5, 0.1, 95.0), Some(StopReason::GoalError));
        assert_eq!(goals.reached(0.5, 0.9, 95.0), Some(StopReason::GoalAccuracy));
        assert_eq!(goals.reached(1.0, 0.9, 50.0), None);
    }
}
