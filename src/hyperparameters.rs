use serde::Deserialize;

use crate::loss::Loss;
use crate::optimizer::Sgd;

/// Hyperparameters for the network
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    /// Samples drawn per minibatch
    pub batch_size: usize,

    /// Learning rate for training
    pub learning_rate: f64,

    /// Momentum coefficient, carried but not applied by the update rule
    pub momentum: f64,

    /// Loss used for statistics and for the output gradient
    pub loss: Loss,
}

impl Hyperparameters {
    pub fn optimizer(&self) -> Sgd {
        Sgd::with_momentum(self.learning_rate, self.momentum)
    }
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            batch_size: 64,
            learning_rate: 0.01,
            momentum: 0.01,
            loss: Loss::CrossEntropy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hyperparameters() {
        let hp = Hyperparameters::default();

        assert_eq!(hp.batch_size, 64);
        assert_eq!(hp.learning_rate, 0.01);
        assert_eq!(hp.momentum, 0.01);
        assert_eq!(hp.loss, Loss::CrossEntropy);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let hp: Hyperparameters =
            serde_json::from_str(r#"{ "batch_size": 8, "loss": "mean_squared_error" }"#).unwrap();

        assert_eq!(hp.batch_size, 8);
        assert_eq!(hp.learning_rate, 0.01);
        assert_eq!(hp.loss, Loss::MeanSquaredError);
    }
}
