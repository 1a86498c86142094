//! Training configuration read from JSON.
//!
//! Every field is optional; missing ones fall back to the defaults of
//! [`Hyperparameters`] and [`TrainingGoals`].
//!
//! ```json
//! {
//!   "batch_size": 32,
//!   "learning_rate": 0.005,
//!   "loss": "cross_entropy",
//!   "max_epochs": 3,
//!   "goal_accuracy": 98.5,
//!   "test_split": 0.1,
//!   "seed": 17
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::builder::NetworkBuilder;
use crate::error::{NetworkError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::train::TrainingGoals;

fn default_test_split() -> f64 {
    0.2
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingConfig {
    #[serde(flatten)]
    pub hyperparameters: Hyperparameters,

    #[serde(flatten)]
    pub goals: TrainingGoals,

    /// Fraction of the dataset held out for evaluation
    #[serde(default = "default_test_split")]
    pub test_split: f64,

    /// Seed for weight initialization, dropout and sampling; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            hyperparameters: Hyperparameters::default(),
            goals: TrainingGoals::default(),
            test_split: default_test_split(),
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Hands hyperparameters and seed to a builder that has not added any
    /// layers yet.
    pub fn configure(&self, builder: NetworkBuilder) -> NetworkBuilder {
        let builder = builder.hyperparameters(self.hyperparameters);
        match self.seed {
            Some(seed) => builder.seed(seed),
            None => builder,
        }
    }
}

/// Loads and validates a training configuration from a JSON file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    debug!(path = %path.as_ref().display(), "loading training config");
    parse_config(&contents)
}

/// Parses and validates a training configuration from a JSON string.
pub fn parse_config(json: &str) -> Result<TrainingConfig> {
    let config: TrainingConfig = serde_json::from_str(json)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &TrainingConfig) -> Result<()> {
    let hp = &config.hyperparameters;
    if hp.batch_size == 0 {
        return Err(NetworkError::InvalidConfig("batch_size must be positive".into()));
    }
    if !(hp.learning_rate >= 0.0) {
        return Err(NetworkError::InvalidConfig("learning_rate must be non-negative".into()));
    }
    if !(hp.momentum >= 0.0) {
        return Err(NetworkError::InvalidConfig("momentum must be non-negative".into()));
    }
    if !(0.0..1.0).contains(&config.test_split) {
        return Err(NetworkError::InvalidConfig("test_split must be in [0, 1)".into()));
    }
    if !(0.0..=100.0).contains(&config.goals.goal_accuracy) {
        return Err(NetworkError::InvalidConfig("goal_accuracy must be in [0, 100]".into()));
    }
    if !(config.goals.max_epochs > 0.0) {
        return Err(NetworkError::InvalidConfig("max_epochs must be positive".into()));
    }
    Ok(())
}
