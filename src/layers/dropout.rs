use ndarray::Array1;
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};

use crate::error::{NetworkError, Result};

/// Per-output dropout attached to a fully-connected layer.
///
/// Dropped outputs are forced to zero; kept outputs are not rescaled.
#[derive(Debug, Clone)]
pub struct Dropout {
    probability: f64,
    keep: Bernoulli,
}

impl Dropout {
    pub fn new(probability: f64) -> Result<Self> {
        if !(probability > 0.0 && probability < 1.0) {
            return Err(NetworkError::InvalidConfig(format!(
                "dropout probability must be in (0, 1), got {probability}"
            )));
        }
        let keep = Bernoulli::new(1.0 - probability).map_err(|_| NetworkError::InvalidRange { min: 0.0, max: 1.0 })?;
        Ok(Dropout { probability, keep })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// 1.0 for kept units, 0.0 for dropped ones.
    pub fn sample_mask<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Array1<f64> {
        Array1::from_shape_fn(len, |_| if self.keep.sample(rng) { 1.0 } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_probabilities_outside_open_interval() {
        assert!(Dropout::new(0.0).is_err());
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(f64::NAN).is_err());
        assert!(Dropout::new(0.5).is_ok());
    }

    #[test]
    fn mask_is_binary_and_roughly_calibrated() {
        let dropout = Dropout::new(0.25).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let mask = dropout.sample_mask(10_000, &mut rng);
        assert!(mask.iter().all(|&m| m == 0.0 || m == 1.0));
        let kept = mask.sum() / mask.len() as f64;
        assert!((kept - 0.75).abs() < 0.03, "kept fraction {kept}");
    }
}
