use ndarray::Array1;
use serde::Deserialize;

/// Smallest probability fed to `ln` by the cross-entropy forward pass.
const EPSILON: f64 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Loss {
    #[default]
    CrossEntropy,
    MeanSquaredError,
}

impl Loss {
    pub fn calculate(&self, prediction: &Array1<f64>, target: &Array1<f64>) -> f64 {
        match self {
            Loss::CrossEntropy => {
                // Cross entropy loss: -Σ(target * log(prediction))
                // Also clamp to avoid log(0)
                let safe_pred = prediction.mapv(|x| x.clamp(EPSILON, 1.0 - EPSILON));
                -(target * &safe_pred.mapv(f64::ln)).sum()
            }
            Loss::MeanSquaredError => (target - prediction).mapv(|d| d * d).sum(),
        }
    }

    /// Gradient of the loss with respect to the last layer's pre-softmax sum.
    ///
    /// Both forms assume the output layer is a Softmax, whose derivative is
    /// folded in here rather than applied by the layer.
    pub fn gradient(&self, prediction: &Array1<f64>, target: &Array1<f64>) -> Array1<f64> {
        match self {
            Loss::CrossEntropy => prediction - target,
            Loss::MeanSquaredError => {
                // dL/dz_i = 2 p_i Σ_k (t_k - p_k) p_k - 2 p_i (t_i - p_i)
                let residual = target - prediction;
                let weighted: f64 = (&residual * prediction).sum();
                Array1::from_shape_fn(prediction.len(), |i| {
                    let p = prediction[i];
                    let diagonal = 2.0 * p * residual[i] * (1.0 - p);
                    let off_diagonal = 2.0 * p * (weighted - residual[i] * p);
                    off_diagonal - diagonal
                })
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Loss::CrossEntropy => "cross-entropy",
            Loss::MeanSquaredError => "mean squared error",
        }
    }
}
