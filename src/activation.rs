/// Enum representing different activation function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivationType {
    /// No activation; the layer output is its weighted sum.
    #[default]
    Linear,
    ReLU,
    Sigmoid,
    Tanh,
    /// Vector-wide normalization; only valid on the last fully-connected layer.
    Softmax,
}

impl ActivationType {
    /// Applies the activation function to a given input.
    ///
    /// Softmax needs the whole vector and is handled by the fully-connected
    /// kernel; here it behaves like `Linear`.
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationType::ReLU => x.max(0.0),
            ActivationType::Tanh => x.tanh(),
            ActivationType::Linear | ActivationType::Softmax => x,
        }
    }

    /// Derivative expressed through the already-activated output `y`.
    ///
    /// Softmax returns 1: its gradient is folded into the loss gradient.
    pub fn derivative_from_output(&self, y: f64) -> f64 {
        match self {
            ActivationType::Sigmoid => y * (1.0 - y),
            ActivationType::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationType::Tanh => 1.0 - y * y,
            ActivationType::Linear | ActivationType::Softmax => 1.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ActivationType::Linear => "None",
            ActivationType::ReLU => "ReLU",
            ActivationType::Sigmoid => "Sig",
            ActivationType::Tanh => "Tanh",
            ActivationType::Softmax => "Soft",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::EPSILON;

    #[test]
    fn test_activation_functions() {
        // Sigmoid tests
        assert!((ActivationType::Sigmoid.apply(0.0) - 0.5).abs() < EPSILON);

        // ReLU tests
        assert_eq!(ActivationType::ReLU.apply(-1.0), 0.0);
        assert_eq!(ActivationType::ReLU.apply(2.0), 2.0);

        // Tanh tests
        assert!((ActivationType::Tanh.apply(0.0)).abs() < EPSILON);

        // Linear tests
        assert_eq!(ActivationType::Linear.apply(5.0), 5.0);
    }

    #[test]
    fn test_shortcut_derivatives() {
        // sigmoid(0) = 0.5 -> 0.25
        assert!((ActivationType::Sigmoid.derivative_from_output(0.5) - 0.25).abs() < EPSILON);

        assert_eq!(ActivationType::ReLU.derivative_from_output(0.0), 0.0);
        assert_eq!(ActivationType::ReLU.derivative_from_output(2.0), 1.0);

        // tanh(0) = 0 -> 1
        assert!((ActivationType::Tanh.derivative_from_output(0.0) - 1.0).abs() < EPSILON);

        assert_eq!(ActivationType::Linear.derivative_from_output(5.0), 1.0);
        assert_eq!(ActivationType::Softmax.derivative_from_output(0.3), 1.0);
    }

    #[test]
    fn test_shortcut_matches_analytic_derivative() {
        for &x in &[-2.0_f64, -0.3, 0.4, 1.7] {
            let y = ActivationType::Sigmoid.apply(x);
            let analytic = (-x).exp() / (1.0 + (-x).exp()).powi(2);
            assert!((ActivationType::Sigmoid.derivative_from_output(y) - analytic).abs() < 1e-12);

            let y = ActivationType::Tanh.apply(x);
            let analytic = 1.0 / x.cosh().powi(2);
            assert!((ActivationType::Tanh.derivative_from_output(y) - analytic).abs() < 1e-12);
        }
    }
}
