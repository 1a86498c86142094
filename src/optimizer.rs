use ndarray::{ArrayBase, ArrayViewMut, Data, Dimension};

/// Plain stochastic gradient descent, applied in place after every sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sgd {
    pub learning_rate: f64,
    /// Carried alongside the learning rate; does not enter [`Sgd::step`].
    pub momentum: f64,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
        }
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64) -> Self {
        Self {
            learning_rate,
            momentum,
        }
    }

    /// `weights -= learning_rate * gradient`
    pub fn step<S, D>(&self, mut weights: ArrayViewMut<'_, f64, D>, gradient: &ArrayBase<S, D>)
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        weights.scaled_add(-self.learning_rate, gradient);
    }
}
