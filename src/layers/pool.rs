use std::fmt;

use ndarray::{s, Array3};

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::layers::{Phase, Propagate};
use crate::optimizer::Sgd;
use crate::tensor::{Shape, Volume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolType {
    Max,
    Mean,
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolType::Max => write!(f, "Max"),
            PoolType::Mean => write!(f, "Mean"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolLayer {
    pub window: usize,
    pub stride: usize,
    pub pool_type: PoolType,
    pub activation: ActivationType,
    pub input_shape: Shape,
    pub output_shape: Shape,
    /// Input-shaped routing cache: a 1 at each window's maximum for max
    /// pooling, the window average in every cell for mean pooling.
    pub mask: Volume,
    /// Absolute `(row, col)` of the maximum of every output position.
    max_indices: Option<Array3<(usize, usize)>>,
    output_cache: Option<Volume>,
}

impl PoolLayer {
    /// Spatial output extent, or `None` when the windows do not tile the input.
    pub fn output_size(input: usize, window: usize, stride: usize) -> Option<usize> {
        if stride == 0 || window > input || (input - window) % stride != 0 {
            return None;
        }
        Some(1 + (input - window) / stride)
    }

    pub fn new(input_shape: Shape, window: usize, stride: usize, pool_type: PoolType) -> Result<Self> {
        let output_size = Self::output_size(input_shape.height, window, stride).ok_or_else(|| {
            NetworkError::InvalidConfig(format!(
                "window {window} with stride {stride} does not tile a {input_shape} input"
            ))
        })?;

        Ok(PoolLayer {
            window,
            stride,
            pool_type,
            activation: ActivationType::Linear,
            input_shape,
            output_shape: Shape::square(input_shape.channels, output_size),
            mask: input_shape.zeros(),
            max_indices: None,
            output_cache: None,
        })
    }

    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }

    fn window_origin(&self, oy: usize, ox: usize) -> (usize, usize) {
        (oy * self.stride, ox * self.stride)
    }
}

impl Propagate for PoolLayer {
    type Input = Volume;
    type Output = Volume;

    fn forward(&mut self, input: &Volume, phase: &mut Phase<'_>) -> Volume {
        debug_assert_eq!(Shape::of(input), self.input_shape);

        let f = self.window;
        let out = self.output_shape.height;
        let mut output = self.output_shape.zeros();
        let mut max_indices = Array3::from_elem(self.output_shape.dim(), (0, 0));

        for c in 0..self.input_shape.channels {
            for oy in 0..out {
                for ox in 0..out {
                    let (y0, x0) = self.window_origin(oy, ox);
                    let window = input.slice(s![c, y0..y0 + f, x0..x0 + f]);

                    let pooled = match self.pool_type {
                        PoolType::Max => {
                            // Row-major scan, strict comparison: first maximum wins.
                            let mut best = f64::NEG_INFINITY;
                            let mut at = (y0, x0);
                            for ((dy, dx), &v) in window.indexed_iter() {
                                if v > best {
                                    best = v;
                                    at = (y0 + dy, x0 + dx);
                                }
                            }
                            self.mask.slice_mut(s![c, y0..y0 + f, x0..x0 + f]).fill(0.0);
                            self.mask[[c, at.0, at.1]] = 1.0;
                            max_indices[[c, oy, ox]] = at;
                            best
                        }
                        PoolType::Mean => {
                            let mean = window.sum() / (f * f) as f64;
                            self.mask.slice_mut(s![c, y0..y0 + f, x0..x0 + f]).fill(mean);
                            mean
                        }
                    };
                    output[[c, oy, ox]] = self.activation.apply(pooled);
                }
            }
        }

        if phase.is_training() {
            self.max_indices = Some(max_indices);
            self.output_cache = Some(output.clone());
        }
        output
    }

    fn backward(&mut self, grad_output: &Volume, _optimizer: &Sgd) -> Result<Volume> {
        let output = self.output_cache.take().ok_or(NetworkError::MissingCache)?;
        let max_indices = self.max_indices.take().ok_or(NetworkError::MissingCache)?;

        let f = self.window;
        let share = 1.0 / (f * f) as f64;
        let mut grad_input = self.input_shape.zeros();

        for ((c, oy, ox), &error) in grad_output.indexed_iter() {
            let delta = error * self.activation.derivative_from_output(output[[c, oy, ox]]);
            match self.pool_type {
                PoolType::Max => {
                    let (y, x) = max_indices[[c, oy, ox]];
                    grad_input[[c, y, x]] += delta;
                }
                PoolType::Mean => {
                    let (y0, x0) = self.window_origin(oy, ox);
                    grad_input
                        .slice_mut(s![c, y0..y0 + f, x0..x0 + f])
                        .mapv_inplace(|g| g + delta * share);
                }
            }
        }

        Ok(grad_input)
    }

    fn parameter_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(size: usize) -> Volume {
        Volume::from_shape_fn((1, size, size), |(_, y, x)| (y * size + x) as f64)
    }

    #[test]
    fn output_size_requires_exact_tiling() {
        assert_eq!(PoolLayer::output_size(4, 2, 2), Some(2));
        assert_eq!(PoolLayer::output_size(55, 3, 2), Some(27));
        assert_eq!(PoolLayer::output_size(5, 2, 2), None);
    }

    #[test]
    fn max_pool_picks_window_maximum() {
        let mut layer = PoolLayer::new(Shape::square(1, 4), 2, 2, PoolType::Max).unwrap();
        let output = layer.forward(&ramp(4), &mut Phase::Inference);
        assert_eq!(output.as_slice().unwrap(), &[5.0, 7.0, 13.0, 15.0]);
        assert_eq!(layer.mask.sum(), 4.0);
        assert_eq!(layer.mask[[0, 1, 1]], 1.0);
    }

    #[test]
    fn max_pool_first_maximum_wins_ties() {
        let mut layer = PoolLayer::new(Shape::square(1, 2), 2, 1, PoolType::Max).unwrap();
        let input = Volume::from_elem((1, 2, 2), 3.0);
        layer.forward(&input, &mut Phase::Inference);
        assert_eq!(layer.mask[[0, 0, 0]], 1.0);
        assert_eq!(layer.mask.sum(), 1.0);
    }

    #[test]
    fn mean_pool_spreads_average() {
        let mut layer = PoolLayer::new(Shape::square(1, 4), 2, 2, PoolType::Mean).unwrap();
        let output = layer.forward(&ramp(4), &mut Phase::Inference);
        assert_eq!(output[[0, 0, 0]], 2.5);
        assert_eq!(layer.mask[[0, 0, 1]], 2.5);
        assert_eq!(layer.mask[[0, 3, 3]], 12.5);
    }

    #[test]
    fn pool_has_no_parameters() {
        let layer = PoolLayer::new(Shape::square(3, 4), 2, 2, PoolType::Mean).unwrap();
        assert_eq!(layer.parameter_count(), 0);
    }
}
