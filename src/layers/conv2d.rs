use ndarray::{s, Axis, Zip};
use rand::Rng;

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::layers::{Phase, Propagate, WEIGHT_INIT_RANGE};
use crate::optimizer::Sgd;
use crate::tensor::{self, Shape, Volume};

#[derive(Debug, Clone)]
pub struct Conv2DLayer {
    /// One `[in_channels, kernel_size, kernel_size]` volume per output channel.
    pub kernels: Vec<Volume>,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
    pub activation: ActivationType,
    pub input_shape: Shape, // (channels, height, width)
    pub output_shape: Shape,
    input_cache: Option<Volume>,
    output_cache: Option<Volume>,
}

impl Conv2DLayer {
    /// Spatial output extent, or `None` when the geometry does not tile the
    /// padded input exactly.
    pub fn output_size(input: usize, kernel_size: usize, stride: usize, padding: usize) -> Option<usize> {
        let padded = input + 2 * padding;
        if stride == 0 || kernel_size > padded || (padded - kernel_size) % stride != 0 {
            return None;
        }
        Some(1 + (padded - kernel_size) / stride)
    }

    pub fn new<R: Rng + ?Sized>(
        input_shape: Shape,
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<Self> {
        let output_size = Self::output_size(input_shape.height, kernel_size, stride, padding).ok_or_else(|| {
            NetworkError::InvalidConfig(format!(
                "kernel {kernel_size} with stride {stride} and padding {padding} does not tile a {input_shape} input"
            ))
        })?;

        let mut kernels = Vec::with_capacity(filters);
        for _ in 0..filters {
            let mut kernel = Volume::zeros((input_shape.channels, kernel_size, kernel_size));
            tensor::randomize(&mut kernel, -WEIGHT_INIT_RANGE, WEIGHT_INIT_RANGE, rng)?;
            kernels.push(kernel);
        }

        Ok(Conv2DLayer {
            kernels,
            kernel_size,
            stride,
            padding,
            activation: ActivationType::Linear,
            input_shape,
            output_shape: Shape::square(filters, output_size),
            input_cache: None,
            output_cache: None,
        })
    }

    /// Replace the kernels, keeping the geometry.
    pub fn with_kernels(mut self, kernels: Vec<Volume>) -> Result<Self> {
        let expected = Shape::square(self.input_shape.channels, self.kernel_size);
        if kernels.len() != self.kernels.len() {
            return Err(NetworkError::InvalidConfig(format!(
                "expected {} kernels, got {}",
                self.kernels.len(),
                kernels.len()
            )));
        }
        if let Some(bad) = kernels.iter().find(|k| Shape::of(k) != expected) {
            return Err(NetworkError::ShapeMismatch {
                expected,
                actual: Shape::of(bad),
            });
        }
        self.kernels = kernels;
        Ok(self)
    }

    pub fn with_activation(mut self, activation: ActivationType) -> Self {
        self.activation = activation;
        self
    }
}

impl Propagate for Conv2DLayer {
    type Input = Volume;
    type Output = Volume;

    fn forward(&mut self, input: &Volume, phase: &mut Phase<'_>) -> Volume {
        debug_assert_eq!(Shape::of(input), self.input_shape);

        let padded = tensor::pad(input, self.padding);
        let (k, stride) = (self.kernel_size, self.stride);
        let out = self.output_shape.height;

        let mut output = self.output_shape.zeros();
        for (filter, kernel) in self.kernels.iter().enumerate() {
            for oy in 0..out {
                for ox in 0..out {
                    let (y, x) = (oy * stride, ox * stride);
                    let window = padded.slice(s![.., y..y + k, x..x + k]);
                    let sum = Zip::from(&window).and(kernel).fold(0.0, |acc, &a, &w| acc + a * w);
                    output[[filter, oy, ox]] = self.activation.apply(sum);
                }
            }
        }

        if phase.is_training() {
            self.input_cache = Some(input.clone());
            self.output_cache = Some(output.clone());
        }
        output
    }

    fn backward(&mut self, grad_output: &Volume, optimizer: &Sgd) -> Result<Volume> {
        let input = self.input_cache.take().ok_or(NetworkError::MissingCache)?;
        let output = self.output_cache.take().ok_or(NetworkError::MissingCache)?;

        let activation = self.activation;
        let delta = Zip::from(grad_output)
            .and(&output)
            .map_collect(|&e, &y| e * activation.derivative_from_output(y));

        // A stride > 1 forward pass is undone by a stride-1 pass over the
        // zero-dilated delta.
        let delta = tensor::dilate(&delta, self.stride);
        let dilated = delta.dim().1;
        let (k, p) = (self.kernel_size, self.padding);
        let size = self.input_shape.height;

        // Full convolution of the delta with the flipped kernels, restricted
        // to the unpadded input region.
        let delta_padded = tensor::pad(&delta, k - 1);
        let mut grad_input = self.input_shape.zeros();
        for (filter, kernel) in self.kernels.iter().enumerate() {
            let flipped = tensor::flip(kernel);
            let delta_channel = delta_padded.index_axis(Axis(0), filter);
            for (channel, weights) in flipped.outer_iter().enumerate() {
                for y in 0..size {
                    for x in 0..size {
                        let window = delta_channel.slice(s![y + p..y + p + k, x + p..x + p + k]);
                        grad_input[[channel, y, x]] +=
                            Zip::from(&window).and(&weights).fold(0.0, |acc, &d, &w| acc + d * w);
                    }
                }
            }
        }

        let padded_input = tensor::pad(&input, p);
        for (filter, kernel) in self.kernels.iter_mut().enumerate() {
            let delta_channel = delta.index_axis(Axis(0), filter);
            let mut gradient = Volume::zeros(kernel.dim());
            for channel in 0..self.input_shape.channels {
                for u in 0..k {
                    for v in 0..k {
                        let window = padded_input.slice(s![channel, u..u + dilated, v..v + dilated]);
                        gradient[[channel, u, v]] =
                            Zip::from(&window).and(&delta_channel).fold(0.0, |acc, &a, &d| acc + a * d);
                    }
                }
            }
            optimizer.step(kernel.view_mut(), &gradient);
        }

        Ok(grad_input)
    }

    fn parameter_count(&self) -> usize {
        self.kernels.iter().map(|k| k.len()).sum()
    }
}
