pub mod conv2d;
pub mod dropout;
pub mod feed_forward;
pub mod pool;

use std::fmt::{self, Debug};

use rand::rngs::StdRng;

use crate::activation::ActivationType;
use crate::error::Result;
use crate::optimizer::Sgd;
use crate::tensor::{self, Shape, Vector, Volume};

pub use conv2d::Conv2DLayer;
pub use dropout::Dropout;
pub use feed_forward::FeedForwardLayer;
pub use pool::{PoolLayer, PoolType};

/// Fresh weights are drawn uniformly from `[-WEIGHT_INIT_RANGE, WEIGHT_INIT_RANGE]`.
pub const WEIGHT_INIT_RANGE: f64 = 0.05;

/// Whether a forward pass is part of training.
///
/// Training passes cache what backward needs and draw dropout masks from the
/// borrowed generator.
pub enum Phase<'a> {
    Inference,
    Training(&'a mut StdRng),
}

impl Phase<'_> {
    pub fn is_training(&self) -> bool {
        matches!(self, Phase::Training(_))
    }
}

/// Forward/backward kernels of one layer kind.
pub trait Propagate: Debug {
    type Input;
    type Output;

    fn forward(&mut self, input: &Self::Input, phase: &mut Phase<'_>) -> Self::Output;

    /// Consumes the cache of the last training forward, updates this layer's
    /// weights in place and returns the error for the previous layer.
    fn backward(&mut self, grad_output: &Self::Output, optimizer: &Sgd) -> Result<Self::Input>;

    fn parameter_count(&self) -> usize;
}

/// Data travelling between layers of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Volume(Volume),
    Flat(Vector),
}

impl Signal {
    pub fn shape(&self) -> Shape {
        match self {
            Signal::Volume(v) => Shape::of(v),
            Signal::Flat(v) => Shape::flat(v.len()),
        }
    }

    pub fn into_flat(self) -> Vector {
        match self {
            Signal::Volume(v) => tensor::flatten(&v),
            Signal::Flat(v) => v,
        }
    }

    pub fn into_volume(self, shape: Shape) -> Result<Volume> {
        match self {
            Signal::Volume(v) => Ok(v),
            Signal::Flat(v) => tensor::unflatten(&v, shape),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Conv,
    Pool,
    FullyConnected,
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Conv => write!(f, "Conv"),
            LayerKind::Pool => write!(f, "Pool"),
            LayerKind::FullyConnected => write!(f, "Fcon"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2DLayer),
    Pool(PoolLayer),
    FullyConnected(FeedForwardLayer),
}

impl Layer {
    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Conv(_) => LayerKind::Conv,
            Layer::Pool(_) => LayerKind::Pool,
            Layer::FullyConnected(_) => LayerKind::FullyConnected,
        }
    }

    pub fn activation(&self) -> ActivationType {
        match self {
            Layer::Conv(l) => l.activation,
            Layer::Pool(l) => l.activation,
            Layer::FullyConnected(l) => l.activation,
        }
    }

    pub(crate) fn set_activation(&mut self, activation: ActivationType) {
        match self {
            Layer::Conv(l) => l.activation = activation,
            Layer::Pool(l) => l.activation = activation,
            Layer::FullyConnected(l) => l.activation = activation,
        }
    }

    pub fn input_shape(&self) -> Shape {
        match self {
            Layer::Conv(l) => l.input_shape,
            Layer::Pool(l) => l.input_shape,
            Layer::FullyConnected(l) => Shape::flat(l.inputs()),
        }
    }

    pub fn output_shape(&self) -> Shape {
        match self {
            Layer::Conv(l) => l.output_shape,
            Layer::Pool(l) => l.output_shape,
            Layer::FullyConnected(l) => Shape::flat(l.outputs()),
        }
    }

    pub fn parameter_count(&self) -> usize {
        match self {
            Layer::Conv(l) => l.parameter_count(),
            Layer::Pool(l) => l.parameter_count(),
            Layer::FullyConnected(l) => l.parameter_count(),
        }
    }

    pub fn forward(&mut self, input: Signal, phase: &mut Phase<'_>) -> Result<Signal> {
        let output = match self {
            Layer::Conv(l) => {
                let volume = input.into_volume(l.input_shape)?;
                Signal::Volume(l.forward(&volume, phase))
            }
            Layer::Pool(l) => {
                let volume = input.into_volume(l.input_shape)?;
                Signal::Volume(l.forward(&volume, phase))
            }
            Layer::FullyConnected(l) => Signal::Flat(l.forward(&input.into_flat(), phase)),
        };
        Ok(output)
    }

    pub fn backward(&mut self, grad_output: Signal, optimizer: &Sgd) -> Result<Signal> {
        let grad_input = match self {
            Layer::Conv(l) => {
                let grad = grad_output.into_volume(l.output_shape)?;
                Signal::Volume(l.backward(&grad, optimizer)?)
            }
            Layer::Pool(l) => {
                let grad = grad_output.into_volume(l.output_shape)?;
                Signal::Volume(l.backward(&grad, optimizer)?)
            }
            Layer::FullyConnected(l) => Signal::Flat(l.backward(&grad_output.into_flat(), optimizer)?),
        };
        Ok(grad_input)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Conv(l) => write!(
                f,
                "Conv  {}, {}x{}, {}, {}, {}",
                l.kernels.len(),
                l.kernel_size,
                l.kernel_size,
                l.stride,
                l.padding,
                l.activation.name()
            ),
            Layer::Pool(l) => write!(
                f,
                "Pool  {}x{}, {}, {}, {}",
                l.window,
                l.window,
                l.stride,
                l.pool_type,
                l.activation.name()
            ),
            Layer::FullyConnected(l) => write!(
                f,
                "Fcon  {}, {:.2}",
                l.activation.name(),
                l.dropout.as_ref().map_or(0.0, Dropout::probability)
            ),
        }
    }
}
