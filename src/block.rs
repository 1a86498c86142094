use tracing::trace;

use crate::error::Result;
use crate::layers::{Layer, Phase, Signal};
use crate::optimizer::Sgd;
use crate::tensor::Shape;

/// An ordered run of layers with one shape descriptor per layer boundary.
///
/// `shapes[i]` is the input shape of `layers[i]`; the last entry is the
/// block's output shape. The burst multiplier and per-layer parallelism only
/// shape the offload hand-off; the CPU path ignores them.
#[derive(Debug, Clone)]
pub struct Block {
    layers: Vec<Layer>,
    shapes: Vec<Shape>,
    parallelism: Vec<usize>,
    burst_mult: usize,
}

impl Block {
    pub fn new(input_shape: Shape) -> Self {
        Block {
            layers: Vec::new(),
            shapes: vec![input_shape],
            parallelism: Vec::new(),
            burst_mult: 1,
        }
    }

    pub(crate) fn push(&mut self, layer: Layer) {
        self.shapes.push(layer.output_shape());
        self.layers.push(layer);
        self.parallelism.push(1);
    }

    pub(crate) fn set_parallelism(&mut self, layer: usize, parallelism: usize) {
        self.parallelism[layer] = parallelism;
    }

    pub(crate) fn set_burst_mult(&mut self, burst_mult: usize) {
        self.burst_mult = burst_mult;
    }

    pub(crate) fn last_layer_mut(&mut self) -> Option<&mut Layer> {
        self.layers.last_mut()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn input_shape(&self) -> Shape {
        self.shapes[0]
    }

    pub fn output_shape(&self) -> Shape {
        self.shapes[self.shapes.len() - 1]
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// How many channels (convolution) or output groups (fully-connected)
    /// each layer hands the accelerator at once.
    pub fn parallelism(&self) -> &[usize] {
        &self.parallelism
    }

    pub fn burst_mult(&self) -> usize {
        self.burst_mult
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    pub fn forward(&mut self, input: Signal, phase: &mut Phase<'_>) -> Result<Signal> {
        let mut signal = input;
        for (index, layer) in self.layers.iter_mut().enumerate() {
            signal = layer.forward(signal, phase)?;
            trace!(layer = index, kind = %layer.kind(), shape = %signal.shape(), "layer forward");
        }
        Ok(signal)
    }

    /// Walks the layers in reverse, updating each one in place, and returns
    /// the error with respect to the block input.
    pub fn backward(&mut self, grad_output: Signal, optimizer: &Sgd) -> Result<Signal> {
        let mut grad = grad_output;
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(grad, optimizer)?;
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Conv2DLayer, FeedForwardLayer, PoolLayer, PoolType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn mixed_block() -> Block {
        let mut rng = StdRng::seed_from_u64(1);
        let input = Shape::square(1, 6);
        let mut block = Block::new(input);
        block.push(Layer::Conv(Conv2DLayer::new(input, 2, 3, 1, 0, &mut rng).unwrap()));
        block.push(Layer::Pool(
            PoolLayer::new(Shape::square(2, 4), 2, 2, PoolType::Max).unwrap(),
        ));
        block.push(Layer::FullyConnected(FeedForwardLayer::new(8, 3, &mut rng).unwrap()));
        block
    }

    #[test]
    fn shapes_chain_across_layers() {
        let block = mixed_block();
        assert_eq!(
            block.shapes(),
            &[Shape::square(1, 6), Shape::square(2, 4), Shape::square(2, 2), Shape::flat(3)]
        );
        for (i, layer) in block.layers().iter().enumerate() {
            assert_eq!(layer.input_shape().len(), block.shapes()[i].len());
            assert_eq!(layer.output_shape(), block.shapes()[i + 1]);
        }
    }

    #[test]
    fn forward_flattens_at_fully_connected_transition() {
        let mut block = mixed_block();
        let input = Signal::Volume(Shape::square(1, 6).zeros());
        let output = block.forward(input, &mut Phase::Inference).unwrap();
        assert!(matches!(output, Signal::Flat(ref v) if v.len() == 3));
    }

    #[test]
    fn backward_restores_input_shape() {
        let mut block = mixed_block();
        let mut rng = StdRng::seed_from_u64(2);
        let input = Signal::Volume(Shape::square(1, 6).zeros() + 0.5);
        block.forward(input, &mut Phase::Training(&mut rng)).unwrap();
        let grad = block
            .backward(Signal::Flat(ndarray::Array1::ones(3)), &Sgd::new(0.01))
            .unwrap();
        assert_eq!(grad.shape(), Shape::square(1, 6));
    }
}
