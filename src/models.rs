//! Classic architectures, ready for hyperparameters and `build()`.
//!
//! Both allocate their full weight set while the layers are added, which runs
//! to hundreds of megabytes.

use crate::activation::ActivationType::{ReLU, Softmax};
use crate::builder::NetworkBuilder;
use crate::error::Result;
use crate::layers::PoolType::Max;
use crate::tensor::Shape;

pub const ALEXNET_INPUT: Shape = Shape {
    channels: 3,
    height: 227,
    width: 227,
};

pub const VGG16_INPUT: Shape = Shape {
    channels: 3,
    height: 224,
    width: 224,
};

pub fn alexnet() -> Result<NetworkBuilder> {
    alexnet_layers(NetworkBuilder::new(ALEXNET_INPUT))
}

pub fn alexnet_seeded(seed: u64) -> Result<NetworkBuilder> {
    alexnet_layers(NetworkBuilder::new(ALEXNET_INPUT).seed(seed))
}

pub fn vgg16() -> Result<NetworkBuilder> {
    vgg16_layers(NetworkBuilder::new(VGG16_INPUT))
}

pub fn vgg16_seeded(seed: u64) -> Result<NetworkBuilder> {
    vgg16_layers(NetworkBuilder::new(VGG16_INPUT).seed(seed))
}

fn alexnet_layers(builder: NetworkBuilder) -> Result<NetworkBuilder> {
    builder
        .add_block()?
        .add_conv(96, 11, 4, 0)?
        .add_activation(ReLU)?
        .add_pool(3, 2, Max)?
        .add_conv(256, 5, 1, 2)?
        .add_activation(ReLU)?
        .add_pool(3, 2, Max)?
        .add_block()?
        .add_conv(384, 3, 1, 1)?
        .add_activation(ReLU)?
        .add_conv(384, 3, 1, 1)?
        .add_activation(ReLU)?
        .add_conv(256, 3, 1, 1)?
        .add_pool(3, 2, Max)?
        .add_block()?
        .add_fully_connected(4096)?
        .add_activation(ReLU)?
        .add_dropout(0.5)?
        .add_fully_connected(4096)?
        .add_activation(ReLU)?
        .add_dropout(0.5)?
        .add_fully_connected(1000)?
        .add_dropout(0.5)?
        .add_activation(Softmax)
}

/// Burst multipliers for the five VGG16 blocks; each convolution block uses
/// the widest burst its output channels allow.
pub const VGG16_BURST_MULTS: [usize; 5] = [2048, 1024, 256, 64, 8];

fn vgg16_layers(builder: NetworkBuilder) -> Result<NetworkBuilder> {
    let mut builder = builder;
    for (convs, kernels) in [(2, 64), (2, 128), (3, 256), (3, 512)] {
        builder = builder.add_block()?;
        for _ in 0..convs {
            builder = builder.add_conv(kernels, 3, 1, 1)?.add_activation(ReLU)?;
        }
        builder = builder.add_pool(2, 2, Max)?;
    }
    builder = builder
        .add_block()?
        .add_fully_connected(4096)?
        .add_activation(ReLU)?
        .add_fully_connected(4096)?
        .add_activation(ReLU)?
        .add_fully_connected(1000)?
        .add_activation(Softmax)?;
    for (block, burst_mult) in VGG16_BURST_MULTS.into_iter().enumerate() {
        builder = builder.burst_mult(block, burst_mult)?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{Conv2DLayer, PoolLayer};

    #[test]
    fn alexnet_geometry_tiles_exactly() {
        let mut size = Conv2DLayer::output_size(ALEXNET_INPUT.height, 11, 4, 0).unwrap();
        assert_eq!(size, 55);
        size = PoolLayer::output_size(size, 3, 2).unwrap();
        assert_eq!(size, 27);
        size = Conv2DLayer::output_size(size, 5, 1, 2).unwrap();
        size = PoolLayer::output_size(size, 3, 2).unwrap();
        assert_eq!(size, 13);
        for _ in 0..3 {
            size = Conv2DLayer::output_size(size, 3, 1, 1).unwrap();
        }
        size = PoolLayer::output_size(size, 3, 2).unwrap();
        assert_eq!(size * size * 256, 9216);
    }

    #[test]
    #[ignore = "allocates the full AlexNet weight set"]
    fn alexnet_builds() {
        let network = alexnet_seeded(1).unwrap().build().unwrap();
        assert_eq!(network.input_shape(), ALEXNET_INPUT);
        assert_eq!(network.output_len(), 1000);
        assert_eq!(network.blocks().len(), 3);
    }

    #[test]
    #[ignore = "allocates the full VGG16 weight set"]
    fn vgg16_builds() {
        let network = vgg16_seeded(1).unwrap().build().unwrap();
        assert_eq!(network.output_len(), 1000);
        assert_eq!(network.blocks().len(), 5);
        assert_eq!(network.blocks()[4].input_shape(), Shape::square(512, 14));
        let burst_mults: Vec<usize> = network.blocks().iter().map(|b| b.burst_mult()).collect();
        assert_eq!(burst_mults, VGG16_BURST_MULTS);
    }
}
