//! Hand-off of a network's layout and weights to an external accelerator.
//!
//! The snapshot mirrors the CPU layout exactly; device memory is carved into
//! bursts, so every per-layer buffer is padded to a whole number of them.
//! Scheduling and execution belong to the [`Accelerator`] implementation.

use std::mem;

use bytemuck::{Pod, Zeroable};
use ndarray::Array1;
use tracing::{debug, warn};

use crate::activation::ActivationType;
use crate::error::{NetworkError, Result};
use crate::layers::{Layer, LayerKind, PoolType};
use crate::network::Network;
use crate::tensor::{self, Volume};

pub const BURST_SIZE_BYTES: usize = 192;
pub const BURST_SIZE_DOUBLES: usize = BURST_SIZE_BYTES / mem::size_of::<f64>();

/// Fixed-layout description of one layer, in the order layers run.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LayerDescriptor {
    /// 1 convolution, 2 pooling, 3 fully-connected
    pub kind: u32,
    /// 0 none, 1 ReLU, 2 sigmoid, 3 tanh, 4 softmax
    pub activation: u32,
    /// Burst multiplier of the owning block
    pub burst_mult: u32,
    pub parallelism: u32,
    pub in_channels: u32,
    pub in_size: u32,
    pub out_channels: u32,
    pub out_size: u32,
    /// Kernel or window size; 0 for fully-connected layers
    pub kernel_size: u32,
    pub stride: u32,
    pub padding: u32,
    /// 1 max, 2 mean; 0 for other layers
    pub pool_type: u32,
    pub dropout: f32,
}

fn activation_code(activation: ActivationType) -> u32 {
    match activation {
        ActivationType::Linear => 0,
        ActivationType::ReLU => 1,
        ActivationType::Sigmoid => 2,
        ActivationType::Tanh => 3,
        ActivationType::Softmax => 4,
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| NetworkError::Offload(format!("{what} {value} does not fit in 32 bits")))
}

/// Rounds `len` doubles up to a whole number of `burst_mult` bursts.
pub fn burst_aligned(len: usize, burst_mult: usize) -> usize {
    let burst = burst_mult * BURST_SIZE_DOUBLES;
    len.div_ceil(burst) * burst
}

#[derive(Debug, Clone, PartialEq)]
pub struct OffloadSnapshot {
    pub descriptors: Vec<LayerDescriptor>,
    /// Number of descriptors belonging to each block.
    pub block_sizes: Vec<usize>,
    pub burst_mults: Vec<usize>,
    /// All weights, each layer's run starting at its `weight_offsets` entry
    /// (in doubles) and zero-padded to whole bursts of its block.
    pub weights: Vec<f64>,
    pub weight_offsets: Vec<usize>,
    /// Byte offset of each block's input in device memory.
    pub input_offsets: Vec<usize>,
}

impl OffloadSnapshot {
    pub fn capture(network: &Network) -> Result<Self> {
        let mut descriptors = Vec::new();
        let mut block_sizes = Vec::with_capacity(network.blocks().len());
        let mut burst_mults = Vec::with_capacity(network.blocks().len());
        let mut weights = Vec::new();
        let mut weight_offsets = Vec::new();
        let mut input_offsets = Vec::with_capacity(network.blocks().len());
        let mut offset = 0;

        for block in network.blocks() {
            let burst_mult = block.burst_mult();
            input_offsets.push(offset);
            block_sizes.push(block.len());
            burst_mults.push(burst_mult);

            for (index, layer) in block.layers().iter().enumerate() {
                let input = block.shapes()[index];
                let output = block.shapes()[index + 1];

                // Activations of every layer boundary live in device memory;
                // pooling keeps its mask next to them.
                let mut footprint = burst_aligned(input.len(), burst_mult) * mem::size_of::<f64>();
                if let Layer::Pool(_) = layer {
                    footprint *= 2;
                }
                offset += footprint;

                // Fully-connected layers see their input as one flat vector.
                let ((in_channels, in_size), (out_channels, out_size)) = match layer {
                    Layer::FullyConnected(_) => ((1, input.len()), (1, output.len())),
                    _ => ((input.channels, input.height), (output.channels, output.height)),
                };

                let (kernel_size, stride, padding, pool_type, dropout, flat) = match layer {
                    Layer::Conv(conv) => {
                        let flat: Vec<f64> = conv.kernels.iter().flat_map(|k| k.iter().copied()).collect();
                        (conv.kernel_size, conv.stride, conv.padding, 0, 0.0, flat)
                    }
                    Layer::Pool(pool) => {
                        let code = match pool.pool_type {
                            PoolType::Max => 1,
                            PoolType::Mean => 2,
                        };
                        (pool.window, pool.stride, 0, code, 0.0, Vec::new())
                    }
                    Layer::FullyConnected(fc) => {
                        let p = fc.dropout.as_ref().map_or(0.0, |d| d.probability());
                        (0, 0, 0, 0, p as f32, fc.weights.iter().copied().collect())
                    }
                };

                weight_offsets.push(weights.len());
                if !flat.is_empty() {
                    let padded = burst_aligned(flat.len(), burst_mult);
                    weights.extend_from_slice(&flat);
                    weights.resize(weights.len() + padded - flat.len(), 0.0);
                }

                descriptors.push(LayerDescriptor {
                    kind: match layer.kind() {
                        LayerKind::Conv => 1,
                        LayerKind::Pool => 2,
                        LayerKind::FullyConnected => 3,
                    },
                    activation: activation_code(layer.activation()),
                    burst_mult: to_u32(burst_mult, "burst multiplier")?,
                    parallelism: to_u32(block.parallelism()[index], "parallelism")?,
                    in_channels: to_u32(in_channels, "input channels")?,
                    in_size: to_u32(in_size, "input size")?,
                    out_channels: to_u32(out_channels, "output channels")?,
                    out_size: to_u32(out_size, "output size")?,
                    kernel_size: to_u32(kernel_size, "kernel size")?,
                    stride: to_u32(stride, "stride")?,
                    padding: to_u32(padding, "padding")?,
                    pool_type,
                    dropout,
                });
            }
        }

        debug!(
            layers = descriptors.len(),
            weight_doubles = weights.len(),
            "offload snapshot captured"
        );
        Ok(OffloadSnapshot {
            descriptors,
            block_sizes,
            burst_mults,
            weights,
            weight_offsets,
            input_offsets,
        })
    }

    pub fn descriptor_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.descriptors)
    }

    pub fn weight_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.weights)
    }
}

/// An external device that runs the forward pass described by a snapshot.
pub trait Accelerator {
    fn forward(&mut self, snapshot: &OffloadSnapshot, input: &Volume) -> Result<Array1<f64>>;
}

/// CPU and accelerator outputs for the same input.
#[derive(Debug, Clone, PartialEq)]
pub struct OffloadComparison {
    pub cpu: Array1<f64>,
    pub accelerator: Array1<f64>,
    /// Output indices that differ by more than the requested margin.
    pub mismatches: Vec<usize>,
}

impl OffloadComparison {
    pub fn matches(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl Network {
    /// Runs `input` through both the CPU kernels and `accelerator` and reports
    /// where the outputs disagree. Nothing here feeds back into the network.
    pub fn validate_offload<A: Accelerator + ?Sized>(
        &mut self,
        accelerator: &mut A,
        input: &Volume,
        margin: f64,
    ) -> Result<OffloadComparison> {
        let snapshot = OffloadSnapshot::capture(self)?;
        let cpu = self.forward(input)?;
        let accelerator = accelerator.forward(&snapshot, input)?;
        let mismatches = tensor::compare(&cpu, &accelerator, margin);
        if !mismatches.is_empty() {
            warn!(count = mismatches.len(), margin, "accelerator output differs from CPU");
        }
        Ok(OffloadComparison {
            cpu,
            accelerator,
            mismatches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_constants() {
        assert_eq!(BURST_SIZE_DOUBLES, 24);
        assert_eq!(mem::size_of::<LayerDescriptor>(), 52);
    }

    #[test]
    fn alignment_rounds_up_to_whole_bursts() {
        assert_eq!(burst_aligned(1, 1), 24);
        assert_eq!(burst_aligned(24, 1), 24);
        assert_eq!(burst_aligned(25, 1), 48);
        assert_eq!(burst_aligned(25, 2), 48);
        assert_eq!(burst_aligned(49, 2), 96);
        assert_eq!(burst_aligned(0, 3), 0);
    }
}
