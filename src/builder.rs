use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::activation::ActivationType;
use crate::block::Block;
use crate::error::{NetworkError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::layers::{Conv2DLayer, Dropout, FeedForwardLayer, Layer, LayerKind, PoolLayer, PoolType};
use crate::loss::Loss;
use crate::network::Network;
use crate::offload::BURST_SIZE_DOUBLES;
use crate::tensor::Shape;

const ANY_LAYER: &str = "add_conv, add_pool or add_fully_connected";

/// Fully-connected weights stop fitting in accelerator memory past this.
const MAX_FULLY_CONNECTED_BURST_MULT: usize = 8;

/// Checks a burst multiplier against every layer already in `block`.
fn check_burst_mult(index: usize, block: &Block, burst_mult: usize) -> Result<()> {
    if burst_mult < 1 {
        return Err(NetworkError::construction(index, 0, "burst multiplier must be at least 1"));
    }
    let burst = burst_mult * BURST_SIZE_DOUBLES;
    for (l, layer) in block.layers().iter().enumerate() {
        match layer {
            Layer::Conv(_) => {
                let output = block.shapes()[l + 1];
                let limit = 2 * output.height * output.width;
                if burst >= limit {
                    return Err(NetworkError::construction(
                        index,
                        l,
                        format!("burst of {burst} doubles must stay below two {}x{} output channels ({limit})", output.height, output.width),
                    ));
                }
            }
            Layer::FullyConnected(_) => {
                if burst_mult > MAX_FULLY_CONNECTED_BURST_MULT {
                    return Err(NetworkError::construction(
                        index,
                        l,
                        format!("blocks with fully-connected layers allow a burst multiplier of at most {MAX_FULLY_CONNECTED_BURST_MULT}"),
                    ));
                }
                let parallelism = block.parallelism()[l];
                if parallelism > burst / 2 {
                    return Err(NetworkError::construction(
                        index,
                        l,
                        format!("parallelism {parallelism} exceeds half a burst ({})", burst / 2),
                    ));
                }
            }
            Layer::Pool(_) => {}
        }
    }
    Ok(())
}

/// Incremental network construction.
///
/// Every `add_*` call validates geometry and ordering against what has been
/// added so far and hands the builder back on success:
///
/// ```
/// use cnn_engine::{ActivationType, NetworkBuilder, PoolType, Shape};
///
/// let network = NetworkBuilder::new(Shape::square(1, 28))
///     .seed(7)
///     .add_block()?
///     .add_conv(4, 5, 1, 0)?
///     .add_activation(ActivationType::ReLU)?
///     .add_pool(2, 2, PoolType::Max)?
///     .add_block()?
///     .add_fully_connected(10)?
///     .add_activation(ActivationType::Softmax)?
///     .build()?;
/// assert_eq!(network.output_len(), 10);
/// # Ok::<(), cnn_engine::NetworkError>(())
/// ```
#[derive(Debug)]
pub struct NetworkBuilder {
    input_shape: Shape,
    blocks: Vec<Block>,
    current: Option<Block>,
    hyperparameters: Hyperparameters,
    rng: StdRng,
    seen_fully_connected: bool,
    activation_attached: bool,
    finalized: bool,
}

impl NetworkBuilder {
    /// Starts a network whose inputs have `input_shape`. Weights are drawn
    /// from an entropy-seeded generator unless [`NetworkBuilder::seed`] is
    /// called first.
    pub fn new(input_shape: Shape) -> Self {
        debug!(input = %input_shape, "network init");
        NetworkBuilder {
            input_shape,
            blocks: Vec::new(),
            current: None,
            hyperparameters: Hyperparameters::default(),
            rng: StdRng::from_os_rng(),
            seen_fully_connected: false,
            activation_attached: false,
            finalized: false,
        }
    }

    /// Reseeds the generator used by every later layer, dropout mask and
    /// minibatch draw.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.hyperparameters.batch_size = batch_size;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.hyperparameters.learning_rate = learning_rate;
        self
    }

    pub fn momentum(mut self, momentum: f64) -> Self {
        self.hyperparameters.momentum = momentum;
        self
    }

    pub fn loss(mut self, loss: Loss) -> Self {
        self.hyperparameters.loss = loss;
        self
    }

    fn running_shape(&self) -> Shape {
        match (&self.current, self.blocks.last()) {
            (Some(block), _) => block.output_shape(),
            (None, Some(block)) => block.output_shape(),
            (None, None) => self.input_shape,
        }
    }

    /// Index of the current block and of the next layer to be added to it.
    fn position(&self) -> (usize, usize) {
        (self.blocks.len(), self.current.as_ref().map_or(0, Block::len))
    }

    fn ensure_open(&self, call: &'static str) -> Result<()> {
        if self.finalized {
            return Err(NetworkError::Finalized);
        }
        if self.current.is_none() {
            return Err(NetworkError::Precedence {
                call,
                required: "add_block",
            });
        }
        Ok(())
    }

    fn append(mut self, call: &'static str, layer: Layer) -> Result<Self> {
        let (block, index) = self.position();
        debug!(block, layer = index, "{call}: {layer}");
        self.current
            .as_mut()
            .ok_or(NetworkError::Precedence {
                call,
                required: "add_block",
            })?
            .push(layer);
        self.activation_attached = false;
        Ok(self)
    }

    /// Closes the current block, if any, and opens a new one fed by its output.
    pub fn add_block(mut self) -> Result<Self> {
        if self.finalized {
            return Err(NetworkError::Finalized);
        }
        if let Some(block) = self.current.take() {
            if block.is_empty() {
                return Err(NetworkError::construction(self.blocks.len(), 0, "block has no layers"));
            }
            self.blocks.push(block);
        }
        let input = self.running_shape();
        debug!(block = self.blocks.len(), input = %input, "add_block");
        self.current = Some(Block::new(input));
        Ok(self)
    }

    /// Appends a convolution with `kernels` output channels.
    pub fn add_conv(mut self, kernels: usize, kernel_size: usize, stride: usize, padding: usize) -> Result<Self> {
        self.ensure_open("add_conv")?;
        let (b, l) = self.position();
        if self.seen_fully_connected {
            return Err(NetworkError::construction(b, l, "convolution after a fully-connected layer"));
        }
        if kernels < 1 {
            return Err(NetworkError::construction(b, l, "convolution needs at least one kernel"));
        }
        if kernel_size < 2 {
            return Err(NetworkError::construction(b, l, "kernel size must be at least 2"));
        }
        if stride < 1 {
            return Err(NetworkError::construction(b, l, "stride must be at least 1"));
        }
        let input = self.running_shape();
        if input.height != input.width {
            return Err(NetworkError::construction(b, l, format!("convolution over non-square input {input}")));
        }
        let padded = input.height + 2 * padding;
        if kernel_size > padded {
            return Err(NetworkError::construction(
                b,
                l,
                format!("kernel size {kernel_size} exceeds padded input {padded}"),
            ));
        }
        if (padded - kernel_size) % stride != 0 {
            return Err(NetworkError::construction(
                b,
                l,
                format!("(H - K + 2P) % S != 0 for H={}, K={kernel_size}, P={padding}, S={stride}", input.height),
            ));
        }

        let conv = Conv2DLayer::new(input, kernels, kernel_size, stride, padding, &mut self.rng)?;
        self.append("add_conv", Layer::Conv(conv))
    }

    pub fn add_pool(self, window: usize, stride: usize, pool_type: PoolType) -> Result<Self> {
        self.ensure_open("add_pool")?;
        let (b, l) = self.position();
        if self.seen_fully_connected {
            return Err(NetworkError::construction(b, l, "pooling after a fully-connected layer"));
        }
        if window < 2 {
            return Err(NetworkError::construction(b, l, "pooling window must be at least 2"));
        }
        if stride < 1 {
            return Err(NetworkError::construction(b, l, "stride must be at least 1"));
        }
        let input = self.running_shape();
        if input.height != input.width {
            return Err(NetworkError::construction(b, l, format!("pooling over non-square input {input}")));
        }
        if window > input.height {
            return Err(NetworkError::construction(
                b,
                l,
                format!("window {window} exceeds input {}", input.height),
            ));
        }
        if (input.height - window) % stride != 0 {
            return Err(NetworkError::construction(
                b,
                l,
                format!("(H - F) % S != 0 for H={}, F={window}, S={stride}", input.height),
            ));
        }

        let pool = PoolLayer::new(input, window, stride, pool_type)?;
        self.append("add_pool", Layer::Pool(pool))
    }

    pub fn add_fully_connected(mut self, outputs: usize) -> Result<Self> {
        self.ensure_open("add_fully_connected")?;
        let (b, l) = self.position();
        if outputs < 1 {
            return Err(NetworkError::construction(b, l, "fully-connected layer needs at least one output"));
        }
        let inputs = self.running_shape().len();
        let fc = FeedForwardLayer::new(inputs, outputs, &mut self.rng)?;
        self.seen_fully_connected = true;
        self.append("add_fully_connected", Layer::FullyConnected(fc))
    }

    /// Sets the activation of the most recent layer. Softmax is only allowed
    /// on a fully-connected layer and ends the network.
    pub fn add_activation(mut self, activation: ActivationType) -> Result<Self> {
        self.ensure_open("add_activation")?;
        let (b, next) = self.position();
        let attached = self.activation_attached;
        let layer = self
            .current
            .as_mut()
            .and_then(Block::last_layer_mut)
            .ok_or(NetworkError::Precedence {
                call: "add_activation",
                required: ANY_LAYER,
            })?;
        let l = next - 1;
        if attached {
            return Err(NetworkError::Repeat {
                block: b,
                layer: l,
                what: "activation",
            });
        }
        if activation == ActivationType::Softmax && layer.kind() != LayerKind::FullyConnected {
            return Err(NetworkError::construction(
                b,
                l,
                format!("softmax on a {} layer", layer.kind()),
            ));
        }

        layer.set_activation(activation);
        self.activation_attached = true;
        debug!(block = b, layer = l, activation = activation.name(), "add_activation");
        if activation == ActivationType::Softmax {
            self.finalized = true;
        }
        Ok(self)
    }

    pub fn add_dropout(mut self, probability: f64) -> Result<Self> {
        self.ensure_open("add_dropout")?;
        let (b, next) = self.position();
        let layer = self
            .current
            .as_mut()
            .and_then(Block::last_layer_mut)
            .ok_or(NetworkError::Precedence {
                call: "add_dropout",
                required: "add_fully_connected",
            })?;
        let l = next - 1;
        let kind = layer.kind();
        let Layer::FullyConnected(fc) = layer else {
            return Err(NetworkError::construction(b, l, format!("dropout on a {kind} layer")));
        };
        if fc.dropout.is_some() {
            return Err(NetworkError::Repeat {
                block: b,
                layer: l,
                what: "dropout",
            });
        }
        let dropout = Dropout::new(probability).map_err(|e| NetworkError::construction(b, l, e.to_string()))?;
        fc.dropout = Some(dropout);
        debug!(block = b, layer = l, probability, "add_dropout");
        Ok(self)
    }

    /// Sets how many input channels (convolution) or output groups
    /// (fully-connected) the most recent layer hands the accelerator at once.
    /// Pooling always runs at 1.
    pub fn parallelism(mut self, parallelism: usize) -> Result<Self> {
        self.ensure_open("parallelism")?;
        let (b, next) = self.position();
        let block = self.current.as_mut().ok_or(NetworkError::Precedence {
            call: "parallelism",
            required: "add_block",
        })?;
        let Some(l) = next.checked_sub(1) else {
            return Err(NetworkError::Precedence {
                call: "parallelism",
                required: "add_conv or add_fully_connected",
            });
        };
        if parallelism < 1 {
            return Err(NetworkError::construction(b, l, "parallelism must be at least 1"));
        }
        match &block.layers()[l] {
            Layer::Conv(_) => {
                let channels = block.shapes()[l].channels;
                if channels % parallelism != 0 {
                    return Err(NetworkError::construction(
                        b,
                        l,
                        format!("{channels} input channels do not divide into parallelism {parallelism}"),
                    ));
                }
            }
            Layer::FullyConnected(_) => {
                let half_burst = block.burst_mult() * BURST_SIZE_DOUBLES / 2;
                if parallelism > half_burst {
                    return Err(NetworkError::construction(
                        b,
                        l,
                        format!("parallelism {parallelism} exceeds half a burst ({half_burst})"),
                    ));
                }
            }
            Layer::Pool(_) => {
                return Err(NetworkError::construction(b, l, "pooling runs with parallelism 1"));
            }
        }
        block.set_parallelism(l, parallelism);
        debug!(block = b, layer = l, parallelism, "parallelism");
        Ok(self)
    }

    /// Sets the burst multiplier of block `block`, which may be the one still
    /// being filled. Every block starts at 1. Allowed after the network is
    /// finalized.
    pub fn burst_mult(mut self, block: usize, burst_mult: usize) -> Result<Self> {
        let closed = self.blocks.len();
        let target = if block < closed {
            &mut self.blocks[block]
        } else if block == closed {
            self.current.as_mut().ok_or(NetworkError::Precedence {
                call: "burst_mult",
                required: "add_block",
            })?
        } else {
            return Err(NetworkError::construction(block, 0, "no such block"));
        };
        check_burst_mult(block, target, burst_mult)?;
        target.set_burst_mult(burst_mult);
        debug!(block, burst_mult, "burst_mult");
        Ok(self)
    }

    pub fn build(mut self) -> Result<Network> {
        match self.current.take() {
            Some(block) if block.is_empty() => {
                return Err(NetworkError::construction(self.blocks.len(), 0, "block has no layers"));
            }
            Some(block) => self.blocks.push(block),
            None => {}
        }
        if self.blocks.is_empty() {
            return Err(NetworkError::Precedence {
                call: "build",
                required: "add_block",
            });
        }
        if self.hyperparameters.batch_size == 0 {
            return Err(NetworkError::InvalidConfig("batch size must be positive".into()));
        }

        let network = Network::from_parts(self.blocks, self.hyperparameters, self.rng);
        debug!(
            blocks = network.blocks().len(),
            parameters = network.parameter_count(),
            "network built"
        );
        Ok(network)
    }
}
