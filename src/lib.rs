pub mod activation;
pub mod block;
pub mod builder;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hyperparameters;
pub mod layers;
pub mod loss;
pub mod models;
pub mod network;
pub mod offload;
pub mod optimizer;
pub mod tensor;
pub mod train;

pub use activation::ActivationType;
pub use block::Block;
pub use builder::NetworkBuilder;
pub use config::{load_config, parse_config, TrainingConfig};
pub use dataset::{one_hot, DataSource, DataSplit, InMemoryDataset};
pub use error::{NetworkError, Result};
pub use hyperparameters::Hyperparameters;
pub use layers::{Conv2DLayer, Dropout, FeedForwardLayer, Layer, LayerKind, Phase, PoolLayer, PoolType, Propagate, Signal};
pub use loss::Loss;
pub use network::Network;
pub use offload::{Accelerator, LayerDescriptor, OffloadComparison, OffloadSnapshot};
pub use optimizer::Sgd;
pub use tensor::{Shape, Vector, Volume};
pub use train::{StopReason, TrainingGoals, TrainingReport};
