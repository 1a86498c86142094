use approx::assert_abs_diff_eq;
use cnn_engine::{
    ActivationType, Layer, Loss, NetworkBuilder, NetworkError, PoolType, Shape, Volume,
};
use ndarray::Array1;

fn small_network(seed: u64) -> cnn_engine::Network {
    NetworkBuilder::new(Shape::square(1, 8))
        .seed(seed)
        .learning_rate(0.05)
        .add_block()
        .unwrap()
        .add_conv(3, 3, 1, 1)
        .unwrap()
        .add_activation(ActivationType::ReLU)
        .unwrap()
        .add_pool(2, 2, PoolType::Max)
        .unwrap()
        .add_block()
        .unwrap()
        .add_fully_connected(12)
        .unwrap()
        .add_activation(ActivationType::Tanh)
        .unwrap()
        .add_fully_connected(4)
        .unwrap()
        .add_activation(ActivationType::Softmax)
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_block_shapes_chain() {
    let network = small_network(1);
    assert_eq!(network.input_shape(), Shape::square(1, 8));
    assert_eq!(network.output_len(), 4);

    let blocks = network.blocks();
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].output_shape(), Shape::square(3, 4));
    assert_eq!(blocks[1].input_shape(), blocks[0].output_shape());
    for block in blocks {
        assert_eq!(block.shapes().len(), block.len() + 1);
        for (i, layer) in block.layers().iter().enumerate() {
            assert_eq!(layer.output_shape(), block.shapes()[i + 1]);
        }
    }
}

#[test]
fn test_parameter_count() {
    let network = small_network(1);
    let conv = 3 * 3 * 3;
    let fc = 48 * 12 + 12 * 4;
    assert_eq!(network.parameter_count(), conv + fc);
}

#[test]
fn test_forward_is_a_distribution() {
    let mut network = small_network(2);
    let input = Volume::from_shape_fn((1, 8, 8), |(_, y, x)| ((y * 8 + x) as f64).sin() * 500.0);
    let output = network.forward(&input).unwrap();
    assert_eq!(output.len(), 4);
    assert!(output.iter().all(|&p| p >= 0.0));
    assert_abs_diff_eq!(output.sum(), 1.0, epsilon = 1e-9);
    assert!(network.classify(&input).unwrap() < 4);
}

#[test]
fn test_same_seed_same_network() {
    let input = Volume::from_elem((1, 8, 8), 0.3);
    let a = small_network(9).forward(&input).unwrap();
    let b = small_network(9).forward(&input).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_inference_input_shape_checked() {
    let mut network = small_network(3);
    let err = network.forward(&Volume::zeros((1, 7, 7))).unwrap_err();
    assert!(matches!(err, NetworkError::ShapeMismatch { .. }));
}

#[test]
fn test_train_step_reduces_loss_on_one_sample() {
    let mut network = small_network(4);
    let input = Volume::from_shape_fn((1, 8, 8), |(_, y, x)| if (x + y) % 3 == 0 { 1.0 } else { 0.0 });
    let label = Array1::from(vec![0.0, 0.0, 1.0, 0.0]);

    let before = Loss::CrossEntropy.calculate(&network.forward(&input).unwrap(), &label);
    for _ in 0..20 {
        network.train_step(&input, &label).unwrap();
    }
    let after = Loss::CrossEntropy.calculate(&network.forward(&input).unwrap(), &label);
    assert!(after < before, "loss went from {before} to {after}");
}

#[test]
fn test_backward_without_training_forward_fails() {
    let mut network = small_network(5);
    let prediction = Array1::from_elem(4, 0.25);
    let label = Array1::from(vec![1.0, 0.0, 0.0, 0.0]);
    assert!(matches!(
        network.backward(&prediction, &label),
        Err(NetworkError::MissingCache)
    ));
}

#[test]
fn test_label_length_checked() {
    let mut network = small_network(6);
    let input = Volume::zeros((1, 8, 8));
    let err = network.train_step(&input, &Array1::zeros(3)).unwrap_err();
    assert!(matches!(err, NetworkError::ShapeMismatch { .. }));
}

#[test]
fn test_accuracy_is_a_percentage() {
    let mut network = small_network(7);
    let inputs = vec![Volume::zeros((1, 8, 8)); 4];
    let predicted = network.classify(&inputs[0]).unwrap();
    let mut right = Array1::zeros(4);
    right[predicted] = 1.0;
    let mut wrong = Array1::zeros(4);
    wrong[(predicted + 1) % 4] = 1.0;
    let labels = vec![right.clone(), right, wrong.clone(), wrong];

    assert_abs_diff_eq!(network.test_accuracy(&inputs, &labels).unwrap(), 50.0, epsilon = 1e-12);
    assert!(matches!(
        network.test_accuracy(&inputs, &labels[..3]),
        Err(NetworkError::LabelMismatch { .. })
    ));
    assert!(matches!(network.test_accuracy(&[], &[]), Err(NetworkError::EmptyDataset)));
}

#[test]
fn test_setters_update_hyperparameters() {
    let mut network = small_network(8);
    network.set_batch_size(7);
    network.set_learning_rate(0.2);
    network.set_momentum(0.9);
    network.set_loss(Loss::MeanSquaredError);
    let hp = network.hyperparameters();
    assert_eq!(hp.batch_size, 7);
    assert_eq!(hp.learning_rate, 0.2);
    assert_eq!(hp.momentum, 0.9);
    assert_eq!(hp.loss, Loss::MeanSquaredError);
}

#[test]
fn test_display_lists_layers() {
    let summary = small_network(1).to_string();
    assert!(summary.contains("Conv  3, 3x3, 1, 1, ReLU"));
    assert!(summary.contains("Pool  2x2, 2, Max, None"));
    assert!(summary.contains("Fcon  Soft"));
    assert!(summary.contains("3x4x4"));
}

#[test]
fn test_conv_after_fully_connected_rejected() {
    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_fully_connected(16)
        .unwrap()
        .add_block()
        .unwrap();
    assert!(matches!(
        builder.add_conv(2, 2, 1, 0),
        Err(NetworkError::Construction { block: 1, layer: 0, .. })
    ));

    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_fully_connected(16)
        .unwrap();
    assert!(matches!(
        builder.add_pool(2, 2, PoolType::Mean),
        Err(NetworkError::Construction { block: 0, layer: 1, .. })
    ));
}

#[test]
fn test_dropout_only_on_fully_connected() {
    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_conv(2, 3, 1, 0)
        .unwrap();
    assert!(matches!(
        builder.add_dropout(0.5),
        Err(NetworkError::Construction { block: 0, layer: 0, .. })
    ));

    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_fully_connected(4)
        .unwrap()
        .add_dropout(0.5)
        .unwrap();
    assert!(matches!(
        builder.add_dropout(0.2),
        Err(NetworkError::Repeat { what: "dropout", .. })
    ));

    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_fully_connected(4)
        .unwrap();
    assert!(builder.add_dropout(1.5).is_err());
}

#[test]
fn test_softmax_only_on_fully_connected() {
    let builder = NetworkBuilder::new(Shape::square(1, 8))
        .seed(1)
        .add_block()
        .unwrap()
        .add_pool(2, 2, PoolType::Max)
        .unwrap();
    assert!(matches!(
        builder.add_activation(ActivationType::Softmax),
        Err(NetworkError::Construction { .. })
    ));
}

#[test]
fn test_activation_before_any_layer() {
    let builder = NetworkBuilder::new(Shape::square(1, 8)).add_block().unwrap();
    assert!(matches!(
        builder.add_activation(ActivationType::ReLU),
        Err(NetworkError::Precedence { call: "add_activation", .. })
    ));
}

#[test]
fn test_network_ending_in_volume_flattens_output() {
    let mut network = NetworkBuilder::new(Shape::square(2, 4))
        .seed(3)
        .add_block()
        .unwrap()
        .add_pool(2, 2, PoolType::Mean)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(network.output_len(), 8);
    let output = network.forward(&Volume::ones((2, 4, 4))).unwrap();
    assert_eq!(output.len(), 8);
    assert!(output.iter().all(|&v| v == 1.0));
    assert!(matches!(network.blocks()[0].layers()[0], Layer::Pool(_)));
}
