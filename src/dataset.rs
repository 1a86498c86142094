use tracing::debug;

use crate::error::{NetworkError, Result};
use crate::tensor::{Vector, Volume};

/// Owned training and test samples with one-hot labels.
#[derive(Debug, Clone, Default)]
pub struct DataSplit {
    pub train_inputs: Vec<Volume>,
    pub train_labels: Vec<Vector>,
    pub test_inputs: Vec<Volume>,
    pub test_labels: Vec<Vector>,
}

/// Something that can produce a [`DataSplit`], holding out `test_split` of
/// its samples for evaluation.
pub trait DataSource {
    fn load(&mut self, test_split: f64) -> Result<DataSplit>;
}

/// Samples already in memory. The leading `1 - test_split` fraction trains.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Vec<Volume>,
    labels: Vec<Vector>,
}

impl InMemoryDataset {
    pub fn new(inputs: Vec<Volume>, labels: Vec<Vector>) -> Result<Self> {
        if inputs.len() != labels.len() {
            return Err(NetworkError::LabelMismatch {
                inputs: inputs.len(),
                labels: labels.len(),
            });
        }
        Ok(InMemoryDataset { inputs, labels })
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl DataSource for InMemoryDataset {
    fn load(&mut self, test_split: f64) -> Result<DataSplit> {
        if !(0.0..1.0).contains(&test_split) {
            return Err(NetworkError::InvalidConfig(format!(
                "test split must be in [0, 1), got {test_split}"
            )));
        }
        if self.is_empty() {
            return Err(NetworkError::EmptyDataset);
        }

        let train_len = ((1.0 - test_split) * self.len() as f64).round() as usize;
        let train_len = train_len.clamp(1, self.len());
        debug!(train = train_len, test = self.len() - train_len, "dataset split");

        Ok(DataSplit {
            train_inputs: self.inputs[..train_len].to_vec(),
            train_labels: self.labels[..train_len].to_vec(),
            test_inputs: self.inputs[train_len..].to_vec(),
            test_labels: self.labels[train_len..].to_vec(),
        })
    }
}

/// A length-`classes` vector with a 1 at `class`.
pub fn one_hot(class: usize, classes: usize) -> Result<Vector> {
    if class >= classes {
        return Err(NetworkError::InvalidConfig(format!(
            "class {class} out of range for {classes} classes"
        )));
    }
    let mut label = Vector::zeros(classes);
    label[class] = 1.0;
    Ok(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Shape;

    fn dataset(n: usize) -> InMemoryDataset {
        let inputs = (0..n).map(|i| Shape::square(1, 2).zeros() + i as f64).collect();
        let labels = (0..n).map(|i| one_hot(i % 2, 2).unwrap()).collect();
        InMemoryDataset::new(inputs, labels).unwrap()
    }

    #[test]
    fn split_keeps_leading_fraction_for_training() {
        let split = dataset(10).load(0.2).unwrap();
        assert_eq!(split.train_inputs.len(), 8);
        assert_eq!(split.test_inputs.len(), 2);
        assert_eq!(split.test_inputs[0][[0, 0, 0]], 8.0);
        assert_eq!(split.test_labels.len(), 2);
    }

    #[test]
    fn zero_split_has_no_test_set() {
        let split = dataset(3).load(0.0).unwrap();
        assert_eq!(split.train_inputs.len(), 3);
        assert!(split.test_inputs.is_empty());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = InMemoryDataset::new(vec![Shape::square(1, 2).zeros()], vec![]).unwrap_err();
        assert!(matches!(err, NetworkError::LabelMismatch { inputs: 1, labels: 0 }));
    }

    #[test]
    fn one_hot_marks_class() {
        assert_eq!(one_hot(2, 4).unwrap().to_vec(), vec![0.0, 0.0, 1.0, 0.0]);
        assert!(one_hot(4, 4).is_err());
    }
}
