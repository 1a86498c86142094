//! Dense volume helpers shared by every layer kernel.
//!
//! A [`Volume`] is indexed `[channel, row, col]`; a [`Vector`] is what a block
//! works on once it has flattened its running volume for fully-connected
//! processing. A `[1, 1, N]` volume and a length-`N` vector hold the same data.

use std::fmt;

use ndarray::{s, Array, Array1, Array2, Array3, ArrayBase, Axis, Data, Dimension, Ix1};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::error::{NetworkError, Result};

pub type Volume = Array3<f64>;
pub type Vector = Array1<f64>;

/// Dimensions of a volume at a layer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl Shape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Shape {
            channels,
            height,
            width,
        }
    }

    /// Square volume, the only kind that appears inside a network.
    pub fn square(channels: usize, size: usize) -> Self {
        Shape::new(channels, size, size)
    }

    /// The `[1, 1, len]` descriptor of a flat vector.
    pub fn flat(len: usize) -> Self {
        Shape::new(1, 1, len)
    }

    pub fn of(volume: &Volume) -> Self {
        let (channels, height, width) = volume.dim();
        Shape::new(channels, height, width)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zeros(&self) -> Volume {
        Volume::zeros(self.dim())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.height, self.width)
    }
}

/// Fill `array` with values drawn uniformly from `[min, max]`.
pub fn randomize<D, R>(array: &mut Array<f64, D>, min: f64, max: f64, rng: &mut R) -> Result<()>
where
    D: Dimension,
    R: Rng + ?Sized,
{
    let uniform = Uniform::new_inclusive(min, max).map_err(|_| NetworkError::InvalidRange { min, max })?;
    array.mapv_inplace(|_| uniform.sample(rng));
    Ok(())
}

/// Flatten in channel -> row -> col order.
pub fn flatten(volume: &Volume) -> Vector {
    volume.iter().copied().collect()
}

/// Inverse of [`flatten`].
pub fn unflatten(vector: &Vector, shape: Shape) -> Result<Volume> {
    if vector.len() != shape.len() {
        return Err(NetworkError::ShapeMismatch {
            expected: shape,
            actual: Shape::flat(vector.len()),
        });
    }
    Volume::from_shape_vec(shape.dim(), vector.to_vec()).map_err(|_| NetworkError::ShapeMismatch {
        expected: shape,
        actual: Shape::flat(vector.len()),
    })
}

/// Flat indices where `a` and `b` differ by more than `margin`.
///
/// Diagnostic only; arrays of different length report every index of the
/// longer one past the common prefix.
pub fn compare<S1, S2, D>(a: &ArrayBase<S1, D>, b: &ArrayBase<S2, D>, margin: f64) -> Vec<usize>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    let mut mismatches: Vec<usize> = a
        .iter()
        .zip(b.iter())
        .enumerate()
        .filter(|(_, (x, y))| (*x - *y).abs() > margin || x.is_nan() != y.is_nan())
        .map(|(i, _)| i)
        .collect();
    let common = a.len().min(b.len());
    mismatches.extend(common..a.len().max(b.len()));
    mismatches
}

/// Zero-pad the two spatial axes by `padding` on every side.
pub fn pad(volume: &Volume, padding: usize) -> Volume {
    if padding == 0 {
        return volume.clone();
    }
    let (channels, height, width) = volume.dim();
    let mut padded = Volume::zeros((channels, height + 2 * padding, width + 2 * padding));
    padded
        .slice_mut(s![.., padding..padding + height, padding..padding + width])
        .assign(volume);
    padded
}

/// Remove `padding` rows and columns from every spatial edge.
pub fn crop(volume: &Volume, padding: usize) -> Volume {
    if padding == 0 {
        return volume.clone();
    }
    let (_, height, width) = volume.dim();
    volume
        .slice(s![.., padding..height - padding, padding..width - padding])
        .to_owned()
}

/// Reverse rows, then columns, of every channel.
pub fn flip(volume: &Volume) -> Volume {
    volume.slice(s![.., ..;-1, ..;-1]).to_owned()
}

/// Interleave `stride - 1` zero rows and columns between the entries of each
/// channel. A `size` extent becomes `size + (size - 1) * (stride - 1)`.
pub fn dilate(volume: &Volume, stride: usize) -> Volume {
    if stride <= 1 {
        return volume.clone();
    }
    let (channels, height, width) = volume.dim();
    let dilated_h = height + height.saturating_sub(1) * (stride - 1);
    let dilated_w = width + width.saturating_sub(1) * (stride - 1);
    let mut dilated = Volume::zeros((channels, dilated_h, dilated_w));
    dilated
        .slice_mut(s![.., ..;stride, ..;stride])
        .assign(volume);
    dilated
}

/// `a ⊗ b`, shaped `[a.len(), b.len()]`.
pub fn outer_product<S1, S2>(a: &ArrayBase<S1, Ix1>, b: &ArrayBase<S2, Ix1>) -> Array2<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
{
    let column = a.view().insert_axis(Axis(1));
    let row = b.view().insert_axis(Axis(0));
    column.dot(&row)
}

/// Index of the largest entry; the first one wins on ties.
pub fn argmax<S>(values: &ArrayBase<S, Ix1>) -> usize
where
    S: Data<Elem = f64>,
{
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
