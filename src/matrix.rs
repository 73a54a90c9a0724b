//! The capability contract every container must satisfy, and a reference container.
//!
//! # Matrix Capabilities
//!
//! The dispatch layer never assumes more of a container than [`Matrix`] offers:
//!
//! - an associated [`Scalar`] element type
//! - read access by `(row, col)`
//! - write access by `(row, col)`
//! - row and column extents
//!
//! Backends are free to demand more. The dense CPU and GPU backends require
//! [`Contiguous`] row-major storage so they can hand whole slices to rayon or
//! upload them to the device in one copy.
//!
//! ## Vectors
//!
//! There is no separate vector type: a vector is a `1×N` or `N×1` matrix.
//! [`DenseMatrix::row_vector`] and [`DenseMatrix::column_vector`] build them.
//!
//! ## Example
//!
//! ```rust
//! use linalg_dispatch::matrix::{DenseMatrix, Matrix};
//! let m = DenseMatrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(m.get(1, 0), 4.0);
//! assert_eq!(m.shape().cols, 3);
//! ```

use briny::prelude::*;
use core::fmt::{self, Debug, Display};
use core::ops::{Add, AddAssign, Mul, Neg, Sub};

/// Element type of a [`Matrix`].
///
/// Conversions through `f32`/`f64` may round; the device backend computes in
/// single precision.
pub trait Scalar:
    Copy
    + PartialEq
    + PartialOrd
    + Debug
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Neg<Output = Self>
    + AddAssign
{
    /// Additive identity.
    const ZERO: Self;
    /// Multiplicative identity.
    const ONE: Self;

    /// Convert to `f32`.
    fn to_f32(self) -> f32;
    /// Convert from `f32`.
    fn from_f32(x: f32) -> Self;
    /// Convert to `f64`.
    fn to_f64(self) -> f64;
    /// Convert from `f64`.
    fn from_f64(x: f64) -> Self;
}

impl Scalar for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(x: f32) -> Self {
        x
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_f64(x: f64) -> Self {
        x as Self
    }
}

impl Scalar for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;

    #[allow(clippy::cast_possible_truncation)]
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(x: f32) -> Self {
        Self::from(x)
    }

    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(x: f64) -> Self {
        x
    }
}

/// Row and column extents of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
}

impl Shape {
    /// Creates a shape.
    #[must_use]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// The shape with rows and columns swapped.
    #[must_use]
    pub const fn transposed(self) -> Self {
        Self {
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Total element count.
    #[must_use]
    pub const fn len(self) -> usize {
        self.rows * self.cols
    }

    /// Whether either extent is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// The minimal set of operations a container must support to be usable
/// through the dispatch layer.
///
/// Indices are `(row, col)`; implementations may panic on out-of-range
/// indices, the dispatch layer never produces one for a validated call.
pub trait Matrix {
    /// The element type.
    type Scalar: Scalar;

    /// Number of rows.
    fn rows(&self) -> usize;

    /// Number of columns.
    fn cols(&self) -> usize;

    /// Reads the element at `(row, col)`.
    fn get(&self, row: usize, col: usize) -> Self::Scalar;

    /// Writes the element at `(row, col)`.
    fn set(&mut self, row: usize, col: usize, value: Self::Scalar);

    /// Both extents at once.
    fn shape(&self) -> Shape {
        Shape::new(self.rows(), self.cols())
    }

    /// Total element count.
    fn len(&self) -> usize {
        self.rows() * self.cols()
    }

    /// Whether the matrix holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`Matrix`] whose elements live in one row-major slice.
///
/// `as_slice()[row * cols + col]` must be the element at `(row, col)`.
pub trait Contiguous: Matrix {
    /// Row-major view of all elements.
    fn as_slice(&self) -> &[Self::Scalar];

    /// Mutable row-major view of all elements.
    fn as_mut_slice(&mut self) -> &mut [Self::Scalar];
}

/// An owned, row-major dense matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

/// Unchecked parts handed to [`DenseMatrix::try_from_parts`].
struct RawParts<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T> Validate for RawParts<T> {
    fn validate(&self) -> Result<(), ValidationError> {
        match self.rows.checked_mul(self.cols) {
            Some(expected) if expected == self.data.len() => Ok(()),
            _ => Err(ValidationError),
        }
    }
}

impl<T> DenseMatrix<T> {
    /// Creates a matrix from row-major data.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    #[must_use]
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            rows * cols,
            data.len(),
            "shape {rows}x{cols} is incompatible with {} data elements",
            data.len()
        );
        Self { rows, cols, data }
    }

    /// Creates a matrix from row-major data, rejecting a length that does not
    /// match the shape instead of panicking.
    ///
    /// # Errors
    /// Returns [`ValidationError`] on a length mismatch or an overflowing shape.
    pub fn try_from_parts(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, ValidationError> {
        let trusted = TrustedData::new(RawParts { rows, cols, data })?;
        let RawParts { rows, cols, data } = trusted.into_inner();
        Ok(Self { rows, cols, data })
    }

    /// A `1×N` matrix.
    #[must_use]
    pub fn row_vector(data: Vec<T>) -> Self {
        Self {
            rows: 1,
            cols: data.len(),
            data,
        }
    }

    /// An `N×1` matrix.
    #[must_use]
    pub fn column_vector(data: Vec<T>) -> Self {
        Self {
            rows: data.len(),
            cols: 1,
            data,
        }
    }

    /// Builds a matrix by evaluating `f(row, col)` for every element.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Self { rows, cols, data }
    }

    /// Row-major element storage.
    #[must_use]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Consumes the matrix, returning its row-major storage.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }
}

impl<T: Scalar> DenseMatrix<T> {
    /// A `rows×cols` matrix of zeros.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::ZERO; rows * cols],
        }
    }

    /// A zero matrix with the given shape.
    #[must_use]
    pub fn zeros_shaped(shape: Shape) -> Self {
        Self::zeros(shape.rows, shape.cols)
    }

    /// The transpose, as a new matrix.
    #[must_use]
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.cols, self.rows, |r, c| self.data[c * self.cols + r])
    }
}

impl<T: Scalar> Matrix for DenseMatrix<T> {
    type Scalar = T;

    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get(&self, row: usize, col: usize) -> T {
        debug_assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of range");
        self.data[row * self.cols + col]
    }

    fn set(&mut self, row: usize, col: usize, value: T) {
        debug_assert!(row < self.rows && col < self.cols, "index ({row}, {col}) out of range");
        self.data[row * self.cols + col] = value;
    }
}

impl<T: Scalar> Contiguous for DenseMatrix<T> {
    fn as_slice(&self) -> &[T] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// Defines a [`DenseMatrix`] from nested row literals.
///
/// # Example
/// ```
/// use linalg_dispatch::matrix;
/// use linalg_dispatch::matrix::Matrix;
/// let m = matrix![[1.0, 2.0], [3.0, 4.0]];
/// assert_eq!(m.rows(), 2);
/// assert_eq!(m.get(1, 1), 4.0);
/// ```
#[macro_export]
macro_rules! matrix {
    ($( [ $( $x:expr ),* $(,)? ] ),+ $(,)?) => {{
        let rows: ::std::vec::Vec<::std::vec::Vec<_>> = vec![ $( vec![ $( $x ),* ] ),+ ];
        let cols = rows[0].len();
        assert!(rows.iter().all(|r| r.len() == cols),
            "ragged matrix literal (rows have mismatched lengths)");
        let n_rows = rows.len();
        let data: ::std::vec::Vec<_> = rows.into_iter().flatten().collect();
        $crate::matrix::DenseMatrix::new(n_rows, cols, data)
    }};
}
