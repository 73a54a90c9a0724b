//! # Operation Dispatch Layer
//!
//! This module defines the contract between the generic dispatch functions and
//! the backend kernels that do the arithmetic.
//!
//! ## Submodules
//!
//! - [`dispatch`]: the public operation functions, generic over backend tag and container
//! - [`native`]: scalar loop kernels (always built)
//! - [`cpu`] *(default)*: multi-threaded dense CPU kernels using `rayon`
//! - [`wgpu`] *(opt-in)*: GPU compute shader pipelines using `wgpu`
//!
//! ## Kernel Traits
//!
//! Each operation has one kernel trait, implemented by a backend tag for the
//! container types it supports. A dispatch function is callable with a tag
//! exactly when the tag implements the matching trait for the container, so
//! an unsupported `(operation, backend, container)` triple is rejected by the
//! compiler.
//!
//! Kernels receive arguments that have already passed shape validation. They
//! must honor the flags exactly as documented on the dispatch functions, and
//! they are the only place where elements are read or written.
//!
//! ## Extending the Backend
//!
//! To add a new operation:
//!
//! 1. Add a kernel trait here
//! 2. Implement it for one or more tags (e.g. `native`, `cpu`, `wgpu`)
//! 3. Add a validated entry point to `dispatch`
//!
//! ## Feature Flags
//!
//! - `cpu`: Enables the rayon backend, and with it `matrix_product` and `convolve`
//! - `wgpu`: Enables the `wgpu` (WebGPU) backend, and with it `matrix_product` and `convolve`

use crate::error::Result;
use crate::matrix::{Matrix, Scalar};

pub mod dispatch;
pub mod native;

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "wgpu")]
pub mod wgpu;

/// `C := alpha * A + beta * B`.
pub trait AddKernel<M: Matrix> {
    /// Computes the weighted sum into `c`.
    ///
    /// # Errors
    /// Backend failures only; shapes are already validated.
    fn add(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()>;
}

/// `B := alpha * A`.
pub trait ScaleKernel<M: Matrix> {
    /// Scales `a` into `b`.
    ///
    /// # Errors
    /// Backend failures only; shapes are already validated.
    fn scale(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()>;
}

/// `C := A ⊙ B`.
pub trait ElementwiseProductKernel<M: Matrix> {
    /// Multiplies `a` and `b` elementwise into `c`.
    ///
    /// # Errors
    /// Backend failures only; shapes are already validated.
    fn elementwise_product(a: &M, b: &M, c: &mut M) -> Result<()>;
}

/// `result := m ⊙ m`, either allocating or into a caller-owned container.
pub trait ElementwiseSquareKernel<M: Matrix> {
    /// The container produced by the allocating form.
    type Output: Matrix<Scalar = M::Scalar>;

    /// Returns a newly allocated matrix of squares.
    ///
    /// # Errors
    /// Backend failures only.
    fn elementwise_square(m: &M) -> Result<Self::Output>;

    /// Writes the squares into `result` without allocating a container.
    ///
    /// # Errors
    /// Backend failures only; shapes are already validated.
    fn elementwise_square_into<R>(m: &M, result: &mut R) -> Result<()>
    where
        R: SquareTarget<M::Scalar>;
}

/// Containers `elementwise_square_into` may write to.
///
/// The result container may be a different type than the input, as long as
/// it holds the same scalar. Backends that need contiguous storage get it
/// through [`SquareTarget::as_contiguous_mut`].
pub trait SquareTarget<T: Scalar>: Matrix<Scalar = T> {
    /// Row-major storage, when the container has it.
    fn as_contiguous_mut(&mut self) -> Option<&mut [T]>;
}

impl<T: Scalar> SquareTarget<T> for crate::matrix::DenseMatrix<T> {
    fn as_contiguous_mut(&mut self) -> Option<&mut [T]> {
        Some(crate::matrix::Contiguous::as_mut_slice(self))
    }
}

/// Flags for [`matrix_product`](crate::matrix_product).
///
/// The default is `C := A × B`, overwriting `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductOptions {
    /// Use `Aᵗ` in place of `A`.
    pub transpose_a: bool,
    /// Use `Bᵗ` in place of `B`.
    pub transpose_b: bool,
    /// Replace the contents of `C`; when false the product is added to them.
    pub overwrite: bool,
}

impl Default for ProductOptions {
    fn default() -> Self {
        Self {
            transpose_a: false,
            transpose_b: false,
            overwrite: true,
        }
    }
}

impl ProductOptions {
    /// Sets `transpose_a`.
    #[must_use]
    pub const fn transpose_a(mut self, yes: bool) -> Self {
        self.transpose_a = yes;
        self
    }

    /// Sets `transpose_b`.
    #[must_use]
    pub const fn transpose_b(mut self, yes: bool) -> Self {
        self.transpose_b = yes;
        self
    }

    /// Sets `overwrite`.
    #[must_use]
    pub const fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }
}

/// Flags for [`convolve`](crate::convolve).
///
/// The default is a true convolution with unit strides, overwriting `Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolveOptions {
    /// Use the filter unflipped, i.e. compute a cross-correlation.
    pub flip: bool,
    /// Replace the contents of `Y`; when false the result is added to them.
    pub overwrite: bool,
    /// Column step between output samples.
    pub stride_x: usize,
    /// Row step between output samples.
    pub stride_y: usize,
}

impl Default for ConvolveOptions {
    fn default() -> Self {
        Self {
            flip: false,
            overwrite: true,
            stride_x: 1,
            stride_y: 1,
        }
    }
}

impl ConvolveOptions {
    /// Sets `flip`.
    #[must_use]
    pub const fn flip(mut self, yes: bool) -> Self {
        self.flip = yes;
        self
    }

    /// Sets `overwrite`.
    #[must_use]
    pub const fn overwrite(mut self, yes: bool) -> Self {
        self.overwrite = yes;
        self
    }

    /// Sets both strides.
    #[must_use]
    pub const fn strides(mut self, stride_x: usize, stride_y: usize) -> Self {
        self.stride_x = stride_x;
        self.stride_y = stride_y;
        self
    }
}

/// `C := op(A) × op(B)` (or `C += ..` when not overwriting).
#[cfg(any(feature = "cpu", feature = "wgpu"))]
pub trait MatrixProductKernel<M: Matrix> {
    /// Multiplies into `c`.
    ///
    /// # Errors
    /// Backend failures only; shapes are already validated.
    fn matrix_product(a: &M, b: &M, c: &mut M, options: ProductOptions) -> Result<()>;
}

/// `Y := conv2d(X, W)` with zero padding and output striding.
#[cfg(any(feature = "cpu", feature = "wgpu"))]
pub trait ConvolveKernel<M: Matrix> {
    /// Convolves into `y`.
    ///
    /// # Errors
    /// Backend failures only; shapes, filter and strides are already validated.
    fn convolve(x: &M, w: &M, y: &mut M, options: ConvolveOptions) -> Result<()>;
}

/// Output extent of a strided convolution along one axis.
#[must_use]
pub const fn strided_extent(len: usize, stride: usize) -> usize {
    len.div_ceil(stride)
}
