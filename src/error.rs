//! Error types for the dispatch layer.
//!
//! Shape and precondition violations are caller errors: they are detected
//! before any kernel runs, so a rejected call leaves its output untouched.
//! Backend failures are passed through from the kernel that raised them.
//! Requesting a backend that is not compiled in is not represented here at
//! all, because it cannot get past the type checker.

use crate::matrix::Shape;
use thiserror::Error;

/// Result type alias using [`LinalgError`].
pub type Result<T> = core::result::Result<T, LinalgError>;

/// Errors that can occur in a dispatch call.
#[derive(Error, Debug)]
pub enum LinalgError {
    /// An operand or output does not have the shape the operation requires.
    #[error("{op}: shape mismatch, expected {expected} but got {got}")]
    ShapeMismatch {
        /// The operation that rejected the call.
        op: &'static str,
        /// The shape required.
        expected: Shape,
        /// The shape supplied.
        got: Shape,
    },

    /// `op(A)` columns differ from `op(B)` rows in a matrix product.
    #[error("matrix_product: inner dimensions disagree ({lhs} vs {rhs})")]
    InnerDimensionMismatch {
        /// Columns of `op(A)`.
        lhs: usize,
        /// Rows of `op(B)`.
        rhs: usize,
    },

    /// A convolution filter with an even extent has no center cell.
    #[error("convolve: filter extents must be odd, got {0}")]
    EvenFilter(Shape),

    /// A convolution stride of zero.
    #[error("convolve: strides must be positive, got x={stride_x} y={stride_y}")]
    InvalidStride {
        /// Column stride.
        stride_x: usize,
        /// Row stride.
        stride_y: usize,
    },

    /// A failure of the `wgpu` device backend.
    #[cfg(feature = "wgpu")]
    #[error(transparent)]
    Gpu(#[from] crate::ops::wgpu::GpuFailure),
}

impl LinalgError {
    /// Whether the error is a caller contract violation (as opposed to a
    /// backend failure).
    #[must_use]
    pub const fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::InnerDimensionMismatch { .. }
                | Self::EvenFilter(_)
                | Self::InvalidStride { .. }
        )
    }
}
