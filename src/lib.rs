//! linalg_dispatch: backend-agnostic dense linear algebra with compile-time dispatch.
//!
//! A small set of primitives (weighted sums, scaling, elementwise products
//! and squares, matrix products and 2-D convolution) written once against a
//! generic matrix contract and executed by whichever backend the caller
//! selects. Selection is a type parameter, so an unsupported combination of
//! operation, backend and container is a compile error and a supported one
//! costs nothing at runtime.
//!
//! # Backends
//!
//! - [`Native`]: scalar loops over any [`Matrix`]; elementwise operations only.
//! - [`Cpu`] *(feature `cpu`, default)*: rayon kernels over [`Contiguous`] storage.
//! - [`Wgpu`] *(feature `wgpu`)*: WGSL compute shaders, in `f32`.
//! - [`Sparse`]: reserved tag with no kernels.
//!
//! # Modules
//!
//! - [`matrix`]: the container contract and the bundled [`DenseMatrix`].
//! - [`backend`]: backend tags and default selection.
//! - [`ops`]: kernel traits, option flags and the backend implementations.
//! - [`error`]: the crate error type.
//! - [`approx`]: graded float comparison for checking results across backends.
//!
//! # Example
//!
//! ```rust
//! use linalg_dispatch::{matrix, DenseMatrix, ProductOptions};
//!
//! let a = matrix![[1.0, 2.0], [3.0, 4.0]];
//! let b = matrix![[5.0, 6.0], [7.0, 8.0]];
//! let mut c = DenseMatrix::zeros(2, 2);
//!
//! # #[cfg(feature = "cpu")]
//! # {
//! linalg_dispatch::matrix_product(&a, &b, &mut c, ProductOptions::default()).unwrap();
//! assert_eq!(c, matrix![[19.0, 22.0], [43.0, 50.0]]);
//! # }
//! ```
//!
//! # Logging
//!
//! Dispatch decisions are emitted as `tracing` events at `trace` level,
//! rejected calls at `debug`, and GPU context setup at `info`. Install any
//! `tracing` subscriber to see them.

pub mod approx;
pub mod backend;
pub mod error;
pub mod matrix;
pub mod ops;

pub use backend::{Backend, BackendKind, BackendSelector, Core, DefaultBackend, Native, Sparse, available_backends};
#[cfg(feature = "cpu")]
pub use backend::Cpu;
#[cfg(feature = "wgpu")]
pub use backend::Wgpu;
pub use error::{LinalgError, Result};
pub use matrix::{Contiguous, DenseMatrix, Matrix, Scalar, Shape};
pub use ops::dispatch::{
    Linalg, add, elementwise_product, elementwise_square, elementwise_square_into, scale, subtract,
};
#[cfg(feature = "cpu")]
pub use ops::dispatch::{convolve, matrix_product};
pub use ops::{ConvolveOptions, ProductOptions, SquareTarget};
