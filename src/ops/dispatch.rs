//! Operation Dispatch Layer
//!
//! Every operation is exposed twice:
//!
//! - as an associated function of [`Linalg<B>`], with the backend named explicitly
//! - as a free function that uses [`DefaultBackend`]
//!
//! Both forms validate shapes, then forward to the kernel selected by
//! `(operation, backend tag, container type)`. Selection happens during
//! monomorphization; there is no runtime branch on the backend.
//!
//! # Design Highlights
//! - **Pluggable**: Backends are optional and modular
//! - **Fail fast**: Preconditions are checked before the output is touched
//! - **Zero-cost**: Tags are zero-sized; nothing is retained between calls
//!
//! # Example
//! ```rust
//! use linalg_dispatch::{matrix, Linalg, Native};
//!
//! let a = matrix![[1.0, 2.0], [3.0, 4.0]];
//! let b = matrix![[5.0, 6.0], [7.0, 8.0]];
//! let mut c = matrix![[0.0, 0.0], [0.0, 0.0]];
//!
//! linalg_dispatch::add(&a, &b, &mut c, 1.0, 1.0).unwrap(); // default backend
//! assert_eq!(c, matrix![[6.0, 8.0], [10.0, 12.0]]);
//!
//! Linalg::<Native>::subtract(&a, &b, &mut c, 1.0, 1.0).unwrap(); // explicit backend
//! assert_eq!(c, matrix![[-4.0, -4.0], [-4.0, -4.0]]);
//! ```

use core::marker::PhantomData;

use crate::backend::{Backend, DefaultBackend};
use crate::error::{LinalgError, Result};
use crate::matrix::{Matrix, Shape};
use crate::ops::{AddKernel, ElementwiseProductKernel, ElementwiseSquareKernel, ScaleKernel, SquareTarget};

#[cfg(any(feature = "cpu", feature = "wgpu"))]
use crate::ops::{ConvolveKernel, ConvolveOptions, MatrixProductKernel, ProductOptions, strided_extent};

/// Operation entry points bound to the backend tag `B`.
///
/// `Linalg` is never constructed; it only carries the tag for the associated
/// functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linalg<B: Backend = DefaultBackend>(PhantomData<B>);

fn expect_shape(op: &'static str, expected: Shape, got: Shape) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        tracing::debug!(op, %expected, %got, "rejected call: shape mismatch");
        Err(LinalgError::ShapeMismatch { op, expected, got })
    }
}

/// Shape `C` must have for `op(A) × op(B)`.
#[cfg(any(feature = "cpu", feature = "wgpu"))]
fn product_shape(a: Shape, b: Shape, options: ProductOptions) -> Result<Shape> {
    let a = if options.transpose_a { a.transposed() } else { a };
    let b = if options.transpose_b { b.transposed() } else { b };
    if a.cols != b.rows {
        tracing::debug!(lhs = a.cols, rhs = b.rows, "rejected call: inner dimension mismatch");
        return Err(LinalgError::InnerDimensionMismatch {
            lhs: a.cols,
            rhs: b.rows,
        });
    }
    Ok(Shape::new(a.rows, b.cols))
}

/// Shape `Y` must have for a convolution of an `x`-shaped input.
#[cfg(any(feature = "cpu", feature = "wgpu"))]
fn convolve_shape(x: Shape, w: Shape, options: ConvolveOptions) -> Result<Shape> {
    if w.rows % 2 == 0 || w.cols % 2 == 0 {
        tracing::debug!(filter = %w, "rejected call: even filter");
        return Err(LinalgError::EvenFilter(w));
    }
    if options.stride_x == 0 || options.stride_y == 0 {
        tracing::debug!(
            stride_x = options.stride_x,
            stride_y = options.stride_y,
            "rejected call: zero stride"
        );
        return Err(LinalgError::InvalidStride {
            stride_x: options.stride_x,
            stride_y: options.stride_y,
        });
    }
    Ok(Shape::new(
        strided_extent(x.rows, options.stride_y),
        strided_extent(x.cols, options.stride_x),
    ))
}

impl<B: Backend> Linalg<B> {
    /// Performs `C = alpha * A + beta * B`. Works for both matrices and vectors.
    ///
    /// # Errors
    /// [`LinalgError::ShapeMismatch`] unless `A`, `B` and `C` share one shape;
    /// otherwise whatever the backend reports.
    pub fn add<M>(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()>
    where
        M: Matrix,
        B: AddKernel<M>,
    {
        tracing::trace!(op = "add", backend = B::NAME, shape = %a.shape(), "dispatch");
        expect_shape("add", a.shape(), b.shape())?;
        expect_shape("add", a.shape(), c.shape())?;
        B::add(a, b, c, alpha, beta)
    }

    /// Performs `C = alpha * A - beta * B`. Works for both matrices and vectors.
    ///
    /// Runs the add kernel with `beta` negated.
    ///
    /// # Errors
    /// Same as [`Linalg::add`].
    pub fn subtract<M>(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()>
    where
        M: Matrix,
        B: AddKernel<M>,
    {
        tracing::trace!(op = "subtract", backend = B::NAME, shape = %a.shape(), "dispatch");
        expect_shape("subtract", a.shape(), b.shape())?;
        expect_shape("subtract", a.shape(), c.shape())?;
        B::add(a, b, c, alpha, -beta)
    }

    /// Performs `B = alpha * A`. Works for both matrices and vectors.
    ///
    /// # Errors
    /// [`LinalgError::ShapeMismatch`] unless `A` and `B` share one shape.
    pub fn scale<M>(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()>
    where
        M: Matrix,
        B: ScaleKernel<M>,
    {
        tracing::trace!(op = "scale", backend = B::NAME, shape = %a.shape(), "dispatch");
        expect_shape("scale", a.shape(), b.shape())?;
        B::scale(a, b, alpha)
    }

    /// Performs `C = A ⊙ B`, the elementwise (Hadamard) product.
    ///
    /// # Errors
    /// [`LinalgError::ShapeMismatch`] unless `A`, `B` and `C` share one shape.
    pub fn elementwise_product<M>(a: &M, b: &M, c: &mut M) -> Result<()>
    where
        M: Matrix,
        B: ElementwiseProductKernel<M>,
    {
        tracing::trace!(op = "elementwise_product", backend = B::NAME, shape = %a.shape(), "dispatch");
        expect_shape("elementwise_product", a.shape(), b.shape())?;
        expect_shape("elementwise_product", a.shape(), c.shape())?;
        B::elementwise_product(a, b, c)
    }

    /// Returns a new matrix whose elements are the squares of `m`'s.
    ///
    /// The result type is the one the backend declares.
    ///
    /// # Errors
    /// Backend failures only.
    pub fn elementwise_square<M>(m: &M) -> Result<<B as ElementwiseSquareKernel<M>>::Output>
    where
        M: Matrix,
        B: ElementwiseSquareKernel<M>,
    {
        tracing::trace!(op = "elementwise_square", backend = B::NAME, shape = %m.shape(), "dispatch");
        B::elementwise_square(m)
    }

    /// Writes the squares of `m`'s elements into the pre-allocated `result`.
    ///
    /// # Errors
    /// [`LinalgError::ShapeMismatch`] unless `result` has `m`'s shape.
    pub fn elementwise_square_into<M, R>(m: &M, result: &mut R) -> Result<()>
    where
        M: Matrix,
        R: SquareTarget<M::Scalar>,
        B: ElementwiseSquareKernel<M>,
    {
        tracing::trace!(op = "elementwise_square_into", backend = B::NAME, shape = %m.shape(), "dispatch");
        expect_shape("elementwise_square", m.shape(), result.shape())?;
        B::elementwise_square_into(m, result)
    }

    /// Performs `C = op(A) × op(B)` where `op(X)` is `X` or `Xᵗ` per the
    /// transpose flags. Without `overwrite` the product is added to `C`.
    ///
    /// # Errors
    /// [`LinalgError::InnerDimensionMismatch`] when the inner extents of
    /// `op(A)` and `op(B)` differ, [`LinalgError::ShapeMismatch`] when `C`
    /// is not `rows(op(A)) × cols(op(B))`.
    #[cfg(any(feature = "cpu", feature = "wgpu"))]
    pub fn matrix_product<M>(a: &M, b: &M, c: &mut M, options: ProductOptions) -> Result<()>
    where
        M: Matrix,
        B: MatrixProductKernel<M>,
    {
        tracing::trace!(
            op = "matrix_product",
            backend = B::NAME,
            lhs = %a.shape(),
            rhs = %b.shape(),
            ?options,
            "dispatch"
        );
        let expected = product_shape(a.shape(), b.shape(), options)?;
        expect_shape("matrix_product", expected, c.shape())?;
        B::matrix_product(a, b, c, options)
    }

    /// Computes the 2D convolution of `X` with the filter `W` into `Y`.
    ///
    /// Borders of `X` are implicitly zero padded, so before striding the
    /// output has `X`'s extents; `Y` must be
    /// `ceil(rows/stride_y) × ceil(cols/stride_x)`. With `flip` the filter is
    /// applied unmirrored, giving a cross-correlation. Without `overwrite` the
    /// result is added to `Y`.
    ///
    /// # Errors
    /// [`LinalgError::EvenFilter`] unless both filter extents are odd,
    /// [`LinalgError::InvalidStride`] for a zero stride,
    /// [`LinalgError::ShapeMismatch`] for a wrongly sized `Y`.
    #[cfg(any(feature = "cpu", feature = "wgpu"))]
    pub fn convolve<M>(x: &M, w: &M, y: &mut M, options: ConvolveOptions) -> Result<()>
    where
        M: Matrix,
        B: ConvolveKernel<M>,
    {
        tracing::trace!(
            op = "convolve",
            backend = B::NAME,
            input = %x.shape(),
            filter = %w.shape(),
            ?options,
            "dispatch"
        );
        let expected = convolve_shape(x.shape(), w.shape(), options)?;
        expect_shape("convolve", expected, y.shape())?;
        B::convolve(x, w, y, options)
    }
}

/// [`Linalg::add`] on the default backend.
///
/// # Errors
/// See [`Linalg::add`].
pub fn add<M>(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()>
where
    M: Matrix,
    DefaultBackend: AddKernel<M>,
{
    Linalg::<DefaultBackend>::add(a, b, c, alpha, beta)
}

/// [`Linalg::subtract`] on the default backend.
///
/// # Errors
/// See [`Linalg::subtract`].
pub fn subtract<M>(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()>
where
    M: Matrix,
    DefaultBackend: AddKernel<M>,
{
    Linalg::<DefaultBackend>::subtract(a, b, c, alpha, beta)
}

/// [`Linalg::scale`] on the default backend.
///
/// # Errors
/// See [`Linalg::scale`].
pub fn scale<M>(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()>
where
    M: Matrix,
    DefaultBackend: ScaleKernel<M>,
{
    Linalg::<DefaultBackend>::scale(a, b, alpha)
}

/// [`Linalg::elementwise_product`] on the default backend.
///
/// # Errors
/// See [`Linalg::elementwise_product`].
pub fn elementwise_product<M>(a: &M, b: &M, c: &mut M) -> Result<()>
where
    M: Matrix,
    DefaultBackend: ElementwiseProductKernel<M>,
{
    Linalg::<DefaultBackend>::elementwise_product(a, b, c)
}

/// [`Linalg::elementwise_square`] on the default backend.
///
/// # Errors
/// See [`Linalg::elementwise_square`].
pub fn elementwise_square<M>(m: &M) -> Result<<DefaultBackend as ElementwiseSquareKernel<M>>::Output>
where
    M: Matrix,
    DefaultBackend: ElementwiseSquareKernel<M>,
{
    Linalg::<DefaultBackend>::elementwise_square(m)
}

/// [`Linalg::elementwise_square_into`] on the default backend.
///
/// # Errors
/// See [`Linalg::elementwise_square_into`].
pub fn elementwise_square_into<M, R>(m: &M, result: &mut R) -> Result<()>
where
    M: Matrix,
    R: SquareTarget<M::Scalar>,
    DefaultBackend: ElementwiseSquareKernel<M>,
{
    Linalg::<DefaultBackend>::elementwise_square_into(m, result)
}

/// [`Linalg::matrix_product`] on the default backend.
///
/// # Errors
/// See [`Linalg::matrix_product`].
///
/// Only the `cpu` backend is a default for this operation; without it, name
/// the backend through [`Linalg`].
#[cfg(feature = "cpu")]
pub fn matrix_product<M>(a: &M, b: &M, c: &mut M, options: ProductOptions) -> Result<()>
where
    M: Matrix,
    DefaultBackend: MatrixProductKernel<M>,
{
    Linalg::<DefaultBackend>::matrix_product(a, b, c, options)
}

/// [`Linalg::convolve`] on the default backend.
///
/// # Errors
/// See [`Linalg::convolve`].
///
/// Only the `cpu` backend is a default for this operation; without it, name
/// the backend through [`Linalg`].
#[cfg(feature = "cpu")]
pub fn convolve<M>(x: &M, w: &M, y: &mut M, options: ConvolveOptions) -> Result<()>
where
    M: Matrix,
    DefaultBackend: ConvolveKernel<M>,
{
    Linalg::<DefaultBackend>::convolve(x, w, y, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Native;
    use crate::matrix;
    use crate::matrix::{Contiguous, DenseMatrix};

    #[test]
    fn mismatched_add_leaves_output_untouched() {
        let a = matrix![[1.0, 2.0], [3.0, 4.0]];
        let b = matrix![[1.0, 2.0, 3.0]];
        let mut c = matrix![[9.0, 9.0], [9.0, 9.0]];
        let err = Linalg::<Native>::add(&a, &b, &mut c, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, LinalgError::ShapeMismatch { op: "add", .. }));
        assert_eq!(c, matrix![[9.0, 9.0], [9.0, 9.0]]);
    }

    #[test]
    fn output_shape_is_checked_too() {
        let a = matrix![[1.0, 2.0]];
        let mut b = DenseMatrix::<f64>::zeros(2, 1);
        let err = Linalg::<Native>::scale(&a, &mut b, 2.0).unwrap_err();
        match err {
            LinalgError::ShapeMismatch { expected, got, .. } => {
                assert_eq!(expected, Shape::new(1, 2));
                assert_eq!(got, Shape::new(2, 1));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn square_into_rejects_wrong_result_shape() {
        let m = matrix![[1.0, 2.0]];
        let mut result = DenseMatrix::<f64>::zeros(1, 3);
        assert!(Linalg::<Native>::elementwise_square_into(&m, &mut result).is_err());
        assert_eq!(result.as_slice(), &[0.0, 0.0, 0.0]);
    }

    #[cfg(feature = "cpu")]
    #[test]
    fn default_product_and_convolve_run_on_cpu() {
        use crate::backend::{Backend, BackendKind};

        assert_eq!(<DefaultBackend as Backend>::KIND, BackendKind::Cpu);
        let a = matrix![[1.0, 2.0], [3.0, 4.0]];
        let mut c = DenseMatrix::zeros(2, 2);
        matrix_product(&a, &a, &mut c, ProductOptions::default()).unwrap();
        assert_eq!(c, matrix![[7.0, 10.0], [15.0, 22.0]]);
        convolve(&a, &matrix![[2.0]], &mut c, ConvolveOptions::default()).unwrap();
        assert_eq!(c, matrix![[2.0, 4.0], [6.0, 8.0]]);
    }

    #[cfg(any(feature = "cpu", feature = "wgpu"))]
    #[test]
    fn product_shape_honors_transposes() {
        let a = Shape::new(3, 2);
        let b = Shape::new(3, 4);
        assert!(product_shape(a, b, ProductOptions::default()).is_err());
        let shape = product_shape(a, b, ProductOptions::default().transpose_a(true)).unwrap();
        assert_eq!(shape, Shape::new(2, 4));
        let shape = product_shape(b, a, ProductOptions::default().transpose_a(true)).unwrap();
        assert_eq!(shape, Shape::new(4, 2));
        assert!(matches!(
            product_shape(a, a, ProductOptions::default()),
            Err(LinalgError::InnerDimensionMismatch { lhs: 2, rhs: 3 })
        ));
    }

    #[cfg(any(feature = "cpu", feature = "wgpu"))]
    #[test]
    fn convolve_shape_rounds_strided_extents_up() {
        let x = Shape::new(5, 7);
        let w = Shape::new(3, 1);
        let shape = convolve_shape(x, w, ConvolveOptions::default().strides(2, 3)).unwrap();
        assert_eq!(shape, Shape::new(2, 4));
        assert!(matches!(
            convolve_shape(x, Shape::new(2, 3), ConvolveOptions::default()),
            Err(LinalgError::EvenFilter(_))
        ));
        assert!(matches!(
            convolve_shape(x, w, ConvolveOptions::default().strides(0, 1)),
            Err(LinalgError::InvalidStride { stride_x: 0, stride_y: 1 })
        ));
    }
}
