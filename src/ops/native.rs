//! Scalar loop kernels.
//!
//! The native backend needs nothing beyond the [`Matrix`] contract: it reads
//! and writes one element at a time, so it runs on any container. It covers
//! the elementwise operations only; `matrix_product` and `convolve` need a
//! linear-algebra backend (`cpu` or `wgpu`).

use crate::backend::Native;
use crate::error::Result;
use crate::matrix::{DenseMatrix, Matrix};
use crate::ops::{AddKernel, ElementwiseProductKernel, ElementwiseSquareKernel, ScaleKernel, SquareTarget};

/// Applies `f(row, col)` to every index in row-major order.
#[inline]
fn for_each_index(rows: usize, cols: usize, mut f: impl FnMut(usize, usize)) {
    for r in 0..rows {
        for c in 0..cols {
            f(r, c);
        }
    }
}

impl<M: Matrix> AddKernel<M> for Native {
    fn add(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()> {
        for_each_index(a.rows(), a.cols(), |r, col| {
            c.set(r, col, alpha * a.get(r, col) + beta * b.get(r, col));
        });
        Ok(())
    }
}

impl<M: Matrix> ScaleKernel<M> for Native {
    fn scale(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()> {
        for_each_index(a.rows(), a.cols(), |r, c| b.set(r, c, alpha * a.get(r, c)));
        Ok(())
    }
}

impl<M: Matrix> ElementwiseProductKernel<M> for Native {
    fn elementwise_product(a: &M, b: &M, c: &mut M) -> Result<()> {
        for_each_index(a.rows(), a.cols(), |r, col| {
            c.set(r, col, a.get(r, col) * b.get(r, col));
        });
        Ok(())
    }
}

impl<M: Matrix> ElementwiseSquareKernel<M> for Native {
    type Output = DenseMatrix<M::Scalar>;

    fn elementwise_square(m: &M) -> Result<Self::Output> {
        Ok(DenseMatrix::from_fn(m.rows(), m.cols(), |r, c| {
            let x = m.get(r, c);
            x * x
        }))
    }

    fn elementwise_square_into<R>(m: &M, result: &mut R) -> Result<()>
    where
        R: SquareTarget<M::Scalar>,
    {
        for_each_index(m.rows(), m.cols(), |r, c| {
            let x = m.get(r, c);
            result.set(r, c, x * x);
        });
        Ok(())
    }
}
