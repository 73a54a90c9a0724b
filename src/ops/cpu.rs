//! Parallel CPU backend kernels
//!
//! # CPU Backend
//!
//! Dense kernels for containers with [`Contiguous`] row-major storage. This is
//! the default backend whenever the `cpu` feature is enabled.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Row-parallel matrix product with an `i-l-j` loop order, so the inner loop
//!   streams over contiguous rows of `op(B)` and `C`
//! - Row-parallel convolution over the strided output grid
//!
//! ## Implemented Ops
//!
//! - `add`, `scale`, `elementwise_product`, `elementwise_square`
//! - `matrix_product` with transpose and accumulate flags
//! - `convolve` with flip, accumulate and stride flags
//!
//! ## Design Goals
//!
//! - Deterministic results: every output element is reduced on one thread in a fixed order
//! - Zero dependencies beyond `rayon`
//! - Modular: CPU kernels are separate from dispatching and validation

use rayon::prelude::*;

use crate::backend::Cpu;
use crate::error::Result;
use crate::matrix::{Contiguous, DenseMatrix, Scalar};
use crate::ops::{
    AddKernel, ConvolveKernel, ConvolveOptions, ElementwiseProductKernel, ElementwiseSquareKernel,
    MatrixProductKernel, ProductOptions, ScaleKernel, SquareTarget,
};

impl<M: Contiguous> AddKernel<M> for Cpu {
    fn add(a: &M, b: &M, c: &mut M, alpha: M::Scalar, beta: M::Scalar) -> Result<()> {
        c.as_mut_slice()
            .par_iter_mut()
            .zip(a.as_slice().par_iter())
            .zip(b.as_slice().par_iter())
            .for_each(|((z, &x), &y)| *z = alpha * x + beta * y);
        Ok(())
    }
}

impl<M: Contiguous> ScaleKernel<M> for Cpu {
    fn scale(a: &M, b: &mut M, alpha: M::Scalar) -> Result<()> {
        b.as_mut_slice()
            .par_iter_mut()
            .zip(a.as_slice().par_iter())
            .for_each(|(y, &x)| *y = alpha * x);
        Ok(())
    }
}

impl<M: Contiguous> ElementwiseProductKernel<M> for Cpu {
    fn elementwise_product(a: &M, b: &M, c: &mut M) -> Result<()> {
        c.as_mut_slice()
            .par_iter_mut()
            .zip(a.as_slice().par_iter())
            .zip(b.as_slice().par_iter())
            .for_each(|((z, &x), &y)| *z = x * y);
        Ok(())
    }
}

impl<M: Contiguous> ElementwiseSquareKernel<M> for Cpu {
    type Output = DenseMatrix<M::Scalar>;

    fn elementwise_square(m: &M) -> Result<Self::Output> {
        let data: Vec<M::Scalar> = m.as_slice().par_iter().map(|&x| x * x).collect();
        Ok(DenseMatrix::new(m.rows(), m.cols(), data))
    }

    fn elementwise_square_into<R>(m: &M, result: &mut R) -> Result<()>
    where
        R: SquareTarget<M::Scalar>,
    {
        let src = m.as_slice();
        let cols = m.cols();
        if let Some(out) = result.as_contiguous_mut() {
            out.par_iter_mut().zip(src.par_iter()).for_each(|(y, &x)| *y = x * x);
        } else {
            for (i, &x) in src.iter().enumerate() {
                result.set(i / cols, i % cols, x * x);
            }
        }
        Ok(())
    }
}

/// Element `(i, l)` of `op(X)` for a row-major `X` with `cols` columns.
#[inline]
fn op_at<T: Copy>(data: &[T], cols: usize, transpose: bool, i: usize, l: usize) -> T {
    if transpose {
        data[l * cols + i]
    } else {
        data[i * cols + l]
    }
}

impl<M: Contiguous> MatrixProductKernel<M> for Cpu {
    fn matrix_product(a: &M, b: &M, c: &mut M, options: ProductOptions) -> Result<()> {
        let a_cols = a.cols();
        let b_cols = b.cols();
        let inner = if options.transpose_a { a.rows() } else { a_cols };
        let n = c.cols();
        if n == 0 {
            return Ok(());
        }

        let a_data = a.as_slice();
        let b_data = b.as_slice();

        c.as_mut_slice()
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(i, row)| {
                if options.overwrite {
                    row.fill(M::Scalar::ZERO);
                }
                for l in 0..inner {
                    let a_il = op_at(a_data, a_cols, options.transpose_a, i, l);
                    for (j, out) in row.iter_mut().enumerate() {
                        *out += a_il * op_at(b_data, b_cols, options.transpose_b, l, j);
                    }
                }
            });
        Ok(())
    }
}

/// Index into a filter of radius `radius` for input offset `delta` in
/// `-radius..=radius`; mirrored unless `flip`.
#[inline]
fn filter_index(radius: usize, delta: isize, flip: bool) -> usize {
    let r = radius.cast_signed();
    (if flip { r + delta } else { r - delta }).cast_unsigned()
}

impl<M: Contiguous> ConvolveKernel<M> for Cpu {
    fn convolve(x: &M, w: &M, y: &mut M, options: ConvolveOptions) -> Result<()> {
        let (height, width) = (x.rows(), x.cols());
        let (ky, kx) = (w.rows(), w.cols());
        let (ry, rx) = ((ky - 1) / 2, (kx - 1) / 2);
        let out_cols = y.cols();
        if out_cols == 0 {
            return Ok(());
        }

        let x_data = x.as_slice();
        let w_data = w.as_slice();

        y.as_mut_slice()
            .par_chunks_mut(out_cols)
            .enumerate()
            .for_each(|(yo, row)| {
                let yc = yo * options.stride_y;
                for (xo, out) in row.iter_mut().enumerate() {
                    let xc = xo * options.stride_x;
                    let mut sum = if options.overwrite { M::Scalar::ZERO } else { *out };
                    for y1 in yc.saturating_sub(ry)..=(yc + ry).min(height - 1) {
                        let wy = filter_index(ry, y1.cast_signed() - yc.cast_signed(), options.flip);
                        for x1 in xc.saturating_sub(rx)..=(xc + rx).min(width - 1) {
                            let wx = filter_index(rx, x1.cast_signed() - xc.cast_signed(), options.flip);
                            sum += w_data[wy * kx + wx] * x_data[y1 * width + x1];
                        }
                    }
                    *out = sum;
                }
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix;
    use crate::matrix::Matrix;

    #[test]
    fn product_matches_known_values() {
        let a = matrix![[1.0, 2.0], [3.0, 4.0]];
        let b = matrix![[5.0, 6.0], [7.0, 8.0]];
        let mut c = matrix![[100.0, -3.0], [0.5, 42.0]];
        Cpu::matrix_product(&a, &b, &mut c, ProductOptions::default()).unwrap();
        assert_eq!(c, matrix![[19.0, 22.0], [43.0, 50.0]]);
    }

    #[test]
    fn product_accumulates_without_overwrite() {
        let a = matrix![[1.0, 2.0, 3.0]];
        let b = matrix![[1.0], [1.0], [1.0]];
        let mut c = matrix![[10.0]];
        Cpu::matrix_product(&a, &b, &mut c, ProductOptions::default().overwrite(false)).unwrap();
        assert_eq!(c, matrix![[16.0]]);
    }

    #[test]
    fn product_with_both_transposes() {
        // Aᵗ is 2x3, Bᵗ is 3x2
        let a = matrix![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]];
        let b = matrix![[7.0, 9.0, 11.0], [8.0, 10.0, 12.0]];
        let mut c = DenseMatrix::zeros(2, 2);
        let options = ProductOptions::default().transpose_a(true).transpose_b(true);
        Cpu::matrix_product(&a, &b, &mut c, options).unwrap();
        assert_eq!(c, matrix![[58.0, 64.0], [139.0, 154.0]]);
    }

    #[test]
    fn convolve_mirrors_filter_unless_flipped() {
        let x = matrix![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let w = matrix![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];

        // an impulse convolved with W reproduces W
        let mut y = DenseMatrix::zeros(3, 3);
        Cpu::convolve(&x, &w, &mut y, ConvolveOptions::default()).unwrap();
        assert_eq!(y, w);

        // cross-correlation reproduces W rotated by 180 degrees
        Cpu::convolve(&x, &w, &mut y, ConvolveOptions::default().flip(true)).unwrap();
        assert_eq!(y, matrix![[9.0, 8.0, 7.0], [6.0, 5.0, 4.0], [3.0, 2.0, 1.0]]);
    }

    #[test]
    fn convolve_pads_borders_with_zeros() {
        let x = matrix![[1.0, 1.0], [1.0, 1.0]];
        let w = matrix![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        let mut y = DenseMatrix::zeros(2, 2);
        Cpu::convolve(&x, &w, &mut y, ConvolveOptions::default()).unwrap();
        assert_eq!(y, matrix![[4.0, 4.0], [4.0, 4.0]]);
    }

    #[test]
    fn convolve_strides_subsample_and_accumulate() {
        let x = DenseMatrix::from_fn(4, 5, |r, c| (r * 5 + c) as f64);
        let w = matrix![[1.0]];
        let mut y = DenseMatrix::from_fn(2, 3, |_, _| 1.0);
        let options = ConvolveOptions::default().strides(2, 2).overwrite(false);
        Cpu::convolve(&x, &w, &mut y, options).unwrap();
        assert_eq!(y, matrix![[1.0, 3.0, 5.0], [11.0, 13.0, 15.0]]);
    }

    #[test]
    fn square_forms_agree() {
        let m = matrix![[1.0, -2.0], [3.0, -4.0]];
        let owned = Cpu::elementwise_square(&m).unwrap();
        let mut into = DenseMatrix::zeros(2, 2);
        Cpu::elementwise_square_into(&m, &mut into).unwrap();
        assert_eq!(owned, into);
        assert_eq!(owned, matrix![[1.0, 4.0], [9.0, 16.0]]);
    }

    /// Square target without row-major storage, stored column-major.
    struct ColumnMajor {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    }

    impl Matrix for ColumnMajor {
        type Scalar = f64;

        fn rows(&self) -> usize {
            self.rows
        }

        fn cols(&self) -> usize {
            self.cols
        }

        fn get(&self, row: usize, col: usize) -> f64 {
            self.data[col * self.rows + row]
        }

        fn set(&mut self, row: usize, col: usize, value: f64) {
            self.data[col * self.rows + row] = value;
        }
    }

    impl SquareTarget<f64> for ColumnMajor {
        fn as_contiguous_mut(&mut self) -> Option<&mut [f64]> {
            None
        }
    }

    #[test]
    fn square_into_non_contiguous_target() {
        let m = DenseMatrix::from_fn(3, 4, |r, c| (r * 4 + c) as f64 - 5.0);
        let mut result = ColumnMajor {
            rows: 3,
            cols: 4,
            data: vec![0.0; 12],
        };
        Cpu::elementwise_square_into(&m, &mut result).unwrap();
        for r in 0..3 {
            for c in 0..4 {
                let x = m.get(r, c);
                assert_eq!(result.get(r, c), x * x);
            }
        }
        // column-major layout: (1, 0) sits right after (0, 0)
        assert_eq!(result.data[1], 1.0);
    }
}
