#![cfg(feature = "wgpu")]

use linalg_dispatch::approx::roughly_eq;
use linalg_dispatch::ops::wgpu::context;
use linalg_dispatch::{
    matrix, ConvolveOptions, DenseMatrix, Linalg, LinalgError, Matrix, Native, ProductOptions,
    SquareTarget, Wgpu,
};

/// Skips the calling test when the machine has no usable adapter.
macro_rules! require_gpu {
    () => {
        if let Err(err) = context() {
            eprintln!("skipping: {err}");
            return;
        }
    };
}

#[test]
fn test_wgpu_elementwise_ops() {
    require_gpu!();
    let a = matrix![[1.0, 2.0], [3.0, 4.0]];
    let b = matrix![[5.0, 6.0], [7.0, 8.0]];
    let mut c = DenseMatrix::zeros(2, 2);

    Linalg::<Wgpu>::add(&a, &b, &mut c, 1.0, 1.0).unwrap();
    assert_eq!(c, matrix![[6.0, 8.0], [10.0, 12.0]]);

    Linalg::<Wgpu>::subtract(&a, &b, &mut c, 2.0, 1.0).unwrap();
    assert_eq!(c, matrix![[-3.0, -2.0], [-1.0, 0.0]]);

    Linalg::<Wgpu>::scale(&a, &mut c, -0.5).unwrap();
    assert_eq!(c, matrix![[-0.5, -1.0], [-1.5, -2.0]]);

    Linalg::<Wgpu>::elementwise_product(&a, &b, &mut c).unwrap();
    assert_eq!(c, matrix![[5.0, 12.0], [21.0, 32.0]]);

    let owned = Linalg::<Wgpu>::elementwise_square(&a).unwrap();
    Linalg::<Wgpu>::elementwise_square_into(&a, &mut c).unwrap();
    assert_eq!(owned, c);
    assert_eq!(owned, matrix![[1.0, 4.0], [9.0, 16.0]]);
}

/// Square target stored column-major, with no row-major slice to hand out.
struct ColumnMajor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix for ColumnMajor {
    type Scalar = f32;

    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get(&self, row: usize, col: usize) -> f32 {
        self.data[col * self.rows + row]
    }

    fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[col * self.rows + row] = value;
    }
}

impl SquareTarget<f32> for ColumnMajor {
    fn as_contiguous_mut(&mut self) -> Option<&mut [f32]> {
        None
    }
}

#[test]
fn test_wgpu_square_into_non_contiguous_target() {
    require_gpu!();
    let m: DenseMatrix<f32> = DenseMatrix::from_fn(3, 4, |r, c| (r * 4 + c) as f32 - 5.0);
    let mut result = ColumnMajor {
        rows: 3,
        cols: 4,
        data: vec![0.0; 12],
    };
    Linalg::<Wgpu>::elementwise_square_into(&m, &mut result).unwrap();
    for r in 0..3 {
        for c in 0..4 {
            let x = m.get(r, c);
            assert_eq!(result.get(r, c), x * x);
        }
    }
    assert_eq!(result.data[1], 1.0);
}

#[test]
fn test_wgpu_large_elementwise_matches_native() {
    require_gpu!();
    let a: DenseMatrix<f32> = DenseMatrix::from_fn(300, 257, |r, c| ((r * 7 + c) % 13) as f32);
    let b: DenseMatrix<f32> = DenseMatrix::from_fn(300, 257, |r, c| ((r + c * 3) % 5) as f32);
    let mut gpu = DenseMatrix::zeros(300, 257);
    let mut cpu = DenseMatrix::zeros(300, 257);
    Linalg::<Wgpu>::add(&a, &b, &mut gpu, 0.5, -2.0).unwrap();
    Linalg::<Native>::add(&a, &b, &mut cpu, 0.5, -2.0).unwrap();
    assert_eq!(gpu, cpu);
}

#[test]
fn test_wgpu_matrix_product() {
    require_gpu!();
    let a = matrix![[1.0, 2.0], [3.0, 4.0]];
    let b = matrix![[5.0, 6.0], [7.0, 8.0]];
    let mut c = matrix![[100.0, -1.0], [3.0, 9.0]];
    Linalg::<Wgpu>::matrix_product(&a, &b, &mut c, ProductOptions::default()).unwrap();
    assert_eq!(c, matrix![[19.0, 22.0], [43.0, 50.0]]);

    let options = ProductOptions::default().overwrite(false);
    Linalg::<Wgpu>::matrix_product(&a, &b, &mut c, options).unwrap();
    assert_eq!(c, matrix![[38.0, 44.0], [86.0, 100.0]]);

    let a = matrix![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]];
    let b = matrix![[7.0, 9.0, 11.0], [8.0, 10.0, 12.0]];
    let options = ProductOptions::default().transpose_a(true).transpose_b(true);
    let mut c = DenseMatrix::zeros(2, 2);
    Linalg::<Wgpu>::matrix_product(&a, &b, &mut c, options).unwrap();
    assert_eq!(c, matrix![[58.0, 64.0], [139.0, 154.0]]);
}

#[cfg(feature = "cpu")]
#[test]
fn test_wgpu_product_matches_cpu() {
    require_gpu!();
    let a = DenseMatrix::from_fn(37, 19, |r, c| ((r * 31 + c * 17) % 11) as f64 / 4.0);
    let b = DenseMatrix::from_fn(19, 41, |r, c| ((r * 13 + c * 7) % 9) as f64 / 8.0);
    let mut gpu = DenseMatrix::zeros(37, 41);
    let mut cpu = DenseMatrix::zeros(37, 41);
    Linalg::<Wgpu>::matrix_product(&a, &b, &mut gpu, ProductOptions::default()).unwrap();
    linalg_dispatch::matrix_product(&a, &b, &mut cpu, ProductOptions::default()).unwrap();
    assert!(roughly_eq(&gpu, &cpu));
}

#[test]
fn test_wgpu_convolve() {
    require_gpu!();
    let x = matrix![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
    let w = matrix![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]];
    let mut y = DenseMatrix::zeros(3, 3);

    Linalg::<Wgpu>::convolve(&x, &w, &mut y, ConvolveOptions::default()).unwrap();
    assert_eq!(y, w);

    Linalg::<Wgpu>::convolve(&x, &w, &mut y, ConvolveOptions::default().flip(true)).unwrap();
    assert_eq!(y, matrix![[9.0, 8.0, 7.0], [6.0, 5.0, 4.0], [3.0, 2.0, 1.0]]);

    let x = DenseMatrix::from_fn(4, 5, |r, c| (r * 5 + c) as f64);
    let mut y = DenseMatrix::from_fn(2, 3, |_, _| 1.0);
    let options = ConvolveOptions::default().strides(2, 2).overwrite(false);
    Linalg::<Wgpu>::convolve(&x, &matrix![[1.0]], &mut y, options).unwrap();
    assert_eq!(y, matrix![[1.0, 3.0, 5.0], [11.0, 13.0, 15.0]]);
}

#[test]
fn test_wgpu_validation_runs_before_device() {
    // shape checks never touch the device, so this holds with or without one
    let x = matrix![[1.0, 2.0], [3.0, 4.0]];
    let w = matrix![[1.0, 1.0]];
    let mut y = DenseMatrix::zeros(2, 2);
    let err = Linalg::<Wgpu>::convolve(&x, &w, &mut y, ConvolveOptions::default()).unwrap_err();
    assert!(matches!(err, LinalgError::EvenFilter(_)));
}
