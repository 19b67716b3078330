//! Dense column major matrix with factorization state.
//!
//! This is the working currency of the compression engine: assembled
//! kernel blocks, the temporary factors of the cross approximation loops
//! and the final low-rank factors are all stored here. On top of plain
//! storage the type tracks factorization state: LU pivots, the detached
//! diagonal of an LDLt factorization and the triangular shape flags that
//! solves rely on.
//!
//! Storage is always column major so that slices can be handed to LAPACK
//! unchanged; `ndarray`'s stride machinery plays the role of the leading
//! dimension, and views give borrowed access where the original code
//! wrapped externally owned pointers.

use crate::types::{lapack_failure, HScalar, Result};
use crate::vector::VectorOps;
use lax::layout::MatrixLayout;
use ndarray::linalg::general_mat_mul;
use ndarray::{s, Array1, Array2, CowArray, Ix2, ShapeBuilder};
use ndarray_linalg::{Diag, SolveTriangular, UPLO};
use num::traits::{One, Zero};

/// Transposition selector for [`FullMatrix::gemm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    NoTrans,
    Trans,
    ConjTrans,
}

pub struct FullMatrix<A: HScalar> {
    /// Element storage, always column major.
    pub data: Array2<A>,
    pivots: Option<Vec<i32>>,
    diagonal: Option<Array1<A>>,
    tri_upper: bool,
    tri_lower: bool,
}

impl<A: HScalar> FullMatrix<A> {
    /// A zero initialized `rows x cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        FullMatrix {
            data: Array2::zeros((rows, cols).f()),
            pivots: None,
            diagonal: None,
            tri_upper: false,
            tri_lower: false,
        }
    }

    /// Wrap an existing array, converting to column major storage if
    /// necessary.
    pub fn from_array(arr: Array2<A>) -> Self {
        let data = if arr.t().is_standard_layout() {
            arr
        } else {
            let mut fortran = Array2::zeros(arr.raw_dim().f());
            fortran.assign(&arr);
            fortran
        };
        FullMatrix {
            data,
            pivots: None,
            diagonal: None,
            tri_upper: false,
            tri_lower: false,
        }
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// LU pivots, present iff [`FullMatrix::lu`] has run.
    pub fn pivots(&self) -> Option<&[i32]> {
        self.pivots.as_deref()
    }

    /// Detached diagonal, present iff [`FullMatrix::ldlt`] has run.
    pub fn diagonal(&self) -> Option<&Array1<A>> {
        self.diagonal.as_ref()
    }

    pub fn is_tri_upper(&self) -> bool {
        self.tri_upper
    }

    pub fn is_tri_lower(&self) -> bool {
        self.tri_lower
    }

    fn layout(&self) -> MatrixLayout {
        debug_assert!(self.data.t().is_standard_layout());
        MatrixLayout::F {
            col: self.ncols() as i32,
            lda: self.nrows() as i32,
        }
    }

    /// Set all elements (and the detached diagonal, if any) to zero.
    pub fn clear(&mut self) {
        self.data.fill(A::zero());
        if let Some(diagonal) = &mut self.diagonal {
            diagonal.fill(A::zero());
        }
    }

    /// Scale all elements; the detached diagonal is scaled as well.
    pub fn scale(&mut self, alpha: A) {
        self.data.mapv_inplace(|item| item * alpha);
        if let Some(diagonal) = &mut self.diagonal {
            diagonal.mapv_inplace(|item| item * alpha);
        }
    }

    /// Transpose in place. Square matrices are swapped element wise,
    /// rectangular ones go through a temporary. The triangular shape
    /// flags travel with the data.
    pub fn transpose(&mut self) {
        let (rows, cols) = (self.nrows(), self.ncols());
        if rows == cols {
            for col in 0..cols {
                for row in 0..col {
                    let tmp = self.data[[row, col]];
                    self.data[[row, col]] = self.data[[col, row]];
                    self.data[[col, row]] = tmp;
                }
            }
        } else {
            let mut transposed = Array2::zeros((cols, rows).f());
            transposed.assign(&self.data.t());
            self.data = transposed;
        }
        if self.tri_upper {
            self.tri_upper = false;
            self.tri_lower = true;
        } else if self.tri_lower {
            self.tri_lower = false;
            self.tri_upper = true;
        }
    }

    /// Copy of the matrix data, diagonal and shape flags. Pivots are not
    /// carried over.
    pub fn copy(&self) -> FullMatrix<A> {
        let mut result = FullMatrix::zeros(self.nrows(), self.ncols());
        result.data.assign(&self.data);
        result.diagonal = self.diagonal.clone();
        result.tri_upper = self.tri_upper;
        result.tri_lower = self.tri_lower;
        result
    }

    pub fn copy_and_transpose(&self) -> FullMatrix<A> {
        let mut result = FullMatrix::zeros(self.ncols(), self.nrows());
        result.data.assign(&self.data.t());
        result
    }

    /// Copy `a` into this matrix starting at the given offset.
    pub fn copy_at(&mut self, a: &FullMatrix<A>, row_offset: usize, col_offset: usize) {
        self.data
            .slice_mut(s![
                row_offset..row_offset + a.nrows(),
                col_offset..col_offset + a.ncols()
            ])
            .assign(&a.data);
    }

    /// Copy the leading `rows x cols` part of `a` into this matrix at the
    /// given offset.
    pub fn copy_at_size(
        &mut self,
        a: &FullMatrix<A>,
        row_offset: usize,
        col_offset: usize,
        rows: usize,
        cols: usize,
    ) {
        self.data
            .slice_mut(s![row_offset..row_offset + rows, col_offset..col_offset + cols])
            .assign(&a.data.slice(s![..rows, ..cols]));
    }

    /// `self <- alpha * op(a) * op(b) + beta * self`.
    pub fn gemm(&mut self, ta: Op, tb: Op, alpha: A, a: &FullMatrix<A>, b: &FullMatrix<A>, beta: A) {
        let a_op = op_view(&a.data, ta);
        let b_op = op_view(&b.data, tb);
        assert_eq!(self.nrows(), a_op.nrows());
        assert_eq!(self.ncols(), b_op.ncols());
        assert_eq!(a_op.ncols(), b_op.nrows());
        general_mat_mul(alpha, &a_op, &b_op, beta, &mut self.data);
    }

    /// `y <- alpha * op(self) * x + beta * y`.
    pub fn gemv(&self, trans: Op, alpha: A, x: &Array1<A>, beta: A, y: &mut Array1<A>) {
        let a_op = op_view(&self.data, trans);
        assert_eq!(a_op.ncols(), x.len());
        assert_eq!(a_op.nrows(), y.len());
        let product = a_op.dot(x);
        for (out, &value) in y.iter_mut().zip(product.iter()) {
            *out = *out * beta + value * alpha;
        }
    }

    /// `self <- self + alpha * a`.
    pub fn axpy(&mut self, alpha: A, a: &FullMatrix<A>) {
        assert_eq!(self.nrows(), a.nrows());
        assert_eq!(self.ncols(), a.ncols());
        self.data.scaled_add(alpha, &a.data);
    }

    /// Squared Frobenius norm, accumulated in f64.
    pub fn norm_sqr(&self) -> f64 {
        self.data.iter().map(|&item| item.squared_norm()).sum()
    }

    pub fn norm(&self) -> f64 {
        self.norm_sqr().sqrt()
    }

    /// Abort if any element is NaN.
    pub fn check_nan(&self) {
        for &item in self.data.iter() {
            assert!(!item.is_nan(), "NaN detected in matrix entries");
        }
    }

    /// LU factorization with partial pivoting (getrf). The pivots are
    /// stored on the matrix for the subsequent solves. A singular pivot
    /// is a fatal error.
    pub fn lu(&mut self) {
        if self.is_empty() {
            return;
        }
        let layout = self.layout();
        let slice = self.data.as_slice_memory_order_mut().unwrap();
        match lax::Solve_::lu(layout, slice) {
            Ok(pivots) => self.pivots = Some(pivots),
            Err(err) => panic!("getrf failed during LU factorization: {:?}", err),
        }
    }

    /// Cholesky factorization A = L L^H (potrf). The strict upper
    /// triangle is zeroed after the factorization.
    pub fn llt(&mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        assert_eq!(self.nrows(), self.ncols(), "llt requires a square matrix");
        let layout = self.layout();
        let slice = self.data.as_slice_memory_order_mut().unwrap();
        lax::Cholesky_::cholesky(layout, lax::UPLO::Lower, slice)
            .map_err(|err| lapack_failure("potrf", err))?;
        self.tri_lower = true;
        for col in 1..self.ncols() {
            for row in 0..col {
                self.data[[row, col]] = A::zero();
            }
        }
        Ok(())
    }

    /// LDLt factorization without pivoting.
    ///
    /// The plain two-loop algorithm is used instead of sytrf: the blocks
    /// this is applied to come from symmetric positive definite integral
    /// operators, where no pivoting is required. After the call the
    /// storage holds a unit lower triangular L and the diagonal lives in
    /// [`FullMatrix::diagonal`]. A zero pivot is a fatal error.
    pub fn ldlt(&mut self) {
        if self.is_empty() {
            return;
        }
        let n = self.nrows();
        assert_eq!(n, self.ncols(), "ldlt requires a square matrix");

        let mut diagonal = Array1::<A>::zeros(n);
        let mut v = vec![A::zero(); n];
        for j in 0..n {
            for i in 0..j {
                v[i] = self.data[[j, i]] * self.data[[i, i]];
            }
            v[j] = self.data[[j, j]];
            for i in 0..j {
                v[j] = v[j] - self.data[[j, i]] * v[i];
            }
            self.data[[j, j]] = v[j];
            for i in 0..j {
                for k in (j + 1)..n {
                    let update = self.data[[k, i]] * v[i];
                    self.data[[k, j]] = self.data[[k, j]] - update;
                }
            }
            if j + 1 < n {
                assert!(v[j] != A::zero(), "division by zero in LDLt at pivot {}", j);
                for k in (j + 1)..n {
                    self.data[[k, j]] = self.data[[k, j]] / v[j];
                }
            }
        }

        for i in 0..n {
            diagonal[i] = self.data[[i, i]];
            self.data[[i, i]] = A::one();
            for j in (i + 1)..n {
                self.data[[i, j]] = A::zero();
            }
        }

        self.diagonal = Some(diagonal);
        self.tri_lower = true;
    }

    /// Solve `L X = B` in place of `x`.
    ///
    /// If the matrix has been LU factorized the row pivots are applied to
    /// `x` first, exactly as getrs does before its triangular solves.
    pub fn solve_lower_triangular_left(&self, x: &mut FullMatrix<A>, unit: bool) -> Result<()> {
        if x.is_empty() {
            return Ok(());
        }
        if let Some(pivots) = &self.pivots {
            apply_pivots(&mut x.data, pivots);
        }
        let diag = if unit { Diag::Unit } else { Diag::NonUnit };
        let solution = self.data.solve_triangular(UPLO::Lower, diag, &x.data)?;
        x.data.assign(&solution);
        Ok(())
    }

    /// Solve `X U = B` in place of `x`. With `lower_stored` the matrix
    /// holds L and the system solved is `X L^T = B`.
    pub fn solve_upper_triangular_right(
        &self,
        x: &mut FullMatrix<A>,
        unit: bool,
        lower_stored: bool,
    ) -> Result<()> {
        if x.is_empty() {
            return Ok(());
        }
        let diag = if unit { Diag::Unit } else { Diag::NonUnit };
        let rhs_t = x.data.t().to_owned();
        let solution_t = if lower_stored {
            // X L^T = B  <=>  L X^T = B^T
            self.data.solve_triangular(UPLO::Lower, diag, &rhs_t)?
        } else {
            // X U = B  <=>  U^T X^T = B^T with U^T lower triangular
            let transposed = self.data.t().to_owned();
            transposed.solve_triangular(UPLO::Lower, diag, &rhs_t)?
        };
        x.data.assign(&solution_t.t());
        Ok(())
    }

    /// Solve `U X = B` in place of `x`. With `lower_stored` the matrix
    /// holds L and the system solved is `L^T X = B`.
    pub fn solve_upper_triangular_left(
        &self,
        x: &mut FullMatrix<A>,
        unit: bool,
        lower_stored: bool,
    ) -> Result<()> {
        if x.is_empty() {
            return Ok(());
        }
        let diag = if unit { Diag::Unit } else { Diag::NonUnit };
        let solution = if lower_stored {
            let transposed = self.data.t().to_owned();
            transposed.solve_triangular(UPLO::Upper, diag, &x.data)?
        } else {
            self.data.solve_triangular(UPLO::Upper, diag, &x.data)?
        };
        x.data.assign(&solution);
        Ok(())
    }

    /// Solve `A X = B` using the stored LU factorization (getrs).
    pub fn solve(&self, x: &mut FullMatrix<A>) -> Result<()> {
        if x.is_empty() {
            return Ok(());
        }
        let pivots = self
            .pivots
            .as_ref()
            .expect("solve called on a matrix that has not been LU factorized");
        let layout = self.layout();
        let a_slice = self.data.as_slice_memory_order().unwrap();
        let n = x.nrows();
        let x_slice = x.data.as_slice_memory_order_mut().unwrap();
        for rhs in x_slice.chunks_exact_mut(n) {
            lax::Solve_::solve(layout, lax::Transpose::No, a_slice, pivots, rhs)
                .map_err(|err| lapack_failure("getrs", err))?;
        }
        Ok(())
    }

    /// Invert in place via getrf + getri.
    pub fn inverse(&mut self) -> Result<()> {
        assert_eq!(self.nrows(), self.ncols(), "inverse requires a square matrix");
        if self.is_empty() {
            return Ok(());
        }
        let layout = self.layout();
        let slice = self.data.as_slice_memory_order_mut().unwrap();
        let pivots =
            lax::Solve_::lu(layout, slice).map_err(|err| lapack_failure("getrf", err))?;
        lax::Solve_::inv(layout, slice, &pivots).map_err(|err| lapack_failure("getri", err))?;
        Ok(())
    }

    /// True iff every column is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data.columns().into_iter().all(|col| col.is_zero())
    }
}

fn op_view<A: HScalar>(data: &Array2<A>, op: Op) -> CowArray<'_, A, Ix2> {
    match op {
        Op::NoTrans => data.view().into(),
        Op::Trans => data.t().into(),
        Op::ConjTrans => data.t().mapv(|item| item.conj()).into(),
    }
}

/// Apply getrf style row interchanges: row `i` is swapped with row
/// `pivots[i] - 1`, in order (the laswp convention).
fn apply_pivots<A: HScalar>(x: &mut Array2<A>, pivots: &[i32]) {
    for (row, &pivot) in pivots.iter().enumerate() {
        let other = (pivot - 1) as usize;
        if other != row {
            let (mut first, mut second) = x.multi_slice_mut((s![row, ..], s![other, ..]));
            ndarray::Zip::from(&mut first)
                .and(&mut second)
                .for_each(std::mem::swap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{c32, c64};
    use num::cast::cast;

    fn mat_from_fn<A: HScalar>(
        rows: usize,
        cols: usize,
        f: impl Fn(usize, usize) -> f64,
    ) -> FullMatrix<A> {
        let mut result = FullMatrix::zeros(rows, cols);
        for col in 0..cols {
            for row in 0..rows {
                result.data[[row, col]] = cast::<f64, A>(f(row, col)).unwrap();
            }
        }
        result
    }

    fn rel_diff<A: HScalar>(actual: &FullMatrix<A>, expected: &FullMatrix<A>) -> f64 {
        let mut diff = actual.copy();
        diff.axpy(-A::one(), expected);
        diff.norm() / expected.norm()
    }

    macro_rules! gemm_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let a = mat_from_fn::<$scalar>(3, 4, |i, j| (i + 2 * j) as f64);
                let b = mat_from_fn::<$scalar>(2, 4, |i, j| 1.0 / (1.0 + (i + j) as f64));

                // c <- 2 a b^T + c, against a manual triple loop.
                let mut c = mat_from_fn::<$scalar>(3, 2, |i, j| (i * j) as f64);
                let mut expected = FullMatrix::<$scalar>::zeros(3, 2);
                for i in 0..3 {
                    for j in 0..2 {
                        let mut acc = c.data[[i, j]];
                        for l in 0..4 {
                            acc = acc + cast::<f64, $scalar>(2.0).unwrap()
                                * a.data[[i, l]] * b.data[[j, l]];
                        }
                        expected.data[[i, j]] = acc;
                    }
                }
                c.gemm(
                    Op::NoTrans,
                    Op::Trans,
                    cast::<f64, $scalar>(2.0).unwrap(),
                    &a,
                    &b,
                    <$scalar as One>::one(),
                );
                assert!(rel_diff(&c, &expected) < $tol);
            }
            )*
        };
    }

    macro_rules! lu_solve_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 6;
                let mut a = mat_from_fn::<$scalar>(n, n, |i, j| {
                    if i == j { 10.0 } else { 1.0 / (1.0 + (i + j) as f64) }
                });
                let x = mat_from_fn::<$scalar>(n, 2, |i, j| (1 + i + j) as f64);
                let mut b = FullMatrix::<$scalar>::zeros(n, 2);
                b.gemm(Op::NoTrans, Op::NoTrans, One::one(), &a, &x, Zero::zero());

                a.lu();
                assert!(a.pivots().is_some());

                // Full solve via getrs.
                let mut sol = b.copy();
                a.solve(&mut sol).unwrap();
                assert!(rel_diff(&sol, &x) < $tol);

                // Same solution via the two triangular stages.
                let mut staged = b.copy();
                a.solve_lower_triangular_left(&mut staged, true).unwrap();
                a.solve_upper_triangular_left(&mut staged, false, false).unwrap();
                assert!(rel_diff(&staged, &x) < $tol);
            }
            )*
        };
    }

    macro_rules! upper_right_solve_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 5;
                let u = mat_from_fn::<$scalar>(n, n, |i, j| {
                    if i > j { 0.0 } else if i == j { 3.0 + i as f64 } else { 1.0 }
                });
                let x = mat_from_fn::<$scalar>(3, n, |i, j| ((i + 1) * (j + 2)) as f64);
                let mut b = FullMatrix::<$scalar>::zeros(3, n);
                b.gemm(Op::NoTrans, Op::NoTrans, One::one(), &x, &u, Zero::zero());

                let mut sol = b.copy();
                u.solve_upper_triangular_right(&mut sol, false, false).unwrap();
                assert!(rel_diff(&sol, &x) < $tol);

                // The same system with the transposed factor stored as L.
                let l = u.copy_and_transpose();
                let mut sol = b.copy();
                l.solve_upper_triangular_right(&mut sol, false, true).unwrap();
                assert!(rel_diff(&sol, &x) < $tol);
            }
            )*
        };
    }

    macro_rules! llt_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 5;
                let b = mat_from_fn::<$scalar>(n, n, |i, j| 1.0 / (1.0 + (i + 2 * j) as f64));
                let mut a = mat_from_fn::<$scalar>(n, n, |i, j| if i == j { 2.0 } else { 0.0 });
                a.gemm(Op::NoTrans, Op::ConjTrans, One::one(), &b, &b, One::one());
                let original = a.copy();

                a.llt().unwrap();
                assert!(a.is_tri_lower());

                let mut reconstructed = FullMatrix::<$scalar>::zeros(n, n);
                reconstructed.gemm(Op::NoTrans, Op::ConjTrans, One::one(), &a, &a, Zero::zero());
                assert!(rel_diff(&reconstructed, &original) < $tol);
            }
            )*
        };
    }

    macro_rules! ldlt_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 5;
                let b = mat_from_fn::<$scalar>(n, n, |i, j| 1.0 / (1.0 + (2 * i + j) as f64));
                let mut a = mat_from_fn::<$scalar>(n, n, |i, j| if i == j { 3.0 } else { 0.0 });
                a.gemm(Op::NoTrans, Op::Trans, One::one(), &b, &b, One::one());
                let original = a.copy();

                a.ldlt();
                assert!(a.is_tri_lower());
                let diagonal = a.diagonal().expect("ldlt must detach the diagonal").clone();
                for i in 0..n {
                    assert!(a.data[[i, i]] == One::one());
                }

                // Reconstruct L D L^T.
                let mut scaled = a.copy();
                for (j, mut col) in scaled.data.columns_mut().into_iter().enumerate() {
                    col.mapv_inplace(|item| item * diagonal[j]);
                }
                let mut reconstructed = FullMatrix::<$scalar>::zeros(n, n);
                reconstructed.gemm(Op::NoTrans, Op::Trans, One::one(), &scaled, &a, Zero::zero());
                assert!(rel_diff(&reconstructed, &original) < $tol);
            }
            )*
        };
    }

    macro_rules! inverse_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 4;
                let a = mat_from_fn::<$scalar>(n, n, |i, j| {
                    if i == j { 4.0 } else { 1.0 / (1.0 + (i + j) as f64) }
                });
                let mut inv = a.copy();
                inv.inverse().unwrap();

                let mut product = FullMatrix::<$scalar>::zeros(n, n);
                product.gemm(Op::NoTrans, Op::NoTrans, One::one(), &a, &inv, Zero::zero());
                let identity = mat_from_fn::<$scalar>(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
                assert!(rel_diff(&product, &identity) < $tol);
            }
            )*
        };
    }

    gemm_tests! {
        test_gemm_f32: f32, 1E-5,
        test_gemm_f64: f64, 1E-12,
        test_gemm_c32: c32, 1E-5,
        test_gemm_c64: c64, 1E-12,
    }

    lu_solve_tests! {
        test_lu_solve_f32: f32, 1E-4,
        test_lu_solve_f64: f64, 1E-10,
        test_lu_solve_c32: c32, 1E-4,
        test_lu_solve_c64: c64, 1E-10,
    }

    upper_right_solve_tests! {
        test_solve_upper_right_f32: f32, 1E-4,
        test_solve_upper_right_f64: f64, 1E-10,
        test_solve_upper_right_c32: c32, 1E-4,
        test_solve_upper_right_c64: c64, 1E-10,
    }

    llt_tests! {
        test_llt_f32: f32, 1E-4,
        test_llt_f64: f64, 1E-10,
        test_llt_c32: c32, 1E-4,
        test_llt_c64: c64, 1E-10,
    }

    ldlt_tests! {
        test_ldlt_f32: f32, 1E-3,
        test_ldlt_f64: f64, 1E-10,
        test_ldlt_c32: c32, 1E-3,
        test_ldlt_c64: c64, 1E-10,
    }

    inverse_tests! {
        test_inverse_f32: f32, 1E-4,
        test_inverse_f64: f64, 1E-10,
        test_inverse_c32: c32, 1E-4,
        test_inverse_c64: c64, 1E-10,
    }

    macro_rules! gemv_tests {
        ($($name:ident: $scalar:ty, $tol:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let a = mat_from_fn::<$scalar>(4, 3, |i, j| (1 + i * 3 + j) as f64);
                let x: Array1<$scalar> =
                    (0..3).map(|i| cast::<f64, $scalar>(i as f64 - 1.0).unwrap()).collect();
                let mut y: Array1<$scalar> =
                    (0..4).map(|i| cast::<f64, $scalar>(i as f64).unwrap()).collect();

                let mut expected = y.clone();
                for row in 0..4 {
                    let mut acc = expected[row] * cast::<f64, $scalar>(3.0).unwrap();
                    for col in 0..3 {
                        acc = acc + cast::<f64, $scalar>(2.0).unwrap()
                            * a.data[[row, col]] * x[col];
                    }
                    expected[row] = acc;
                }

                a.gemv(
                    Op::NoTrans,
                    cast::<f64, $scalar>(2.0).unwrap(),
                    &x,
                    cast::<f64, $scalar>(3.0).unwrap(),
                    &mut y,
                );
                let diff: f64 = y
                    .iter()
                    .zip(expected.iter())
                    .map(|(&actual, &wanted)| (actual - wanted).squared_norm())
                    .sum();
                assert!(diff.sqrt() < $tol);
            }
            )*
        };
    }

    gemv_tests! {
        test_gemv_f32: f32, 1E-4,
        test_gemv_f64: f64, 1E-10,
        test_gemv_c64: c64, 1E-10,
    }

    #[test]
    fn transpose_toggles_triangle_flags() {
        let mut a = mat_from_fn::<f64>(4, 4, |i, j| if i == j { 5.0 } else { 1.0 });
        a.llt().unwrap();
        assert!(a.is_tri_lower() && !a.is_tri_upper());
        a.transpose();
        assert!(a.is_tri_upper() && !a.is_tri_lower());
        a.transpose();
        assert!(a.is_tri_lower() && !a.is_tri_upper());
    }

    #[test]
    fn transpose_rectangular() {
        let a = mat_from_fn::<f64>(3, 5, |i, j| (i * 10 + j) as f64);
        let mut b = a.copy();
        b.transpose();
        assert_eq!(b.nrows(), 5);
        assert_eq!(b.ncols(), 3);
        for i in 0..3 {
            for j in 0..5 {
                assert_eq!(a.data[[i, j]], b.data[[j, i]]);
            }
        }
    }

    #[test]
    fn scale_also_scales_detached_diagonal() {
        let mut a = mat_from_fn::<f64>(3, 3, |i, j| if i == j { 2.0 + i as f64 } else { 0.5 });
        a.ldlt();
        let before = a.diagonal().unwrap().clone();
        a.scale(2.0);
        let after = a.diagonal().unwrap();
        for i in 0..3 {
            assert_eq!(after[i], 2.0 * before[i]);
        }
    }

    #[test]
    fn copy_at_places_submatrix() {
        let a = mat_from_fn::<f64>(2, 2, |i, j| (1 + i + 10 * j) as f64);
        let mut b = FullMatrix::<f64>::zeros(4, 4);
        b.copy_at(&a, 1, 2);
        assert_eq!(b.data[[1, 2]], 1.0);
        assert_eq!(b.data[[2, 3]], 12.0);
        assert_eq!(b.data[[0, 0]], 0.0);

        let mut c = FullMatrix::<f64>::zeros(4, 4);
        c.copy_at_size(&a, 0, 0, 1, 2);
        assert_eq!(c.data[[0, 1]], 11.0);
        assert_eq!(c.data[[1, 0]], 0.0);
    }

    #[test]
    #[should_panic(expected = "has not been LU factorized")]
    fn solve_without_pivots_panics() {
        let a = mat_from_fn::<f64>(3, 3, |i, j| if i == j { 1.0 } else { 0.0 });
        let mut b = FullMatrix::<f64>::zeros(3, 1);
        b.data[[0, 0]] = 1.0;
        let _ = a.solve(&mut b);
    }

    #[test]
    fn zero_detection_per_column() {
        let mut a = FullMatrix::<c64>::zeros(3, 3);
        assert!(a.is_zero());
        a.data[[2, 1]] = c64::new(0.0, 1E-20);
        assert!(!a.is_zero());
    }

    #[test]
    fn empty_matrix_operations_are_noops() {
        let mut a = FullMatrix::<f64>::zeros(0, 0);
        a.lu();
        a.ldlt();
        a.llt().unwrap();
        assert!(a.norm() == 0.0);
    }
}
