//! Low-rank compression of kernel blocks.
//!
//! Four strategies produce a rank-k factorization `A * B^T` of a block:
//! a truncated SVD of the assembled block, full ACA with global pivot
//! search on the assembled block, partial ACA sampling rows and columns
//! on demand, and ACA+ which keeps a reference row and column to pick
//! pivots robustly.
//!
//! The three cross approximation variants share one stopping rule. With
//! `S_k` the rank-k approximant built so far, the Frobenius norm estimate
//! is updated incrementally,
//!
//! ```text
//! ||S_k||^2 = ||S_{k-1}||^2 + 2 Re(sum_{l<k} <a_k, a_l><b_k, b_l>)
//!             + ||a_k||^2 ||b_k||^2
//! ```
//!
//! and the iteration stops as soon as
//! `||a_k||^2 ||b_k||^2 < epsilon^2 ||S_k||^2`.

use crate::assembly::{AssemblyFunction, ClusterAssemblyFunction};
use crate::full_matrix::FullMatrix;
use crate::index_set::IndexSet;
use crate::rk_matrix::{find_rank, RkMatrix};
use crate::types::{HScalar, Result};
use crate::vector::VectorOps;
use crate::CompressionMethod;
use ndarray::linalg::general_mat_mul;
use ndarray::{s, Array1, Array2, ArrayView1, Axis, ShapeBuilder};
use ndarray_linalg::{SVDDCInto, UVTFlag};
use num::traits::{One, Zero};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Approximation parameters, read-only during compression.
#[derive(Clone, Debug)]
pub struct CompressionSettings {
    /// Relative tolerance of the assembly approximation.
    pub epsilon: f64,
    /// Optional cap on the rank of the full ACA working factors.
    pub max_rank: Option<usize>,
    /// When set, every compressed block is checked against the assembled
    /// block.
    pub validation: Option<ValidationSettings>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        CompressionSettings {
            epsilon: 1E-4,
            max_rank: None,
            validation: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidationSettings {
    /// Relative error above which a diagnostic is emitted.
    pub threshold: f64,
    /// Run the compression a second time on a failed block, for
    /// debugging.
    pub rerun: bool,
    /// Dump the assembled block and the evaluated approximation of a
    /// failed block into this directory.
    pub dump_dir: Option<PathBuf>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            threshold: 1E-3,
            rerun: false,
            dump_dir: None,
        }
    }
}

/// Compress the block spanned by `rows` and `cols` of a kernel.
///
/// The result is produced in the accumulator precision of the kernel
/// scalar type. A block that compresses to nothing yields an empty
/// [`RkMatrix`] tagged with the strategy that produced it.
pub fn compress<T: HScalar, F: AssemblyFunction<T>>(
    method: CompressionMethod,
    settings: &CompressionSettings,
    f: &F,
    rows: &Arc<IndexSet>,
    cols: &Arc<IndexSet>,
) -> Result<RkMatrix<T::Dp>> {
    let block = ClusterAssemblyFunction::new(f, rows, cols);
    debug!(
        method = ?method,
        rows = rows.len(),
        cols = cols.len(),
        epsilon = settings.epsilon,
        "compressing block"
    );
    let rk = compress_without_validation(method, settings, &block)?;
    if let Some(validation) = &settings.validation {
        validate(method, settings, validation, &block, &rk)?;
    }
    Ok(rk)
}

fn compress_without_validation<T: HScalar, F: AssemblyFunction<T>>(
    method: CompressionMethod,
    settings: &CompressionSettings,
    block: &ClusterAssemblyFunction<'_, T, F>,
) -> Result<RkMatrix<T::Dp>> {
    match method {
        CompressionMethod::Svd => compress_svd(block, settings),
        CompressionMethod::AcaFull => compress_aca_full(block, settings),
        CompressionMethod::AcaPartial => Ok(compress_aca_partial(block, settings)),
        CompressionMethod::AcaPlus => Ok(compress_aca_plus(block, settings)),
        CompressionMethod::NoCompression => {
            panic!("compress called with method NoCompression")
        }
    }
}

/// SVD compression of an already assembled block.
///
/// The full minimum-dimension SVD is computed and truncated with
/// [`find_rank`]; the singular values are folded into the row factor.
pub fn compress_matrix<A: HScalar>(
    m: FullMatrix<A>,
    rows: &Arc<IndexSet>,
    cols: &Arc<IndexSet>,
    epsilon: f64,
) -> Result<RkMatrix<A>> {
    assert_eq!(m.nrows(), rows.len());
    assert_eq!(m.ncols(), cols.len());

    if m.is_zero() {
        return Ok(RkMatrix::empty(
            rows.clone(),
            cols.clone(),
            CompressionMethod::Svd,
        ));
    }

    let (u, sigma, vt) = m.data.svddc_into(UVTFlag::Some)?;
    let u = u.expect("gesdd did not return singular vectors");
    let vt = vt.expect("gesdd did not return singular vectors");

    let k = find_rank(sigma.as_slice().unwrap(), epsilon);
    if k == 0 {
        return Ok(RkMatrix::empty(
            rows.clone(),
            cols.clone(),
            CompressionMethod::Svd,
        ));
    }

    let mut a = u.slice(s![.., ..k]).to_owned();
    for (col, mut column) in a.axis_iter_mut(Axis(1)).enumerate() {
        let value = A::from_real(sigma[col]);
        column.mapv_inplace(|item| item * value);
    }
    let b = vt.slice(s![..k, ..]).t().to_owned();

    Ok(RkMatrix::new(
        FullMatrix::from_array(a),
        FullMatrix::from_array(b),
        rows.clone(),
        cols.clone(),
        CompressionMethod::Svd,
    ))
}

fn compress_svd<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    settings: &CompressionSettings,
) -> Result<RkMatrix<T::Dp>> {
    let m = block.assemble();
    compress_matrix(m, block.rows, block.cols, settings.epsilon)
}

fn compress_aca_full<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    settings: &CompressionSettings,
) -> Result<RkMatrix<T::Dp>> {
    let mut m = block.assemble();
    let epsilon = settings.epsilon;
    let mut estimate = 0.0;

    let row_count = m.nrows();
    let col_count = m.ncols();
    let mut max_k = row_count.min(col_count);
    if let Some(rank) = settings.max_rank {
        max_k = max_k.min(rank);
    }

    let mut tmp_a = Array2::<T::Dp>::zeros((row_count, max_k).f());
    let mut tmp_b = Array2::<T::Dp>::zeros((col_count, max_k).f());

    let mut nu = 0;
    while nu < max_k {
        let (i_nu, j_nu) = find_max(&m);
        let delta = m.data[[i_nu, j_nu]];
        if delta.squared_norm() == 0.0 {
            break;
        }

        tmp_a.column_mut(nu).assign(&m.data.column(j_nu));
        {
            let mut b_col = tmp_b.column_mut(nu);
            for col in 0..col_count {
                b_col[col] = m.data[[i_nu, col]] / delta;
            }
        }

        {
            let a_col = tmp_a.column(nu).insert_axis(Axis(1));
            let b_row = tmp_b.column(nu).insert_axis(Axis(0));
            general_mat_mul(-<T::Dp>::one(), &a_col, &b_row, <T::Dp>::one(), &mut m.data);
        }

        let ab_norm2 = update_norm_estimate(
            &mut estimate,
            tmp_a.column(nu),
            tmp_b.column(nu),
            (0..nu).map(|l| (tmp_a.column(l), tmp_b.column(l))),
        );
        // ||a_nu||^2 ||b_nu||^2 < epsilon^2 ||S_nu||^2: the last pair is
        // negligible and dropped.
        if ab_norm2 < epsilon * epsilon * estimate {
            break;
        }
        nu += 1;
    }

    if nu == 0 {
        return Ok(RkMatrix::empty(
            block.rows.clone(),
            block.cols.clone(),
            CompressionMethod::AcaFull,
        ));
    }

    let a = FullMatrix::from_array(tmp_a.slice(s![.., ..nu]).to_owned());
    let b = FullMatrix::from_array(tmp_b.slice(s![.., ..nu]).to_owned());
    Ok(RkMatrix::new(
        a,
        b,
        block.rows.clone(),
        block.cols.clone(),
        CompressionMethod::AcaFull,
    ))
}

fn compress_aca_partial<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    settings: &CompressionSettings,
) -> RkMatrix<T::Dp> {
    let epsilon = settings.epsilon;
    let mut estimate = 0.0;

    let row_count = block.rows.len();
    let col_count = block.cols.len();
    let max_k = row_count.min(col_count);

    let mut row_free = vec![true; row_count];
    let mut row_pivot_count = 0;
    let mut col_free = vec![true; col_count];
    let mut a_cols: Vec<Array1<T::Dp>> = Vec::new();
    let mut b_cols: Vec<Array1<T::Dp>> = Vec::new();

    let mut i = 0;
    let mut j = 0;
    let mut k = 0;

    loop {
        let mut b_col = block.get_row(i);
        deflate(&mut b_col, i, &b_cols, &a_cols, k);
        row_free[i] = false;
        row_pivot_count += 1;

        let mut max_norm2 = 0.0;
        for (col, &free) in col_free.iter().enumerate() {
            let norm2 = b_col[col].squared_norm();
            if free && norm2 > max_norm2 {
                max_norm2 = norm2;
                j = col;
            }
        }

        if b_col[j] == <T::Dp>::zero() {
            // The pivot row carries nothing new; move on to the next free
            // row. The row fetched on the next pass is deflated from
            // scratch.
            match row_free.iter().position(|&free| free) {
                Some(next) => i = next,
                None => break,
            }
        } else {
            let pivot = <T::Dp>::one() / b_col[j];
            b_col.mapv_inplace(|item| item * pivot);

            let mut a_col = block.get_col(j);
            deflate(&mut a_col, j, &a_cols, &b_cols, k);
            col_free[j] = false;

            let mut max_norm2 = 0.0;
            for (row, &free) in row_free.iter().enumerate() {
                let norm2 = a_col[row].squared_norm();
                if free && norm2 > max_norm2 {
                    max_norm2 = norm2;
                    i = row;
                }
            }

            let ab_norm2 = update_norm_estimate(
                &mut estimate,
                a_col.view(),
                b_col.view(),
                a_cols.iter().zip(&b_cols).map(|(a, b)| (a.view(), b.view())),
            );
            a_cols.push(a_col);
            b_cols.push(b_col);
            k += 1;

            if ab_norm2 < epsilon * epsilon * estimate {
                break;
            }
        }

        if row_pivot_count >= max_k {
            break;
        }
    }

    if k == 0 {
        return RkMatrix::empty(
            block.rows.clone(),
            block.cols.clone(),
            CompressionMethod::AcaPartial,
        );
    }

    let (a, b) = factors_from_columns(row_count, col_count, &a_cols, &b_cols);
    RkMatrix::new(
        a,
        b,
        block.rows.clone(),
        block.cols.clone(),
        CompressionMethod::AcaPartial,
    )
}

fn compress_aca_plus<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    settings: &CompressionSettings,
) -> RkMatrix<T::Dp> {
    let epsilon = settings.epsilon;
    let mut estimate = 0.0;

    let row_count = block.rows.len();
    let col_count = block.cols.len();
    let max_k = row_count.min(col_count);

    let mut a_ref = Array1::<T::Dp>::zeros(row_count);
    let mut b_ref = Array1::<T::Dp>::zeros(col_count);
    let mut row_free = vec![true; row_count];
    let mut col_free = vec![true; col_count];
    let mut a_cols: Vec<Array1<T::Dp>> = Vec::new();
    let mut b_cols: Vec<Array1<T::Dp>> = Vec::new();

    let mut j_ref = match find_col(block, &mut col_free, &mut a_ref) {
        Some(col) => col,
        // The block is completely zero.
        None => {
            return RkMatrix::empty(
                block.rows.clone(),
                block.cols.clone(),
                CompressionMethod::AcaPlus,
            )
        }
    };

    // The reference row is chosen to intersect the reference column at
    // its argmin index.
    let mut i_ref = match find_min_row(block, &mut row_free, &a_cols, &b_cols, &a_ref, &mut b_ref)
    {
        Some(row) => row,
        None => {
            return RkMatrix::empty(
                block.rows.clone(),
                block.cols.clone(),
                CompressionMethod::AcaPlus,
            )
        }
    };

    let mut k = 0;
    loop {
        let mut i_star = a_ref.absolute_max_index();
        let mut j_star = b_ref.absolute_max_index();

        let (a_vec, b_vec);
        if a_ref[i_star].squared_norm() > b_ref[j_star].squared_norm() {
            // i_star is fixed, look for j_star in the residue of the row.
            let mut b = block.get_row(i_star);
            deflate(&mut b, i_star, &b_cols, &a_cols, k);
            j_star = b.absolute_max_index();
            let pivot = b[j_star];
            assert!(
                pivot != <T::Dp>::zero(),
                "zero pivot in ACA+ row selection"
            );
            let mut a = block.get_col(j_star);
            deflate(&mut a, j_star, &a_cols, &b_cols, k);
            let scale = <T::Dp>::one() / pivot;
            a.mapv_inplace(|item| item * scale);
            a_vec = a;
            b_vec = b;
        } else {
            // j_star is fixed, look for i_star in the residue of the
            // column.
            let mut a = block.get_col(j_star);
            deflate(&mut a, j_star, &a_cols, &b_cols, k);
            i_star = a.absolute_max_index();
            let pivot = a[i_star];
            assert!(
                pivot != <T::Dp>::zero(),
                "zero pivot in ACA+ column selection"
            );
            let mut b = block.get_row(i_star);
            deflate(&mut b, i_star, &b_cols, &a_cols, k);
            let scale = <T::Dp>::one() / pivot;
            b.mapv_inplace(|item| item * scale);
            a_vec = a;
            b_vec = b;
        }

        row_free[i_star] = false;
        col_free[j_star] = false;

        let ab_norm2 = update_norm_estimate(
            &mut estimate,
            a_vec.view(),
            b_vec.view(),
            a_cols.iter().zip(&b_cols).map(|(a, b)| (a.view(), b.view())),
        );
        a_cols.push(a_vec);
        b_cols.push(b_vec);
        k += 1;

        if ab_norm2 < epsilon * epsilon * estimate {
            break;
        }

        // Update the references and replace whichever was consumed by the
        // pivot or has become zero.
        let a_coefficient = -b_cols[k - 1][j_ref];
        a_ref.scaled_add(a_coefficient, &a_cols[k - 1]);
        let b_coefficient = -a_cols[k - 1][i_ref];
        b_ref.scaled_add(b_coefficient, &b_cols[k - 1]);
        let need_new_a = a_ref.is_zero() || j_star == j_ref;
        let need_new_b = b_ref.is_zero() || i_star == i_ref;

        if need_new_a && need_new_b {
            let mut found = false;
            while !found {
                a_ref.fill(<T::Dp>::zero());
                match find_col(block, &mut col_free, &mut a_ref) {
                    Some(col) => j_ref = col,
                    // No non-zero column left, done.
                    None => break,
                }
                deflate(&mut a_ref, j_ref, &a_cols, &b_cols, k);
                found = !a_ref.is_zero();
            }
            if !found {
                break;
            }
            b_ref.fill(<T::Dp>::zero());
            match find_min_row(block, &mut row_free, &a_cols, &b_cols, &a_ref, &mut b_ref) {
                Some(row) => i_ref = row,
                None => break,
            }
        } else if need_new_b {
            b_ref.fill(<T::Dp>::zero());
            match find_min_row(block, &mut row_free, &a_cols, &b_cols, &a_ref, &mut b_ref) {
                Some(row) => i_ref = row,
                None => break,
            }
        } else if need_new_a {
            a_ref.fill(<T::Dp>::zero());
            match find_min_col(block, &mut col_free, &a_cols, &b_cols, &b_ref, &mut a_ref) {
                Some(col) => j_ref = col,
                None => break,
            }
        }

        if k >= max_k {
            break;
        }
    }

    assert!(k > 0);
    let (a, b) = factors_from_columns(row_count, col_count, &a_cols, &b_cols);
    RkMatrix::new(
        a,
        b,
        block.rows.clone(),
        block.cols.clone(),
        CompressionMethod::AcaPlus,
    )
}

/// Subtract the contributions of the pairs already captured from a
/// freshly sampled row or column:
/// `vec <- vec - sum_{l < count} coefficients[l][index] * basis[l]`.
fn deflate<A: HScalar>(
    vec: &mut Array1<A>,
    index: usize,
    basis: &[Array1<A>],
    coefficients: &[Array1<A>],
    count: usize,
) {
    for l in 0..count {
        let factor = -coefficients[l][index];
        vec.scaled_add(factor, &basis[l]);
    }
}

/// Shared running norm update of the cross approximation loops. Returns
/// `||a_new||^2 ||b_new||^2` and adds the rank-one contribution to the
/// estimate.
fn update_norm_estimate<'a, A: HScalar + 'a>(
    estimate: &mut f64,
    a_new: ArrayView1<'_, A>,
    b_new: ArrayView1<'_, A>,
    priors: impl Iterator<Item = (ArrayView1<'a, A>, ArrayView1<'a, A>)>,
) -> f64 {
    let mut cross = 0.0;
    for (a_prior, b_prior) in priors {
        cross += (a_new.conj_dot(&a_prior) * b_new.conj_dot(&b_prior)).real_f64();
    }
    *estimate += 2.0 * cross;
    let ab_norm2 = a_new.norm_sqr_f64() * b_new.norm_sqr_f64();
    *estimate += ab_norm2;
    ab_norm2
}

/// Global argmax of the modulus over a dense residual.
fn find_max<A: HScalar>(m: &FullMatrix<A>) -> (usize, usize) {
    let mut result = (0, 0);
    let mut max_norm = 0.0;
    for ((row, col), &item) in m.data.indexed_iter() {
        let norm = item.squared_norm();
        if norm > max_norm {
            max_norm = norm;
            result = (row, col);
        }
    }
    result
}

/// Find the first free column that is not null. Every visited column is
/// marked used, including the returned one.
fn find_col<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    col_free: &mut [bool],
    col: &mut Array1<T::Dp>,
) -> Option<usize> {
    for index in 0..col_free.len() {
        if col_free[index] {
            *col = block.get_col(index);
            col_free[index] = false;
            if !col.is_zero() {
                return Some(index);
            }
        }
    }
    None
}

/// Among the free rows, fetch the one where the reference column is
/// smallest in modulus; rows whose residue is zero are consumed until a
/// non-zero one is found.
fn find_min_row<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    row_free: &mut [bool],
    a_cols: &[Array1<T::Dp>],
    b_cols: &[Array1<T::Dp>],
    a_ref: &Array1<T::Dp>,
    row: &mut Array1<T::Dp>,
) -> Option<usize> {
    loop {
        let mut candidate = None;
        let mut min_norm2 = f64::MAX;
        for (index, &free) in row_free.iter().enumerate() {
            if free {
                let norm2 = a_ref[index].squared_norm();
                if norm2 < min_norm2 {
                    candidate = Some(index);
                    min_norm2 = norm2;
                }
            }
        }
        let index = candidate?;
        *row = block.get_row(index);
        deflate(row, index, b_cols, a_cols, a_cols.len());
        row_free[index] = false;
        if !row.is_zero() {
            return Some(index);
        }
    }
}

fn find_min_col<T: HScalar, F: AssemblyFunction<T>>(
    block: &ClusterAssemblyFunction<'_, T, F>,
    col_free: &mut [bool],
    a_cols: &[Array1<T::Dp>],
    b_cols: &[Array1<T::Dp>],
    b_ref: &Array1<T::Dp>,
    col: &mut Array1<T::Dp>,
) -> Option<usize> {
    loop {
        let mut candidate = None;
        let mut min_norm2 = f64::MAX;
        for (index, &free) in col_free.iter().enumerate() {
            if free {
                let norm2 = b_ref[index].squared_norm();
                if norm2 < min_norm2 {
                    candidate = Some(index);
                    min_norm2 = norm2;
                }
            }
        }
        let index = candidate?;
        *col = block.get_col(index);
        deflate(col, index, a_cols, b_cols, b_cols.len());
        col_free[index] = false;
        if !col.is_zero() {
            return Some(index);
        }
    }
}

fn factors_from_columns<A: HScalar>(
    row_count: usize,
    col_count: usize,
    a_cols: &[Array1<A>],
    b_cols: &[Array1<A>],
) -> (FullMatrix<A>, FullMatrix<A>) {
    let k = a_cols.len();
    debug_assert_eq!(k, b_cols.len());
    let mut a = FullMatrix::zeros(row_count, k);
    for (col, vec) in a_cols.iter().enumerate() {
        a.data.column_mut(col).assign(vec);
    }
    let mut b = FullMatrix::zeros(col_count, k);
    for (col, vec) in b_cols.iter().enumerate() {
        b.data.column_mut(col).assign(vec);
    }
    (a, b)
}

/// Compare a compressed block against the assembled one. NaN in the
/// approximation is fatal; an error above the configured threshold emits
/// a diagnostic and optionally re-runs the compression and dumps both
/// matrices.
fn validate<T: HScalar, F: AssemblyFunction<T>>(
    method: CompressionMethod,
    settings: &CompressionSettings,
    validation: &ValidationSettings,
    block: &ClusterAssemblyFunction<'_, T, F>,
    rk: &RkMatrix<T::Dp>,
) -> Result<()> {
    let full = block.assemble();
    if let Some(a) = &rk.a {
        a.check_nan();
    }
    if let Some(b) = &rk.b {
        b.check_nan();
    }

    let mut rk_full = rk.eval();
    let approx_norm = rk_full.norm();
    let full_norm = full.norm();

    if approx_norm.is_nan() {
        if let Some(dir) = &validation.dump_dir {
            crate::dump::write_matrix(&rk_full, dir.join("Rk"))?;
            crate::dump::write_matrix(&full, dir.join("Full"))?;
        }
        panic!("NaN norm in compressed approximation");
    }

    rk_full.axpy(-<T::Dp as One>::one(), &full);
    let diff_norm = rk_full.norm();
    if diff_norm > validation.threshold * full_norm {
        warn!(
            rows = %block.rows.description(),
            cols = %block.cols.description(),
            full_norm,
            approx_norm,
            relative_error = diff_norm / full_norm,
            rank = rk.rank(),
            max_rank = full.nrows().min(full.ncols()),
            "compressed block exceeds the validation threshold"
        );
        if validation.rerun {
            // A second run of the same compression, for debugger sessions.
            let _ = compress_without_validation(method, settings, block);
        }
        if let Some(dir) = &validation.dump_dir {
            let name = format!(
                "{}x{}",
                block.rows.description(),
                block.cols.description()
            );
            let rk_eval = rk.eval();
            crate::dump::write_matrix(&rk_eval, dir.join(format!("Rk_{}", name)))?;
            crate::dump::write_matrix(&full, dir.join(format!("Full_{}", name)))?;
        }
    }
    Ok(())
}
