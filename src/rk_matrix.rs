//! Low-rank factorized blocks.

use crate::full_matrix::{FullMatrix, Op};
use crate::index_set::IndexSet;
use crate::types::HScalar;
use crate::CompressionMethod;
use num::traits::{Float, One, ToPrimitive, Zero};
use std::sync::Arc;

/// A rank-k block stored as `A * B^T` (plain transpose, no conjugation),
/// or rank zero with both factors absent.
///
/// The factor shapes are tied to the clusters the block spans:
/// `a` is `rows.len() x k`, `b` is `cols.len() x k`.
pub struct RkMatrix<A: HScalar> {
    pub a: Option<FullMatrix<A>>,
    pub b: Option<FullMatrix<A>>,
    rows: Arc<IndexSet>,
    cols: Arc<IndexSet>,
    method: CompressionMethod,
}

impl<A: HScalar> RkMatrix<A> {
    /// The rank zero block.
    pub fn empty(rows: Arc<IndexSet>, cols: Arc<IndexSet>, method: CompressionMethod) -> Self {
        RkMatrix {
            a: None,
            b: None,
            rows,
            cols,
            method,
        }
    }

    pub fn new(
        a: FullMatrix<A>,
        b: FullMatrix<A>,
        rows: Arc<IndexSet>,
        cols: Arc<IndexSet>,
        method: CompressionMethod,
    ) -> Self {
        assert_eq!(a.nrows(), rows.len(), "row factor does not span the row cluster");
        assert_eq!(b.nrows(), cols.len(), "column factor does not span the column cluster");
        assert_eq!(a.ncols(), b.ncols(), "factor ranks differ");
        assert!(a.ncols() >= 1, "rank zero blocks carry no factors");
        RkMatrix {
            a: Some(a),
            b: Some(b),
            rows,
            cols,
            method,
        }
    }

    pub fn rank(&self) -> usize {
        self.a.as_ref().map_or(0, |a| a.ncols())
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_none()
    }

    pub fn rows(&self) -> &Arc<IndexSet> {
        &self.rows
    }

    pub fn cols(&self) -> &Arc<IndexSet> {
        &self.cols
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Evaluate the product `A * B^T` as a dense block.
    pub fn eval(&self) -> FullMatrix<A> {
        let mut result = FullMatrix::zeros(self.rows.len(), self.cols.len());
        if let (Some(a), Some(b)) = (&self.a, &self.b) {
            result.gemm(Op::NoTrans, Op::Trans, A::one(), a, b, A::zero());
        }
        result
    }
}

/// Number of singular values to keep for a relative tolerance.
///
/// Returns the smallest k with `sum_{i >= k} sigma_i^2 <= epsilon^2 *
/// sum_i sigma_i^2`, i.e. the truncated tail is at most `epsilon` of the
/// block in the Frobenius norm. (The alternative `sigma_k <= epsilon *
/// sigma_0` cutoff is not used.)
pub fn find_rank<R: Float + ToPrimitive>(sigma: &[R], epsilon: f64) -> usize {
    let mut tail: Vec<f64> = sigma
        .iter()
        .rev()
        .scan(0.0, |acc, &value| {
            *acc += value.to_f64().unwrap().powi(2);
            Some(*acc)
        })
        .collect();
    tail.reverse();

    let total = tail.first().copied().unwrap_or(0.0);
    tail.iter()
        .position(|&rest| rest <= epsilon * epsilon * total)
        .unwrap_or(sigma.len())
}
