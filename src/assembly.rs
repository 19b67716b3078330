//! The kernel interface and the per-block assembly adapter.
//!
//! A user kernel produces matrix entries for (row cluster, column
//! cluster) pairs. Before a block is compressed the kernel is asked to
//! prepare it once; the returned [`BlockInfo`] can classify the block as
//! dense, sparse (with null row/column predicates) or entirely null, and
//! may carry an opaque payload that is handed back on every entry
//! request. The [`ClusterAssemblyFunction`] adapter scopes that
//! preparation: `release_block` runs on drop, on every exit path.

use crate::full_matrix::FullMatrix;
use crate::index_set::IndexSet;
use crate::types::HScalar;
use ndarray::{Array1, ArrayViewMut1};
use num::traits::Zero;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockType {
    Dense,
    Sparse,
    Null,
}

type NullPredicate = Box<dyn Fn(usize) -> bool + Send + Sync>;

/// Per-block hints returned by [`AssemblyFunction::prepare_block`].
pub struct BlockInfo {
    pub block_type: BlockType,
    is_null_row: Option<NullPredicate>,
    is_null_col: Option<NullPredicate>,
    pub user_data: Option<Box<dyn Any + Send>>,
}

impl BlockInfo {
    pub fn dense() -> Self {
        BlockInfo {
            block_type: BlockType::Dense,
            is_null_row: None,
            is_null_col: None,
            user_data: None,
        }
    }

    pub fn null() -> Self {
        BlockInfo {
            block_type: BlockType::Null,
            is_null_row: None,
            is_null_col: None,
            user_data: None,
        }
    }

    /// A sparse block with predicates naming the rows and columns that
    /// are entirely zero.
    pub fn sparse(is_null_row: NullPredicate, is_null_col: NullPredicate) -> Self {
        BlockInfo {
            block_type: BlockType::Sparse,
            is_null_row: Some(is_null_row),
            is_null_col: Some(is_null_col),
            user_data: None,
        }
    }

    pub fn with_user_data(mut self, user_data: Box<dyn Any + Send>) -> Self {
        self.user_data = Some(user_data);
        self
    }

    pub fn row_is_null(&self, index: usize) -> bool {
        self.block_type == BlockType::Sparse
            && self.is_null_row.as_ref().map_or(false, |p| p(index))
    }

    pub fn col_is_null(&self, index: usize) -> bool {
        self.block_type == BlockType::Sparse
            && self.is_null_col.as_ref().map_or(false, |p| p(index))
    }
}

/// A user supplied kernel.
///
/// Rows, columns and assembled blocks are produced in the accumulator
/// precision `T::Dp`. Indices are local to the block; the index sets are
/// available for mapping back to global degrees of freedom.
pub trait AssemblyFunction<T: HScalar> {
    fn prepare_block(&self, rows: &IndexSet, cols: &IndexSet) -> BlockInfo {
        let _ = (rows, cols);
        BlockInfo::dense()
    }

    fn release_block(&self, info: BlockInfo) {
        drop(info);
    }

    /// Write row `index` of the block into `out` (length = number of
    /// columns).
    fn get_row(
        &self,
        rows: &IndexSet,
        cols: &IndexSet,
        index: usize,
        info: &BlockInfo,
        out: ArrayViewMut1<'_, T::Dp>,
    );

    /// Write column `index` of the block into `out` (length = number of
    /// rows).
    fn get_col(
        &self,
        rows: &IndexSet,
        cols: &IndexSet,
        index: usize,
        info: &BlockInfo,
        out: ArrayViewMut1<'_, T::Dp>,
    );

    /// Materialize the whole block. The default assembles column by
    /// column, honoring the sparsity hints.
    fn assemble(&self, rows: &IndexSet, cols: &IndexSet, info: &BlockInfo) -> FullMatrix<T::Dp> {
        let mut result = FullMatrix::zeros(rows.len(), cols.len());
        let mut buffer = Array1::<T::Dp>::zeros(rows.len());
        for col in 0..cols.len() {
            if info.col_is_null(col) {
                continue;
            }
            buffer.fill(<T::Dp>::zero());
            self.get_col(rows, cols, col, info, buffer.view_mut());
            result.data.column_mut(col).assign(&buffer);
        }
        result
    }
}

/// Scoped view of a kernel on one block.
///
/// Construction prepares the block, drop releases it. Null rows and
/// columns of sparse blocks are answered with zero vectors without
/// calling into the kernel; null blocks assemble to zero.
pub struct ClusterAssemblyFunction<'a, T: HScalar, F: AssemblyFunction<T>> {
    f: &'a F,
    pub rows: &'a Arc<IndexSet>,
    pub cols: &'a Arc<IndexSet>,
    info: Option<BlockInfo>,
    _marker: PhantomData<T>,
}

impl<'a, T: HScalar, F: AssemblyFunction<T>> ClusterAssemblyFunction<'a, T, F> {
    pub fn new(f: &'a F, rows: &'a Arc<IndexSet>, cols: &'a Arc<IndexSet>) -> Self {
        let info = f.prepare_block(rows, cols);
        ClusterAssemblyFunction {
            f,
            rows,
            cols,
            info: Some(info),
            _marker: PhantomData,
        }
    }

    fn info(&self) -> &BlockInfo {
        self.info.as_ref().unwrap()
    }

    pub fn get_row(&self, index: usize) -> Array1<T::Dp> {
        let mut result = Array1::zeros(self.cols.len());
        if !self.info().row_is_null(index) {
            self.f
                .get_row(self.rows, self.cols, index, self.info(), result.view_mut());
        }
        result
    }

    pub fn get_col(&self, index: usize) -> Array1<T::Dp> {
        let mut result = Array1::zeros(self.rows.len());
        if !self.info().col_is_null(index) {
            self.f
                .get_col(self.rows, self.cols, index, self.info(), result.view_mut());
        }
        result
    }

    pub fn assemble(&self) -> FullMatrix<T::Dp> {
        if self.info().block_type == BlockType::Null {
            FullMatrix::zeros(self.rows.len(), self.cols.len())
        } else {
            self.f.assemble(self.rows, self.cols, self.info())
        }
    }
}

impl<'a, T: HScalar, F: AssemblyFunction<T>> Drop for ClusterAssemblyFunction<'a, T, F> {
    fn drop(&mut self) {
        if let Some(info) = self.info.take() {
            self.f.release_block(info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn line_set(n: usize) -> Arc<IndexSet> {
        Arc::new(IndexSet::new(
            (0..n).collect(),
            (0..n).map(|i| [i as f64, 0.0, 0.0]).collect(),
        ))
    }

    /// Kernel with entries (i + 1) * (j + 1) that counts entry requests
    /// and block releases.
    struct CountingKernel {
        sparse: bool,
        row_calls: Cell<usize>,
        releases: Cell<usize>,
    }

    impl CountingKernel {
        fn new(sparse: bool) -> Self {
            CountingKernel {
                sparse,
                row_calls: Cell::new(0),
                releases: Cell::new(0),
            }
        }
    }

    impl AssemblyFunction<f64> for CountingKernel {
        fn prepare_block(&self, _rows: &IndexSet, _cols: &IndexSet) -> BlockInfo {
            if self.sparse {
                BlockInfo::sparse(Box::new(|i| i % 2 == 1), Box::new(|_| false))
            } else {
                BlockInfo::dense()
            }
        }

        fn release_block(&self, info: BlockInfo) {
            self.releases.set(self.releases.get() + 1);
            drop(info);
        }

        fn get_row(
            &self,
            _rows: &IndexSet,
            _cols: &IndexSet,
            index: usize,
            _info: &BlockInfo,
            mut out: ArrayViewMut1<'_, f64>,
        ) {
            self.row_calls.set(self.row_calls.get() + 1);
            for (j, item) in out.iter_mut().enumerate() {
                *item = ((index + 1) * (j + 1)) as f64;
            }
        }

        fn get_col(
            &self,
            _rows: &IndexSet,
            _cols: &IndexSet,
            index: usize,
            _info: &BlockInfo,
            mut out: ArrayViewMut1<'_, f64>,
        ) {
            for (i, item) in out.iter_mut().enumerate() {
                *item = ((i + 1) * (index + 1)) as f64;
            }
        }
    }

    #[test]
    fn sparse_null_rows_skip_the_kernel() {
        let rows = line_set(4);
        let cols = line_set(3);
        let kernel = CountingKernel::new(true);
        let block = ClusterAssemblyFunction::new(&kernel, &rows, &cols);

        let even = block.get_row(2);
        assert_eq!(even[2], 9.0);
        assert_eq!(kernel.row_calls.get(), 1);

        let odd = block.get_row(1);
        assert!(odd.iter().all(|&item| item == 0.0));
        assert_eq!(kernel.row_calls.get(), 1);
    }

    #[test]
    fn release_runs_exactly_once_on_drop() {
        let rows = line_set(2);
        let cols = line_set(2);
        let kernel = CountingKernel::new(false);
        {
            let block = ClusterAssemblyFunction::new(&kernel, &rows, &cols);
            let _ = block.get_col(0);
        }
        assert_eq!(kernel.releases.get(), 1);
    }

    #[test]
    fn default_assemble_matches_columns() {
        let rows = line_set(3);
        let cols = line_set(4);
        let kernel = CountingKernel::new(false);
        let block = ClusterAssemblyFunction::new(&kernel, &rows, &cols);

        let assembled = block.assemble();
        for i in 0..3 {
            for j in 0..4 {
                assert_eq!(assembled.data[[i, j]], ((i + 1) * (j + 1)) as f64);
            }
        }
    }

    #[test]
    fn null_blocks_assemble_to_zero() {
        struct NullKernel;
        impl AssemblyFunction<f32> for NullKernel {
            fn prepare_block(&self, _rows: &IndexSet, _cols: &IndexSet) -> BlockInfo {
                BlockInfo::null()
            }
            fn get_row(
                &self,
                _rows: &IndexSet,
                _cols: &IndexSet,
                _index: usize,
                _info: &BlockInfo,
                _out: ArrayViewMut1<'_, f64>,
            ) {
                panic!("null blocks must not be sampled");
            }
            fn get_col(
                &self,
                _rows: &IndexSet,
                _cols: &IndexSet,
                _index: usize,
                _info: &BlockInfo,
                _out: ArrayViewMut1<'_, f64>,
            ) {
                panic!("null blocks must not be sampled");
            }
            fn assemble(
                &self,
                _rows: &IndexSet,
                _cols: &IndexSet,
                _info: &BlockInfo,
            ) -> FullMatrix<f64> {
                panic!("null blocks must not be assembled by the kernel");
            }
        }

        let rows = line_set(3);
        let cols = line_set(3);
        let block = ClusterAssemblyFunction::new(&NullKernel, &rows, &cols);
        assert!(block.assemble().is_zero());
    }
}
