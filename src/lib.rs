//! Admissibility evaluation and low-rank block compression for
//! hierarchical matrix methods.
//!
//! Given a user supplied kernel and a pair of index clusters, this crate
//! decides whether the spanned block is far-field (admissible) via
//! geometric bounding-box criteria, and compresses admissible blocks into
//! a rank-k factorization `A * B^T` with a relative Frobenius norm
//! tolerance. Four compression strategies are available: truncated SVD,
//! full adaptive cross approximation, partial ACA and ACA+.

pub mod admissibility;
pub mod assembly;
pub mod bounding_box;
pub mod compression;
pub mod dump;
pub mod full_matrix;
pub mod index_set;
pub mod rk_matrix;
pub mod types;
pub mod vector;

/// The compression strategy applied to admissible blocks. `NoCompression`
/// only appears as the tag of blocks that were never compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    NoCompression,
    Svd,
    AcaFull,
    AcaPartial,
    AcaPlus,
}

pub use admissibility::{AdmissibilityCondition, StandardAdmissibility, TallSkinnyAdmissibility};
pub use assembly::{AssemblyFunction, BlockInfo, BlockType};
pub use bounding_box::AxisAlignedBoundingBox;
pub use compression::{compress, compress_matrix, CompressionSettings, ValidationSettings};
pub use full_matrix::{FullMatrix, Op};
pub use index_set::{ClusterTree, IndexSet, NodeId};
pub use rk_matrix::RkMatrix;
pub use types::{c32, c64, HScalar, HmatrixError, Result};
pub use vector::VectorOps;
