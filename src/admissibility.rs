//! Admissibility conditions over cluster pairs.
//!
//! An admissibility condition decides whether the block spanned by a row
//! and a column cluster is far-field and therefore worth compressing.
//! The geometry needed for that decision (one axis aligned bounding box
//! per cluster) is computed lazily on first use and cached by the
//! condition itself, keyed by node id, so the cluster tree stays free of
//! back references. `clean` releases the cached entry for a node and may
//! be called any number of times.

use crate::bounding_box::AxisAlignedBoundingBox;
use crate::index_set::ClusterTree;
use crate::CompressionMethod;
use std::collections::HashMap;

pub trait AdmissibilityCondition {
    /// True if the two clusters satisfy the far-field criterion.
    fn is_admissible(&mut self, rows: &ClusterTree, cols: &ClusterTree) -> bool;

    /// Per-side admissibility, used to build rectangular leaf blocks.
    fn is_rows_cols_admissible(&mut self, rows: &ClusterTree, cols: &ClusterTree) -> (bool, bool) {
        let admissible = self.is_admissible(rows, cols);
        (admissible, admissible)
    }

    /// True if the block should not be created at all.
    fn is_inert(&self, rows: &ClusterTree, cols: &ClusterTree) -> bool;

    /// Release cached per-node state. Safe to call repeatedly.
    fn clean(&mut self, node: &ClusterTree) {
        let _ = node;
    }

    fn describe(&self) -> String;
}

/// Size-ratio capability: a side is admissible when it is `ratio` times
/// smaller than the other side. Composed into full conditions rather than
/// inherited from.
#[derive(Clone, Debug)]
pub struct TallSkinnyAdmissibility {
    ratio: f64,
}

impl TallSkinnyAdmissibility {
    pub fn new(ratio: f64) -> Self {
        TallSkinnyAdmissibility { ratio }
    }

    pub fn is_rows_cols_admissible(&self, rows: &ClusterTree, cols: &ClusterTree) -> (bool, bool) {
        let row_count = rows.data().len() as f64;
        let col_count = cols.data().len() as f64;
        (
            row_count * self.ratio <= col_count,
            col_count * self.ratio <= row_count,
        )
    }
}

impl Default for TallSkinnyAdmissibility {
    fn default() -> Self {
        TallSkinnyAdmissibility::new(2.0)
    }
}

/// The Hackbusch admissibility criterion
/// `min(diam(rows), diam(cols)) <= eta * dist(rows, cols)`.
///
/// The compression method is part of the condition: full-matrix methods
/// (SVD, full ACA) materialize the whole block, so their blocks are
/// additionally capped at `max_elements_per_block` elements.
pub struct StandardAdmissibility {
    eta: f64,
    max_elements_per_block: usize,
    max_elements_per_block_aca: Option<usize>,
    always: bool,
    method: CompressionMethod,
    tall_skinny: TallSkinnyAdmissibility,
    boxes: HashMap<crate::index_set::NodeId, AxisAlignedBoundingBox>,
}

impl StandardAdmissibility {
    pub fn new(eta: f64, method: CompressionMethod) -> Self {
        assert!(eta > 0.0, "eta must be positive");
        StandardAdmissibility {
            eta,
            max_elements_per_block: 5_000_000,
            max_elements_per_block_aca: None,
            always: false,
            method,
            tall_skinny: TallSkinnyAdmissibility::default(),
            boxes: HashMap::new(),
        }
    }

    pub fn set_eta(&mut self, eta: f64) {
        assert!(eta > 0.0, "eta must be positive");
        self.eta = eta;
    }

    /// Cap on `rows * cols` for the full-matrix compression methods.
    pub fn set_max_elements_per_block(&mut self, max_elements: usize) {
        self.max_elements_per_block = max_elements;
    }

    /// Optional cap on `rows * cols` for the sampling based methods.
    pub fn set_max_elements_per_block_aca(&mut self, max_elements: Option<usize>) {
        self.max_elements_per_block_aca = max_elements;
    }

    /// Ignore the geometry and treat every block that passes the size
    /// gates as admissible.
    pub fn set_always(&mut self, always: bool) {
        self.always = always;
    }

    fn cached_box(&mut self, node: &ClusterTree) -> &AxisAlignedBoundingBox {
        self.boxes
            .entry(node.id())
            .or_insert_with(|| AxisAlignedBoundingBox::from_index_set(node.data()))
    }
}

impl AdmissibilityCondition for StandardAdmissibility {
    fn is_admissible(&mut self, rows: &ClusterTree, cols: &ClusterTree) -> bool {
        let elements = rows.data().len() * cols.data().len();
        let is_full_algo = !matches!(
            self.method,
            CompressionMethod::AcaPartial | CompressionMethod::AcaPlus
        );
        if is_full_algo && elements > self.max_elements_per_block {
            return false;
        }
        if !is_full_algo {
            if let Some(max_elements) = self.max_elements_per_block_aca {
                if elements > max_elements {
                    return false;
                }
            }
        }
        if rows.data().len() < 2 || cols.data().len() < 2 {
            return false;
        }
        if self.always {
            return true;
        }

        let rows_diameter = self.cached_box(rows).diameter();
        let cols_diameter = self.cached_box(cols).diameter();
        let distance = self.boxes[&rows.id()].distance_to(&self.boxes[&cols.id()]);
        rows_diameter.min(cols_diameter) <= self.eta * distance
    }

    fn is_rows_cols_admissible(&mut self, rows: &ClusterTree, cols: &ClusterTree) -> (bool, bool) {
        self.tall_skinny.is_rows_cols_admissible(rows, cols)
    }

    fn is_inert(&self, _rows: &ClusterTree, _cols: &ClusterTree) -> bool {
        false
    }

    fn clean(&mut self, node: &ClusterTree) {
        self.boxes.remove(&node.id());
    }

    fn describe(&self) -> String {
        format!("Hackbusch formula, with eta = {}", self.eta)
    }
}
