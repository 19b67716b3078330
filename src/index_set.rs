//! Index sets and cluster tree nodes.
//!
//! An [`IndexSet`] is an ordered list of global degree-of-freedom indices
//! together with the 3-d coordinates the clustering was computed from.
//! Cluster tree construction itself happens outside this crate; the
//! [`ClusterTree`] node type carries just enough structure for the
//! admissibility conditions, which cache per-node geometry keyed by
//! [`NodeId`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An ordered set of global indices with attached 3-d points.
#[derive(Clone, Debug)]
pub struct IndexSet {
    indices: Vec<usize>,
    points: Vec<[f64; 3]>,
}

impl IndexSet {
    pub fn new(indices: Vec<usize>, points: Vec<[f64; 3]>) -> Self {
        assert_eq!(
            indices.len(),
            points.len(),
            "every index requires a coordinate"
        );
        IndexSet { indices, points }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Global index of the local position `i`.
    pub fn index(&self, i: usize) -> usize {
        self.indices[i]
    }

    pub fn point(&self, i: usize) -> [f64; 3] {
        self.points[i]
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Short diagnostic string used in validation output.
    pub fn description(&self) -> String {
        match (self.indices.first(), self.indices.last()) {
            (Some(first), Some(last)) => format!("[{}..{}](n={})", first, last, self.len()),
            _ => "[](n=0)".to_string(),
        }
    }
}

/// Identity of a cluster tree node, unique within the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(0);

/// A node of a cluster tree.
///
/// The children are opaque to this crate; they exist so that callers can
/// hang a whole tree off one root while the admissibility conditions are
/// queried pairwise on nodes.
#[derive(Debug)]
pub struct ClusterTree {
    id: NodeId,
    data: Arc<IndexSet>,
    children: Vec<ClusterTree>,
}

impl ClusterTree {
    pub fn new(data: Arc<IndexSet>) -> Self {
        ClusterTree {
            id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
            data,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn data(&self) -> &Arc<IndexSet> {
        &self.data
    }

    pub fn add_child(&mut self, child: ClusterTree) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[ClusterTree] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_set(offset: usize, n: usize) -> IndexSet {
        IndexSet::new(
            (offset..offset + n).collect(),
            (0..n).map(|i| [(offset + i) as f64, 0.0, 0.0]).collect(),
        )
    }

    #[test]
    fn description_names_range_and_size() {
        let set = line_set(4, 3);
        assert_eq!(set.description(), "[4..6](n=3)");
        assert_eq!(IndexSet::new(vec![], vec![]).description(), "[](n=0)");
    }

    #[test]
    fn node_ids_are_unique() {
        let data = Arc::new(line_set(0, 2));
        let a = ClusterTree::new(data.clone());
        let b = ClusterTree::new(data);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn children_are_reachable() {
        let data = Arc::new(line_set(0, 4));
        let mut root = ClusterTree::new(data.clone());
        root.add_child(ClusterTree::new(data));
        assert_eq!(root.children().len(), 1);
        assert_eq!(root.children()[0].data().len(), 4);
    }
}
