//! Axis aligned bounding boxes over cluster coordinates.

use crate::index_set::IndexSet;

#[derive(Clone, Debug, PartialEq)]
pub struct AxisAlignedBoundingBox {
    min: [f64; 3],
    max: [f64; 3],
}

impl AxisAlignedBoundingBox {
    /// Bounding box of all points attached to an index set.
    pub fn from_index_set(data: &IndexSet) -> Self {
        assert!(!data.is_empty(), "bounding box of an empty cluster");
        let mut min = data.point(0);
        let mut max = data.point(0);
        for point in data.points() {
            for dim in 0..3 {
                min[dim] = min[dim].min(point[dim]);
                max[dim] = max[dim].max(point[dim]);
            }
        }
        AxisAlignedBoundingBox { min, max }
    }

    pub fn diameter(&self) -> f64 {
        let mut result = 0.0;
        for dim in 0..3 {
            let extent = self.max[dim] - self.min[dim];
            result += extent * extent;
        }
        result.sqrt()
    }

    /// Distance between the two boxes, zero if they overlap.
    pub fn distance_to(&self, other: &AxisAlignedBoundingBox) -> f64 {
        let mut result = 0.0;
        for dim in 0..3 {
            let gap = (self.min[dim] - other.max[dim])
                .max(other.min[dim] - self.max[dim])
                .max(0.0);
            result += gap * gap;
        }
        result.sqrt()
    }
}
