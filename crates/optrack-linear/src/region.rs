//! Rasterize a marker quadrilateral against an organized point cloud.
//!
//! Each orientation class has its own pair of corner paths bounding the
//! marker interior on the left and on the right. Walking a path segment by
//! segment yields, for every image row the marker covers, the first and last
//! pixel column inside the marker. The point-cloud samples in that span that
//! pass the depth filter are the region samples fed to the plane fit.

use log::debug;
use optrack_core::{inverse_slope, PointCloud, Pt2, Pt3, Real};
use serde::{Deserialize, Serialize};

use crate::orientation::{classify_corners, MarkerOrientation, OrientedCorners};

/// Exclusive band of accepted depth values.
///
/// Rejects near-field sensor noise and background returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthRange {
    pub min: Real,
    pub max: Real,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            min: 50.0,
            max: 2000.0,
        }
    }
}

impl DepthRange {
    pub fn contains(&self, depth: Real) -> bool {
        depth > self.min && depth < self.max
    }
}

/// Per-row column span of a marker interior.
#[derive(Debug, Clone, PartialEq)]
pub struct RowBounds {
    top: i64,
    left: Vec<Option<i64>>,
    right: Vec<Option<i64>>,
}

/// Snap a corner to the pixel grid.
fn pixel(p: &Pt2) -> Pt2 {
    Pt2::new(p.x.floor(), p.y.floor())
}

/// Write the interpolated column of every row spanned by `path` into `out`.
///
/// Later segments overwrite shared end rows; segments running upwards write
/// nothing. Only rows inside `out` are visited.
fn trace_path(path: &[Pt2], top: i64, out: &mut [Option<i64>]) {
    let last = top + out.len() as i64 - 1;
    for seg in path.windows(2) {
        let (a, b) = (pixel(&seg[0]), pixel(&seg[1]));
        let slope = inverse_slope(&a, &b);
        let (row_a, row_b) = (a.y as i64, b.y as i64);
        let (col_a, dx, dy) = (a.x as i64, (b.x - a.x) as i64, row_b - row_a);
        for row in row_a.max(top)..=row_b.min(last) {
            // Integer floor of `slope * (row - row_a)`, exact on the snapped grid.
            let col = if slope == 0.0 {
                col_a
            } else {
                col_a + (dx * (row - row_a)).div_euclid(dy)
            };
            out[(row - top) as usize] = Some(col);
        }
    }
}

impl RowBounds {
    /// Build bounds for rows `top..=bottom` from a left and a right corner path.
    pub fn from_paths(top: i64, bottom: i64, left_path: &[Pt2], right_path: &[Pt2]) -> Self {
        let height = (bottom - top + 1).max(0) as usize;
        let mut left = vec![None; height];
        let mut right = vec![None; height];
        trace_path(left_path, top, &mut left);
        trace_path(right_path, top, &mut right);
        Self { top, left, right }
    }

    /// Bounds of a classified marker, using the paths for its orientation.
    pub fn for_marker(oc: &OrientedCorners) -> Self {
        Self::for_marker_within(oc, i64::MIN, i64::MAX)
    }

    /// Like [`RowBounds::for_marker`], keeping only rows in `first..=last`.
    pub fn for_marker_within(oc: &OrientedCorners, first: i64, last: i64) -> Self {
        let top = (oc.top().y.floor() as i64).max(first);
        let bottom = (oc.bottom().y.floor() as i64).min(last);
        let (left, right) = match oc.orientation {
            MarkerOrientation::Rotated => rotated_paths(&oc.corners),
            MarkerOrientation::SkewLeft => skew_left_paths(&oc.corners),
            MarkerOrientation::SkewRight => skew_right_paths(&oc.corners),
        };
        Self::from_paths(top, bottom, &left, &right)
    }

    pub fn top(&self) -> i64 {
        self.top
    }

    pub fn bottom(&self) -> i64 {
        self.top + self.left.len() as i64 - 1
    }

    /// Inclusive column span for `row`, if the row was reached by both paths.
    pub fn bounds(&self, row: i64) -> Option<(i64, i64)> {
        let i = usize::try_from(row - self.top).ok()?;
        Some((self.left.get(i).copied()??, self.right.get(i).copied()??))
    }

    /// Every covered row with its inclusive column span.
    pub fn rows(&self) -> impl Iterator<Item = (i64, i64, i64)> + '_ {
        (self.top..=self.bottom()).filter_map(|row| self.bounds(row).map(|(l, r)| (row, l, r)))
    }
}

/// Top, left, bottom on the left; top, right, bottom on the right.
fn rotated_paths(c: &[Pt2; 4]) -> (Vec<Pt2>, Vec<Pt2>) {
    const TOP: usize = 0;
    const RIGHT: usize = 1;
    const BOTTOM: usize = 2;
    const LEFT: usize = 3;
    (
        vec![c[TOP], c[LEFT], c[BOTTOM]],
        vec![c[TOP], c[RIGHT], c[BOTTOM]],
    )
}

/// Both side corners on the left; the right side is the direct top-bottom edge.
fn skew_left_paths(c: &[Pt2; 4]) -> (Vec<Pt2>, Vec<Pt2>) {
    const TOP: usize = 0;
    const BOTTOM: usize = 1;
    const LOWER_LEFT: usize = 2;
    const UPPER_LEFT: usize = 3;
    (
        vec![c[TOP], c[UPPER_LEFT], c[LOWER_LEFT], c[BOTTOM]],
        vec![c[TOP], c[BOTTOM]],
    )
}

/// Both side corners on the right; the left side is the direct top-bottom edge.
fn skew_right_paths(c: &[Pt2; 4]) -> (Vec<Pt2>, Vec<Pt2>) {
    const TOP: usize = 0;
    const UPPER_RIGHT: usize = 1;
    const LOWER_RIGHT: usize = 2;
    const BOTTOM: usize = 3;
    (
        vec![c[TOP], c[BOTTOM]],
        vec![c[TOP], c[UPPER_RIGHT], c[LOWER_RIGHT], c[BOTTOM]],
    )
}

/// Harvests the point-cloud samples lying on a marker's face.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionExtractor {
    pub depth_range: DepthRange,
}

impl RegionExtractor {
    pub fn new(depth_range: DepthRange) -> Self {
        Self { depth_range }
    }

    /// Collect in-range samples inside an already classified marker.
    pub fn extract(&self, cloud: &PointCloud, oc: &OrientedCorners) -> Vec<Pt3> {
        let last_row = cloud.height() as i64 - 1;
        let last_col = cloud.width as i64 - 1;
        let bounds = RowBounds::for_marker_within(oc, 0, last_row);
        let mut samples = Vec::new();
        for (row, left, right) in bounds.rows() {
            for col in left.max(0)..=right.min(last_col) {
                if let Some(p) = cloud.point_at(row, col) {
                    if self.depth_range.contains(p.z) {
                        samples.push(p);
                    }
                }
            }
        }
        debug!(
            "{:?} marker rows {}..={}: {} region samples",
            oc.orientation,
            bounds.top(),
            bounds.bottom(),
            samples.len()
        );
        samples
    }

    /// Classify raw detector corners and collect the region samples.
    pub fn extract_corners(&self, cloud: &PointCloud, corners: &[Pt2; 4]) -> Vec<Pt3> {
        self.extract(cloud, &classify_corners(corners))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_cloud(width: usize, height: usize, depth: Real) -> PointCloud {
        PointCloud::from_fn(width, height, |r, c| Some(Pt3::new(c as Real, r as Real, depth)))
    }

    #[test]
    fn depth_band_is_exclusive() {
        let range = DepthRange::default();
        assert!(!range.contains(50.0));
        assert!(!range.contains(2000.0));
        assert!(!range.contains(10.0));
        assert!(range.contains(50.001));
        assert!(range.contains(1999.999));
    }

    #[test]
    fn axis_aligned_square_covers_full_rectangle() {
        let corners = [
            Pt2::new(10.0, 10.0),
            Pt2::new(20.0, 10.0),
            Pt2::new(20.0, 20.0),
            Pt2::new(10.0, 20.0),
        ];
        let cloud = flat_cloud(64, 48, 500.0);
        let samples = RegionExtractor::default().extract_corners(&cloud, &corners);
        assert_eq!(samples.len(), 11 * 11);
        assert!(samples.iter().all(|p| (10.0..=20.0).contains(&p.x)));
        assert!(samples.iter().all(|p| (10.0..=20.0).contains(&p.y)));
    }

    #[test]
    fn diamond_rows_widen_then_narrow() {
        let oc = classify_corners(&[
            Pt2::new(30.0, 10.0),
            Pt2::new(50.0, 30.0),
            Pt2::new(30.0, 50.0),
            Pt2::new(10.0, 30.0),
        ]);
        let bounds = RowBounds::for_marker(&oc);
        assert_eq!(bounds.top(), 10);
        assert_eq!(bounds.bottom(), 50);
        assert_eq!(bounds.bounds(10), Some((30, 30)));
        assert_eq!(bounds.bounds(30), Some((10, 50)));
        assert_eq!(bounds.bounds(40), Some((20, 40)));
        assert_eq!(bounds.bounds(51), None);
    }

    fn convex_quads() -> Vec<[Pt2; 4]> {
        vec![
            // rotated
            [
                Pt2::new(30.0, 10.0),
                Pt2::new(50.0, 30.0),
                Pt2::new(30.0, 50.0),
                Pt2::new(10.0, 30.0),
            ],
            [
                Pt2::new(41.0, 12.0),
                Pt2::new(77.0, 35.0),
                Pt2::new(52.0, 81.0),
                Pt2::new(13.0, 47.0),
            ],
            // skew left
            [
                Pt2::new(120.0, 40.0),
                Pt2::new(110.0, 160.0),
                Pt2::new(40.0, 130.0),
                Pt2::new(50.0, 60.0),
            ],
            // skew right
            [
                Pt2::new(50.0, 40.0),
                Pt2::new(130.0, 60.0),
                Pt2::new(120.0, 130.0),
                Pt2::new(60.0, 160.0),
            ],
            // axis aligned, tied extremes
            [
                Pt2::new(10.0, 10.0),
                Pt2::new(20.0, 10.0),
                Pt2::new(20.0, 20.0),
                Pt2::new(10.0, 20.0),
            ],
        ]
    }

    #[test]
    fn every_row_of_a_convex_quad_has_ordered_bounds() {
        let mut classes = Vec::new();
        for quad in convex_quads() {
            let ccw = [quad[0], quad[3], quad[2], quad[1]];
            for corners in [quad, ccw] {
                let oc = classify_corners(&corners);
                classes.push(oc.orientation);
                let bounds = RowBounds::for_marker(&oc);
                let rows: Vec<_> = bounds.rows().collect();
                assert_eq!(rows.len() as i64, bounds.bottom() - bounds.top() + 1);
                for (i, (row, l, r)) in rows.into_iter().enumerate() {
                    assert_eq!(row, bounds.top() + i as i64);
                    assert!(l <= r, "{:?}: row {row} has {l} > {r}", oc.orientation);
                }
            }
        }
        for class in [
            MarkerOrientation::Rotated,
            MarkerOrientation::SkewLeft,
            MarkerOrientation::SkewRight,
        ] {
            assert!(classes.contains(&class), "{class:?} not covered");
        }
    }

    #[test]
    fn winding_does_not_change_region_samples() {
        let cloud = flat_cloud(64, 64, 500.0);
        let extractor = RegionExtractor::default();
        let cw = [
            Pt2::new(30.0, 10.0),
            Pt2::new(50.0, 30.0),
            Pt2::new(30.0, 50.0),
            Pt2::new(10.0, 30.0),
        ];
        let ccw = [cw[0], cw[3], cw[2], cw[1]];
        let a = extractor.extract_corners(&cloud, &cw);
        let b = extractor.extract_corners(&cloud, &ccw);
        // 21 rows widening to 41 columns, then 20 rows narrowing back.
        assert_eq!(a.len(), 841);
        assert_eq!(a, b);
    }

    #[test]
    fn bounds_are_clipped_to_the_requested_rows() {
        let oc = classify_corners(&[
            Pt2::new(30.0, -100.0),
            Pt2::new(50.0, 30.0),
            Pt2::new(30.0, 500.0),
            Pt2::new(10.0, 30.0),
        ]);
        let bounds = RowBounds::for_marker_within(&oc, 0, 47);
        assert_eq!(bounds.top(), 0);
        assert_eq!(bounds.bottom(), 47);
        assert_eq!(bounds.rows().count(), 48);
        assert_eq!(bounds.bounds(30), Some((10, 50)));
    }

    #[test]
    fn horizontal_edges_do_not_divide_by_zero() {
        let bounds = RowBounds::from_paths(
            5,
            5,
            &[Pt2::new(2.0, 5.0), Pt2::new(8.0, 5.0)],
            &[Pt2::new(9.0, 5.0), Pt2::new(12.0, 5.0)],
        );
        assert_eq!(bounds.bounds(5), Some((2, 9)));
    }

    #[test]
    fn out_of_range_samples_are_dropped() {
        let corners = [
            Pt2::new(2.0, 2.0),
            Pt2::new(5.0, 2.0),
            Pt2::new(5.0, 5.0),
            Pt2::new(2.0, 5.0),
        ];
        let cloud = PointCloud::from_fn(8, 8, |r, c| {
            let z = match (r + c) % 3 {
                0 => 50.0,
                1 => 2000.0,
                _ => 700.0,
            };
            Some(Pt3::new(c as Real, r as Real, z))
        });
        let samples = RegionExtractor::default().extract_corners(&cloud, &corners);
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|p| p.z == 700.0));
    }

    #[test]
    fn marker_partly_outside_cloud_is_clipped() {
        let corners = [
            Pt2::new(-5.0, -5.0),
            Pt2::new(3.0, -5.0),
            Pt2::new(3.0, 3.0),
            Pt2::new(-5.0, 3.0),
        ];
        let cloud = flat_cloud(10, 10, 800.0);
        let samples = RegionExtractor::default().extract_corners(&cloud, &corners);
        assert_eq!(samples.len(), 16);
    }
}
