//! Image-space orientation of a marker quadrilateral.
//!
//! The interior of a foreshortened marker is bounded by a different pair of
//! corner paths depending on which corner ends up lowest on screen once the
//! topmost corner is placed first. [`classify_corners`] puts the corners in
//! clockwise screen order, rotates the list so index 0 is the top corner and
//! names the resulting shape.

use log::{debug, trace};
use optrack_core::Pt2;
use serde::{Deserialize, Serialize};

/// Shape class of a marker quadrilateral after canonical ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerOrientation {
    /// Bottom corner opposite the top corner (canonical index 2).
    Rotated,
    /// Bottom corner directly after the top corner (canonical index 1); both
    /// remaining corners lie on the left.
    SkewLeft,
    /// Bottom corner last (canonical index 3, or 0 for a flat quad); both
    /// remaining corners lie on the right.
    SkewRight,
}

/// Corners in canonical order (index 0 topmost) with their orientation class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedCorners {
    pub orientation: MarkerOrientation,
    pub corners: [Pt2; 4],
}

impl OrientedCorners {
    pub fn top(&self) -> &Pt2 {
        &self.corners[0]
    }

    /// Bottommost corner for this orientation class.
    pub fn bottom(&self) -> &Pt2 {
        match self.orientation {
            MarkerOrientation::Rotated => &self.corners[2],
            MarkerOrientation::SkewLeft => &self.corners[1],
            MarkerOrientation::SkewRight => &self.corners[3],
        }
    }
}

/// Index of the first strict extremum of `y`; ties keep the earlier corner.
fn first_extreme(corners: &[Pt2; 4], better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    for i in 1..4 {
        if better(corners[i].y, corners[best].y) {
            best = i;
        }
    }
    best
}

/// Twice the signed area of the quad; positive for clockwise order on screen
/// (image y pointing down).
fn signed_area2(c: &[Pt2; 4]) -> f64 {
    (0..4)
        .map(|i| {
            let (a, b) = (&c[i], &c[(i + 1) % 4]);
            a.x * b.y - b.x * a.y
        })
        .sum()
}

/// Rotate `corners` so the topmost corner comes first and classify the shape
/// by the position of the bottommost corner.
///
/// Counter-clockwise input is reversed first, so the result is always in
/// clockwise screen order.
pub fn classify_corners(corners: &[Pt2; 4]) -> OrientedCorners {
    let clockwise = if signed_area2(corners) < 0.0 {
        trace!("reversing counter-clockwise marker corners");
        [corners[0], corners[3], corners[2], corners[1]]
    } else {
        *corners
    };
    let corners = &clockwise;
    let top = first_extreme(corners, |y, best| y < best);
    let canonical: [Pt2; 4] = std::array::from_fn(|i| corners[(top + i) % 4]);

    let orientation = match first_extreme(&canonical, |y, best| y > best) {
        1 => MarkerOrientation::SkewLeft,
        2 => MarkerOrientation::Rotated,
        _ => MarkerOrientation::SkewRight,
    };
    debug!("marker orientation {:?}", orientation);

    OrientedCorners {
        orientation,
        corners: canonical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotations(corners: [Pt2; 4]) -> impl Iterator<Item = [Pt2; 4]> {
        (0..4).map(move |k| std::array::from_fn(|i| corners[(k + i) % 4]))
    }

    #[test]
    fn diamond_is_rotated() {
        let diamond = [
            Pt2::new(100.0, 50.0),
            Pt2::new(150.0, 100.0),
            Pt2::new(100.0, 150.0),
            Pt2::new(50.0, 100.0),
        ];
        let oc = classify_corners(&diamond);
        assert_eq!(oc.orientation, MarkerOrientation::Rotated);
        assert_eq!(oc.top(), &Pt2::new(100.0, 50.0));
        assert_eq!(oc.bottom(), &Pt2::new(100.0, 150.0));
    }

    #[test]
    fn skew_left_and_right() {
        // Clockwise on screen: top, bottom, lower-left, upper-left.
        let left = [
            Pt2::new(120.0, 40.0),
            Pt2::new(110.0, 160.0),
            Pt2::new(40.0, 130.0),
            Pt2::new(50.0, 60.0),
        ];
        assert_eq!(classify_corners(&left).orientation, MarkerOrientation::SkewLeft);

        // Clockwise on screen: top, upper-right, lower-right, bottom.
        let right = [
            Pt2::new(50.0, 40.0),
            Pt2::new(130.0, 60.0),
            Pt2::new(120.0, 130.0),
            Pt2::new(60.0, 160.0),
        ];
        assert_eq!(classify_corners(&right).orientation, MarkerOrientation::SkewRight);
    }

    fn reversed(c: [Pt2; 4]) -> [Pt2; 4] {
        [c[3], c[2], c[1], c[0]]
    }

    #[test]
    fn counter_clockwise_input_is_reordered() {
        let clockwise = [
            // Rotated
            [
                Pt2::new(30.0, 10.0),
                Pt2::new(50.0, 30.0),
                Pt2::new(30.0, 50.0),
                Pt2::new(10.0, 30.0),
            ],
            // SkewLeft
            [
                Pt2::new(120.0, 40.0),
                Pt2::new(110.0, 160.0),
                Pt2::new(40.0, 130.0),
                Pt2::new(50.0, 60.0),
            ],
            // SkewRight
            [
                Pt2::new(50.0, 40.0),
                Pt2::new(130.0, 60.0),
                Pt2::new(120.0, 130.0),
                Pt2::new(60.0, 160.0),
            ],
        ];
        for quad in clockwise {
            let expected = classify_corners(&quad);
            for ccw in rotations(reversed(quad)) {
                assert_eq!(classify_corners(&ccw), expected);
            }
        }
    }

    #[test]
    fn counter_clockwise_diamond_keeps_right_corner_second() {
        let oc = classify_corners(&[
            Pt2::new(30.0, 10.0),
            Pt2::new(10.0, 30.0),
            Pt2::new(30.0, 50.0),
            Pt2::new(50.0, 30.0),
        ]);
        assert_eq!(oc.orientation, MarkerOrientation::Rotated);
        assert_eq!(oc.corners[1], Pt2::new(50.0, 30.0));
        assert_eq!(oc.corners[3], Pt2::new(10.0, 30.0));
    }

    #[test]
    fn classification_is_invariant_to_cyclic_rotation() {
        let quads = [
            [
                Pt2::new(100.0, 50.0),
                Pt2::new(151.0, 99.0),
                Pt2::new(101.0, 152.0),
                Pt2::new(49.0, 101.0),
            ],
            [
                Pt2::new(120.0, 40.0),
                Pt2::new(110.0, 160.0),
                Pt2::new(40.0, 130.0),
                Pt2::new(50.0, 60.0),
            ],
            [
                Pt2::new(50.0, 40.0),
                Pt2::new(130.0, 60.0),
                Pt2::new(120.0, 130.0),
                Pt2::new(60.0, 160.0),
            ],
        ];
        for quad in quads {
            let expected = classify_corners(&quad);
            for rotated in rotations(quad) {
                assert_eq!(classify_corners(&rotated), expected);
            }
        }
    }

    #[test]
    fn classification_is_idempotent() {
        let quad = [
            Pt2::new(60.0, 160.0),
            Pt2::new(50.0, 40.0),
            Pt2::new(130.0, 60.0),
            Pt2::new(120.0, 130.0),
        ];
        let once = classify_corners(&quad);
        let twice = classify_corners(&once.corners);
        assert_eq!(once, twice);
    }

    #[test]
    fn ties_keep_first_corner() {
        // Axis-aligned square: two corners share the top row and two the bottom.
        let square = [
            Pt2::new(100.0, 100.0),
            Pt2::new(200.0, 100.0),
            Pt2::new(200.0, 200.0),
            Pt2::new(100.0, 200.0),
        ];
        let oc = classify_corners(&square);
        assert_eq!(oc.corners[0], Pt2::new(100.0, 100.0));
        assert_eq!(oc.orientation, MarkerOrientation::Rotated);

        let shifted = [square[1], square[2], square[3], square[0]];
        let oc = classify_corners(&shifted);
        assert_eq!(oc.corners[0], Pt2::new(200.0, 100.0));
        assert_eq!(oc.orientation, MarkerOrientation::SkewLeft);
    }

    #[test]
    fn flat_quad_defaults_to_skew_right() {
        let flat = [
            Pt2::new(10.0, 5.0),
            Pt2::new(20.0, 5.0),
            Pt2::new(30.0, 5.0),
            Pt2::new(40.0, 5.0),
        ];
        assert_eq!(classify_corners(&flat).orientation, MarkerOrientation::SkewRight);
    }
}
