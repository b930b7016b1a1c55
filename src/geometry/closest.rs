//! Clamped-parametric closest-point tests (Ericson style).
//!
//! All three tests return a [`Closest`] carrying the separation vector, the
//! scalar distance and the segment parameters `s`, `t`. The parameters double
//! as barycentric weights when contact forces are distributed over a rod's
//! two balls: the ball at the segment start receives weight `1 - s`, the ball
//! at the end receives `s`.

use glam::DVec3;

/// Result of a closest-point query.
///
/// `s` parameterises the first segment, `t` the second. For point queries the
/// unused parameter is zero.
#[derive(Debug, Clone, Copy)]
pub struct Closest {
    /// Vector from the closest point on the second shape to the closest
    /// point on the first.
    pub d_p: DVec3,
    /// Distance between the closest points.
    pub dist: f64,
    /// Parameter along the first segment, in `[0, 1]`.
    pub s: f64,
    /// Parameter along the second segment, in `[0, 1]`.
    pub t: f64,
    /// Closest point on the first shape.
    pub c1: DVec3,
    /// Closest point on the second shape.
    pub c2: DVec3,
}

/// Distance between two points (sphere-sphere narrow phase).
pub fn point_point(p1: DVec3, p2: DVec3) -> Closest {
    let d_p = p1 - p2;
    Closest {
        d_p,
        dist: d_p.length(),
        s: 0.0,
        t: 0.0,
        c1: p1,
        c2: p2,
    }
}

/// Closest point on segment `p1..q1` to point `p2` (rod-sphere narrow phase).
///
/// Projects the point onto the segment's supporting line and clamps the
/// parameter to `[0, 1]`.
pub fn segment_point(p1: DVec3, q1: DVec3, p2: DVec3) -> Closest {
    let ab = q1 - p1;
    let w = p2 - p1;
    let s = (w.dot(ab) / ab.dot(ab)).clamp(0.0, 1.0);
    let c1 = p1 + ab * s;
    let d_p = c1 - p2;
    Closest {
        d_p,
        dist: d_p.length(),
        s,
        t: 0.0,
        c1,
        c2: p2,
    }
}

/// Closest points between segments `p1..q1` and `p2..q2` (rod-rod narrow
/// phase).
///
/// Solves for `s, t` in `[0, 1]` minimising the squared distance between
/// `S1(s) = p1 + s*(q1 - p1)` and `S2(t) = p2 + t*(q2 - p2)`. Parallel
/// segments (`denom == 0`) fix `s = 0`; if the unclamped `t` falls outside
/// `[0, 1]` it is clamped and `s` recomputed for the new `t`.
pub fn segment_segment(p1: DVec3, q1: DVec3, p2: DVec3, q2: DVec3) -> Closest {
    let d1 = q1 - p1; // direction of S1
    let d2 = q2 - p2; // direction of S2
    let r = p1 - p2;
    let a = d1.dot(d1); // squared length of S1, > 0
    let e = d2.dot(d2); // squared length of S2, > 0
    let f = d2.dot(r);
    let c = d1.dot(r);
    let b = d1.dot(d2);
    let denom = a * e - b * b; // always >= 0

    // If the segments are not parallel, pick the closest point on L1 to L2
    // and clamp to S1. Otherwise pick an arbitrary s (= 0).
    let mut s = if denom != 0.0 {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    // Point on L2 closest to S1(s): t = ((p1 + d1*s) - p2).dot(d2) / d2.dot(d2)
    let mut t = (b * s + f) / e;

    // If t is outside [0, 1], clamp it and recompute s for the new t.
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }

    let c1 = p1 + d1 * s;
    let c2 = p2 + d2 * t;
    let d_p = c1 - c2;
    Closest {
        d_p,
        dist: d_p.length(),
        s,
        t,
        c1,
        c2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-12;

    #[test]
    fn test_point_point_distance() {
        let c = point_point(DVec3::new(1.0, 2.0, 2.0), DVec3::ZERO);
        assert!((c.dist - 3.0).abs() < TOL);
        assert!((c.d_p - DVec3::new(1.0, 2.0, 2.0)).length() < TOL);
    }

    #[test]
    fn test_segment_point_interior_projection() {
        let c = segment_point(
            DVec3::ZERO,
            DVec3::new(2.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
        );
        assert!((c.s - 0.5).abs() < TOL);
        assert!((c.dist - 1.0).abs() < TOL);
        assert!((c.c1 - DVec3::new(1.0, 0.0, 0.0)).length() < TOL);
    }

    #[test]
    fn test_segment_point_clamps_to_endpoints() {
        let p1 = DVec3::ZERO;
        let q1 = DVec3::new(1.0, 0.0, 0.0);
        let before = segment_point(p1, q1, DVec3::new(-2.0, 0.0, 0.0));
        assert_eq!(before.s, 0.0);
        assert!((before.dist - 2.0).abs() < TOL);
        let after = segment_point(p1, q1, DVec3::new(3.0, 0.0, 0.0));
        assert_eq!(after.s, 1.0);
        assert!((after.dist - 2.0).abs() < TOL);
    }

    #[test]
    fn test_segment_segment_crossing() {
        // Perpendicular segments crossing at their midpoints, offset in z.
        let c = segment_segment(
            DVec3::new(-1.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, -1.0, 0.5),
            DVec3::new(0.0, 1.0, 0.5),
        );
        assert!((c.s - 0.5).abs() < TOL);
        assert!((c.t - 0.5).abs() < TOL);
        assert!((c.dist - 0.5).abs() < TOL);
    }

    #[test]
    fn test_segment_segment_parallel_degenerate() {
        // Two parallel unit segments offset perpendicular to their axis must
        // take the denom == 0 branch: s = t = 0 and distance d.
        let d = 0.25;
        let c = segment_segment(
            DVec3::ZERO,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, d, 0.0),
            DVec3::new(1.0, d, 0.0),
        );
        assert_eq!(c.s, 0.0);
        assert_eq!(c.t, 0.0);
        assert!((c.dist - d).abs() < TOL);
    }

    #[test]
    fn test_segment_segment_endpoint_clamp() {
        // Collinear but disjoint segments: closest points are facing ends.
        let c = segment_segment(
            DVec3::ZERO,
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
            DVec3::new(4.0, 0.0, 0.0),
        );
        assert!((c.dist - 2.0).abs() < TOL);
        assert_eq!(c.s, 1.0);
        assert_eq!(c.t, 0.0);
    }

    #[test]
    fn test_separation_vector_orientation() {
        // d_p points from the closest point on shape 2 towards shape 1.
        let c = segment_point(
            DVec3::new(0.0, 2.0, 0.0),
            DVec3::new(1.0, 2.0, 0.0),
            DVec3::new(0.5, 0.0, 0.0),
        );
        assert!(c.d_p.y > 0.0);
        assert!((c.d_p.length() - c.dist).abs() < TOL);
    }
}
