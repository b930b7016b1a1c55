//! Closest-point geometry between the primitive shapes of the model.
//!
//! Cells are spheres (one ball) or sphero-cylinders (two balls joined by a
//! rod spring), so every narrow-phase query reduces to point-point,
//! segment-point or segment-segment distance.
//!
//! Reference: Ericson, Real-Time Collision Detection, Morgan Kaufmann 2005

pub mod closest;

pub use closest::{point_point, segment_point, segment_segment, Closest};
