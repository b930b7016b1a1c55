//! Hookean springs and the bond groups that tie siblings together.
//!
//! Springs formed as one logical multi-point bond (the four stick springs of
//! a rod-rod attachment, the short/long filament pair) live in a single
//! [`BondGroup`] with one identity. A group forms and breaks atomically;
//! "siblings" of a spring are simply the other members of its group, which
//! makes sibling symmetry hold by construction.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Spring flavour; decides the rest-length and stiffness formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpringKind {
    /// Internal spring of a rod cell.
    Rod,
    /// Adhesive spring between two collided cells.
    Stick,
    /// Short filament spring of a straight chain (or the sphere filament).
    FilShort,
    /// Long filament spring of a straight chain.
    FilLong,
    /// Short filament spring of a branched linkage.
    FilBranchShort,
    /// Long filament spring of a branched linkage.
    FilBranchLong,
}

impl SpringKind {
    /// Whether this is one of the filament flavours.
    pub fn is_filament(self) -> bool {
        matches!(
            self,
            SpringKind::FilShort
                | SpringKind::FilLong
                | SpringKind::FilBranchShort
                | SpringKind::FilBranchLong
        )
    }
}

/// Elastic connector between exactly two balls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spring {
    pub kind: SpringKind,
    /// The two connected balls.
    pub balls: [usize; 2],
    /// Stiffness [N m^-1], scaled by ball amount at construction.
    pub k: f64,
    /// Rest length [m].
    pub rest_length: f64,
}

/// Kind tag for a bond group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondKind {
    Stick,
    Filament,
}

/// A set of 1, 2 or 4 co-formed sibling springs with a single identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondGroup {
    /// Unique id; stable across removals of other groups.
    pub id: u64,
    pub kind: BondKind,
    pub springs: Vec<Spring>,
}

/// Spring from one ball to a fixed point on the domain floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorSpring {
    /// The anchored ball.
    pub ball: usize,
    /// Fixed floor point, directly below the ball at formation time.
    pub anchor: DVec3,
    /// Stiffness [N m^-1].
    pub k: f64,
    /// Rest length [m], fixed at creation.
    pub rest_length: f64,
}

/// All anchor springs of one cell, broken together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorGroup {
    pub id: u64,
    /// The anchored cell.
    pub cell: usize,
    pub springs: Vec<AnchorSpring>,
}
