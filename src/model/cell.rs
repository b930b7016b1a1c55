//! Cells: one or two balls forming a biological unit.

use serde::{Deserialize, Serialize};

/// Shape class of a cell species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// One ball.
    Sphere,
    /// Two balls and a rod spring; ball radius grows with mass.
    RodVariable,
    /// Two balls and a rod spring; radius fixed at maximum, length grows.
    RodFixed,
}

impl Shape {
    /// Whether this shape is a two-ball rod.
    pub fn is_rod(self) -> bool {
        matches!(self, Shape::RodVariable | Shape::RodFixed)
    }
}

/// A cell: sphere (one ball) or rod (two balls joined by exactly one rod
/// spring). Adjacency is stored as ids into the model's arenas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    /// Species index into the per-species parameter arrays.
    pub species: usize,
    /// Whether this cell participates in filament formation.
    pub filament: bool,
    /// Ball indices; length 1 for spheres, 2 for rods.
    pub balls: Vec<usize>,
    /// Index of the internal rod spring; `Some` iff the cell is a rod.
    pub rod_spring: Option<usize>,
    /// Cells this cell is stuck to.
    pub stick_partners: Vec<usize>,
    /// Stick bond groups this cell participates in.
    pub stick_groups: Vec<u64>,
    /// Filament bond groups this cell participates in.
    pub fil_groups: Vec<u64>,
    /// Anchor group, if anchored to the substratum.
    pub anchor_group: Option<u64>,
    /// Lineage: the cell this one divided from, set at division.
    pub mother: Option<usize>,
    /// Surface reaction rate supplied by the flux collaborator [mol s^-1].
    pub q: f64,
    /// Growth iteration at which this cell was born.
    pub born: u32,
    /// Per-cell radius offset [m], drawn at construction (fixed-radius rods).
    pub radius_modifier: f64,
}

impl Cell {
    /// Whether `other` is this cell's mother or daughter.
    pub fn is_related(&self, self_id: usize, other_id: usize, other: &Cell) -> bool {
        self.mother == Some(other_id) || other.mother == Some(self_id)
    }
}
