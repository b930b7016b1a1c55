//! The entity graph: balls, cells, springs and bond groups, arena-owned.
//!
//! Every entity lives in a contiguous collection on [`Model`] and refers to
//! other entities by index (balls, cells, rod springs) or by stable bond id
//! (stick/filament/anchor groups), so there are no ownership cycles. Cells
//! are never removed; bond groups come and go as bonds form and break.

pub mod ball;
pub mod cell;
pub mod spring;

pub use ball::{ball_radius, Ball};
pub use cell::{Cell, Shape};
pub use spring::{AnchorGroup, AnchorSpring, BondGroup, BondKind, Spring, SpringKind};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::config::Parameters;
use crate::error::SimError;
use crate::geometry::{self, Closest};

/// The world: owns all entities, the parameter set and the iteration
/// counters. A serialized `Model` is a complete, resumable checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub params: Parameters,
    pub balls: Vec<Ball>,
    pub cells: Vec<Cell>,
    /// Internal rod springs; exactly one per rod cell, never removed.
    pub rod_springs: Vec<Spring>,
    pub stick_groups: Vec<BondGroup>,
    pub fil_groups: Vec<BondGroup>,
    pub anchor_groups: Vec<AnchorGroup>,
    next_bond_id: u64,

    // === Progress counters ===
    pub growth_iter: u32,
    /// Accumulated growth time [s].
    pub growth_time: f64,
    pub relaxation_iter: u32,
    /// Accumulated relaxation time [s]; start of the next ODE window.
    pub relaxation_time: f64,

    /// Adaptive stiffness control for the ODE stepper; lowered when windows
    /// take excessive steps.
    pub ode_beta: f64,
}

impl Model {
    /// Create an empty model after validating the parameter set.
    pub fn new(params: Parameters) -> Result<Self, SimError> {
        params.validate()?;
        let ode_beta = params.ode_beta;
        Ok(Self {
            ode_beta,
            params,
            balls: Vec::new(),
            cells: Vec::new(),
            rod_springs: Vec::new(),
            stick_groups: Vec::new(),
            fil_groups: Vec::new(),
            anchor_groups: Vec::new(),
            next_bond_id: 0,
            growth_iter: 0,
            growth_time: 0.0,
            relaxation_iter: 0,
            relaxation_time: 0.0,
        })
    }

    /// Lower the step controller's beta after an excessive-step relaxation.
    pub fn lower_ode_beta(&mut self) {
        self.ode_beta *= 0.75;
    }

    fn fresh_bond_id(&mut self) -> u64 {
        let id = self.next_bond_id;
        self.next_bond_id += 1;
        id
    }

    /// Shape of a cell.
    pub fn shape(&self, cell: usize) -> Shape {
        self.params.shape[self.cells[cell].species]
    }

    // =======================================================================
    // Construction
    // =======================================================================

    /// Construct a cell of the given species holding amount `n` [Cmol].
    ///
    /// `base0` places the (first) ball; `base1` places the second ball of a
    /// rod and is ignored for spheres. A rod cell also gets its internal rod
    /// spring, rest length derived from the species' aspect ratio and the
    /// balls' radii.
    pub fn create_cell(
        &mut self,
        species: usize,
        n: f64,
        base0: DVec3,
        base1: DVec3,
        filament: bool,
        radius_modifier: f64,
    ) -> Result<usize, SimError> {
        if species >= self.params.n_species() {
            return Err(SimError::Config(format!(
                "species index {} out of range ({} species configured)",
                species,
                self.params.n_species()
            )));
        }
        let cell_id = self.cells.len();
        let shape = self.params.shape[species];
        let mut cell = Cell {
            species,
            filament,
            balls: Vec::with_capacity(2),
            rod_spring: None,
            stick_partners: Vec::new(),
            stick_groups: Vec::new(),
            fil_groups: Vec::new(),
            anchor_group: None,
            mother: None,
            q: 0.0,
            born: self.growth_iter,
            radius_modifier,
        };

        let mut push_ball = |balls: &mut Vec<Ball>, pos: DVec3, amount: f64| -> usize {
            let id = balls.len();
            balls.push(Ball {
                pos,
                vel: DVec3::ZERO,
                force: DVec3::ZERO,
                n: amount,
                radius: ball_radius(&self.params, species, amount, radius_modifier),
                cell: cell_id,
            });
            id
        };

        match shape {
            Shape::Sphere => {
                cell.balls.push(push_ball(&mut self.balls, base0, n));
            }
            Shape::RodVariable | Shape::RodFixed => {
                cell.balls.push(push_ball(&mut self.balls, base0, n / 2.0));
                cell.balls.push(push_ball(&mut self.balls, base1, n / 2.0));
            }
        }
        self.cells.push(cell);

        if shape.is_rod() {
            let spring_id = self.rod_springs.len();
            let b0 = self.cells[cell_id].balls[0];
            let b1 = self.cells[cell_id].balls[1];
            self.rod_springs.push(Spring {
                kind: SpringKind::Rod,
                balls: [b0, b1],
                k: self.params.kr * self.params.n_cell_max(species) / 4.0,
                rest_length: 0.0,
            });
            self.cells[cell_id].rod_spring = Some(spring_id);
            self.reset_rod_rest_length(cell_id);
        }
        Ok(cell_id)
    }

    // =======================================================================
    // Amount and derived geometry
    // =======================================================================

    /// Total chemical amount of a cell [Cmol].
    pub fn amount(&self, cell: usize) -> f64 {
        self.cells[cell].balls.iter().map(|&b| self.balls[b].n).sum()
    }

    /// Set the total amount, redistributing evenly over the balls and
    /// recomputing radii. Rod cells also get their rod spring rest length
    /// rebuilt, since it depends on radius and amount.
    pub fn set_amount(&mut self, cell: usize, new_amount: f64) {
        let species = self.cells[cell].species;
        let modifier = self.cells[cell].radius_modifier;
        let n_balls = self.cells[cell].balls.len() as f64;
        let per_ball = new_amount / n_balls;
        for i in 0..self.cells[cell].balls.len() {
            let b = self.cells[cell].balls[i];
            self.balls[b].n = per_ball;
            self.balls[b].radius = ball_radius(&self.params, species, per_ball, modifier);
        }
        if self.cells[cell].rod_spring.is_some() {
            self.reset_rod_rest_length(cell);
        }
    }

    /// Rest length of a rod cell's internal spring, from current radii.
    pub fn rod_rest_length(&self, cell: usize) -> f64 {
        use std::f64::consts::PI;
        let c = &self.cells[cell];
        let r = self.balls[c.balls[0]].radius;
        match self.params.shape[c.species] {
            Shape::RodVariable => r * self.params.aspect(c.species),
            Shape::RodFixed => {
                self.amount(cell) * self.params.mw_x / (PI * self.params.rho_x * r * r)
                    - 4.0 / 3.0 * r
            }
            Shape::Sphere => 0.0,
        }
    }

    /// Recompute the rod spring rest length of `cell`.
    pub fn reset_rod_rest_length(&mut self, cell: usize) {
        if let Some(spring_id) = self.cells[cell].rod_spring {
            self.rod_springs[spring_id].rest_length = self.rod_rest_length(cell);
        }
    }

    /// Surface area of a cell [m^2]: sphere, or sphero-cylinder for rods.
    pub fn surface_area(&self, cell: usize) -> f64 {
        use std::f64::consts::PI;
        let c = &self.cells[cell];
        let r = self.balls[c.balls[0]].radius;
        match self.params.shape[c.species] {
            Shape::Sphere => 4.0 * PI * r * r,
            Shape::RodVariable | Shape::RodFixed => {
                let height = self.rod_springs[c.rod_spring.expect("rod cell")].rest_length;
                4.0 * PI * r * r + 2.0 * PI * r * height
            }
        }
    }

    /// Volume of a cell [m^3].
    pub fn volume(&self, cell: usize) -> f64 {
        use std::f64::consts::PI;
        let c = &self.cells[cell];
        let r = self.balls[c.balls[0]].radius;
        match self.params.shape[c.species] {
            Shape::Sphere => 4.0 / 3.0 * PI * r.powi(3),
            Shape::RodVariable | Shape::RodFixed => {
                let height = self.rod_springs[c.rod_spring.expect("rod cell")].rest_length;
                4.0 / 3.0 * PI * r.powi(3) + PI * r * r * height
            }
        }
    }

    // =======================================================================
    // Spring stiffness and rest-length formulas
    // =======================================================================

    /// Stiffness of a stick spring between two cells; averages the two
    /// species' per-ball mass scales (2 balls for spheres, 4 for rods).
    pub fn stick_k(&self, cell0: usize, cell1: usize) -> f64 {
        let div = |c: usize| -> f64 {
            if self.shape(c).is_rod() {
                4.0
            } else {
                2.0
            }
        };
        let s0 = self.cells[cell0].species;
        let s1 = self.cells[cell1].species;
        self.params.ks
            * (self.params.n_cell_max(s0) / div(cell0) + self.params.n_cell_max(s1) / div(cell1))
            / 2.0
    }

    /// Stiffness of a filament spring anchored at `cell0`.
    pub fn fil_k(&self, cell0: usize) -> f64 {
        let div = if self.shape(cell0).is_rod() { 2.0 } else { 1.0 };
        self.params.kf * self.params.n_cell_max(self.cells[cell0].species) / div
    }

    /// Rest length for a filament spring of `kind` between two balls.
    ///
    /// Long flavours depend on the parents' rod rest lengths; the branched
    /// long flavour additionally needs its sibling short spring's rest length
    /// (`short_rest`), so shorts must be computed first.
    pub fn fil_rest_length(&self, kind: SpringKind, b0: usize, b1: usize, short_rest: f64) -> f64 {
        let r0 = self.balls[b0].radius;
        let r1 = self.balls[b1].radius;
        let rod_rest = |b: usize| -> f64 {
            let c = &self.cells[self.balls[b].cell];
            c.rod_spring
                .map(|s| self.rod_springs[s].rest_length)
                .unwrap_or(0.0)
        };
        let avg_rod = 0.5 * (self.params.fil_length_rod[0] + self.params.fil_length_rod[1]);
        match kind {
            SpringKind::FilShort => {
                let both_spheres =
                    !self.shape(self.balls[b0].cell).is_rod() && !self.shape(self.balls[b1].cell).is_rod();
                if both_spheres {
                    self.params.fil_length_sphere * (r0 + r1)
                } else {
                    self.params.fil_length_rod[0] * (r0 + r1)
                }
            }
            SpringKind::FilLong => {
                self.params.fil_length_rod[1] * (r0 + r1) + rod_rest(b0) + rod_rest(b1)
            }
            SpringKind::FilBranchShort => avg_rod * (r0 + r1),
            SpringKind::FilBranchLong => {
                let rls = short_rest;
                let rl0 = rod_rest(b0);
                let rl1 = rod_rest(b1);
                avg_rod
                    * ((rl0 + 0.5 * rls).powi(2) + (rl1 + 0.75f64.sqrt() * rls).powi(2)).sqrt()
            }
            SpringKind::Rod | SpringKind::Stick => unreachable!("not a filament kind"),
        }
    }

    /// Recompute rest lengths of every filament spring. Springs are stored
    /// short-before-long within each group, so the running `last_short` is
    /// always valid when a branched long spring needs it.
    pub fn reset_filament_rest_lengths(&mut self) {
        for g in 0..self.fil_groups.len() {
            let mut last_short = 0.0;
            for s in 0..self.fil_groups[g].springs.len() {
                let spring = &self.fil_groups[g].springs[s];
                let rest = self.fil_rest_length(spring.kind, spring.balls[0], spring.balls[1], last_short);
                let spring = &mut self.fil_groups[g].springs[s];
                spring.rest_length = rest;
                if matches!(spring.kind, SpringKind::FilShort | SpringKind::FilBranchShort) {
                    last_short = rest;
                }
            }
        }
    }

    /// Add a filament bond group; springs must be listed short-before-long.
    /// Rest lengths are computed here, in listed order. Registers the group
    /// with every cell one of its springs touches.
    pub fn add_fil_group(&mut self, springs: Vec<(SpringKind, usize, usize)>) -> u64 {
        let id = self.fresh_bond_id();
        let mut built = Vec::with_capacity(springs.len());
        let mut last_short = 0.0;
        for (kind, b0, b1) in springs {
            let rest = self.fil_rest_length(kind, b0, b1, last_short);
            if matches!(kind, SpringKind::FilShort | SpringKind::FilBranchShort) {
                last_short = rest;
            }
            built.push(Spring {
                kind,
                balls: [b0, b1],
                k: self.fil_k(self.balls[b0].cell),
                rest_length: rest,
            });
        }
        let cells = self.group_cells(&built);
        for &c in &cells {
            self.cells[c].fil_groups.push(id);
        }
        self.fil_groups.push(BondGroup {
            id,
            kind: BondKind::Filament,
            springs: built,
        });
        id
    }

    /// Unique cells touched by a set of springs.
    fn group_cells(&self, springs: &[Spring]) -> Vec<usize> {
        let mut cells = Vec::new();
        for s in springs {
            for &b in &s.balls {
                let c = self.balls[b].cell;
                if !cells.contains(&c) {
                    cells.push(c);
                }
            }
        }
        cells
    }

    // =======================================================================
    // Stick bonds
    // =======================================================================

    /// Stick two cells together with one bond group of `n0 * n1` springs,
    /// pairing every ball of one cell with every ball of the other. Returns
    /// the number of springs formed.
    pub fn stick(&mut self, cell_a: usize, cell_b: usize) -> usize {
        // Sphere goes first so the ball pairing below indexes correctly.
        let (cell0, cell1) = if self.shape(cell_a).is_rod() && !self.shape(cell_b).is_rod() {
            (cell_b, cell_a)
        } else {
            (cell_a, cell_b)
        };
        let n0 = self.cells[cell0].balls.len();
        let n1 = self.cells[cell1].balls.len();
        let n_springs = n0 * n1;
        let k = self.stick_k(cell0, cell1);

        let mut springs = Vec::with_capacity(n_springs);
        for i in 0..n_springs {
            let b0 = self.cells[cell0].balls[i / 2];
            let b1 = self.cells[cell1].balls[i % 2];
            // Rest length never shorter than touching, even when the pair
            // still overlaps at formation time.
            let dist = (self.balls[b1].pos - self.balls[b0].pos).length();
            let rest = dist.max(self.balls[b0].radius + self.balls[b1].radius);
            springs.push(Spring {
                kind: SpringKind::Stick,
                balls: [b0, b1],
                k,
                rest_length: rest,
            });
        }

        let id = self.fresh_bond_id();
        self.cells[cell0].stick_groups.push(id);
        self.cells[cell1].stick_groups.push(id);
        self.cells[cell0].stick_partners.push(cell1);
        self.cells[cell1].stick_partners.push(cell0);
        self.stick_groups.push(BondGroup {
            id,
            kind: BondKind::Stick,
            springs,
        });
        n_springs
    }

    /// The stick group connecting two cells, if any.
    pub fn stick_group_between(&self, cell0: usize, cell1: usize) -> Option<u64> {
        self.stick_groups.iter().find_map(|g| {
            let s = &g.springs[0];
            let ca = self.balls[s.balls[0]].cell;
            let cb = self.balls[s.balls[1]].cell;
            if (ca == cell0 && cb == cell1) || (ca == cell1 && cb == cell0) {
                Some(g.id)
            } else {
                None
            }
        })
    }

    /// Break a stick bond group with all its sibling springs: removed from
    /// the model list, both cells' group lists and partner lists atomically.
    /// Returns the number of springs removed.
    pub fn break_stick_group(&mut self, id: u64) -> usize {
        let Some(idx) = self.stick_groups.iter().position(|g| g.id == id) else {
            return 0;
        };
        let group = self.stick_groups.swap_remove(idx);
        let s = &group.springs[0];
        let cell0 = self.balls[s.balls[0]].cell;
        let cell1 = self.balls[s.balls[1]].cell;
        for (c, other) in [(cell0, cell1), (cell1, cell0)] {
            self.cells[c].stick_groups.retain(|&g| g != id);
            if let Some(p) = self.cells[c].stick_partners.iter().position(|&p| p == other) {
                self.cells[c].stick_partners.swap_remove(p);
            }
        }
        group.springs.len()
    }

    /// Break a filament bond group and all its siblings. Returns the number
    /// of springs removed.
    pub fn break_fil_group(&mut self, id: u64) -> usize {
        let Some(idx) = self.fil_groups.iter().position(|g| g.id == id) else {
            return 0;
        };
        let group = self.fil_groups.swap_remove(idx);
        for c in self.group_cells(&group.springs) {
            self.cells[c].fil_groups.retain(|&g| g != id);
        }
        group.springs.len()
    }

    // =======================================================================
    // Anchors
    // =======================================================================

    /// Anchor every ball of a cell to the floor point directly below it.
    /// All anchors of the cell form one sibling group. Returns the number of
    /// anchor springs formed; zero if the cell is already anchored.
    pub fn anchor_cell(&mut self, cell: usize) -> usize {
        if self.cells[cell].anchor_group.is_some() {
            return 0;
        }
        let k = self.params.kan * self.params.n_ball_init(self.cells[cell].species);
        let springs: Vec<AnchorSpring> = self.cells[cell]
            .balls
            .iter()
            .map(|&b| {
                let pos = self.balls[b].pos;
                let anchor = DVec3::new(pos.x, 0.0, pos.z);
                AnchorSpring {
                    ball: b,
                    anchor,
                    k,
                    rest_length: (pos - anchor).length(),
                }
            })
            .collect();
        let count = springs.len();
        let id = self.fresh_bond_id();
        self.cells[cell].anchor_group = Some(id);
        self.anchor_groups.push(AnchorGroup { id, cell, springs });
        count
    }

    /// Break a cell's anchor group. Returns the number of springs removed.
    pub fn break_anchor_group(&mut self, id: u64) -> usize {
        let Some(idx) = self.anchor_groups.iter().position(|g| g.id == id) else {
            return 0;
        };
        let group = self.anchor_groups.swap_remove(idx);
        self.cells[group.cell].anchor_group = None;
        group.springs.len()
    }

    // =======================================================================
    // Collision queries
    // =======================================================================

    /// Conservative reach bound for a cell pair: sum of radii plus each
    /// rod's full extent, the whole envelope scaled by `factor` (the
    /// over-push factor for collision, the formation factor for stick
    /// formation). The scaled radii keep the bound at least as wide as any
    /// narrow-phase gate using the same factor.
    pub fn reach(&self, cell0: usize, cell1: usize, factor: f64) -> f64 {
        let extent = |c: usize| -> f64 {
            if self.shape(c).is_rod() {
                let cc = &self.cells[c];
                self.params.aspect(cc.species) * 2.0 * self.balls[cc.balls[0]].radius
            } else {
                0.0
            }
        };
        let r0 = self.balls[self.cells[cell0].balls[0]].radius;
        let r1 = self.balls[self.cells[cell1].balls[0]].radius;
        factor * (extent(cell0) + extent(cell1) + r0 + r1)
    }

    /// Cheap axis-aligned broad phase: can the pair possibly be within
    /// `reach` of each other?
    pub fn within_reach(&self, cell0: usize, cell1: usize, reach: f64) -> bool {
        let d = self.balls[self.cells[cell1].balls[0]].pos
            - self.balls[self.cells[cell0].balls[0]].pos;
        d.x.abs() < reach && d.y.abs() < reach && d.z.abs() < reach
    }

    /// Exact closest-point query between two cells, dispatching on shape.
    pub fn cell_closest(&self, cell0: usize, cell1: usize) -> Closest {
        let c0 = &self.cells[cell0];
        let c1 = &self.cells[cell1];
        let rod0 = self.shape(cell0).is_rod();
        let rod1 = self.shape(cell1).is_rod();
        let p = |b: usize| self.balls[b].pos;
        match (rod0, rod1) {
            (false, false) => geometry::point_point(p(c0.balls[0]), p(c1.balls[0])),
            (false, true) => {
                // The query parameterises the rod, which is the second cell
                // here, so the result has to be reoriented: `d_p` must point
                // towards cell0 and the segment parameter belongs in `t`.
                let q = geometry::segment_point(p(c1.balls[0]), p(c1.balls[1]), p(c0.balls[0]));
                Closest {
                    d_p: -q.d_p,
                    dist: q.dist,
                    s: 0.0,
                    t: q.s,
                    c1: q.c2,
                    c2: q.c1,
                }
            }
            (true, false) => {
                geometry::segment_point(p(c0.balls[0]), p(c0.balls[1]), p(c1.balls[0]))
            }
            (true, true) => geometry::segment_segment(
                p(c0.balls[0]),
                p(c0.balls[1]),
                p(c1.balls[0]),
                p(c1.balls[1]),
            ),
        }
    }

    /// Exact overlap scan after relaxation: cells whose shape-correct
    /// distance is below `touch_factor` times the sum of radii. Returns the
    /// sorted, deduplicated ids of all overlapping cells.
    pub fn detect_overlap(&self, touch_factor: f64) -> Vec<usize> {
        let mut overlapping = Vec::new();
        for cell0 in 0..self.cells.len() {
            for cell1 in (cell0 + 1)..self.cells.len() {
                let r2 = self.balls[self.cells[cell0].balls[0]].radius
                    + self.balls[self.cells[cell1].balls[0]].radius;
                let reach = self.reach(cell0, cell1, touch_factor.max(1.0));
                if !self.within_reach(cell0, cell1, reach) {
                    continue;
                }
                if self.cell_closest(cell0, cell1).dist < r2 * touch_factor {
                    overlapping.push(cell0);
                    overlapping.push(cell1);
                }
            }
        }
        overlapping.sort_unstable();
        overlapping.dedup();
        overlapping
    }

    /// Cells with a ball within `touch_factor * radius` of the floor.
    pub fn detect_floor_collision(&self, touch_factor: f64) -> Vec<usize> {
        let mut hits = Vec::new();
        for (i, cell) in self.cells.iter().enumerate() {
            if cell
                .balls
                .iter()
                .any(|&b| self.balls[b].pos.y - touch_factor * self.balls[b].radius < 0.0)
            {
                hits.push(i);
            }
        }
        hits
    }

    // =======================================================================
    // Filament chain topology
    // =======================================================================

    /// The straight-chain neighbour attached at this rod cell's second ball
    /// via a short filament spring, excluding the mother (attached at the
    /// first ball). `None` for chain ends or branched attachments.
    pub fn fil_neighbour(&self, cell: usize) -> Option<usize> {
        let ball1 = *self.cells[cell].balls.get(1)?;
        for group in &self.fil_groups {
            for s in &group.springs {
                if s.kind != SpringKind::FilShort {
                    continue;
                }
                if s.balls[0] == ball1 {
                    return Some(self.balls[s.balls[1]].cell);
                }
                if s.balls[1] == ball1 {
                    return Some(self.balls[s.balls[0]].cell);
                }
            }
        }
        None
    }

    /// Number of filament springs with an endpoint in this cell.
    pub fn fil_spring_count(&self, cell: usize) -> usize {
        self.fil_groups
            .iter()
            .filter(|g| self.cells[cell].fil_groups.contains(&g.id))
            .flat_map(|g| g.springs.iter())
            .filter(|s| {
                self.balls[s.balls[0]].cell == cell || self.balls[s.balls[1]].cell == cell
            })
            .count()
    }

    /// Total number of stick springs in the model.
    pub fn stick_spring_count(&self) -> usize {
        self.stick_groups.iter().map(|g| g.springs.len()).sum()
    }

    /// Total number of anchor springs in the model.
    pub fn anchor_spring_count(&self) -> usize {
        self.anchor_groups.iter().map(|g| g.springs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;

    fn model() -> Model {
        Model::new(Parameters::default()).unwrap()
    }

    #[test]
    fn test_sphere_cell_has_one_ball_no_rod_spring() {
        let mut m = model();
        let c = m
            .create_cell(0, 1e-16, DVec3::splat(1e-6), DVec3::ZERO, false, 0.0)
            .unwrap();
        assert_eq!(m.cells[c].balls.len(), 1);
        assert!(m.cells[c].rod_spring.is_none());
    }

    #[test]
    fn test_rod_cell_owns_exactly_one_rod_spring() {
        let mut m = model();
        let c = m
            .create_cell(
                4,
                1e-14,
                DVec3::new(0.0, 1e-6, 0.0),
                DVec3::new(1e-6, 1e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        assert_eq!(m.cells[c].balls.len(), 2);
        let rod = m.cells[c].rod_spring.expect("rod spring");
        assert_eq!(m.rod_springs[rod].kind, SpringKind::Rod);
        assert!(m.rod_springs[rod].rest_length > 0.0);
    }

    #[test]
    fn test_amount_round_trip_and_redistribution() {
        let mut m = model();
        let c = m
            .create_cell(
                2,
                2e-16,
                DVec3::new(0.0, 1e-6, 0.0),
                DVec3::new(1e-6, 1e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        let target = 3.1e-16;
        m.set_amount(c, target);
        assert!((m.amount(c) - target).abs() / target < 1e-12);
        let b0 = m.cells[c].balls[0];
        let b1 = m.cells[c].balls[1];
        assert!((m.balls[b0].n - m.balls[b1].n).abs() < 1e-30);
        assert_eq!(m.balls[b0].radius, m.balls[b1].radius);
    }

    #[test]
    fn test_set_amount_resets_rod_rest_length() {
        let mut m = model();
        let c = m
            .create_cell(
                2,
                2e-16,
                DVec3::new(0.0, 1e-6, 0.0),
                DVec3::new(1e-6, 1e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        let rod = m.cells[c].rod_spring.unwrap();
        let before = m.rod_springs[rod].rest_length;
        m.set_amount(c, 4e-16);
        // Variable-radius rods grow in radius, so the rest length changes.
        assert!(m.rod_springs[rod].rest_length > before);
    }

    #[test]
    fn test_sphere_volume_matches_amount() {
        let mut m = model();
        let c = m
            .create_cell(0, 1e-16, DVec3::splat(1e-6), DVec3::ZERO, false, 0.0)
            .unwrap();
        let expected = m.amount(c) * m.params.mw_x / m.params.rho_x;
        assert!((m.volume(c) - expected).abs() / expected < 1e-12);
        let r = m.balls[0].radius;
        let area = 4.0 * std::f64::consts::PI * r * r;
        assert!((m.surface_area(c) - area).abs() / area < 1e-12);
    }

    #[test]
    fn test_rod_area_exceeds_sphere_of_same_radius() {
        let mut m = model();
        let c = m
            .create_cell(
                4,
                1e-14,
                DVec3::new(0.0, 1e-6, 0.0),
                DVec3::new(1e-6, 1e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        let r = m.balls[m.cells[c].balls[0]].radius;
        assert!(m.surface_area(c) > 4.0 * std::f64::consts::PI * r * r);
        assert!(m.volume(c) > 4.0 / 3.0 * std::f64::consts::PI * r.powi(3));
    }

    #[test]
    fn test_unknown_species_is_config_error() {
        let mut m = model();
        let err = m
            .create_cell(42, 1e-16, DVec3::ZERO, DVec3::ZERO, false, 0.0)
            .unwrap_err();
        assert!(matches!(err, crate::error::SimError::Config(_)));
    }

    #[test]
    fn test_stick_rod_rod_forms_four_springs() {
        let mut m = model();
        let c0 = m
            .create_cell(
                4,
                2e-16,
                DVec3::new(0.0, 1e-6, 0.0),
                DVec3::new(1e-6, 1e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        let c1 = m
            .create_cell(
                4,
                2e-16,
                DVec3::new(0.0, 1.5e-6, 0.0),
                DVec3::new(1e-6, 1.5e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        assert_eq!(m.stick(c0, c1), 4);
        assert_eq!(m.stick_groups.len(), 1);
        assert_eq!(m.stick_groups[0].springs.len(), 4);
        assert!(m.cells[c0].stick_partners.contains(&c1));
        assert!(m.cells[c1].stick_partners.contains(&c0));
    }

    #[test]
    fn test_break_stick_group_is_atomic() {
        let mut m = model();
        let c0 = m
            .create_cell(0, 1e-16, DVec3::new(0.0, 1e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        let c1 = m
            .create_cell(0, 1e-16, DVec3::new(0.5e-6, 1e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        m.stick(c0, c1);
        let id = m.stick_group_between(c0, c1).unwrap();
        let removed = m.break_stick_group(id);
        assert_eq!(removed, 1);
        assert!(m.stick_groups.is_empty());
        assert!(m.cells[c0].stick_groups.is_empty());
        assert!(m.cells[c1].stick_groups.is_empty());
        assert!(m.cells[c0].stick_partners.is_empty());
        assert!(m.cells[c1].stick_partners.is_empty());
    }

    #[test]
    fn test_anchor_group_covers_both_rod_balls() {
        let mut m = model();
        let c = m
            .create_cell(
                4,
                2e-16,
                DVec3::new(0.0, 0.2e-6, 0.0),
                DVec3::new(1e-6, 0.2e-6, 0.0),
                false,
                0.0,
            )
            .unwrap();
        assert_eq!(m.anchor_cell(c), 2);
        // Second call is a no-op.
        assert_eq!(m.anchor_cell(c), 0);
        let group = &m.anchor_groups[0];
        for s in &group.springs {
            assert_eq!(s.anchor.y, 0.0);
            assert!((s.rest_length - m.balls[s.ball].pos.y).abs() < 1e-18);
        }
    }

    #[test]
    fn test_cell_closest_sphere_rod_keeps_caller_orientation() {
        let mut m = model();
        // Sphere above the midpoint of a rod; the sphere is cell 0.
        m.create_cell(0, 1e-16, DVec3::new(0.0, 6e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        m.create_cell(
            4,
            2e-16,
            DVec3::new(-1e-6, 5e-6, 0.0),
            DVec3::new(1e-6, 5e-6, 0.0),
            false,
            0.0,
        )
        .unwrap();
        let q = m.cell_closest(0, 1);
        // `d_p` points from the rod towards the sphere; the segment
        // parameter sits in `t`, never in `s`.
        assert!(q.d_p.y > 0.0);
        assert!((q.dist - 1e-6).abs() < 1e-16);
        assert_eq!(q.s, 0.0);
        assert!((q.t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_reach_covers_scaled_narrow_phase_gate() {
        let mut m = model();
        m.create_cell(0, 1e-16, DVec3::new(0.0, 5e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        m.create_cell(0, 1e-16, DVec3::new(1e-6, 5e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        let r2 = m.balls[0].radius + m.balls[1].radius;
        let form = m.params.form_lim_stick;
        assert!(m.reach(0, 1, form) >= form * r2);
        // A sphere pair just inside the formation band passes the broad phase.
        m.balls[1].pos.x = m.balls[0].pos.x + 0.99 * form * r2;
        assert!(m.within_reach(0, 1, m.reach(0, 1, form)));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut m = model();
        m.create_cell(
            4,
            2e-16,
            DVec3::new(0.0, 1e-6, 0.0),
            DVec3::new(1e-6, 1e-6, 0.0),
            true,
            0.0,
        )
        .unwrap();
        m.growth_iter = 3;
        m.relaxation_iter = 7;
        let json = serde_json::to_string(&m).unwrap();
        let restored: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cells.len(), m.cells.len());
        assert_eq!(restored.balls.len(), m.balls.len());
        assert_eq!(restored.growth_iter, 3);
        assert_eq!(restored.relaxation_iter, 7);
        let rod = restored.cells[0].rod_spring.unwrap();
        assert_eq!(
            restored.rod_springs[rod].rest_length,
            m.rod_springs[rod].rest_length
        );
    }
}
