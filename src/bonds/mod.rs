//! Threshold-driven bond maintenance: forming and breaking stick, anchor and
//! filament springs between relaxation windows.
//!
//! Breaking is always by whole bond group, so the siblings of a failed
//! spring go with it. Formation respects lineage (mother and daughter never
//! stick) and existing links (no duplicate groups, no stick parallel to a
//! filament). A pair whose group broke in the current sweep is left alone
//! until the next sweep, so each sweep takes one branch per pair.

use serde::Serialize;

use crate::model::Model;

/// Outcome of one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BondStats {
    pub sticks_formed: usize,
    pub sticks_broken: usize,
    pub anchors_formed: usize,
    pub anchors_broken: usize,
    pub fils_broken: usize,
}

/// One full sweep: break overstretched bonds, then form new ones.
pub fn maintain(model: &mut Model) -> BondStats {
    let mut stats = BondStats::default();
    stats.fils_broken = break_filaments(model);
    let (broken, unstuck) = break_sticks(model);
    stats.sticks_broken = broken;
    stats.anchors_broken = break_anchors(model);
    if model.params.sticking {
        stats.sticks_formed = form_sticks(model, &unstuck);
    }
    if model.params.anchoring {
        stats.anchors_formed = form_anchors(model);
    }
    stats
}

fn spring_length(model: &Model, balls: [usize; 2]) -> f64 {
    (model.balls[balls[1]].pos - model.balls[balls[0]].pos).length()
}

/// Break every filament group with a spring outside the stretch band.
/// Returns the number of springs removed.
pub fn break_filaments(model: &mut Model) -> usize {
    let [lo, hi] = model.params.stretch_lim_fil;
    let doomed: Vec<u64> = model
        .fil_groups
        .iter()
        .filter(|g| {
            g.springs.iter().any(|s| {
                let len = spring_length(model, s.balls);
                len < lo * s.rest_length || len > hi * s.rest_length
            })
        })
        .map(|g| g.id)
        .collect();
    doomed.iter().map(|&id| model.break_fil_group(id)).sum()
}

/// Break every stick group with a spring outside the stretch band.
/// Returns the number of springs removed and the cell pairs that came
/// apart, one entry per removed group.
pub fn break_sticks(model: &mut Model) -> (usize, Vec<[usize; 2]>) {
    let [lo, hi] = model.params.stretch_lim_stick;
    let doomed: Vec<u64> = model
        .stick_groups
        .iter()
        .filter(|g| {
            g.springs.iter().any(|s| {
                let len = spring_length(model, s.balls);
                len < lo * s.rest_length || len > hi * s.rest_length
            })
        })
        .map(|g| g.id)
        .collect();
    let mut removed = 0;
    let mut pairs = Vec::with_capacity(doomed.len());
    for id in doomed {
        if let Some(g) = model.stick_groups.iter().find(|g| g.id == id) {
            let s = &g.springs[0];
            pairs.push([model.balls[s.balls[0]].cell, model.balls[s.balls[1]].cell]);
        }
        removed += model.break_stick_group(id);
    }
    (removed, pairs)
}

/// Break every anchor group with a spring outside the stretch band.
/// Returns the number of springs removed.
pub fn break_anchors(model: &mut Model) -> usize {
    let [lo, hi] = model.params.stretch_lim_anchor;
    let doomed: Vec<u64> = model
        .anchor_groups
        .iter()
        .filter(|g| {
            g.springs.iter().any(|s| {
                let len = (model.balls[s.ball].pos - s.anchor).length();
                len < lo * s.rest_length || len > hi * s.rest_length
            })
        })
        .map(|g| g.id)
        .collect();
    doomed.iter().map(|&id| model.break_anchor_group(id)).sum()
}

/// Stick together every unlinked, unrelated cell pair within the formation
/// distance. Pairs listed in `skip` (broken earlier in the same sweep) are
/// not reconsidered. Returns the number of springs formed.
pub fn form_sticks(model: &mut Model, skip: &[[usize; 2]]) -> usize {
    let form = model.params.form_lim_stick;
    let mut pairs = Vec::new();
    for cell0 in 0..model.cells.len() {
        for cell1 in (cell0 + 1)..model.cells.len() {
            if skip
                .iter()
                .any(|&[a, b]| [a, b] == [cell0, cell1] || [b, a] == [cell0, cell1])
            {
                continue;
            }
            let c0 = &model.cells[cell0];
            let c1 = &model.cells[cell1];
            if c0.is_related(cell0, cell1, c1) {
                continue;
            }
            if c0.stick_partners.contains(&cell1) {
                continue;
            }
            // Filament-linked cells are already held together.
            if c0.fil_groups.iter().any(|id| c1.fil_groups.contains(id)) {
                continue;
            }
            if !model.within_reach(cell0, cell1, model.reach(cell0, cell1, form)) {
                continue;
            }
            let r2 = model.balls[c0.balls[0]].radius + model.balls[c1.balls[0]].radius;
            if model.cell_closest(cell0, cell1).dist < form * r2 {
                pairs.push((cell0, cell1));
            }
        }
    }
    pairs
        .into_iter()
        .map(|(c0, c1)| model.stick(c0, c1))
        .sum()
}

/// Anchor every unanchored cell with a ball close enough to the floor.
/// Returns the number of springs formed.
pub fn form_anchors(model: &mut Model) -> usize {
    let form = model.params.form_lim_anchor;
    let candidates: Vec<usize> = model
        .cells
        .iter()
        .enumerate()
        .filter(|(_, c)| c.anchor_group.is_none())
        .filter(|(_, c)| {
            c.balls
                .iter()
                .any(|&b| model.balls[b].pos.y < form * model.balls[b].radius)
        })
        .map(|(i, _)| i)
        .collect();
    candidates.into_iter().map(|c| model.anchor_cell(c)).sum()
}
