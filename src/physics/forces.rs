//! Force evaluation: collisions, substratum, gravity, drag and springs.
//!
//! One call to [`accumulate`] overwrites every ball's `force` with the sum of
//! all mechanical contributions at the current positions and velocities. The
//! evaluation is side-effect free apart from that scratch field, so the ODE
//! right-hand side can call it repeatedly per step.

use glam::DVec3;

use crate::model::Model;

/// Overwrite every ball's force accumulator with the net force.
pub fn accumulate(model: &mut Model) {
    for ball in &mut model.balls {
        ball.force = DVec3::ZERO;
    }
    collision_forces(model);
    background_forces(model);
    spring_forces(model);
}

/// Shape-correct contact repulsion between every cell pair in reach.
fn collision_forces(model: &mut Model) {
    let kc = model.params.kc;
    let overpush = model.params.overpush;
    for cell0 in 0..model.cells.len() {
        for cell1 in (cell0 + 1)..model.cells.len() {
            let reach = model.reach(cell0, cell1, overpush);
            if !model.within_reach(cell0, cell1, reach) {
                continue;
            }
            let b00 = model.cells[cell0].balls[0];
            let b10 = model.cells[cell1].balls[0];
            let r2 = model.balls[b00].radius + model.balls[b10].radius;
            let closest = model.cell_closest(cell0, cell1);
            if closest.dist >= r2 * overpush || closest.dist == 0.0 {
                continue;
            }
            // Linear repulsion in the penetration depth, slightly over-pushed
            // so contacts resolve instead of stalling at exact touching.
            let n_avg = 0.5 * (model.balls[b00].n + model.balls[b10].n);
            let f = kc * n_avg * (r2 * overpush - closest.dist);
            let push = closest.d_p * (f / closest.dist);

            // Distribute over rod balls by the closest-point weights.
            let weights0 = [1.0 - closest.s, closest.s];
            let weights1 = [1.0 - closest.t, closest.t];
            for (i, &b) in model.cells[cell0].balls.clone().iter().enumerate() {
                model.balls[b].force += push * weights0[i];
            }
            for (i, &b) in model.cells[cell1].balls.clone().iter().enumerate() {
                model.balls[b].force -= push * weights1[i];
            }
        }
    }
}

/// Substratum normal force, buoyancy-corrected gravity and viscous drag.
///
/// All three scale with the ball's amount, like the collision and spring
/// stiffnesses, so the relaxation time scales are independent of cell size.
fn background_forces(model: &mut Model) {
    let p = &model.params;
    let buoyancy = p.g * (p.rho_x - p.rho_water) * p.mw_x / p.rho_x;
    for ball in &mut model.balls {
        if p.normal_force && ball.pos.y < ball.radius {
            ball.force.y += p.kw * ball.n * (ball.radius - ball.pos.y);
        }
        if p.gravity && ball.pos.y > 1.1 * ball.radius {
            ball.force.y += buoyancy * ball.n;
        }
        if p.gravity_z {
            ball.force.z += buoyancy * ball.n;
        }
        ball.force -= ball.vel * (p.kd * ball.n);
    }
}

/// Hookean restoring force of a two-ball spring, applied to both ends.
fn apply_spring(model: &mut Model, balls: [usize; 2], k: f64, rest: f64) {
    let d = model.balls[balls[1]].pos - model.balls[balls[0]].pos;
    let dist = d.length();
    if dist == 0.0 {
        return;
    }
    let f = d * (k * (dist - rest) / dist);
    model.balls[balls[0]].force += f;
    model.balls[balls[1]].force -= f;
}

fn spring_forces(model: &mut Model) {
    for i in 0..model.rod_springs.len() {
        let s = model.rod_springs[i].clone();
        apply_spring(model, s.balls, s.k, s.rest_length);
    }
    for g in 0..model.stick_groups.len() {
        for i in 0..model.stick_groups[g].springs.len() {
            let s = model.stick_groups[g].springs[i].clone();
            apply_spring(model, s.balls, s.k, s.rest_length);
        }
    }
    for g in 0..model.fil_groups.len() {
        for i in 0..model.fil_groups[g].springs.len() {
            let s = model.fil_groups[g].springs[i].clone();
            apply_spring(model, s.balls, s.k, s.rest_length);
        }
    }
    for g in 0..model.anchor_groups.len() {
        for i in 0..model.anchor_groups[g].springs.len() {
            let a = model.anchor_groups[g].springs[i].clone();
            let d = a.anchor - model.balls[a.ball].pos;
            let dist = d.length();
            if dist == 0.0 {
                continue;
            }
            model.balls[a.ball].force += d * (a.k * (dist - a.rest_length) / dist);
        }
    }
}
