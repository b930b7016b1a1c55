//! Integration tests for the mechanical core: contact forces, relaxation
//! and threshold bonds acting together on small cell arrangements.

use cellchain::model::ball_radius;
use cellchain::{bonds, physics, Model, Parameters};
use glam::DVec3;

fn mechanics_params() -> Parameters {
    Parameters {
        gravity: false,
        normal_force: false,
        ..Default::default()
    }
}

fn sphere(m: &mut Model, pos: DVec3) -> usize {
    m.create_cell(0, 1e-16, pos, DVec3::ZERO, false, 0.0).unwrap()
}

fn rod(m: &mut Model, base0: DVec3, base1: DVec3) -> usize {
    m.create_cell(4, 1e-14, base0, base1, false, 0.0).unwrap()
}

#[test]
fn test_net_force_vanishes_without_external_fields() {
    let mut m = Model::new(mechanics_params()).unwrap();
    // A small overlapping cluster of mixed shapes.
    sphere(&mut m, DVec3::new(0.0, 5e-6, 0.0));
    sphere(&mut m, DVec3::new(0.4e-6, 5e-6, 0.1e-6));
    rod(
        &mut m,
        DVec3::new(-0.3e-6, 5.2e-6, 0.0),
        DVec3::new(0.7e-6, 5.2e-6, 0.0),
    );
    physics::forces::accumulate(&mut m);
    let total: DVec3 = m.balls.iter().map(|b| b.force).sum();
    let scale: f64 = m.balls.iter().map(|b| b.force.length()).sum();
    assert!(scale > 0.0, "cluster should be in contact");
    assert!(total.length() < scale * 1e-10, "net force {total:?}");
}

#[test]
fn test_parallel_rod_contact_is_symmetric() {
    let mut m = Model::new(mechanics_params()).unwrap();
    let r = ball_radius(&m.params, 4, 1e-14, 0.0);
    // Two parallel rods closer than one diameter.
    let c0 = rod(
        &mut m,
        DVec3::new(0.0, 5e-6, 0.0),
        DVec3::new(1e-6, 5e-6, 0.0),
    );
    let c1 = rod(
        &mut m,
        DVec3::new(0.0, 5e-6 + 1.5 * r, 0.0),
        DVec3::new(1e-6, 5e-6 + 1.5 * r, 0.0),
    );
    physics::forces::accumulate(&mut m);
    let f = |c: usize, i: usize| m.balls[m.cells[c].balls[i]].force;
    // Lower rod pushed down, upper rod pushed up, equal magnitudes.
    assert!(f(c0, 0).y < 0.0);
    assert!(f(c1, 0).y > 0.0);
    let down = f(c0, 0) + f(c0, 1);
    let up = f(c1, 0) + f(c1, 1);
    assert!((down + up).length() < down.length() * 1e-10);
}

#[test]
fn test_spheres_in_formation_band_stick_and_survive_relaxation() {
    let mut m = Model::new(Parameters {
        sticking: true,
        gravity: false,
        normal_force: false,
        ..Default::default()
    })
    .unwrap();
    let r = ball_radius(&m.params, 0, 1e-16, 0.0);
    // Well outside the formation band: a sweep and a window do nothing.
    let a = sphere(&mut m, DVec3::new(0.0, 5e-6, 0.0));
    let b = sphere(&mut m, DVec3::new(6.0 * r, 5e-6, 0.0));
    bonds::maintain(&mut m);
    physics::relax(&mut m).unwrap();
    assert_eq!(m.stick_spring_count(), 0);

    // Moved past contact but inside the band, the next sweep bonds them.
    m.balls[m.cells[b].balls[0]].pos.x = 2.1 * r;
    let stats = bonds::maintain(&mut m);
    assert_eq!(stats.sticks_formed, 1);
    assert!(m.stick_group_between(a, b).is_some());

    // The bond is at rest, so a relaxation window leaves it intact.
    physics::relax(&mut m).unwrap();
    let stats = bonds::maintain(&mut m);
    assert_eq!(stats.sticks_broken, 0);
    assert_eq!(m.stick_spring_count(), 1);
}

#[test]
fn test_floor_detection_and_normal_force() {
    let mut m = Model::new(Parameters {
        gravity: false,
        ..Default::default()
    })
    .unwrap();
    let r = ball_radius(&m.params, 0, 1e-16, 0.0);
    sphere(&mut m, DVec3::new(0.0, 0.5 * r, 0.0));
    sphere(&mut m, DVec3::new(5e-6, 5e-6, 0.0));
    assert_eq!(m.detect_floor_collision(1.0), vec![0]);
    for _ in 0..10 {
        physics::relax(&mut m).unwrap();
    }
    assert!(m.balls[0].pos.y > 0.9 * r);
    // The cell well above the floor never moved.
    assert!((m.balls[1].pos.y - 5e-6).abs() < 1e-9);
}

#[test]
fn test_rod_relaxes_to_rest_length() {
    let mut m = Model::new(mechanics_params()).unwrap();
    let c = rod(
        &mut m,
        DVec3::new(0.0, 5e-6, 0.0),
        DVec3::new(2e-6, 5e-6, 0.0),
    );
    let rest = m.rod_springs[m.cells[c].rod_spring.unwrap()].rest_length;
    let initial = (m.balls[1].pos - m.balls[0].pos).length();
    assert!(initial > rest);
    // The rod spring is heavily overdamped, so a few windows move it
    // monotonically towards rest without reaching it.
    for _ in 0..5 {
        physics::relax(&mut m).unwrap();
    }
    let len = (m.balls[1].pos - m.balls[0].pos).length();
    assert!(len < initial, "rod did not contract: {len:.3e}");
    assert!(len > rest, "rod overshot rest: {len:.3e} vs {rest:.3e}");
}

#[test]
fn test_overlap_scan_uses_capsule_distance() {
    let mut m = Model::new(mechanics_params()).unwrap();
    // A sphere beside a rod's midpoint: centre distance to either ball is
    // large, but the capsule surface is within reach.
    let c0 = rod(
        &mut m,
        DVec3::new(-1e-6, 5e-6, 0.0),
        DVec3::new(1e-6, 5e-6, 0.0),
    );
    let r_rod = m.balls[m.cells[c0].balls[0]].radius;
    let r_sph = ball_radius(&m.params, 0, 1e-16, 0.0);
    sphere(&mut m, DVec3::new(0.0, 5e-6 + 0.5 * (r_rod + r_sph), 0.0));
    let overlapping = m.detect_overlap(1.0);
    assert_eq!(overlapping, vec![0, 1]);
}
