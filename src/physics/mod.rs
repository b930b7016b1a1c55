//! Mechanical relaxation: second-order ball dynamics driven by the force
//! field, integrated over fixed windows with the adaptive stepper.

pub mod forces;
pub mod integrator;

pub use integrator::{Dop853, IntegrationStats, IntegratorConfig};

use crate::error::SimError;
use crate::model::Model;

/// Pack ball state as `[pos, vel]` triplet pairs, one block of six per ball.
fn pack(model: &Model, y: &mut Vec<f64>) {
    y.clear();
    y.reserve(6 * model.balls.len());
    for ball in &model.balls {
        y.extend_from_slice(&[
            ball.pos.x, ball.pos.y, ball.pos.z, ball.vel.x, ball.vel.y, ball.vel.z,
        ]);
    }
}

/// Write a packed state vector back into the balls.
fn unpack(model: &mut Model, y: &[f64]) {
    for (i, ball) in model.balls.iter_mut().enumerate() {
        let s = &y[6 * i..6 * i + 6];
        ball.pos.x = s[0];
        ball.pos.y = s[1];
        ball.pos.z = s[2];
        ball.vel.x = s[3];
        ball.vel.y = s[4];
        ball.vel.z = s[5];
    }
}

/// Integrate the mechanical state over one relaxation sub-window of
/// `relaxation_dt` seconds.
///
/// Advances `model.relaxation_time` and writes the final positions and
/// velocities back into the balls. Non-finite state after integration is a
/// fatal [`SimError::Diverged`]. Returns the stepper's step counts so the
/// caller can adapt the stiffness control.
pub fn relax(model: &mut Model) -> Result<IntegrationStats, SimError> {
    relax_with_samples(model, 0.0, |_, _| {})
}

/// As [`relax`], additionally invoking `sample` with interpolated packed
/// state at every `sample_dt` inside the window (inspection only).
pub fn relax_with_samples<S>(
    model: &mut Model,
    sample_dt: f64,
    sample: S,
) -> Result<IntegrationStats, SimError>
where
    S: FnMut(f64, &[f64]),
{
    let t1 = model.relaxation_time;
    let t2 = t1 + model.params.relaxation_dt;
    let cfg = IntegratorConfig {
        atol: model.params.ode_atol,
        rtol: model.params.ode_rtol,
        h1: model.params.ode_h1,
        hmin: model.params.ode_hmin,
        max_steps: model.params.ode_max_steps,
        beta: model.ode_beta,
        sample_dt,
    };

    let masses: Vec<f64> = model
        .balls
        .iter()
        .map(|b| b.mass(&model.params))
        .collect();
    let mut y = Vec::new();
    pack(model, &mut y);

    let mut stepper = Dop853::new(cfg);
    let stats = {
        let model = &mut *model;
        stepper.integrate(
            &mut y,
            t1,
            t2,
            |state, dstate| {
                unpack(model, state);
                forces::accumulate(model);
                for (i, ball) in model.balls.iter().enumerate() {
                    let a = ball.force / masses[i];
                    dstate[6 * i] = ball.vel.x;
                    dstate[6 * i + 1] = ball.vel.y;
                    dstate[6 * i + 2] = ball.vel.z;
                    dstate[6 * i + 3] = a.x;
                    dstate[6 * i + 4] = a.y;
                    dstate[6 * i + 5] = a.z;
                }
            },
            sample,
        )?
    };

    unpack(model, &y);
    for (i, ball) in model.balls.iter().enumerate() {
        if !ball.pos.is_finite() || !ball.vel.is_finite() {
            return Err(SimError::Diverged { ball: i });
        }
    }
    model.relaxation_time = t2;
    log::debug!(
        "relaxed to t = {:.4} s in {} steps ({} rejected)",
        t2,
        stats.n_accepted,
        stats.n_rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parameters;
    use crate::model::ball_radius;
    use glam::DVec3;

    fn contact_params() -> Parameters {
        Parameters {
            gravity: false,
            normal_force: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_overlapping_spheres_relax_to_contact() {
        let mut m = Model::new(contact_params()).unwrap();
        let r = ball_radius(&m.params, 0, 1e-16, 0.0);
        m.create_cell(0, 1e-16, DVec3::new(0.0, 5e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        m.create_cell(
            0,
            1e-16,
            DVec3::new(1.2 * r, 5e-6, 0.0),
            DVec3::ZERO,
            false,
            0.0,
        )
        .unwrap();
        let stats = relax(&mut m).unwrap();
        assert!(stats.n_accepted > 0);
        // The contact push is overdamped; a few more windows settle the pair
        // at the over-pushed contact distance.
        for _ in 0..9 {
            relax(&mut m).unwrap();
        }
        let dist = (m.balls[1].pos - m.balls[0].pos).length();
        assert!(dist >= 2.0 * r * 0.999, "still overlapping: {dist:.3e}");
        assert!(m.detect_overlap(1.0).is_empty());
    }

    #[test]
    fn test_ball_below_floor_is_lifted() {
        let params = Parameters {
            gravity: false,
            ..Default::default()
        };
        let mut m = Model::new(params).unwrap();
        let r = ball_radius(&m.params, 0, 1e-16, 0.0);
        m.create_cell(0, 1e-16, DVec3::new(0.0, 0.5 * r, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        // The floor push is overdamped; a handful of windows settle it.
        for _ in 0..10 {
            relax(&mut m).unwrap();
        }
        assert!(m.balls[0].pos.y > 0.9 * r, "not lifted: {}", m.balls[0].pos.y);
    }

    #[test]
    fn test_relaxation_advances_clock() {
        let mut m = Model::new(contact_params()).unwrap();
        m.create_cell(0, 1e-16, DVec3::new(0.0, 5e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        let dt = m.params.relaxation_dt;
        relax(&mut m).unwrap();
        relax(&mut m).unwrap();
        assert!((m.relaxation_time - 2.0 * dt).abs() < 1e-12);
    }

    #[test]
    fn test_samples_are_reported_in_order() {
        let mut m = Model::new(contact_params()).unwrap();
        m.create_cell(0, 1e-16, DVec3::new(0.0, 5e-6, 0.0), DVec3::ZERO, false, 0.0)
            .unwrap();
        let mut times = Vec::new();
        let sample_dt = m.params.relaxation_dt / 4.0;
        relax_with_samples(&mut m, sample_dt, |t, _| times.push(t)).unwrap();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
    }
}
