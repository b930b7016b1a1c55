//! Error types for the simulation engine.

use thiserror::Error;

/// Fatal conditions raised by the core engine.
///
/// Overlap after relaxation and excessive-but-bounded step counts are *not*
/// errors; they are reported through return values and handled by the caller.
#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid configuration: bad species index, inconsistent arrays.
    #[error("configuration error: {0}")]
    Config(String),

    /// A ball position or velocity became non-finite during integration.
    #[error("numerical divergence: non-finite state in ball {ball} after integration")]
    Diverged { ball: usize },

    /// The adaptive stepper underflowed the minimum step size.
    #[error("step size {h:.3e} underflowed the minimum {hmin:.3e} at t = {t:.6e}")]
    StepSizeUnderflow { h: f64, hmin: f64, t: f64 },

    /// The integration window needed more internal steps than the hard cap.
    #[error("more than {max} internal steps in one integration window")]
    TooManySteps { max: usize },
}
