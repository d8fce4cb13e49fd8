use std::fmt::{Display, Formatter};

/// When to stop generating columns.
///
/// Exactly one criterion is active at a time: either a fixed iteration count
/// or an objective target derived from `epsilon`. The epsilon variant still
/// carries an iteration ceiling so a stalled pricer cannot loop forever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopCriterion {
    /// Run exactly this many column-generation iterations.
    Iterations(usize),
    /// Run until the master objective drops below `epsilon * 2 * nb_assortments`.
    Epsilon(f64),
}

/// Ceiling on iterations for the epsilon criterion.
const ITERATION_CEILING: usize = 1_000_000;

impl StopCriterion {
    /// Maximum number of column-generation iterations to run.
    pub fn iteration_limit(&self) -> usize {
        match *self {
            StopCriterion::Iterations(n) => n,
            StopCriterion::Epsilon(_) => ITERATION_CEILING,
        }
    }

    /// Objective value at which the fit is declared good enough, if any.
    pub fn objective_target(&self, nb_assortments: usize) -> Option<f64> {
        match *self {
            StopCriterion::Iterations(_) => None,
            StopCriterion::Epsilon(eps) => Some(eps * 2.0 * nb_assortments as f64),
        }
    }
}

impl Display for StopCriterion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StopCriterion::Iterations(n) => write!(f, "{} iterations", n),
            StopCriterion::Epsilon(eps) => write!(f, "epsilon {}", eps),
        }
    }
}
