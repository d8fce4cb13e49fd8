use thiserror::Error;

/// Errors surfaced by the learner and the assortment optimizer.
#[derive(Debug, Error)]
pub enum Error {
    /// The LP or MIP oracle proved that no feasible point exists. Always fatal:
    /// this indicates malformed input (empty column set, contradictory capacity
    /// bounds), not a retryable condition.
    #[error("solver reported an infeasible model (status {status:?})")]
    ModelInfeasible { status: grb::Status },

    /// Repairing the mixture weights clipped every component to zero. Signals a
    /// bug in the reduced-cost bookkeeping rather than bad user input.
    #[error("mixture weights collapsed to an all-zero vector during repair")]
    DegenerateMixture,

    /// The solver hit its time limit without proving optimality. The best
    /// integer-feasible point found so far (if any) is carried along with its
    /// optimality gap; it must not be treated as exact.
    #[error("solver hit its time limit at optimality gap {gap:.4}")]
    OracleTimeout {
        incumbent: Option<Incumbent>,
        gap: f64,
    },

    /// The quadratic fit has no simplex basis to reuse across master solves.
    #[error("the quadratic fit cannot reuse a simplex basis; disable warm starting to use it")]
    QuadraticWarmStart,

    /// The solver stopped with a status the caller did not ask for.
    #[error("unexpected solver status {status:?}")]
    UnexpectedStatus { status: grb::Status },

    #[error(transparent)]
    Solver(#[from] grb::Error),
}

/// Best integer-feasible assortment found before a time limit was hit.
#[derive(Debug, Clone)]
pub struct Incumbent {
    /// Offer flag per product; the no-purchase option at index 0 is always true.
    pub offered: Vec<bool>,
    /// Expected revenue of the incumbent, not certified optimal.
    pub expected_revenue: f64,
}

pub type Result<T> = std::result::Result<T, Error>;
