//! Column generation: alternate restricted master solves with pricing steps
//! that propose new rankings, until no improving column exists or the stop
//! criterion triggers.

pub mod bm;
pub mod gdt;

use std::fmt::{Display, Formatter};

use log::{info, warn};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::choice;
use crate::error::Result;
use crate::models::master::{FitNorm, MasterOptions, MasterSession, MasterSolution};
use crate::problem::Problem;
use crate::ranking::{ChoiceModel, Ranking};
use crate::termination::StopCriterion;

pub use bm::BmConfig;
pub use gdt::GdtConfig;

/// Columns at or above this reduced cost never enter the master.
pub const REDUCED_COST_TOLERANCE: f64 = 1e-4;

/// A priced candidate column.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ranking: Ranking,
    /// Choice probabilities of the ranking, laid out as (product, assortment).
    pub column: Array2<f64>,
    pub reduced_cost: f64,
}

/// Outcome of one pricing step.
pub enum Priced {
    /// Improving columns, each with reduced cost below the tolerance.
    Columns(Vec<Candidate>),
    /// The attempt budget ran out without an improving column. Recoverable:
    /// the loop logs it and moves on to the next iteration.
    NoneFound,
    /// The pricer has exhausted its search space; generation can stop.
    Converged,
}

/// A pricing strategy: proposes an initial column pool, then improving
/// columns given the duals of a master solve.
pub trait ColumnSource {
    fn warm_start(&self, problem: &Problem, rng: &mut StdRng) -> Vec<Ranking>;

    fn price(
        &self,
        problem: &Problem,
        pool: &[Ranking],
        solution: &MasterSolution,
        rng: &mut StdRng,
    ) -> Priced;
}

/// Available pricing strategies, selected once at learner construction.
#[derive(Debug, Clone)]
pub enum Pricer {
    /// Growing-decision-tree pricer: branches sampled columns one rank deeper.
    Gdt(GdtConfig),
    /// Local-search pricer over strict permutations, with random restarts.
    Bm(BmConfig),
}

#[derive(Debug, Clone)]
pub struct LearnConfig {
    pub stop: StopCriterion,
    pub fit: FitNorm,
    /// Reuse simplex bases between master solves.
    pub warm_start: bool,
    pub verbose_solver: bool,
    pub seed: u64,
}

impl Default for LearnConfig {
    fn default() -> Self {
        LearnConfig {
            stop: StopCriterion::Iterations(10),
            fit: FitNorm::L1,
            warm_start: true,
            verbose_solver: false,
            seed: 0,
        }
    }
}

/// Why column generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearnTermination {
    /// The pricer exhausted its search space.
    Converged,
    /// The master objective dropped below the epsilon target.
    TargetReached,
    /// The iteration budget ran out.
    IterationLimit,
}

impl Display for LearnTermination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LearnTermination::Converged => write!(f, "pricer converged"),
            LearnTermination::TargetReached => write!(f, "objective target reached"),
            LearnTermination::IterationLimit => write!(f, "iteration limit"),
        }
    }
}

/// The learned mixture together with the fit it achieved.
#[derive(Debug, Clone)]
pub struct LearnedModel {
    /// Pruned mixture, heaviest column first.
    pub model: ChoiceModel,
    /// Final master objective.
    pub objective: f64,
    /// Master objective after the warm start and after each iteration that
    /// added columns.
    pub history: Vec<f64>,
    pub termination: LearnTermination,
}

impl LearnedModel {
    /// Average fit error per assortment: the L1 objective normalized by
    /// `2 * nb_assortments`, directly comparable to an epsilon stop target.
    pub fn fit_error(&self, nb_assortments: usize) -> f64 {
        self.objective / (2.0 * nb_assortments as f64)
    }
}

/// Learns a ranking mixture explaining the observed choice frequencies.
pub fn learn(problem: &Problem, pricer: &Pricer, config: &LearnConfig) -> Result<LearnedModel> {
    match pricer {
        Pricer::Gdt(cfg) => generate(problem, &gdt::GdtPricer::new(cfg.clone()), config),
        Pricer::Bm(cfg) => generate(problem, &bm::BmPricer::new(cfg.clone()), config),
    }
}

fn generate<S: ColumnSource>(
    problem: &Problem,
    source: &S,
    config: &LearnConfig,
) -> Result<LearnedModel> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let nb_asst = problem.nb_assortments();

    let mut pool = source.warm_start(problem, &mut rng);
    let columns = choice::batch(&pool, problem.inventories());

    let options = MasterOptions {
        fit: config.fit,
        warm_start: config.warm_start,
        verbose: config.verbose_solver,
    };
    let mut master = MasterSession::new(problem, &columns, options)?;
    let mut solution = master.solve()?;
    let mut history = vec![solution.objective];

    let mut termination = LearnTermination::IterationLimit;
    for iteration in 0..config.stop.iteration_limit() {
        if let Some(target) = config.stop.objective_target(nb_asst) {
            if solution.objective < target {
                info!(
                    "objective {:.6} below target {:.6}, stopping",
                    solution.objective, target
                );
                termination = LearnTermination::TargetReached;
                break;
            }
        }

        match source.price(problem, &pool, &solution, &mut rng) {
            Priced::Converged => {
                info!("pricer converged after {} iterations", iteration);
                termination = LearnTermination::Converged;
                break;
            }
            Priced::NoneFound => {
                warn!("no improving column found at iteration {}", iteration);
                continue;
            }
            Priced::Columns(candidates) => {
                let fresh: Vec<Array2<f64>> =
                    candidates.iter().map(|c| c.column.clone()).collect();
                master.append_columns(&fresh)?;
                pool.extend(candidates.into_iter().map(|c| c.ranking));

                solution = master.solve()?;
                history.push(solution.objective);
            }
        }
    }

    let model = ChoiceModel::new(pool, solution.weights.clone())?.pruned();
    info!(
        "learned {} columns, objective {:.6} ({})",
        model.len(),
        solution.objective,
        termination
    );

    Ok(LearnedModel {
        model,
        objective: solution.objective,
        history,
        termination,
    })
}

/// Keeps the `keep` candidates with the lowest reduced cost.
pub(crate) fn keep_best(mut candidates: Vec<Candidate>, keep: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        float_ord::FloatOrd(a.reduced_cost).cmp(&float_ord::FloatOrd(b.reduced_cost))
    });
    candidates.truncate(keep);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::master::FitNorm;

    fn toy_problem() -> Problem {
        Problem::new(
            vec![
                vec![true, true, true, false],
                vec![true, true, false, true],
                vec![true, false, true, true],
            ],
            vec![
                vec![0.1, 0.5, 0.4, 0.0],
                vec![0.2, 0.3, 0.0, 0.5],
                vec![0.3, 0.0, 0.3, 0.4],
            ],
            vec![0.0, 4.0, 5.0, 6.0],
        )
        .unwrap()
    }

    #[test]
    fn gdt_learning_improves_the_fit_monotonically() {
        let problem = toy_problem();
        let config = LearnConfig {
            stop: StopCriterion::Iterations(5),
            ..LearnConfig::default()
        };

        let learned = learn(&problem, &Pricer::Gdt(GdtConfig::default()), &config).unwrap();

        for pair in learned.history.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-6);
        }
        assert!((learned.model.weights().iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert_eq!(*learned.history.last().unwrap(), learned.objective);

        let error = learned.fit_error(problem.nb_assortments());
        assert!((error - learned.objective / 6.0).abs() < 1e-12);
        assert!(error >= 0.0);
    }

    #[test]
    fn bm_learning_yields_a_strict_mixture() {
        let problem = toy_problem();
        let config = LearnConfig {
            stop: StopCriterion::Iterations(5),
            seed: 42,
            ..LearnConfig::default()
        };

        let learned = learn(&problem, &Pricer::Bm(BmConfig::default()), &config).unwrap();

        assert!(!learned.model.is_empty());
        assert!(!learned.model.has_ties());
    }

    #[test]
    fn epsilon_stop_reports_target_reached() {
        // A generous epsilon makes even the warm-started fit good enough
        // after the first round of added columns.
        let problem = toy_problem();
        let config = LearnConfig {
            stop: StopCriterion::Epsilon(0.5),
            ..LearnConfig::default()
        };

        let learned = learn(&problem, &Pricer::Gdt(GdtConfig::default()), &config).unwrap();
        assert!(matches!(
            learned.termination,
            LearnTermination::TargetReached | LearnTermination::Converged
        ));
    }

    #[test]
    fn quadratic_fit_requires_cold_starts() {
        let problem = toy_problem();
        let config = LearnConfig {
            fit: FitNorm::L2,
            warm_start: true,
            ..LearnConfig::default()
        };

        assert!(learn(&problem, &Pricer::Gdt(GdtConfig::default()), &config).is_err());
    }

    #[test]
    fn keep_best_orders_by_reduced_cost() {
        let ranking = Ranking::singleton(1, 3);
        let column = Array2::zeros((3, 1));
        let mk = |rc| Candidate {
            ranking: ranking.clone(),
            column: column.clone(),
            reduced_cost: rc,
        };

        let kept = keep_best(vec![mk(-0.1), mk(-0.9), mk(-0.5)], 2);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].reduced_cost, -0.9);
        assert_eq!(kept[1].reduced_cost, -0.5);
    }
}
