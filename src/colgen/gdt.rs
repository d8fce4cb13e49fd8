//! Growing-decision-tree pricer.
//!
//! The column pool is a tree of partial rankings rooted at the singleton
//! columns. Each pricing step samples heavy columns whose bottom class still
//! holds the no-purchase option, branches them one rank deeper, and keeps the
//! extensions with the most negative reduced cost.

use std::collections::HashSet;

use log::{debug, warn};
use rand::rngs::StdRng;

use crate::choice;
use crate::colgen::{keep_best, Candidate, ColumnSource, Priced, REDUCED_COST_TOLERANCE};
use crate::models::master::MasterSolution;
use crate::problem::Problem;
use crate::ranking::Ranking;

#[derive(Debug, Clone)]
pub struct GdtConfig {
    /// Number of branchable columns sampled per pricing step, weighted by
    /// their mixture weight.
    pub sample_size: usize,
    /// Number of extensions kept per pricing step.
    pub branches_to_keep: usize,
    /// Generation stops once the branchable columns carry at most this much
    /// mixture mass.
    pub convergence_mass: f64,
}

impl Default for GdtConfig {
    fn default() -> Self {
        GdtConfig {
            sample_size: 10,
            branches_to_keep: 20,
            convergence_mass: 0.01,
        }
    }
}

pub(crate) struct GdtPricer {
    config: GdtConfig,
}

impl GdtPricer {
    pub fn new(config: GdtConfig) -> GdtPricer {
        GdtPricer { config }
    }
}

impl ColumnSource for GdtPricer {
    /// One singleton column per product: that product ranked first, the rest
    /// indifferent.
    fn warm_start(&self, problem: &Problem, _rng: &mut StdRng) -> Vec<Ranking> {
        let nb_prod = problem.nb_products();
        (0..nb_prod).map(|i| Ranking::singleton(i, nb_prod)).collect()
    }

    fn price(
        &self,
        problem: &Problem,
        pool: &[Ranking],
        solution: &MasterSolution,
        rng: &mut StdRng,
    ) -> Priced {
        // Columns that already rank the no-purchase option describe a complete
        // behavior and are never branched again.
        let branchable: Vec<f64> = pool
            .iter()
            .zip(&solution.weights)
            .map(|(r, &w)| if r.ranks_no_purchase() { 0.0 } else { w })
            .collect();

        let mass: f64 = branchable.iter().sum();
        if mass <= self.config.convergence_mass {
            debug!("branchable mass {:.4} exhausted", mass);
            return Priced::Converged;
        }

        let positive = branchable.iter().filter(|&&w| w > 0.0).count();
        let amount = self.config.sample_size.min(positive);
        let sampled =
            match rand::seq::index::sample_weighted(rng, pool.len(), |i| branchable[i], amount) {
                Ok(indices) => indices,
                Err(e) => {
                    warn!("weighted column sampling failed: {}", e);
                    return Priced::NoneFound;
                }
            };

        let known: HashSet<&Ranking> = pool.iter().collect();
        let mut batch: HashSet<Ranking> = HashSet::new();
        let mut candidates = Vec::new();
        for k in sampled {
            for extension in pool[k].extensions() {
                if known.contains(&extension) || !batch.insert(extension.clone()) {
                    continue;
                }

                let column = choice::matrix(&extension, problem.inventories());
                let reduced_cost = choice::reduced_cost(&column, solution.alpha.view(), solution.nu);
                if reduced_cost < -REDUCED_COST_TOLERANCE {
                    candidates.push(Candidate {
                        ranking: extension,
                        column,
                        reduced_cost,
                    });
                }
            }
        }

        if candidates.is_empty() {
            return Priced::NoneFound;
        }

        let kept = keep_best(candidates, self.config.branches_to_keep);
        debug!(
            "kept {} branches, best reduced cost {:.6}",
            kept.len(),
            kept[0].reduced_cost
        );
        Priced::Columns(kept)
    }
}
