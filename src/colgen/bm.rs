//! Local-search pricer over strict permutations.
//!
//! Each pricing step runs restarted steepest descent: from a random
//! permutation, repeatedly move to the adjacent-rank swap with the lowest
//! reduced cost until no swap improves, and accept the local optimum if its
//! reduced cost clears the tolerance. Swaps are restricted to the first few
//! ranks, since the tail of a permutation rarely affects which product is
//! chosen.

use std::collections::HashSet;

use float_ord::FloatOrd;
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::Rng;

use crate::choice;
use crate::colgen::{keep_best, Candidate, ColumnSource, Priced, REDUCED_COST_TOLERANCE};
use crate::models::master::MasterSolution;
use crate::problem::Problem;
use crate::ranking::Ranking;

#[derive(Debug, Clone)]
pub struct BmConfig {
    /// Number of random columns the pool starts with.
    pub first_random_columns: usize,
    /// Restart budget per column searched.
    pub tenacity: usize,
    /// Local optima collected per pricing step.
    pub columns_to_find: usize,
    /// How many of the collected columns are kept, best first.
    pub columns_to_keep: usize,
    /// Adjacent swaps are tried among this many top ranks.
    pub neighborhood: usize,
    /// Ceiling on descent steps from a single restart.
    pub max_descent_steps: usize,
}

impl Default for BmConfig {
    fn default() -> Self {
        BmConfig {
            first_random_columns: 1,
            tenacity: 1000,
            columns_to_find: 1,
            columns_to_keep: 1,
            neighborhood: 10,
            max_descent_steps: 1000,
        }
    }
}

pub(crate) struct BmPricer {
    config: BmConfig,
}

impl BmPricer {
    pub fn new(config: BmConfig) -> BmPricer {
        BmPricer { config }
    }

    /// Steepest descent over adjacent-rank swaps in the top of the ranking.
    fn descend(
        &self,
        start: Ranking,
        problem: &Problem,
        solution: &MasterSolution,
    ) -> (Ranking, f64) {
        let span = self.config.neighborhood.min(start.nb_products() - 1);
        let cost = |r: &Ranking| {
            let column = choice::matrix(r, problem.inventories());
            choice::reduced_cost(&column, solution.alpha.view(), solution.nu)
        };

        let mut current = start;
        let mut current_cost = cost(&current);
        for _ in 0..self.config.max_descent_steps {
            let best = (0..span)
                .map(|rank| {
                    let neighbor = current.swap_adjacent(rank);
                    let neighbor_cost = cost(&neighbor);
                    (neighbor, neighbor_cost)
                })
                .min_by_key(|&(_, c)| FloatOrd(c));

            match best {
                Some((neighbor, neighbor_cost)) if neighbor_cost < current_cost => {
                    current = neighbor;
                    current_cost = neighbor_cost;
                }
                _ => break,
            }
        }
        (current, current_cost)
    }

    /// Restarted descent until a column clears the tolerance or the restart
    /// budget runs out.
    fn search(
        &self,
        problem: &Problem,
        solution: &MasterSolution,
        rng: &mut StdRng,
    ) -> Option<Candidate> {
        let nb_prod = problem.nb_products();
        for restart in 0..self.config.tenacity {
            let start = Ranking::random_permutation(nb_prod, rng);
            let (ranking, reduced_cost) = self.descend(start, problem, solution);

            if reduced_cost < -REDUCED_COST_TOLERANCE {
                trace!(
                    "local optimum with reduced cost {:.6} after {} restarts",
                    reduced_cost,
                    restart + 1
                );
                let column = choice::matrix(&ranking, problem.inventories());
                return Some(Candidate {
                    ranking,
                    column,
                    reduced_cost,
                });
            }
        }
        None
    }
}

impl ColumnSource for BmPricer {
    /// Random strict permutations, cycling the top-ranked product and pinning
    /// a random runner-up.
    fn warm_start(&self, problem: &Problem, rng: &mut StdRng) -> Vec<Ranking> {
        let nb_prod = problem.nb_products();
        (0..self.config.first_random_columns)
            .map(|c| {
                let second = rng.gen_range(0..nb_prod);
                Ranking::random_pinned(nb_prod, c % nb_prod, second, rng)
            })
            .collect()
    }

    fn price(
        &self,
        problem: &Problem,
        pool: &[Ranking],
        solution: &MasterSolution,
        rng: &mut StdRng,
    ) -> Priced {
        let mut found = Vec::new();
        for _ in 0..self.config.columns_to_find {
            if let Some(candidate) = self.search(problem, solution, rng) {
                found.push(candidate);
            }
        }
        if found.is_empty() {
            return Priced::NoneFound;
        }

        let known: HashSet<&Ranking> = pool.iter().collect();
        let mut batch: HashSet<Ranking> = HashSet::new();
        let kept: Vec<Candidate> = keep_best(found, self.config.columns_to_keep)
            .into_iter()
            .filter(|c| !known.contains(&c.ranking) && batch.insert(c.ranking.clone()))
            .collect();

        if kept.is_empty() {
            return Priced::NoneFound;
        }
        debug!("best local optimum reduced cost {:.6}", kept[0].reduced_cost);
        Priced::Columns(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::SeedableRng;

    fn toy_problem() -> Problem {
        Problem::new(
            vec![vec![true, true, true], vec![true, false, true]],
            vec![vec![0.2, 0.3, 0.5], vec![0.4, 0.0, 0.6]],
            vec![0.0, 4.0, 5.0],
        )
        .unwrap()
    }

    fn solution_with(alpha: Array2<f64>, nu: f64) -> MasterSolution {
        MasterSolution {
            weights: vec![1.0],
            alpha,
            nu,
            objective: 1.0,
        }
    }

    #[test]
    fn warm_start_pins_the_first_two_ranks() {
        let problem = toy_problem();
        let pricer = BmPricer::new(BmConfig {
            first_random_columns: 3,
            ..BmConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(5);

        let pool = pricer.warm_start(&problem, &mut rng);
        assert_eq!(pool.len(), 3);
        for (c, ranking) in pool.iter().enumerate() {
            assert_eq!(ranking.rank(c % 3), 0);
            // strict permutations: the bottom class has a single member
            assert_eq!(ranking.indifference_class().len(), 1);
        }
    }

    #[test]
    fn descent_never_increases_the_reduced_cost() {
        let problem = toy_problem();
        let pricer = BmPricer::new(BmConfig::default());
        let mut rng = StdRng::seed_from_u64(1);

        let mut alpha = Array2::zeros((3, 2));
        alpha[[2, 0]] = 0.7;
        alpha[[2, 1]] = 0.4;
        let solution = solution_with(alpha, 0.0);

        for _ in 0..10 {
            let start = Ranking::random_permutation(3, &mut rng);
            let start_cost = {
                let column = choice::matrix(&start, problem.inventories());
                choice::reduced_cost(&column, solution.alpha.view(), solution.nu)
            };
            let (_, end_cost) = pricer.descend(start, &problem, &solution);
            assert!(end_cost <= start_cost + 1e-12);
        }
    }

    #[test]
    fn search_finds_the_rewarded_permutation() {
        let problem = toy_problem();
        let pricer = BmPricer::new(BmConfig::default());
        let mut rng = StdRng::seed_from_u64(2);

        // A column putting product 2 first is worth -1.1, anything else less.
        let mut alpha = Array2::zeros((3, 2));
        alpha[[2, 0]] = 0.6;
        alpha[[2, 1]] = 0.5;
        let solution = solution_with(alpha, 0.0);

        let candidate = pricer.search(&problem, &solution, &mut rng).unwrap();
        assert_eq!(candidate.ranking.rank(2), 0);
        assert!((candidate.reduced_cost - (-1.1)).abs() < 1e-9);
    }

    #[test]
    fn hopeless_duals_price_out_every_column() {
        let problem = toy_problem();
        let pricer = BmPricer::new(BmConfig {
            tenacity: 20,
            ..BmConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(3);

        // Every pairing is nonpositive, so no permutation can improve.
        let solution = solution_with(Array2::from_elem((3, 2), -1.0), 0.0);

        assert!(matches!(
            pricer.price(&problem, &[], &solution, &mut rng),
            Priced::NoneFound
        ));
    }
}
