//! Capacitated assortment optimization over a learned choice model.
//!
//! Binary offer decisions per real product, a continuous choice variable per
//! (ranking, product) pair, and the dominance constraints forcing each
//! ranking to pick its most preferred offered product. Bottom-class ties are
//! broken by symmetry constraints, supplied lazily on each integer-feasible
//! incumbent.

use grb::callback::{Callback, CbResult, Where};
use grb::prelude::*;
use grb::Status;
use itertools::iproduct;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Incumbent, Result};
use crate::models::utils::{quiet_model, AddVars, ConvertVars};
use crate::ranking::ChoiceModel;
use crate::utils::EPSILON;

/// How to deal with columns carrying a bottom indifference class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TieHandling {
    /// Keep the tied columns and break symmetry with lazy constraints.
    LazyConstraints,
    /// Expand every tied column into random strict refinements before
    /// building the MIP. Each column spawns
    /// `trunc(weight / threshold) + min_sub_columns` children.
    Expand {
        threshold: f64,
        min_sub_columns: usize,
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct AssortmentOptions {
    /// Minimum number of real products to offer.
    pub min_capacity: usize,
    /// Maximum number of real products to offer.
    pub max_capacity: usize,
    pub tie_handling: TieHandling,
    /// Solver time budget in seconds.
    pub time_limit: Option<f64>,
    pub verbose: bool,
}

impl AssortmentOptions {
    pub fn capacity(min_capacity: usize, max_capacity: usize) -> AssortmentOptions {
        AssortmentOptions {
            min_capacity,
            max_capacity,
            tie_handling: TieHandling::LazyConstraints,
            time_limit: None,
            verbose: false,
        }
    }
}

/// An optimal (or incumbent) assortment and its expected revenue.
#[derive(Debug, Clone, PartialEq)]
pub struct Assortment {
    /// Offer flag per product. Index 0, the no-purchase option, is always true.
    pub offered: Vec<bool>,
    pub expected_revenue: f64,
}

impl Assortment {
    /// Indices of the offered real products.
    pub fn products(&self) -> Vec<usize> {
        (1..self.offered.len())
            .filter(|&i| self.offered[i])
            .collect()
    }
}

/// Reports violated tie-breaking cuts on each integer-feasible incumbent.
///
/// For products i and j tied under ranking k, an incumbent offering both must
/// split their choice mass equally; the cut pair
/// `y[k][i] - y[k][j] <= 2 - x[i] - x[j]` (and its mirror) enforces this
/// without enumerating all tied pairs upfront.
struct TieCuts<'a> {
    /// Offer variable per real product; product i maps to `x[i - 1]`.
    x: &'a [Var],
    y: &'a [Vec<Var>],
    /// Tied pairs `(k, i, j)` with `i > j`, precomputed from the mixture.
    tied: &'a [(usize, usize, usize)],
}

impl Callback for TieCuts<'_> {
    fn callback(&mut self, w: Where) -> CbResult {
        if let Where::MIPSol(ctx) = w {
            let x = ctx.get_solution(self.x.iter().copied())?;
            let value = |i: usize| if i == 0 { 1.0 } else { x[i - 1] };

            let mut added = 0;
            for &(k, i, j) in self.tied {
                let slack = 2.0 - value(i) - value(j);
                if slack >= 1.0 - EPSILON {
                    continue;
                }

                let pair = ctx.get_solution([self.y[k][i], self.y[k][j]])?;
                let (yi, yj) = (self.y[k][i], self.y[k][j]);
                let xi = self.x[i - 1];
                if pair[0] - pair[1] > slack + EPSILON {
                    if j == 0 {
                        ctx.add_lazy(c!(yi - yj + xi <= 1.0))?;
                    } else {
                        let xj = self.x[j - 1];
                        ctx.add_lazy(c!(yi - yj + xi + xj <= 2.0))?;
                    }
                    added += 1;
                }
                if pair[1] - pair[0] > slack + EPSILON {
                    if j == 0 {
                        ctx.add_lazy(c!(yj - yi + xi <= 1.0))?;
                    } else {
                        let xj = self.x[j - 1];
                        ctx.add_lazy(c!(yj - yi + xi + xj <= 2.0))?;
                    }
                    added += 1;
                }
            }

            if added > 0 {
                debug!("added {} tie-breaking cuts", added);
            }
        }
        Ok(())
    }
}

/// Finds the revenue-maximizing assortment under the given choice model.
pub fn best_assortment(
    model: &ChoiceModel,
    revenue: &[f64],
    options: &AssortmentOptions,
) -> Result<Assortment> {
    match options.tie_handling {
        TieHandling::Expand {
            threshold,
            min_sub_columns,
            seed,
        } if model.has_ties() => {
            let mut rng = StdRng::seed_from_u64(seed);
            let expanded = model.expand_ties(threshold, min_sub_columns, &mut rng);
            info!(
                "expanded {} tied columns into {} strict ones",
                model.len(),
                expanded.len()
            );
            solve(&expanded, revenue, options)
        }
        _ => solve(model, revenue, options),
    }
}

fn solve(
    choice: &ChoiceModel,
    revenue: &[f64],
    options: &AssortmentOptions,
) -> Result<Assortment> {
    let nb_prod = revenue.len();
    let nb_col = choice.len();
    let weights = choice.weights();
    let rankings = choice.rankings();

    let mut model = quiet_model("assortment", options.verbose)?;
    if let Some(limit) = options.time_limit {
        model.set_param(param::TimeLimit, limit)?;
    }

    // The no-purchase option has no offer variable; it is always offered.
    let x = (nb_prod - 1).binary(&mut model, "x")?;
    let y = (nb_col, nb_prod).unit(&mut model, "y")?;

    let objective = iproduct!(0..nb_col, 0..nb_prod)
        .map(|(k, i)| weights[k] * revenue[i] * y[k][i])
        .grb_sum();
    model.set_objective(objective, Maximize)?;

    for (k, ranking) in rankings.iter().enumerate() {
        model.add_constr(
            &format!("one_choice_{}", k),
            c!(y[k].iter().grb_sum() == 1.0),
        )?;

        for i in 1..nb_prod {
            model.add_constr(&format!("offered_{}_{}", k, i), c!(y[k][i] <= x[i - 1]))?;

            // Offering i forbids choosing anything i is strictly preferred to.
            let worse: Vec<Var> = (0..nb_prod)
                .filter(|&j| ranking.rank(j) > ranking.rank(i))
                .map(|j| y[k][j])
                .collect();
            if !worse.is_empty() {
                model.add_constr(
                    &format!("dominance_{}_{}", k, i),
                    c!(worse.iter().grb_sum() + x[i - 1] <= 1.0),
                )?;
            }
        }

        // Products ranked below the no-purchase option are never chosen.
        let unreachable: Vec<Var> = (1..nb_prod)
            .filter(|&j| ranking.rank(j) > ranking.rank(0))
            .map(|j| y[k][j])
            .collect();
        if !unreachable.is_empty() {
            model.add_constr(
                &format!("no_purchase_dominates_{}", k),
                c!(unreachable.iter().grb_sum() == 0.0),
            )?;
        }
    }

    model.add_constr(
        "max_capacity",
        c!(x.iter().grb_sum() <= options.max_capacity as f64),
    )?;
    model.add_constr(
        "min_capacity",
        c!(x.iter().grb_sum() >= options.min_capacity as f64),
    )?;

    let tied = tied_pairs(choice);
    if tied.is_empty() {
        model.optimize()?;
    } else {
        model.set_param(param::LazyConstraints, 1)?;
        let mut cuts = TieCuts {
            x: &x,
            y: &y,
            tied: &tied,
        };
        model.optimize_with_callback(&mut cuts)?;
    }

    match model.status()? {
        Status::Optimal => extract(&model, &x, &y, choice, options),
        status @ (Status::Infeasible | Status::InfOrUnbd) => {
            Err(Error::ModelInfeasible { status })
        }
        Status::TimeLimit => {
            // The gap attribute is only defined once an incumbent exists.
            let (incumbent, gap) = if model.get_attr(attr::SolCount)? > 0 {
                let found = extract(&model, &x, &y, choice, options)?;
                let gap = model.get_attr(attr::MIPGap)?;
                let incumbent = Incumbent {
                    offered: found.offered,
                    expected_revenue: found.expected_revenue,
                };
                (Some(incumbent), gap)
            } else {
                (None, f64::INFINITY)
            };
            Err(Error::OracleTimeout { incumbent, gap })
        }
        status => Err(Error::UnexpectedStatus { status }),
    }
}

/// Tied pairs `(k, i, j)` with `i > j`, one entry per unordered pair in each
/// column's bottom indifference class.
fn tied_pairs(choice: &ChoiceModel) -> Vec<(usize, usize, usize)> {
    let mut tied = Vec::new();
    for (k, ranking) in choice.rankings().iter().enumerate() {
        let class = ranking.indifference_class();
        for (a, &i) in class.iter().enumerate().skip(1) {
            for &j in &class[..a] {
                tied.push((k, i, j));
            }
        }
    }
    tied
}

/// Reads the solution back and drops offered products that receive no choice
/// mass, as long as the minimum capacity allows it. Such products change no
/// ranking's choice, so removing them keeps the revenue intact.
fn extract(
    model: &Model,
    x: &[Var],
    y: &[Vec<Var>],
    choice: &ChoiceModel,
    options: &AssortmentOptions,
) -> Result<Assortment> {
    let expected_revenue = model.get_attr(attr::ObjVal)?;
    let xs = x.to_vec().convert(model)?;
    let ys = y.to_vec().convert(model)?;

    let nb_prod = x.len() + 1;
    let mut offered = vec![true; nb_prod];
    for i in 1..nb_prod {
        offered[i] = xs[i - 1] > 0.5;
    }

    let weights = choice.weights();
    let mut kept = offered.iter().skip(1).filter(|&&o| o).count();
    for i in 1..nb_prod {
        if !offered[i] || kept <= options.min_capacity {
            continue;
        }
        let mass: f64 = (0..choice.len()).map(|k| weights[k] * ys[k][i]).sum();
        if mass < EPSILON {
            offered[i] = false;
            kept -= 1;
        }
    }

    Ok(Assortment {
        offered,
        expected_revenue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::Ranking;

    #[test]
    fn symmetric_strict_rankings_pick_exactly_one_product() {
        // Two strict rankings disagreeing on the order of products 1 and 2,
        // both preferring either over walking away.
        let choice = ChoiceModel::new(
            vec![
                Ranking::new(vec![2, 0, 1]).unwrap(),
                Ranking::new(vec![2, 1, 0]).unwrap(),
            ],
            vec![0.6, 0.4],
        )
        .unwrap();

        let options = AssortmentOptions::capacity(0, 1);
        let best = best_assortment(&choice, &[0.0, 10.0, 10.0], &options).unwrap();

        assert_eq!(best.products().len(), 1);
        assert!((best.expected_revenue - 10.0).abs() < 1e-6);
    }

    #[test]
    fn no_purchase_first_yields_the_empty_assortment() {
        let choice = ChoiceModel::new(vec![Ranking::new(vec![0, 1]).unwrap()], vec![1.0]).unwrap();

        let options = AssortmentOptions::capacity(0, 1);
        let best = best_assortment(&choice, &[0.0, 99.0], &options).unwrap();

        assert!(best.products().is_empty());
        assert!(best.expected_revenue.abs() < 1e-9);
        assert!(best.offered[0]);
    }

    #[test]
    fn capacity_bounds_are_respected() {
        let choice = ChoiceModel::new(
            vec![
                Ranking::new(vec![3, 0, 1, 2]).unwrap(),
                Ranking::new(vec![3, 2, 0, 1]).unwrap(),
            ],
            vec![0.5, 0.5],
        )
        .unwrap();

        let options = AssortmentOptions::capacity(2, 3);
        let best = best_assortment(&choice, &[0.0, 1.0, 2.0, 3.0], &options).unwrap();
        let count = best.products().len();
        assert!((2..=3).contains(&count), "offered {} products", count);
    }

    #[test]
    fn tied_columns_split_mass_between_offered_products() {
        // Everything indifferent: the offered products and the no-purchase
        // option split the mass in three equal parts.
        let choice =
            ChoiceModel::new(vec![Ranking::indifferent(3)], vec![1.0]).unwrap();
        assert!(choice.has_ties());

        let options = AssortmentOptions::capacity(2, 2);
        let best = best_assortment(&choice, &[0.0, 3.0, 9.0], &options).unwrap();

        assert_eq!(best.products(), vec![1, 2]);
        assert!((best.expected_revenue - 4.0).abs() < 1e-6);
    }

    #[test]
    fn expansion_handles_ties_without_callbacks() {
        let choice = ChoiceModel::new(vec![Ranking::singleton(2, 3)], vec![1.0]).unwrap();

        let options = AssortmentOptions {
            min_capacity: 0,
            max_capacity: 2,
            tie_handling: TieHandling::Expand {
                threshold: 0.1,
                min_sub_columns: 4,
                seed: 13,
            },
            time_limit: None,
            verbose: false,
        };
        let best = best_assortment(&choice, &[0.0, 5.0, 7.0], &options).unwrap();

        assert!(best.offered[2]);
        assert!((best.expected_revenue - 7.0).abs() < 1e-6);
    }

    #[test]
    fn a_spent_time_budget_surfaces_a_timeout() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        // Large enough that a zero budget cannot certify optimality.
        let mut rng = StdRng::seed_from_u64(17);
        let nb_prod = 12;
        let nb_col = 30;
        let rankings: Vec<Ranking> = (0..nb_col)
            .map(|_| Ranking::random_permutation(nb_prod, &mut rng))
            .collect();
        let choice = ChoiceModel::new(rankings, vec![1.0 / nb_col as f64; nb_col]).unwrap();
        let revenue: Vec<f64> = (0..nb_prod).map(|i| i as f64).collect();

        let options = AssortmentOptions {
            time_limit: Some(0.0),
            ..AssortmentOptions::capacity(2, 5)
        };

        match best_assortment(&choice, &revenue, &options) {
            Err(Error::OracleTimeout { incumbent, gap }) => {
                assert!(gap >= 0.0);
                if let Some(incumbent) = incumbent {
                    let count = incumbent.offered.iter().skip(1).filter(|&&o| o).count();
                    assert!((2..=5).contains(&count), "offered {} products", count);
                }
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn contradictory_capacities_are_infeasible() {
        let choice = ChoiceModel::new(vec![Ranking::singleton(1, 2)], vec![1.0]).unwrap();
        let options = AssortmentOptions::capacity(2, 1);
        assert!(matches!(
            best_assortment(&choice, &[0.0, 1.0], &options),
            Err(Error::ModelInfeasible { .. })
        ));
    }
}
