//! Choice probabilities induced by a ranking over the historical assortments.

use ndarray::{Array2, ArrayView2};

use crate::ranking::Ranking;

/// Choice probabilities of `ranking` in each historical assortment, laid out
/// as (product, assortment). In each assortment the most preferred offered
/// product gets probability 1; when that product sits in the bottom
/// indifference class the probability is split evenly over the offered part
/// of the class.
pub fn matrix(ranking: &Ranking, inventories: &Array2<bool>) -> Array2<f64> {
    let nb_asst = inventories.nrows();
    let nb_prod = inventories.ncols();
    let bottom = ranking.bottom();

    let mut column = Array2::zeros((nb_prod, nb_asst));
    for m in 0..nb_asst {
        let best = (0..nb_prod)
            .filter(|&i| inventories[[m, i]])
            .min_by_key(|&i| ranking.rank(i));

        // The no-purchase option is always offered, so `best` exists.
        if let Some(best) = best {
            if ranking.rank(best) < bottom {
                column[[best, m]] = 1.0;
            } else {
                let tied: Vec<usize> = (0..nb_prod)
                    .filter(|&i| inventories[[m, i]] && ranking.rank(i) == bottom)
                    .collect();
                let share = 1.0 / tied.len() as f64;
                for i in tied {
                    column[[i, m]] = share;
                }
            }
        }
    }
    column
}

/// Choice matrices for a batch of rankings.
pub fn batch(rankings: &[Ranking], inventories: &Array2<bool>) -> Vec<Array2<f64>> {
    rankings.iter().map(|r| matrix(r, inventories)).collect()
}

/// Reduced cost of a candidate column given the master duals: `alpha` on the
/// fit constraints and `nu` on the simplex constraint. Negative values mean
/// the column improves the restricted master.
pub fn reduced_cost(column: &Array2<f64>, alpha: ArrayView2<f64>, nu: f64) -> f64 {
    -(column * &alpha).sum() - nu
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn offers(rows: Vec<Vec<bool>>) -> Array2<bool> {
        let nb_prod = rows[0].len();
        Array2::from_shape_fn((rows.len(), nb_prod), |(m, i)| rows[m][i])
    }

    #[test]
    fn strict_ranking_picks_the_most_preferred_offered_product() {
        // preference order: 2, 1, 0
        let ranking = Ranking::new(vec![2, 1, 0]).unwrap();
        let inv = offers(vec![
            vec![true, true, true],
            vec![true, true, false],
            vec![true, false, false],
        ]);

        let col = matrix(&ranking, &inv);
        assert_eq!(col[[2, 0]], 1.0);
        assert_eq!(col[[1, 1]], 1.0);
        assert_eq!(col[[0, 2]], 1.0);
    }

    #[test]
    fn columns_sum_to_one_per_assortment() {
        let ranking = Ranking::singleton(2, 4);
        let inv = offers(vec![
            vec![true, true, true, true],
            vec![true, true, false, true],
            vec![true, false, false, false],
        ]);

        let col = matrix(&ranking, &inv);
        for m in 0..3 {
            let mass: f64 = (0..4).map(|i| col[[i, m]]).sum();
            assert!((mass - 1.0).abs() < 1e-12, "assortment {} mass {}", m, mass);
        }
    }

    #[test]
    fn ties_split_choice_mass_evenly() {
        // product 3 ranked first, everything else indifferent
        let ranking = Ranking::singleton(3, 4);
        let inv = offers(vec![vec![true, true, true, false]]);

        let col = matrix(&ranking, &inv);
        for i in 0..3 {
            assert!((col[[i, 0]] - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(col[[3, 0]], 0.0);
    }

    #[test]
    fn fully_indifferent_column_spreads_over_the_whole_assortment() {
        let ranking = Ranking::indifferent(3);
        let inv = offers(vec![vec![true, false, true]]);

        let col = matrix(&ranking, &inv);
        assert_eq!(col[[0, 0]], 0.5);
        assert_eq!(col[[1, 0]], 0.0);
        assert_eq!(col[[2, 0]], 0.5);
    }

    #[test]
    fn reduced_cost_is_negated_dual_pairing() {
        let column = array![[1.0, 0.0], [0.0, 1.0]];
        let alpha = array![[0.5, 0.0], [0.0, -0.25]];
        let rc = reduced_cost(&column, alpha.view(), 0.1);
        assert!((rc - (-0.5 + 0.25 - 0.1)).abs() < 1e-12);
    }
}
