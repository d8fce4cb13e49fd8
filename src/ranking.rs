use float_ord::FloatOrd;
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;

/// A single customer type: a mapping from product index to preference rank.
///
/// Lower rank means more preferred. Ties are only allowed at the maximal rank
/// `nb_products - 1`, the bottom indifference class holding the products the
/// customer never considers. All other ranks are unique and form a contiguous
/// prefix `0..ranked_count`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ranking {
    ranks: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum InvalidRanking {
    #[error("a ranking needs at least two products")]
    TooFewProducts,
    #[error("product {product} has rank {rank}, outside 0..{nb_products}")]
    RankOutOfRange {
        product: usize,
        rank: usize,
        nb_products: usize,
    },
    #[error("rank {rank} is held by more than one product")]
    DuplicateRank { rank: usize },
    #[error("ranks are not a contiguous prefix: rank {rank} is missing")]
    GapInRanks { rank: usize },
}

impl Ranking {
    /// Validating constructor for externally supplied rankings.
    pub fn new(ranks: Vec<usize>) -> Result<Ranking, InvalidRanking> {
        let nb_prod = ranks.len();
        if nb_prod < 2 {
            return Err(InvalidRanking::TooFewProducts);
        }

        let bottom = nb_prod - 1;
        let mut held = vec![false; bottom];
        for (product, &rank) in ranks.iter().enumerate() {
            if rank >= nb_prod {
                return Err(InvalidRanking::RankOutOfRange {
                    product,
                    rank,
                    nb_products: nb_prod,
                });
            }
            if rank < bottom {
                if held[rank] {
                    return Err(InvalidRanking::DuplicateRank { rank });
                }
                held[rank] = true;
            }
        }

        let ranked = held.iter().filter(|&&h| h).count();
        if let Some(rank) = held[..ranked].iter().position(|&h| !h) {
            return Err(InvalidRanking::GapInRanks { rank });
        }

        Ok(Ranking { ranks })
    }

    /// The fully indifferent ranking: every product sits in the bottom class.
    pub fn indifferent(nb_prod: usize) -> Ranking {
        Ranking {
            ranks: vec![nb_prod - 1; nb_prod],
        }
    }

    /// A ranking with `product` most preferred and everything else indifferent.
    pub fn singleton(product: usize, nb_prod: usize) -> Ranking {
        let mut ranks = vec![nb_prod - 1; nb_prod];
        ranks[product] = 0;
        Ranking { ranks }
    }

    /// A uniformly random strict ranking over all products.
    pub fn random_permutation<R: Rng>(nb_prod: usize, rng: &mut R) -> Ranking {
        let mut ranks: Vec<usize> = (0..nb_prod).collect();
        ranks.shuffle(rng);
        Ranking { ranks }
    }

    /// A random strict ranking with `first` pinned to rank 0 and `second` to
    /// rank 1. When the two coincide a neighboring product is pinned instead.
    pub fn random_pinned<R: Rng>(
        nb_prod: usize,
        first: usize,
        second: usize,
        rng: &mut R,
    ) -> Ranking {
        let first = first.min(nb_prod - 1);
        let mut second = second.min(nb_prod - 1);
        if second == first {
            second = if first == 0 { 1 } else { first - 1 };
        }

        let mut ranking = Ranking::random_permutation(nb_prod, rng);
        let pos = ranking.ranks.iter().position(|&r| r == 0).unwrap();
        ranking.ranks.swap(pos, first);
        let pos = ranking.ranks.iter().position(|&r| r == 1).unwrap();
        ranking.ranks.swap(pos, second);
        ranking
    }

    /// Number of products covered by this ranking.
    pub fn nb_products(&self) -> usize {
        self.ranks.len()
    }

    /// The rank of the bottom indifference class.
    pub fn bottom(&self) -> usize {
        self.ranks.len() - 1
    }

    /// The preference rank of `product`.
    pub fn rank(&self, product: usize) -> usize {
        self.ranks[product]
    }

    /// Products sitting in the bottom indifference class.
    pub fn indifference_class(&self) -> Vec<usize> {
        let bottom = self.bottom();
        (0..self.ranks.len())
            .filter(|&i| self.ranks[i] == bottom)
            .collect()
    }

    /// Number of strictly ranked products.
    pub fn ranked_count(&self) -> usize {
        let bottom = self.bottom();
        self.ranks.iter().filter(|&&r| r != bottom).count()
    }

    /// Whether the no-purchase option has left the indifference class. Columns
    /// for which this holds are never branched on again by the GDT pricer.
    pub fn ranks_no_purchase(&self) -> bool {
        self.ranks[0] != self.bottom()
    }

    /// Strictly ranked products, most preferred first.
    pub fn preferred(&self) -> Vec<usize> {
        let bottom = self.bottom();
        let mut ranked: Vec<usize> = (0..self.ranks.len())
            .filter(|&i| self.ranks[i] != bottom)
            .collect();
        ranked.sort_by_key(|&i| self.ranks[i]);
        ranked
    }

    /// All rank-1 extensions of this ranking: one child per indifferent
    /// product, promoting it to the next free rank. This is the branching
    /// rule of the GDT tree. Empty when promoting the last indifferent
    /// product would change nothing.
    pub fn extensions(&self) -> Vec<Ranking> {
        let order = self.ranked_count();
        if order + 1 >= self.nb_products() {
            return Vec::new();
        }

        self.indifference_class()
            .into_iter()
            .map(|product| {
                let mut ranks = self.ranks.clone();
                ranks[product] = order;
                Ranking { ranks }
            })
            .collect()
    }

    /// A random strict refinement: the bottom indifference class is completed
    /// into random distinct ranks below every already-ranked product.
    pub fn random_refinement<R: Rng>(&self, rng: &mut R) -> Ranking {
        let class = self.indifference_class();
        if class.len() <= 1 {
            return self.clone();
        }

        let nb_prod = self.nb_products();
        let mut tail: Vec<usize> = (nb_prod - class.len()..nb_prod).collect();
        tail.shuffle(rng);

        let mut ranks = self.ranks.clone();
        for (product, rank) in class.into_iter().zip(tail) {
            ranks[product] = rank;
        }
        Ranking { ranks }
    }

    /// Swaps the products holding ranks `rank` and `rank + 1`. Only meaningful
    /// for strict rankings, where both ranks have a unique holder.
    pub fn swap_adjacent(&self, rank: usize) -> Ranking {
        let mut ranks = self.ranks.clone();
        let lo = ranks.iter().position(|&r| r == rank);
        let hi = ranks.iter().position(|&r| r == rank + 1);
        if let (Some(lo), Some(hi)) = (lo, hi) {
            ranks.swap(lo, hi);
        }
        Ranking { ranks }
    }
}

/// Clips negative components to zero and renormalizes to a distribution.
pub fn repair_weights(mut weights: Vec<f64>) -> Result<Vec<f64>, Error> {
    for w in &mut weights {
        if *w < 0.0 {
            *w = 0.0;
        }
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(Error::DegenerateMixture);
    }

    for w in &mut weights {
        *w /= total;
    }
    Ok(weights)
}

/// A finite mixture of rankings: the learned choice model `(Sigma, Lambda)`.
///
/// Rankings correspond 1:1 to mixture weights; the weights are a probability
/// distribution over customer types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceModel {
    rankings: Vec<Ranking>,
    weights: Vec<f64>,
}

impl ChoiceModel {
    /// Builds a model from rankings and (possibly unrepaired) weights.
    pub fn new(rankings: Vec<Ranking>, weights: Vec<f64>) -> Result<ChoiceModel, Error> {
        assert_eq!(rankings.len(), weights.len());
        let weights = repair_weights(weights)?;
        Ok(ChoiceModel { rankings, weights })
    }

    pub fn rankings(&self) -> &[Ranking] {
        &self.rankings
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.rankings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rankings.is_empty()
    }

    /// Whether any column carries an indifference class of two or more
    /// products, i.e. tied ranks the assortment MIP has to break.
    pub fn has_ties(&self) -> bool {
        self.rankings
            .iter()
            .any(|r| r.indifference_class().len() >= 2)
    }

    /// Drops zero-weight columns and sorts the rest by weight, heaviest first.
    pub fn pruned(self) -> ChoiceModel {
        let mut pairs: Vec<(Ranking, f64)> = self
            .rankings
            .into_iter()
            .zip(self.weights)
            .filter(|&(_, w)| w > 0.0)
            .collect();
        pairs.sort_by_key(|&(_, w)| std::cmp::Reverse(FloatOrd(w)));

        let (rankings, weights) = pairs.into_iter().unzip();
        ChoiceModel { rankings, weights }
    }

    /// Expands every tied column into random strict refinements, so the model
    /// can be fed to a MIP formulation that assumes strict rankings. Each
    /// column spawns `trunc(weight / threshold) + min_sub_columns` children
    /// (at least one), splitting its weight evenly among them.
    pub fn expand_ties<R: Rng>(
        &self,
        threshold: f64,
        min_sub_columns: usize,
        rng: &mut R,
    ) -> ChoiceModel {
        let mut rankings = Vec::new();
        let mut weights = Vec::new();

        for (ranking, &weight) in self.rankings.iter().zip(&self.weights) {
            let split = if threshold > 0.0 {
                (weight / threshold).trunc() as usize
            } else {
                0
            };
            let children = (split + min_sub_columns).max(1);

            for _ in 0..children {
                rankings.push(ranking.random_refinement(rng));
                weights.push(weight / children as f64);
            }
        }

        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        ChoiceModel { rankings, weights }
    }

    /// Human-readable summary: one line per column with its weight and the
    /// strictly ranked products in order of preference.
    pub fn digest(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for (k, (ranking, weight)) in self.rankings.iter().zip(&self.weights).enumerate() {
            let _ = writeln!(
                out,
                "column {:>3}: weight {:.4}, preferred products {:?}",
                k,
                weight,
                ranking.preferred()
            );
        }
        out
    }
}
