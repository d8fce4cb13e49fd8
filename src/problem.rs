use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ProductIndex = usize;
pub type AssortmentIndex = usize;

/// A problem instance: which products were offered in each historical
/// assortment, the choice frequencies observed for them, and the per-product
/// revenue used by the assortment optimizer.
///
/// Product index 0 is the no-purchase option. It is offered in every
/// assortment regardless of the stored flag, and its revenue is typically 0.
#[derive(Debug, Clone)]
pub struct Problem {
    /// Offer matrix, one row per historical assortment, one column per product.
    inventories: Array2<bool>,
    /// Observed choice frequencies, same shape as `inventories`.
    frequencies: Array2<f64>,
    /// Revenue per product.
    revenue: Vec<f64>,
}

#[derive(Debug, Error)]
pub enum ProblemConstructionError {
    /// There must be at least one real product besides the no-purchase option.
    #[error("a problem needs at least one real product besides the no-purchase option")]
    NoProducts,
    /// There must be at least one historical assortment to fit against.
    #[error("a problem needs at least one historical assortment")]
    NoAssortments,
    /// A row of one of the input matrices has the wrong number of products.
    #[error("assortment {assortment} has {actual} entries, expected {expected}")]
    RowSizeMismatch {
        assortment: AssortmentIndex,
        expected: usize,
        actual: usize,
    },
    /// The frequency matrix must have one row per assortment.
    #[error("frequency matrix has {actual} rows, expected {expected}")]
    FrequencyRowCountMismatch { expected: usize, actual: usize },
    /// The revenue vector must have one entry per product.
    #[error("revenue vector has length {actual}, expected {expected}")]
    RevenueSizeMismatch { expected: usize, actual: usize },
    /// Choice frequencies are probabilities.
    #[error("choice frequency {value} for product {product} in assortment {assortment} is outside [0, 1]")]
    FrequencyOutOfRange {
        assortment: AssortmentIndex,
        product: ProductIndex,
        value: f64,
    },
}

#[derive(Debug, Error)]
pub enum ProblemLoadError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Construction(#[from] ProblemConstructionError),
}

/// On-disk representation of a problem instance.
#[derive(Debug, Serialize, Deserialize)]
struct RawProblem {
    inventories: Vec<Vec<bool>>,
    frequencies: Vec<Vec<f64>>,
    revenue: Vec<f64>,
}

impl Problem {
    pub fn new(
        inventories: Vec<Vec<bool>>,
        frequencies: Vec<Vec<f64>>,
        revenue: Vec<f64>,
    ) -> Result<Problem, ProblemConstructionError> {
        let nb_asst = inventories.len();
        if nb_asst == 0 {
            return Err(ProblemConstructionError::NoAssortments);
        }

        let nb_prod = inventories[0].len();
        if nb_prod < 2 {
            return Err(ProblemConstructionError::NoProducts);
        }

        if frequencies.len() != nb_asst {
            return Err(ProblemConstructionError::FrequencyRowCountMismatch {
                expected: nb_asst,
                actual: frequencies.len(),
            });
        }

        for (m, row) in inventories.iter().enumerate() {
            if row.len() != nb_prod {
                return Err(ProblemConstructionError::RowSizeMismatch {
                    assortment: m,
                    expected: nb_prod,
                    actual: row.len(),
                });
            }
        }

        for (m, row) in frequencies.iter().enumerate() {
            if row.len() != nb_prod {
                return Err(ProblemConstructionError::RowSizeMismatch {
                    assortment: m,
                    expected: nb_prod,
                    actual: row.len(),
                });
            }

            for (i, &value) in row.iter().enumerate() {
                if !(0.0..=1.0).contains(&value) {
                    return Err(ProblemConstructionError::FrequencyOutOfRange {
                        assortment: m,
                        product: i,
                        value,
                    });
                }
            }
        }

        if revenue.len() != nb_prod {
            return Err(ProblemConstructionError::RevenueSizeMismatch {
                expected: nb_prod,
                actual: revenue.len(),
            });
        }

        // The no-purchase option is implicitly part of every assortment.
        let inventories =
            Array2::from_shape_fn((nb_asst, nb_prod), |(m, i)| i == 0 || inventories[m][i]);
        let frequencies = Array2::from_shape_fn((nb_asst, nb_prod), |(m, i)| frequencies[m][i]);

        Ok(Problem {
            inventories,
            frequencies,
            revenue,
        })
    }

    /// Reads a JSON problem instance.
    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Problem, ProblemLoadError> {
        let raw: RawProblem = serde_json::from_reader(reader)?;
        Ok(Problem::new(raw.inventories, raw.frequencies, raw.revenue)?)
    }

    /// Number of products, including the no-purchase option at index 0.
    pub fn nb_products(&self) -> usize {
        self.inventories.ncols()
    }

    /// Number of historical assortments.
    pub fn nb_assortments(&self) -> usize {
        self.inventories.nrows()
    }

    /// Offer matrix, one row per historical assortment.
    pub fn inventories(&self) -> &Array2<bool> {
        &self.inventories
    }

    /// Observed choice frequencies, one row per historical assortment.
    pub fn frequencies(&self) -> &Array2<f64> {
        &self.frequencies
    }

    /// Observed frequencies transposed to (product, assortment), the layout
    /// the restricted master fits against.
    pub fn observed_by_product(&self) -> Array2<f64> {
        self.frequencies.t().to_owned()
    }

    /// Revenue per product.
    pub fn revenue(&self) -> &[f64] {
        &self.revenue
    }
}
