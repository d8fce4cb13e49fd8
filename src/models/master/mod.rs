//! Restricted master problem of the column-generation scheme.
//!
//! Fits mixture weights over the current set of choice columns to the
//! observed frequencies, and exposes the duals the pricers need: `alpha` on
//! the fit constraints and `nu` on the simplex constraint.

use grb::prelude::*;
use grb::Status;
use log::{debug, trace};
use ndarray::Array2;

use crate::error::{Error, Result};
use crate::models::utils::{quiet_model, AddVars};
use crate::problem::Problem;
use crate::ranking::repair_weights;

/// Norm used to measure the fit between predicted and observed frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitNorm {
    /// Sum of absolute deviations. Keeps the master linear, so simplex bases
    /// can be reused between solves.
    L1,
    /// Sum of squared deviations. Quadratic objective, no basis reuse.
    L2,
}

#[derive(Debug, Clone, Copy)]
pub struct MasterOptions {
    pub fit: FitNorm,
    /// Reuse the simplex basis of the previous solve when new columns arrive.
    pub warm_start: bool,
    pub verbose: bool,
}

impl Default for MasterOptions {
    fn default() -> Self {
        MasterOptions {
            fit: FitNorm::L1,
            warm_start: true,
            verbose: false,
        }
    }
}

/// Primal and dual information of one master solve.
#[derive(Debug, Clone)]
pub struct MasterSolution {
    /// Repaired mixture weights, one per column currently in the master.
    pub weights: Vec<f64>,
    /// Duals of the fit constraints, laid out as (product, assortment).
    pub alpha: Array2<f64>,
    /// Dual of the simplex constraint.
    pub nu: f64,
    /// Objective value of the fit.
    pub objective: f64,
}

/// Simplex basis snapshot, restored before re-solving with added columns.
struct Basis {
    vbases: Vec<(Var, i32)>,
    cbases: Vec<(Constr, i32)>,
}

/// Basis status of a variable that just entered the model.
const NONBASIC_AT_LOWER: i32 = -1;

/// The restricted master LP, kept alive across column-generation iterations
/// so that added columns only grow the model instead of rebuilding it.
pub struct MasterSession {
    model: Model,
    /// One weight variable per choice column, in insertion order.
    lambda: Vec<Var>,
    /// Positive and negative deviation per (product, assortment) cell.
    slack: Vec<(Var, Var)>,
    /// Fit constraints, row-major over (product, assortment).
    fit_constrs: Vec<Constr>,
    simplex: Constr,
    basis: Option<Basis>,
    options: MasterOptions,
    nb_products: usize,
    nb_assortments: usize,
}

impl MasterSession {
    /// Builds the master over an initial set of choice columns. At least one
    /// column is required, since the simplex constraint is unsatisfiable
    /// without any.
    pub fn new(
        problem: &Problem,
        columns: &[Array2<f64>],
        options: MasterOptions,
    ) -> Result<MasterSession> {
        if columns.is_empty() {
            return Err(Error::ModelInfeasible {
                status: Status::Infeasible,
            });
        }
        if options.fit == FitNorm::L2 && options.warm_start {
            return Err(Error::QuadraticWarmStart);
        }

        let nb_prod = problem.nb_products();
        let nb_asst = problem.nb_assortments();
        let observed = problem.observed_by_product();

        let mut model = quiet_model("master", options.verbose)?;
        // Barrier for the cold solve; warm re-solves switch to dual simplex.
        model.set_param(param::Method, 2)?;

        let lambda = columns.len().cont(&mut model, "lambda")?;

        let mut slack = Vec::with_capacity(nb_prod * nb_asst);
        let mut fit_constrs = Vec::with_capacity(nb_prod * nb_asst);
        for i in 0..nb_prod {
            for m in 0..nb_asst {
                let ep = model.add_var(
                    &format!("ep_{}_{}", i, m),
                    VarType::Continuous,
                    0.0,
                    0.0,
                    f64::INFINITY,
                    std::iter::empty(),
                )?;
                let em = model.add_var(
                    &format!("em_{}_{}", i, m),
                    VarType::Continuous,
                    0.0,
                    0.0,
                    f64::INFINITY,
                    std::iter::empty(),
                )?;

                let fitted = columns
                    .iter()
                    .zip(&lambda)
                    .map(|(a, &l)| a[[i, m]] * l)
                    .grb_sum();

                let constr = model.add_constr(
                    &format!("fit_{}_{}", i, m),
                    c!(fitted + ep - em == observed[[i, m]]),
                )?;

                slack.push((ep, em));
                fit_constrs.push(constr);
            }
        }

        let simplex = model.add_constr("simplex", c!(lambda.iter().grb_sum() == 1.0))?;

        match options.fit {
            FitNorm::L1 => {
                let obj = slack.iter().map(|&(ep, em)| ep + em).grb_sum();
                model.set_objective(obj, Minimize)?;
            }
            FitNorm::L2 => {
                let obj = slack.iter().map(|&(ep, em)| ep * ep + em * em).grb_sum();
                model.set_objective(obj, Minimize)?;
            }
        }

        Ok(MasterSession {
            model,
            lambda,
            slack,
            fit_constrs,
            simplex,
            basis: None,
            options,
            nb_products: nb_prod,
            nb_assortments: nb_asst,
        })
    }

    /// Number of columns currently in the master.
    pub fn nb_columns(&self) -> usize {
        self.lambda.len()
    }

    fn fit_constr(&self, i: usize, m: usize) -> &Constr {
        &self.fit_constrs[i * self.nb_assortments + m]
    }

    /// Adds new choice columns as weight variables. Each variable enters the
    /// fit constraints with its choice probabilities and the simplex
    /// constraint with coefficient 1. When a basis snapshot exists it is
    /// restored, with the newcomers marked nonbasic, so the next solve picks
    /// up where the previous one stopped.
    pub fn append_columns(&mut self, columns: &[Array2<f64>]) -> Result<()> {
        for column in columns {
            let mut coeffs: Vec<(Constr, f64)> = Vec::new();
            for i in 0..self.nb_products {
                for m in 0..self.nb_assortments {
                    if column[[i, m]] != 0.0 {
                        coeffs.push((*self.fit_constr(i, m), column[[i, m]]));
                    }
                }
            }
            coeffs.push((self.simplex, 1.0));

            let var = self.model.add_var(
                &format!("lambda_{}", self.lambda.len()),
                VarType::Continuous,
                0.0,
                0.0,
                f64::INFINITY,
                coeffs,
            )?;
            self.lambda.push(var);
        }
        self.model.update()?;

        if let Some(basis) = self.basis.take() {
            let fresh = self.lambda.len() - columns.len();
            self.model
                .set_obj_attr_batch(attr::VBasis, basis.vbases.iter().copied())?;
            self.model.set_obj_attr_batch(
                attr::CBasis,
                basis.cbases.iter().copied(),
            )?;
            self.model.set_obj_attr_batch(
                attr::VBasis,
                self.lambda[fresh..].iter().map(|&v| (v, NONBASIC_AT_LOWER)),
            )?;
            self.model.set_param(param::Method, 1)?;
        }

        trace!(
            "master grew by {} columns, now {}",
            columns.len(),
            self.lambda.len()
        );
        Ok(())
    }

    /// Solves the master and extracts the repaired weights and the duals.
    pub fn solve(&mut self) -> Result<MasterSolution> {
        self.model.optimize()?;

        match self.model.status()? {
            Status::Optimal => {}
            status @ (Status::Infeasible | Status::InfOrUnbd) => {
                return Err(Error::ModelInfeasible { status })
            }
            status => return Err(Error::UnexpectedStatus { status }),
        }

        let mut weights = Vec::with_capacity(self.lambda.len());
        for var in &self.lambda {
            weights.push(self.model.get_obj_attr(attr::X, var)?);
        }
        let weights = repair_weights(weights)?;

        let mut alpha = Array2::zeros((self.nb_products, self.nb_assortments));
        for i in 0..self.nb_products {
            for m in 0..self.nb_assortments {
                alpha[[i, m]] = self
                    .model
                    .get_obj_attr(attr::Pi, self.fit_constr(i, m))?;
            }
        }
        let nu = self.model.get_obj_attr(attr::Pi, &self.simplex)?;
        let objective = self.model.get_attr(attr::ObjVal)?;

        if self.options.warm_start {
            self.save_basis()?;
        }

        debug!(
            "master solved: objective {:.6}, {} columns",
            objective,
            self.lambda.len()
        );

        Ok(MasterSolution {
            weights,
            alpha,
            nu,
            objective,
        })
    }

    fn save_basis(&mut self) -> Result<()> {
        let mut vbases = Vec::with_capacity(self.lambda.len() + 2 * self.slack.len());
        for &var in self.lambda.iter() {
            vbases.push((var, self.model.get_obj_attr(attr::VBasis, &var)?));
        }
        for &(ep, em) in &self.slack {
            vbases.push((ep, self.model.get_obj_attr(attr::VBasis, &ep)?));
            vbases.push((em, self.model.get_obj_attr(attr::VBasis, &em)?));
        }

        let mut cbases = Vec::with_capacity(self.fit_constrs.len() + 1);
        for constr in self.fit_constrs.iter() {
            cbases.push((*constr, self.model.get_obj_attr(attr::CBasis, constr)?));
        }
        cbases.push((
            self.simplex,
            self.model.get_obj_attr(attr::CBasis, &self.simplex)?,
        ));

        self.basis = Some(Basis { vbases, cbases });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::choice;
    use crate::ranking::Ranking;

    fn toy_problem() -> Problem {
        Problem::new(
            vec![vec![true, true, true], vec![true, true, false]],
            vec![vec![0.2, 0.3, 0.5], vec![0.6, 0.4, 0.0]],
            vec![0.0, 5.0, 8.0],
        )
        .unwrap()
    }

    fn singleton_columns(problem: &Problem) -> Vec<ndarray::Array2<f64>> {
        let rankings: Vec<Ranking> = (0..problem.nb_products())
            .map(|i| Ranking::singleton(i, problem.nb_products()))
            .collect();
        choice::batch(&rankings, problem.inventories())
    }

    #[test]
    fn rejects_an_empty_column_set() {
        let problem = toy_problem();
        assert!(matches!(
            MasterSession::new(&problem, &[], MasterOptions::default()),
            Err(Error::ModelInfeasible { .. })
        ));
    }

    #[test]
    fn rejects_warm_started_quadratic_fit() {
        let problem = toy_problem();
        let columns = singleton_columns(&problem);
        let options = MasterOptions {
            fit: FitNorm::L2,
            warm_start: true,
            verbose: false,
        };
        assert!(matches!(
            MasterSession::new(&problem, &columns, options),
            Err(Error::QuadraticWarmStart)
        ));
    }

    #[test]
    fn solves_a_small_l1_fit() {
        let problem = toy_problem();
        let columns = singleton_columns(&problem);
        let mut session =
            MasterSession::new(&problem, &columns, MasterOptions::default()).unwrap();

        let solution = session.solve().unwrap();
        assert_eq!(solution.weights.len(), 3);
        assert!((solution.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(solution.objective >= -1e-9);
        assert_eq!(solution.alpha.dim(), (3, 2));
    }

    #[test]
    fn resolving_an_unchanged_master_is_idempotent() {
        let problem = toy_problem();
        let columns = singleton_columns(&problem);
        let mut session =
            MasterSession::new(&problem, &columns, MasterOptions::default()).unwrap();

        let first = session.solve().unwrap();
        let second = session.solve().unwrap();
        assert!((first.objective - second.objective).abs() < 1e-9);
    }

    #[test]
    fn added_columns_never_worsen_the_fit() {
        let problem = toy_problem();
        let columns = singleton_columns(&problem);
        let mut session =
            MasterSession::new(&problem, &columns[..2], MasterOptions::default()).unwrap();

        let first = session.solve().unwrap();

        session.append_columns(&columns[2..]).unwrap();
        let second = session.solve().unwrap();

        assert_eq!(session.nb_columns(), 3);
        assert!(second.objective <= first.objective + 1e-9);
    }
}
