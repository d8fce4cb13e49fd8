pub mod choice;
pub mod colgen;
pub mod error;
pub mod models;
pub mod problem;
pub mod ranking;
pub mod termination;
pub mod utils;

pub use colgen::{learn, BmConfig, GdtConfig, LearnConfig, LearnedModel, Pricer};
pub use error::{Error, Result};
pub use models::assortment::{best_assortment, Assortment, AssortmentOptions, TieHandling};
pub use models::master::FitNorm;
pub use problem::Problem;
pub use ranking::{ChoiceModel, Ranking};
pub use termination::StopCriterion;
