pub mod assortment;
pub mod master;
pub mod utils;
