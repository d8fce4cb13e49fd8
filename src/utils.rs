/// Tolerance used when comparing probability masses and objective values.
pub const EPSILON: f64 = 1e-5;
