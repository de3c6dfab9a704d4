// Consensus scoring: model fit → status classification → transition detection.
// Everything here is pure and synchronous; I/O lives in `run`.

pub mod classifier;
pub mod matrix_factorization;
pub mod params;
pub mod transitions;

pub use params::ScoringConfig;
