//! Genetic algorithm for VM consolidation.
//!
//! This module exports the engine components: fitness evaluation, the
//! round-robin initializer, elitist selection, the capacity-repairing
//! crossover and mutation operators, and the generational loop.

pub mod fitness;
pub mod initialization;
pub mod selection;
pub mod crossover;
pub mod mutation;
pub mod engine;

pub use fitness::*;
pub use initialization::*;
pub use selection::*;
pub use crossover::*;
pub use mutation::*;
pub use engine::*;

/// A complete VM -> server assignment; gene `i` is the server hosting VM `i`.
pub type Chromosome = Vec<usize>;
