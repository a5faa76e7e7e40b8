//! Solution representation for VM consolidation.
//!
//! A solution is the best chromosome found by a run together with its
//! evaluation and the run's bookkeeping (history, termination, timing).

use crate::datacenter::{CapacityLedger, Server, Vm};
use crate::genetic::engine::{EngineState, GAResult};
use crate::genetic::fitness::fitness;
use serde::{Deserialize, Serialize};

/// Represents a placement of every VM onto a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// chromosome[i] = server hosting VM i
    pub chromosome: Vec<usize>,
    /// Servers used, or +infinity when the placement is infeasible
    pub fitness: f64,
    /// Whether every capacity constraint holds
    pub feasible: bool,
    /// Algorithm that generated this solution
    pub algorithm: String,
    /// Computation time in seconds
    pub computation_time: f64,
    /// Generations evaluated
    pub generations: usize,
    /// Best fitness per generation
    pub fitness_history: Vec<f64>,
    /// How the run stopped
    pub termination: Option<EngineState>,
}

impl Solution {
    /// Evaluate a bare chromosome
    pub fn from_chromosome(chromosome: Vec<usize>, vms: &[Vm], servers: &[Server], algorithm: &str) -> Self {
        let fitness = fitness(&chromosome, vms, servers);
        Solution {
            chromosome,
            fitness,
            feasible: fitness.is_finite(),
            algorithm: algorithm.to_string(),
            computation_time: 0.0,
            generations: 0,
            fitness_history: Vec::new(),
            termination: None,
        }
    }

    pub fn from_result(result: GAResult, algorithm: &str) -> Self {
        Solution {
            feasible: result.best_fitness.is_finite(),
            fitness: result.best_fitness,
            chromosome: result.best,
            algorithm: algorithm.to_string(),
            computation_time: result.elapsed,
            generations: result.generations,
            fitness_history: result.fitness_history,
            termination: Some(result.termination),
        }
    }

    /// Number of servers in use, if the placement is feasible
    pub fn servers_used(&self) -> Option<usize> {
        self.feasible.then(|| self.fitness as usize)
    }

    /// Rebuild the capacity ledger of this placement (None when infeasible)
    pub fn ledger(&self, vms: &[Vm], servers: &[Server]) -> Option<CapacityLedger> {
        CapacityLedger::from_chromosome(&self.chromosome, vms, servers).ok()
    }
}

impl std::fmt::Display for Solution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Solution ({})", self.algorithm)?;
        match self.servers_used() {
            Some(n) => writeln!(f, "  Servers used: {}", n)?,
            None => writeln!(f, "  Servers used: no valid solution")?,
        }
        writeln!(f, "  Feasible: {}", self.feasible)?;
        writeln!(f, "  Generations: {}", self.generations)?;
        if let Some(state) = self.termination {
            writeln!(f, "  Termination: {}", state)?;
        }
        writeln!(f, "  Time: {:.4}s", self.computation_time)?;
        writeln!(f, "  Placement: {:?}", self.chromosome)
    }
}
