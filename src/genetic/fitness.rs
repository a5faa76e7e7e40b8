//! Fitness evaluation.

use crate::datacenter::{CapacityLedger, Server, Vm};
use rayon::prelude::*;

/// Number of servers hosting at least one VM, or +infinity when the
/// chromosome is infeasible (unassigned gene, unknown server, or a server
/// over capacity). Lower is better.
///
/// Every call replays the chromosome into its own ledger, stopping at the
/// first violating gene.
pub fn fitness(individual: &[usize], vms: &[Vm], servers: &[Server]) -> f64 {
    match CapacityLedger::from_chromosome(individual, vms, servers) {
        Ok(ledger) => ledger.active_count() as f64,
        Err(_) => f64::INFINITY,
    }
}

/// Score a whole population, optionally spread over the rayon pool.
/// Both paths return identical values in population order.
pub fn evaluate_population<C>(population: &[C], vms: &[Vm], servers: &[Server], parallel: bool) -> Vec<f64>
where
    C: AsRef<[usize]> + Sync,
{
    if parallel {
        population
            .par_iter()
            .map(|individual| fitness(individual.as_ref(), vms, servers))
            .collect()
    } else {
        population
            .iter()
            .map(|individual| fitness(individual.as_ref(), vms, servers))
            .collect()
    }
}
