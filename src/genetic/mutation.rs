//! Mutation operators.
//!
//! Every operator is a pure function: it returns a new chromosome and
//! leaves its input untouched. Moves are checked against a capacity ledger
//! rebuilt from the chromosome for that single call, so a feasible input
//! always yields a feasible output. Infeasible inputs come back unchanged.

use super::Chromosome;
use crate::datacenter::{CapacityLedger, Server, Vm};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Mutation operator types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationStrategy {
    /// Exchange the servers of two VMs
    Swap,
    /// Empty the poorest active server into the others
    RobinHood,
    /// Move one VM to another server with room
    SmartMove,
}

impl MutationStrategy {
    pub const ALL: [MutationStrategy; 3] = [
        MutationStrategy::Swap,
        MutationStrategy::RobinHood,
        MutationStrategy::SmartMove,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MutationStrategy::Swap => "swap",
            MutationStrategy::RobinHood => "robin-hood",
            MutationStrategy::SmartMove => "smart-move",
        }
    }

    pub fn mutate<R: Rng + ?Sized>(
        &self,
        individual: &[usize],
        vms: &[Vm],
        servers: &[Server],
        probability: f64,
        rng: &mut R,
    ) -> Chromosome {
        match self {
            MutationStrategy::Swap => swap_mutation(individual, vms, servers, probability, rng),
            MutationStrategy::RobinHood => robin_hood_mutation(individual, vms, servers, probability, rng),
            MutationStrategy::SmartMove => smart_move_mutation(individual, vms, servers, probability, rng),
        }
    }
}

impl std::fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[inline]
fn triggered<R: Rng + ?Sized>(probability: f64, rng: &mut R) -> bool {
    rng.gen::<f64>() < probability
}

/// Swap mutation: exchange the servers of two distinct VMs when each
/// server, without its own VM, can take the other one.
pub fn swap_mutation<R: Rng + ?Sized>(
    individual: &[usize],
    vms: &[Vm],
    servers: &[Server],
    probability: f64,
    rng: &mut R,
) -> Chromosome {
    let mut mutated = individual.to_vec();
    if !triggered(probability, rng) || vms.len() < 2 {
        return mutated;
    }

    let picks = rand::seq::index::sample(rng, vms.len(), 2);
    let (i, j) = (picks.index(0), picks.index(1));
    let (server_i, server_j) = (individual[i], individual[j]);
    if server_i == server_j {
        return mutated;
    }

    let Ok(mut ledger) = CapacityLedger::from_chromosome(individual, vms, servers) else {
        return mutated;
    };

    ledger.deallocate(server_i, &vms[i]);
    ledger.deallocate(server_j, &vms[j]);

    if ledger.can_host(server_i, &vms[j]) && ledger.can_host(server_j, &vms[i]) {
        mutated.swap(i, j);
    }
    mutated
}

/// Robin-Hood consolidation: take the poorest active server (fewest VMs,
/// then lowest load) and rehome its VMs, largest first, on the other
/// active servers with the most combined free capacity.
///
/// Either every VM moves or the individual is returned unchanged.
pub fn robin_hood_mutation<R: Rng + ?Sized>(
    individual: &[usize],
    vms: &[Vm],
    servers: &[Server],
    probability: f64,
    rng: &mut R,
) -> Chromosome {
    if !triggered(probability, rng) {
        return individual.to_vec();
    }

    let Ok(mut ledger) = CapacityLedger::from_chromosome(individual, vms, servers) else {
        return individual.to_vec();
    };

    let active = ledger.active_servers();
    if active.len() < 2 {
        return individual.to_vec();
    }

    let Some(poorest) = active.iter().copied().min_by_key(|&s| {
        let slot = &ledger.slots()[s];
        (slot.hosted().len(), slot.cpu_used() + slot.ram_used(), s)
    }) else {
        return individual.to_vec();
    };

    let mut movers = ledger.slots()[poorest].hosted().to_vec();
    movers.sort_by_key(|&v| Reverse(vms[v].weight()));

    let targets: Vec<usize> = active.iter().copied().filter(|&s| s != poorest).collect();
    let mut mutated = individual.to_vec();

    for v in movers {
        let vm = &vms[v];
        let Some(home) = ledger.worst_fit(&targets, vm, |s| s.free_capacity()) else {
            return individual.to_vec();
        };
        if ledger.allocate(home, vm).is_err() {
            return individual.to_vec();
        }
        ledger.deallocate(poorest, vm);
        mutated[v] = home;
    }

    log::debug!("Robin Hood consolidation emptied server {}", poorest);
    mutated
}

/// Smart single move: pick a random VM and move it to a random other
/// server that has room for it under the current placement.
pub fn smart_move_mutation<R: Rng + ?Sized>(
    individual: &[usize],
    vms: &[Vm],
    servers: &[Server],
    probability: f64,
    rng: &mut R,
) -> Chromosome {
    let mut mutated = individual.to_vec();
    if !triggered(probability, rng) || vms.is_empty() {
        return mutated;
    }

    let v = rng.gen_range(0..vms.len());
    let Ok(ledger) = CapacityLedger::from_chromosome(individual, vms, servers) else {
        return mutated;
    };

    let current = individual[v];
    let candidates: Vec<usize> = (0..servers.len())
        .filter(|&s| s != current && ledger.can_host(s, &vms[v]))
        .collect();

    if let Some(&target) = candidates.choose(rng) {
        mutated[v] = target;
    }
    mutated
}
