//! Initial population construction.

use super::Chromosome;
use crate::datacenter::{CapacityLedger, Server, Vm, UNASSIGNED};

/// Round-robin first-fit placement.
///
/// VM `v` tries servers `(v + k) mod n` for `k = 0..n` and takes the first
/// one with room. VMs that fit nowhere keep the `UNASSIGNED` gene.
pub fn round_robin_individual(vms: &[Vm], servers: &[Server]) -> Chromosome {
    let num_servers = servers.len();
    let mut ledger = CapacityLedger::new(servers);
    let mut individual = vec![UNASSIGNED; vms.len()];

    for (v, vm) in vms.iter().enumerate() {
        let target = (0..num_servers)
            .map(|k| (v + k) % num_servers)
            .find(|&s| ledger.can_host(s, vm));

        match target {
            Some(s) => {
                if ledger.allocate(s, vm).is_ok() {
                    individual[v] = s;
                }
            }
            None => log::warn!("Round-robin: VM {} could not be placed on any server", vm.id),
        }
    }

    individual
}

/// Build the starting population: one round-robin individual replicated
/// `size` times. Diversity comes from crossover and mutation only.
pub fn generate_round_robin_population(vms: &[Vm], servers: &[Server], size: usize) -> Vec<Chromosome> {
    let base = round_robin_individual(vms, servers);
    vec![base; size]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::fitness::fitness;

    #[test]
    fn test_round_robin_scenario_a() {
        let servers = vec![Server::new(0, 4, 8), Server::new(1, 4, 8)];
        let vms = vec![Vm::new(0, 2, 4), Vm::new(1, 2, 4), Vm::new(2, 2, 4)];

        let population = generate_round_robin_population(&vms, &servers, 5);
        assert_eq!(population.len(), 5);
        assert!(population.iter().all(|ind| ind == &vec![0, 1, 0]));
        assert_eq!(fitness(&population[0], &vms, &servers), 2.0);
    }

    #[test]
    fn test_round_robin_skips_full_servers() {
        let servers = vec![Server::new(0, 4, 4), Server::new(1, 2, 2), Server::new(2, 4, 4)];
        let vms = vec![Vm::new(0, 3, 3), Vm::new(1, 3, 3), Vm::new(2, 1, 1)];

        // VM 1 starts at server 1 (too small), falls through to server 2.
        assert_eq!(round_robin_individual(&vms, &servers), vec![0, 2, 2]);
    }

    #[test]
    fn test_round_robin_leaves_unplaceable_vm_unassigned() {
        let servers = vec![Server::new(0, 4, 4)];
        let vms = vec![Vm::new(0, 1, 1), Vm::new(1, 8, 1)];

        let individual = round_robin_individual(&vms, &servers);
        assert_eq!(individual, vec![0, UNASSIGNED]);
        assert_eq!(fitness(&individual, &vms, &servers), f64::INFINITY);
    }
}
