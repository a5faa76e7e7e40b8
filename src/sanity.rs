//! Structural integrity checks.
//!
//! These never judge the quality of a placement. A failure here means the
//! data or the engine itself is broken.

use crate::datacenter::CapacityLedger;
use crate::error::SanityError;
use crate::scenario::Scenario;
use std::collections::HashSet;

/// Every VM id and every server id appears at most once.
pub fn check_scenario(scenario: &Scenario) -> Result<(), SanityError> {
    let mut seen = HashSet::new();
    for server in &scenario.servers {
        if !seen.insert(server.id) {
            return Err(SanityError::DuplicateId { kind: "server", id: server.id });
        }
    }

    seen.clear();
    for vm in &scenario.vms {
        if !seen.insert(vm.id) {
            return Err(SanityError::DuplicateId { kind: "VM", id: vm.id });
        }
    }
    Ok(())
}

/// Population has the configured size and every chromosome one gene per VM.
pub fn check_population<C: AsRef<[usize]>>(
    population: &[C],
    expected_size: usize,
    num_vms: usize,
) -> Result<(), SanityError> {
    if population.len() != expected_size {
        return Err(SanityError::PopulationSize {
            expected: expected_size,
            actual: population.len(),
        });
    }

    for (index, individual) in population.iter().enumerate() {
        let genes = individual.as_ref().len();
        if genes != num_vms {
            return Err(SanityError::GeneCount {
                index,
                expected: num_vms,
                actual: genes,
            });
        }
    }
    Ok(())
}

/// No VM is hosted twice and every hosted VM sits where the chromosome says.
pub fn check_ledger(ledger: &CapacityLedger, chromosome: &[usize]) -> Result<(), SanityError> {
    let mut hosted_on: Vec<Option<usize>> = vec![None; chromosome.len()];

    for slot in ledger.slots() {
        for &vm in slot.hosted() {
            let expected = chromosome.get(vm).copied().unwrap_or(crate::datacenter::UNASSIGNED);
            if expected != slot.id {
                return Err(SanityError::StateMismatch {
                    vm,
                    expected,
                    actual: slot.id,
                });
            }
            // expected == slot.id implies vm < chromosome.len()
            if hosted_on[vm].replace(slot.id).is_some() {
                return Err(SanityError::DuplicateHosting { vm, server: slot.id });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacenter::{Server, Vm};

    fn scenario() -> Scenario {
        Scenario::new(
            "s",
            vec![Server::new(0, 4, 8), Server::new(1, 4, 8)],
            vec![Vm::new(0, 2, 4), Vm::new(1, 2, 4), Vm::new(2, 2, 4)],
        )
    }

    #[test]
    fn test_check_scenario() {
        let mut s = scenario();
        assert!(check_scenario(&s).is_ok());

        s.vms[2].id = 0;
        assert_eq!(
            check_scenario(&s),
            Err(SanityError::DuplicateId { kind: "VM", id: 0 })
        );
    }

    #[test]
    fn test_check_population() {
        let population = vec![vec![0, 1, 0], vec![1, 1, 0]];
        assert!(check_population(&population, 2, 3).is_ok());
        assert_eq!(
            check_population(&population, 3, 3),
            Err(SanityError::PopulationSize { expected: 3, actual: 2 })
        );

        let ragged = vec![vec![0, 1, 0], vec![1, 1]];
        assert_eq!(
            check_population(&ragged, 2, 3),
            Err(SanityError::GeneCount {
                index: 1,
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_check_ledger() {
        let s = scenario();
        let chromosome = vec![0, 1, 0];
        let mut ledger = CapacityLedger::from_chromosome(&chromosome, &s.vms, &s.servers).unwrap();
        assert!(check_ledger(&ledger, &chromosome).is_ok());

        assert_eq!(
            check_ledger(&ledger, &[0, 0, 0]),
            Err(SanityError::StateMismatch {
                vm: 1,
                expected: 0,
                actual: 1
            })
        );

        ledger.deallocate(1, &s.vms[1]);
        ledger.allocate(0, &s.vms[0]).unwrap_err();
        assert!(check_ledger(&ledger, &chromosome).is_ok());
    }

    #[test]
    fn test_check_ledger_duplicate_hosting() {
        let servers = vec![Server::new(0, 10, 10)];
        let vms = vec![Vm::new(0, 2, 2)];
        let mut ledger = CapacityLedger::new(&servers);
        ledger.allocate(0, &vms[0]).unwrap();
        ledger.allocate(0, &vms[0]).unwrap();

        assert_eq!(
            check_ledger(&ledger, &[0]),
            Err(SanityError::DuplicateHosting { vm: 0, server: 0 })
        );
    }
}
