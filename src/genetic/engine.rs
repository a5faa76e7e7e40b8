//! Generational loop.
//!
//! Each generation is evaluated, sorted by ascending fitness and used to
//! breed the next one: the elite is copied unchanged, the rest is filled
//! with mutated crossover children of parents drawn from the best tenth.
//! The run stops when the best fitness has not improved for
//! `max_stagnant_generations` generations (converged) or when
//! `max_generations` generations have been evaluated (exhausted).

use super::crossover::CrossoverStrategy;
use super::fitness::evaluate_population;
use super::initialization::generate_round_robin_population;
use super::mutation::MutationStrategy;
use super::selection::select_parents;
use super::Chromosome;
use crate::error::{ConfigError, Result};
use crate::sanity;
use crate::scenario::Scenario;
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineState {
    Initializing,
    Evaluating,
    Evolving,
    /// No improvement for `max_stagnant_generations` generations
    Converged,
    /// Generation cap reached
    Exhausted,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EngineState::Initializing => "initializing",
            EngineState::Evaluating => "evaluating",
            EngineState::Evolving => "evolving",
            EngineState::Converged => "converged",
            EngineState::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

/// Genetic Algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GAConfig {
    /// Population size
    pub population_size: usize,
    /// Hard cap on evaluated generations
    pub max_generations: usize,
    /// Generations without improvement before the run is declared converged
    pub max_stagnant_generations: usize,
    /// Crossover operator
    pub crossover: CrossoverStrategy,
    /// Mutation operator
    pub mutation: MutationStrategy,
    /// Probability that the mutation operator is applied to a child
    pub mutation_probability: f64,
    /// Best individuals copied unchanged into the next generation
    pub elitism_size: usize,
    /// Random seed
    pub seed: u64,
    /// Evaluate each generation on the rayon thread pool
    pub parallel_evaluation: bool,
    /// Check population structure after every generation
    pub sanity_checks: bool,
    /// Log progress every this many generations (0 disables)
    pub log_interval: usize,
}

impl Default for GAConfig {
    fn default() -> Self {
        GAConfig {
            population_size: 100,
            max_generations: 1000,
            max_stagnant_generations: 200,
            crossover: CrossoverStrategy::ConsensusPartition,
            mutation: MutationStrategy::Swap,
            mutation_probability: 0.5,
            elitism_size: 2,
            seed: 42,
            parallel_evaluation: true,
            sanity_checks: true,
            log_interval: 10,
        }
    }
}

impl GAConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::PopulationTooSmall(self.population_size));
        }
        if self.elitism_size > self.population_size {
            return Err(ConfigError::ElitismTooLarge {
                elitism: self.elitism_size,
                population: self.population_size,
            });
        }
        if self.max_stagnant_generations == 0 {
            return Err(ConfigError::StagnationLimit);
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(ConfigError::MutationProbability(self.mutation_probability));
        }
        if self.population_size < 10 {
            log::warn!(
                "Population of {} is below 10: parents always come from the two best individuals",
                self.population_size
            );
        }
        Ok(())
    }
}

/// Individual in the genetic algorithm population
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub chromosome: Chromosome,
    /// Servers used, +infinity when infeasible
    pub fitness: f64,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct GAResult {
    pub best: Chromosome,
    pub best_fitness: f64,
    /// Best fitness of every evaluated generation, in order
    pub fitness_history: Vec<f64>,
    pub generations: usize,
    pub termination: EngineState,
    /// Wall-clock time in seconds
    pub elapsed: f64,
}

/// Genetic Algorithm implementation
pub struct GeneticAlgorithm<'a> {
    config: GAConfig,
    scenario: &'a Scenario,
    population: Vec<Chromosome>,
    best_individual: Option<Individual>,
    rng: ChaCha8Rng,
    generation: usize,
    no_improve_count: usize,
    history: Vec<f64>,
    state: EngineState,
}

impl<'a> GeneticAlgorithm<'a> {
    pub fn new(scenario: &'a Scenario, config: GAConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        GeneticAlgorithm {
            config,
            scenario,
            population: Vec::new(),
            best_individual: None,
            rng,
            generation: 0,
            no_improve_count: 0,
            history: Vec::new(),
            state: EngineState::Initializing,
        }
    }

    fn initialize_population(&mut self) -> Result<()> {
        self.population = generate_round_robin_population(
            &self.scenario.vms,
            &self.scenario.servers,
            self.config.population_size,
        );
        if self.config.sanity_checks {
            sanity::check_population(&self.population, self.config.population_size, self.scenario.num_vms())?;
        }
        log::info!(
            "Initialized population of {} ({} VMs on {} servers)",
            self.population.len(),
            self.scenario.num_vms(),
            self.scenario.num_servers()
        );
        Ok(())
    }

    /// Score the current population, return it sorted best first and
    /// update the best-so-far record and stagnation counter.
    fn evaluate(&mut self) -> Vec<Individual> {
        let scores = evaluate_population(
            &self.population,
            &self.scenario.vms,
            &self.scenario.servers,
            self.config.parallel_evaluation,
        );

        let mut ranked: Vec<Individual> = self
            .population
            .iter()
            .cloned()
            .zip(scores)
            .map(|(chromosome, fitness)| Individual { chromosome, fitness })
            .collect();
        ranked.sort_by_key(|ind| OrderedFloat(ind.fitness));

        let generation_best = &ranked[0];
        self.history.push(generation_best.fitness);

        let improved = generation_best.fitness < self.best_fitness();
        if improved || self.best_individual.is_none() {
            self.best_individual = Some(generation_best.clone());
        }
        if improved {
            self.no_improve_count = 0;
        } else {
            self.no_improve_count += 1;
        }

        ranked
    }

    /// Create new generation
    fn evolve(&mut self, ranked: &[Individual]) {
        let size = self.config.population_size;
        let vms = &self.scenario.vms;
        let servers = &self.scenario.servers;

        let mut new_population: Vec<Chromosome> = Vec::with_capacity(size);
        new_population.extend(
            ranked
                .iter()
                .take(self.config.elitism_size)
                .map(|ind| ind.chromosome.clone()),
        );

        while new_population.len() < size {
            let parents = select_parents(ranked, 2, &mut self.rng);
            let (parent_a, parent_b) = (&parents[0].chromosome, &parents[1].chromosome);

            let (child_a, child_b) = self.config.crossover.cross(parent_a, parent_b, vms, servers, &mut self.rng);
            let p = self.config.mutation_probability;
            let child_a = self.config.mutation.mutate(&child_a, vms, servers, p, &mut self.rng);
            let child_b = self.config.mutation.mutate(&child_b, vms, servers, p, &mut self.rng);

            new_population.push(child_a);
            if new_population.len() < size {
                new_population.push(child_b);
            }
        }

        self.population = new_population;
    }

    /// Run the genetic algorithm until it converges or exhausts its generations.
    ///
    /// Fails without running any generation when the configuration is
    /// invalid or the scenario's total demand exceeds its total capacity.
    pub fn run(&mut self) -> Result<GAResult> {
        let start = Instant::now();

        self.config.validate()?;
        self.scenario.check_capacity()?;

        self.state = EngineState::Initializing;
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.generation = 0;
        self.no_improve_count = 0;
        self.history.clear();
        self.best_individual = None;

        self.initialize_population()?;
        self.state = EngineState::Evaluating;

        loop {
            if self.generation >= self.config.max_generations {
                self.state = EngineState::Exhausted;
                log::info!("Generation cap of {} reached", self.config.max_generations);
                break;
            }

            let ranked = self.evaluate();

            if self.config.log_interval > 0 && self.generation % self.config.log_interval == 0 {
                log::info!(
                    "Generation {}: best fitness {}  diversity {:.2}  elapsed {:.2}s",
                    self.generation,
                    ranked[0].fitness,
                    self.population_diversity(),
                    start.elapsed().as_secs_f64()
                );
            }

            if self.no_improve_count >= self.config.max_stagnant_generations {
                self.state = EngineState::Converged;
                log::info!("Converged at generation {}", self.generation);
                break;
            }

            self.state = EngineState::Evolving;
            self.evolve(&ranked);
            if self.config.sanity_checks {
                sanity::check_population(&self.population, self.config.population_size, self.scenario.num_vms())?;
            }
            self.generation += 1;
            self.state = EngineState::Evaluating;
        }

        let best = match self.best_individual.clone() {
            Some(best) => best,
            None => self.best_of_current_population(),
        };

        log::info!(
            "Run finished ({}): best fitness {} after {} generations",
            self.state,
            best.fitness,
            self.history.len()
        );

        Ok(GAResult {
            best: best.chromosome,
            best_fitness: best.fitness,
            fitness_history: self.history.clone(),
            generations: self.history.len(),
            termination: self.state,
            elapsed: start.elapsed().as_secs_f64(),
        })
    }

    /// Used when no generation was evaluated (zero generation cap)
    fn best_of_current_population(&self) -> Individual {
        let scores = evaluate_population(&self.population, &self.scenario.vms, &self.scenario.servers, false);
        self.population
            .iter()
            .zip(scores)
            .min_by_key(|(_, f)| OrderedFloat(*f))
            .map(|(c, f)| Individual { chromosome: c.clone(), fitness: f })
            .unwrap_or(Individual {
                chromosome: Vec::new(),
                fitness: f64::INFINITY,
            })
    }

    fn best_fitness(&self) -> f64 {
        self.best_individual
            .as_ref()
            .map_or(f64::INFINITY, |ind| ind.fitness)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Get population diversity (average Hamming distance between the first individuals)
    pub fn population_diversity(&self) -> f64 {
        let sample = &self.population[..self.population.len().min(20)];
        if sample.len() < 2 {
            return 0.0;
        }

        let mut total_diff = 0.0;
        let mut count = 0;
        for i in 0..sample.len() {
            for j in i + 1..sample.len() {
                let diff = sample[i].iter().zip(&sample[j]).filter(|(a, b)| a != b).count();
                total_diff += diff as f64;
                count += 1;
            }
        }
        total_diff / count as f64
    }
}

/// Run the engine on a scenario: best placement plus per-generation history.
pub fn run(scenario: &Scenario, config: &GAConfig) -> Result<GAResult> {
    GeneticAlgorithm::new(scenario, config.clone()).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacenter::{Server, Vm};
    use crate::error::{Error, ScenarioError};
    use crate::genetic::fitness::fitness;

    fn spread_scenario() -> Scenario {
        Scenario::new(
            "spread",
            (0..4).map(|i| Server::new(i, 10, 10)).collect(),
            (0..4).map(|i| Vm::new(i, 2, 2)).collect(),
        )
    }

    fn scenario_a() -> Scenario {
        Scenario::new(
            "a",
            vec![Server::new(0, 4, 8), Server::new(1, 4, 8)],
            vec![Vm::new(0, 2, 4), Vm::new(1, 2, 4), Vm::new(2, 2, 4)],
        )
    }

    #[test]
    fn test_robin_hood_consolidates_to_one_server() {
        let scenario = spread_scenario();
        let config = GAConfig {
            population_size: 20,
            max_generations: 100,
            max_stagnant_generations: 10,
            mutation: MutationStrategy::RobinHood,
            mutation_probability: 1.0,
            ..Default::default()
        };

        let result = run(&scenario, &config).unwrap();
        assert_eq!(result.best_fitness, 1.0);
        assert_eq!(result.termination, EngineState::Converged);
        assert_eq!(fitness(&result.best, &scenario.vms, &scenario.servers), 1.0);
        assert_eq!(result.fitness_history[0], 4.0);
    }

    #[test]
    fn test_history_never_worsens_with_elitism() {
        let scenario = Scenario::new(
            "mixed",
            (0..6).map(|i| Server::new(i, 8 + i as u64, 16)).collect(),
            (0..14).map(|i| Vm::new(i, 1 + i as u64 % 3, 2 + i as u64 % 5)).collect(),
        );

        for crossover in CrossoverStrategy::ALL {
            for mutation in MutationStrategy::ALL {
                let config = GAConfig {
                    population_size: 30,
                    max_generations: 25,
                    max_stagnant_generations: 25,
                    crossover,
                    mutation,
                    ..Default::default()
                };
                let result = run(&scenario, &config).unwrap();
                assert!(result.best_fitness.is_finite());
                for pair in result.fitness_history.windows(2) {
                    assert!(pair[1] <= pair[0], "{} / {}: {:?}", crossover, mutation, result.fitness_history);
                }
                assert_eq!(result.best_fitness, *result.fitness_history.last().unwrap());
            }
        }
    }

    #[test]
    fn test_exhausted_at_generation_cap() {
        let config = GAConfig {
            population_size: 12,
            max_generations: 3,
            max_stagnant_generations: 100,
            ..Default::default()
        };

        let result = run(&scenario_a(), &config).unwrap();
        assert_eq!(result.termination, EngineState::Exhausted);
        assert_eq!(result.fitness_history, vec![2.0, 2.0, 2.0]);
        assert_eq!(result.generations, 3);
    }

    #[test]
    fn test_zero_generations_reports_initial_best() {
        let config = GAConfig {
            population_size: 12,
            max_generations: 0,
            ..Default::default()
        };

        let result = run(&scenario_a(), &config).unwrap();
        assert_eq!(result.termination, EngineState::Exhausted);
        assert!(result.fitness_history.is_empty());
        assert_eq!(result.best, vec![0, 1, 0]);
        assert_eq!(result.best_fitness, 2.0);
    }

    #[test]
    fn test_infeasible_scenario_runs_nothing() {
        let mut scenario = scenario_a();
        scenario.vms.push(Vm::new(3, 4, 4));

        let err = run(&scenario, &GAConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Scenario(ScenarioError::Infeasible { .. })));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = GAConfig {
            population_size: 4,
            elitism_size: 5,
            ..Default::default()
        };
        assert!(matches!(run(&scenario_a(), &config), Err(Error::Config(_))));

        let config = GAConfig {
            mutation_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GAConfig {
            max_stagnant_generations: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::StagnationLimit));
    }

    #[test]
    fn test_odd_offspring_slots_keep_population_size() {
        let scenario = spread_scenario();
        let config = GAConfig {
            population_size: 11,
            elitism_size: 2,
            mutation: MutationStrategy::RobinHood,
            ..Default::default()
        };
        let mut ga = GeneticAlgorithm::new(&scenario, config);
        ga.initialize_population().unwrap();

        for _ in 0..3 {
            let ranked = ga.evaluate();
            ga.evolve(&ranked);
            assert_eq!(ga.population.len(), 11);
        }

        let config = GAConfig {
            population_size: 7,
            elitism_size: 0,
            max_generations: 5,
            ..Default::default()
        };
        let result = run(&scenario, &config).unwrap();
        assert_eq!(result.generations, 5);
    }

    #[test]
    fn test_same_seed_same_result() {
        let scenario = spread_scenario();
        let config = GAConfig {
            population_size: 20,
            max_generations: 15,
            mutation: MutationStrategy::SmartMove,
            crossover: CrossoverStrategy::Uniform,
            ..Default::default()
        };

        let first = run(&scenario, &config).unwrap();
        let second = run(&scenario, &config).unwrap();
        assert_eq!(first.best, second.best);
        assert_eq!(first.fitness_history, second.fitness_history);
    }

    #[test]
    fn test_diversity_of_homogeneous_population_is_zero() {
        let scenario = spread_scenario();
        let mut ga = GeneticAlgorithm::new(&scenario, GAConfig::default());
        ga.initialize_population().unwrap();
        assert_eq!(ga.population_diversity(), 0.0);
        assert_eq!(ga.state(), EngineState::Initializing);
    }
}
