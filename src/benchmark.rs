//! Benchmarking and experimentation module.
//!
//! Runs every configured (crossover, mutation) pair over several seeds,
//! collects one record per run and aggregates them per strategy pair.

use crate::error::Result;
use crate::genetic::crossover::CrossoverStrategy;
use crate::genetic::engine::{self, EngineState, GAConfig};
use crate::genetic::mutation::MutationStrategy;
use crate::scenario::Scenario;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;

/// Result of a single engine run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Scenario name
    pub scenario: String,
    pub crossover: CrossoverStrategy,
    pub mutation: MutationStrategy,
    pub seed: u64,
    /// Servers used by the best placement (empty when infeasible)
    pub servers_used: Option<usize>,
    pub feasible: bool,
    pub generations: usize,
    pub termination: EngineState,
    /// Computation time in seconds
    pub time: f64,
    /// Percent above the scenario's lower bound on servers
    pub gap_to_lower_bound: Option<f64>,
}

/// Aggregated statistics for a strategy pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatistics {
    pub crossover: CrossoverStrategy,
    pub mutation: MutationStrategy,
    pub runs: usize,
    pub feasible_runs: usize,
    pub mean_servers: f64,
    pub std_servers: f64,
    pub min_servers: f64,
    pub max_servers: f64,
    pub mean_time: f64,
    pub mean_gap: Option<f64>,
}

impl StrategyStatistics {
    fn label(&self) -> String {
        format!("{} + {}", self.crossover, self.mutation)
    }
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Seeds per strategy pair
    pub runs: usize,
    /// Seed of the first run; run i uses base_seed + i
    pub base_seed: u64,
    /// Template for every run; crossover, mutation and seed are overridden
    pub ga: GAConfig,
    pub crossovers: Vec<CrossoverStrategy>,
    pub mutations: Vec<MutationStrategy>,
    /// Run the seeds of a pair in parallel
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            runs: 5,
            base_seed: 0,
            ga: GAConfig {
                parallel_evaluation: false,
                log_interval: 0,
                ..Default::default()
            },
            crossovers: CrossoverStrategy::ALL.to_vec(),
            mutations: MutationStrategy::ALL.to_vec(),
            parallel: true,
        }
    }
}

impl BenchmarkConfig {
    /// Keep only the given strategies; `None` leaves that axis unchanged.
    pub fn restricted_to(mut self, crossover: Option<CrossoverStrategy>, mutation: Option<MutationStrategy>) -> Self {
        if let Some(crossover) = crossover {
            self.crossovers = vec![crossover];
        }
        if let Some(mutation) = mutation {
            self.mutations = vec![mutation];
        }
        self
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<RunRecord>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    fn run_once(
        scenario: &Scenario,
        template: &GAConfig,
        crossover: CrossoverStrategy,
        mutation: MutationStrategy,
        seed: u64,
        lower_bound: Option<usize>,
    ) -> Result<RunRecord> {
        let config = GAConfig {
            crossover,
            mutation,
            seed,
            ..template.clone()
        };
        let result = engine::run(scenario, &config)?;

        let feasible = result.best_fitness.is_finite();
        let servers_used = feasible.then(|| result.best_fitness as usize);
        let gap_to_lower_bound = match (servers_used, lower_bound) {
            (Some(used), Some(lb)) if lb > 0 => Some((used as f64 - lb as f64) / lb as f64 * 100.0),
            _ => None,
        };

        Ok(RunRecord {
            scenario: scenario.name.clone(),
            crossover,
            mutation,
            seed,
            servers_used,
            feasible,
            generations: result.generations,
            termination: result.termination,
            time: result.elapsed,
            gap_to_lower_bound,
        })
    }

    /// Run every strategy pair on a scenario
    pub fn run(&mut self, scenario: &Scenario) -> Result<()> {
        scenario.check_capacity()?;
        let lower_bound = scenario.lower_bound_servers();
        log::info!(
            "Running benchmark on scenario {} ({} runs per strategy pair)",
            scenario.name,
            self.config.runs
        );

        let seeds: Vec<u64> = (0..self.config.runs as u64)
            .map(|i| self.config.base_seed + i)
            .collect();

        for &crossover in &self.config.crossovers {
            for &mutation in &self.config.mutations {
                let template = &self.config.ga;
                let records: Vec<RunRecord> = if self.config.parallel {
                    seeds
                        .par_iter()
                        .map(|&seed| Self::run_once(scenario, template, crossover, mutation, seed, lower_bound))
                        .collect::<Result<_>>()?
                } else {
                    seeds
                        .iter()
                        .map(|&seed| Self::run_once(scenario, template, crossover, mutation, seed, lower_bound))
                        .collect::<Result<_>>()?
                };

                log::info!(
                    "{} + {}: {} runs done",
                    crossover,
                    mutation,
                    records.len()
                );
                self.results.extend(records);
            }
        }
        Ok(())
    }

    /// Compute statistics for each strategy pair, best mean first
    pub fn compute_statistics(&self) -> Vec<StrategyStatistics> {
        let mut groups: Vec<((CrossoverStrategy, MutationStrategy), Vec<&RunRecord>)> = Vec::new();
        for record in &self.results {
            let key = (record.crossover, record.mutation);
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, records)) => records.push(record),
                None => groups.push((key, vec![record])),
            }
        }

        let mut statistics: Vec<StrategyStatistics> = groups
            .into_iter()
            .map(|((crossover, mutation), records)| {
                let servers: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.servers_used)
                    .map(|s| s as f64)
                    .collect();
                let times: Vec<f64> = records.iter().map(|r| r.time).collect();
                let gaps: Vec<f64> = records.iter().filter_map(|r| r.gap_to_lower_bound).collect();

                let (mean_servers, std_servers, min_servers, max_servers) = if servers.is_empty() {
                    (f64::NAN, f64::NAN, f64::NAN, f64::NAN)
                } else {
                    let std = if servers.len() > 1 { servers.iter().std_dev() } else { 0.0 };
                    (
                        servers.iter().mean(),
                        std,
                        Statistics::min(servers.iter()),
                        Statistics::max(servers.iter()),
                    )
                };

                StrategyStatistics {
                    crossover,
                    mutation,
                    runs: records.len(),
                    feasible_runs: servers.len(),
                    mean_servers,
                    std_servers,
                    min_servers,
                    max_servers,
                    mean_time: times.iter().mean(),
                    mean_gap: (!gaps.is_empty()).then(|| gaps.iter().mean()),
                }
            })
            .collect();

        statistics.sort_by(|a, b| a.mean_servers.total_cmp(&b.mean_servers));
        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("    VM Consolidation Benchmark Report\n");
        report.push_str("========================================\n\n");

        let stats = self.compute_statistics();

        report.push_str("Strategy Performance Summary:\n");
        report.push_str("-".repeat(80).as_str());
        report.push('\n');
        report.push_str(&format!(
            "{:<25} {:>9} {:>10} {:>8} {:>6} {:>6} {:>10}\n",
            "Strategy", "Feasible", "Mean Srv", "Std", "Min", "Max", "Avg Time"
        ));
        report.push_str("-".repeat(80).as_str());
        report.push('\n');

        for stat in &stats {
            report.push_str(&format!(
                "{:<25} {:>9} {:>10.2} {:>8.2} {:>6} {:>6} {:>10.4}\n",
                stat.label(),
                format!("{}/{}", stat.feasible_runs, stat.runs),
                stat.mean_servers,
                stat.std_servers,
                stat.min_servers,
                stat.max_servers,
                stat.mean_time
            ));
        }

        report.push_str("-".repeat(80).as_str());
        report.push('\n');

        let best = self
            .results
            .iter()
            .filter_map(|r| r.servers_used.map(|s| (s, r)))
            .min_by_key(|(s, _)| *s);
        if let Some((servers, record)) = best {
            report.push_str(&format!(
                "\nBest placement: {} servers ({} + {}, seed {})\n",
                servers, record.crossover, record.mutation, record.seed
            ));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[RunRecord] {
        &self.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datacenter::{Server, Vm};

    fn scenario() -> Scenario {
        Scenario::new(
            "bench",
            (0..4).map(|i| Server::new(i, 10, 10)).collect(),
            (0..6).map(|i| Vm::new(i, 2 + i as u64 % 2, 3)).collect(),
        )
    }

    fn small_config() -> BenchmarkConfig {
        BenchmarkConfig {
            runs: 2,
            ga: GAConfig {
                population_size: 12,
                max_generations: 15,
                max_stagnant_generations: 5,
                parallel_evaluation: false,
                log_interval: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn record(crossover: CrossoverStrategy, servers_used: Option<usize>, time: f64) -> RunRecord {
        RunRecord {
            scenario: "s".to_string(),
            crossover,
            mutation: MutationStrategy::Swap,
            seed: 0,
            servers_used,
            feasible: servers_used.is_some(),
            generations: 1,
            termination: EngineState::Converged,
            time,
            gap_to_lower_bound: servers_used.map(|s| (s as f64 - 2.0) / 2.0 * 100.0),
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.runs, 5);
        assert_eq!(config.crossovers.len() * config.mutations.len(), 9);
    }

    #[test]
    fn test_restricted_strategies() {
        let config = BenchmarkConfig::default().restricted_to(Some(CrossoverStrategy::DominantAntiCancer), None);
        assert_eq!(config.crossovers, vec![CrossoverStrategy::DominantAntiCancer]);
        assert_eq!(config.mutations.len(), 3);

        let config = small_config().restricted_to(None, Some(MutationStrategy::RobinHood));
        let mut bench = Benchmark::new(config);
        bench.run(&scenario()).unwrap();
        assert_eq!(bench.results().len(), 6);
        assert!(bench.results().iter().all(|r| r.mutation == MutationStrategy::RobinHood));
    }

    #[test]
    fn test_every_pair_runs_every_seed() {
        let mut bench = Benchmark::new(small_config());
        bench.run(&scenario()).unwrap();

        assert_eq!(bench.results().len(), 18);
        assert!(bench.results().iter().all(|r| r.feasible));
        assert!(bench.results().iter().all(|r| r.gap_to_lower_bound.unwrap() >= 0.0));

        let stats = bench.compute_statistics();
        assert_eq!(stats.len(), 9);
        assert!(stats.iter().all(|s| s.runs == 2 && s.feasible_runs == 2));
        for pair in stats.windows(2) {
            assert!(pair[0].mean_servers <= pair[1].mean_servers);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut parallel = Benchmark::new(small_config());
        let mut sequential = Benchmark::new(BenchmarkConfig {
            parallel: false,
            ..small_config()
        });
        parallel.run(&scenario()).unwrap();
        sequential.run(&scenario()).unwrap();

        let used = |b: &Benchmark| b.results().iter().map(|r| (r.seed, r.servers_used)).collect::<Vec<_>>();
        assert_eq!(used(&parallel), used(&sequential));
    }

    #[test]
    fn test_statistics() {
        let mut bench = Benchmark::new(BenchmarkConfig::default());
        bench.results = vec![
            record(CrossoverStrategy::Uniform, Some(3), 1.0),
            record(CrossoverStrategy::Uniform, Some(5), 3.0),
            record(CrossoverStrategy::Uniform, None, 2.0),
            record(CrossoverStrategy::ConsensusPartition, Some(2), 1.0),
        ];

        let stats = bench.compute_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].crossover, CrossoverStrategy::ConsensusPartition);
        assert_eq!(stats[0].std_servers, 0.0);
        assert_eq!(stats[0].mean_gap, Some(0.0));

        let uniform = &stats[1];
        assert_eq!((uniform.runs, uniform.feasible_runs), (3, 2));
        assert_eq!(uniform.mean_servers, 4.0);
        assert_eq!((uniform.min_servers, uniform.max_servers), (3.0, 5.0));
        assert!((uniform.std_servers - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(uniform.mean_time, 2.0);

        let report = bench.generate_report();
        assert!(report.contains("Benchmark Report"));
        assert!(report.contains("Best placement: 2 servers"));
    }

    #[test]
    fn test_infeasible_scenario_is_rejected() {
        let mut s = scenario();
        s.vms.push(Vm::new(6, 40, 1));
        let mut bench = Benchmark::new(small_config());
        assert!(bench.run(&s).is_err());
        assert!(bench.results().is_empty());
    }

    #[test]
    fn test_csv_export() {
        let mut bench = Benchmark::new(BenchmarkConfig::default());
        bench.results = vec![
            record(CrossoverStrategy::Uniform, Some(3), 1.0),
            record(CrossoverStrategy::Uniform, None, 2.0),
        ];
        let dir = std::env::temp_dir().join(format!("vm-consolidation-bench-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        bench.export_to_csv(dir.join("results.csv")).unwrap();
        bench.export_statistics_csv(dir.join("statistics.csv")).unwrap();

        let mut reader = csv::Reader::from_path(dir.join("results.csv")).unwrap();
        let rows: Vec<RunRecord> = reader.deserialize().collect::<std::result::Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].servers_used, None);
        assert_eq!(rows[0].crossover, CrossoverStrategy::Uniform);
        std::fs::remove_dir_all(&dir).ok();
    }
}
