//! Parent selection.

use rand::seq::SliceRandom;
use rand::Rng;

/// Size of the elite pool parents are drawn from: the best 10%, at least 2.
pub fn selection_pool_size(population_len: usize) -> usize {
    (population_len / 10).max(2).min(population_len)
}

/// Elitist selection: draw `k` distinct individuals uniformly from the best
/// tenth of a population sorted by ascending fitness.
///
/// Returns fewer than `k` parents only when the population itself is smaller than `k`.
pub fn select_parents<'a, T, R: Rng + ?Sized>(sorted_population: &'a [T], k: usize, rng: &mut R) -> Vec<&'a T> {
    let pool = &sorted_population[..selection_pool_size(sorted_population.len())];
    pool.choose_multiple(rng, k).collect()
}
