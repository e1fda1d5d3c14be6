//! Gene vector operators.
//!
//! Genes are real numbers in `[0, 1)`. Initialization and mutation both draw from that
//! range, and crossover only exchanges existing values, so every gene of every
//! individual stays in `[0, 1)` for the whole run of the genetic algorithm.
//!
//! [`differential_trial`] is not bounded: `a + f * (b - c)` may leave the unit interval.

use rand::Rng;

/// Draws `len` genes uniformly from `[0, 1)`.
pub fn random<R>(rng: &mut R, len: usize) -> Vec<f64>
where
    R: Rng + ?Sized,
{
    (0..len).map(|_| rng.random::<f64>()).collect()
}

/// Uniform crossover: swaps each gene position independently with probability `indpb`.
///
/// Returns the number of swapped positions.
pub fn uniform_crossover<R>(a: &mut [f64], b: &mut [f64], indpb: f64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    let mut swapped = 0;
    for (x, y) in a.iter_mut().zip(b.iter_mut()) {
        if rng.random_bool(indpb) {
            std::mem::swap(x, y);
            swapped += 1;
        }
    }
    swapped
}

/// Uniform mutation: replaces each gene independently with probability `indpb` by a
/// fresh value from `[0, 1)`.
///
/// Returns the number of replaced genes.
pub fn mutate_uniform<R>(genes: &mut [f64], indpb: f64, rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    let mut replaced = 0;
    for gene in genes {
        if rng.random_bool(indpb) {
            *gene = rng.random::<f64>();
            replaced += 1;
        }
    }
    replaced
}

/// Builds a differential evolution trial vector from `agent` and three donors.
///
/// One random position, plus every other position with probability `cr`, takes the
/// mutant value `a + f * (b - c)`; the remaining positions keep the agent's gene.
pub fn differential_trial<R>(
    agent: &[f64],
    [a, b, c]: [&[f64]; 3],
    cr: f64,
    f: f64,
    rng: &mut R,
) -> Vec<f64>
where
    R: Rng + ?Sized,
{
    if agent.is_empty() {
        return vec![];
    }
    let forced = rng.random_range(0..agent.len());
    agent
        .iter()
        .enumerate()
        .map(|(i, &gene)| {
            if i == forced || rng.random_bool(cr) {
                a[i] + f * (b[i] - c[i])
            } else {
                gene
            }
        })
        .collect()
}
