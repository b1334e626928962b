//! Random selection helpers shared by the walks and the binary.

use rand::Rng;
use std::collections::HashSet;

use crate::positions::{Particle, Positions};

/// A uniformly random r-combination of {0, .., n-1}, by Floyd's algorithm
/// (Bentley, CACM 30-9).
pub fn random_combination<R: Rng + ?Sized>(r: usize, n: usize, rng: &mut R) -> Vec<usize> {
    assert!(n > 0 && r > 0 && r <= n);

    if r == n {
        return (0..n).collect();
    }

    let mut chosen: HashSet<usize> = HashSet::with_capacity(r);
    let mut v = Vec::with_capacity(r);
    for k in (n - r)..n {
        let x = rng.gen_range(0..=k);
        let a = if chosen.contains(&x) { k } else { x };
        v.push(a);
        chosen.insert(a);
    }

    debug_assert_eq!(v.len(), r);
    v
}

/// Pick a particle uniformly across all species.
pub fn choose_random_particle<R: Rng + ?Sized>(r: &Positions, rng: &mut R) -> Particle {
    let mut index = rng.gen_range(0..r.n_filled_total());
    for species in 0..r.n_species() {
        if index < r.n_filled(species) {
            return Particle::new(index, species);
        }
        index -= r.n_filled(species);
    }
    unreachable!("particle index beyond total filling");
}
