//! Swapped-system bookkeeping for Renyi walks.
//!
//! Given two wavefunction copies phialpha1 and phialpha2 and a subsystem A,
//! this tracks the two amplitudes phibeta1 and phibeta2 of the
//! subsystem-swapped configurations: phibeta1 carries phialpha1's particles
//! with every A-particle's position replaced by its paired A-particle
//! position from the other copy, and symmetrically for phibeta2. A
//! per-species pairing list matches A-particles of copy 1 with A-particles
//! of copy 2 in an arbitrary but fixed order; new entrants pair at the tail.
//!
//! The swap is only defined while both copies hold equally many A-particles
//! of every species, which is a hard precondition of `update`.
//!
//! `update` must be called after the alpha amplitudes have been updated;
//! references to them are passed in rather than stored, so this type owns
//! only the two beta amplitudes.

use std::sync::Arc;

use crate::positions::{Particle, Positions, SingleParticleMove};
use crate::subsystem::SimpleSubsystem;
use crate::wavefunction::WavefunctionAmplitude;

/// Recheck the beta configurations against the swap definition after every
/// commit. Costly, so only in debug builds.
const CAREFUL_VERIFICATION: bool = cfg!(debug_assertions);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Ready,
    UpdateInProgress,
}

#[derive(Debug, Clone)]
pub struct SwappedSystem<const D: usize> {
    subsystem: Arc<SimpleSubsystem<D>>,
    phibeta1: Option<Arc<WavefunctionAmplitude<D>>>,
    phibeta2: Option<Arc<WavefunctionAmplitude<D>>>,
    phibeta1_dirty: bool,
    phibeta2_dirty: bool,
    /// Per species: particle indices of copy 1 / copy 2 inside the
    /// subsystem, pairwise matched by list position.
    copy1_subsystem_indices: Vec<Vec<usize>>,
    copy2_subsystem_indices: Vec<Vec<usize>>,
    state: State,
    // saved for cancellation
    recent_delta: i32,
    recent_particle1: Option<Particle>,
    recent_particle2: Option<Particle>,
}

impl<const D: usize> SwappedSystem<D> {
    pub fn new(subsystem: Arc<SimpleSubsystem<D>>) -> Self {
        SwappedSystem {
            subsystem,
            phibeta1: None,
            phibeta2: None,
            phibeta1_dirty: false,
            phibeta2_dirty: false,
            copy1_subsystem_indices: Vec::new(),
            copy2_subsystem_indices: Vec::new(),
            state: State::Uninitialized,
            recent_delta: 0,
            recent_particle1: None,
            recent_particle2: None,
        }
    }

    pub fn subsystem(&self) -> &Arc<SimpleSubsystem<D>> {
        &self.subsystem
    }

    pub fn phibeta1(&self) -> &WavefunctionAmplitude<D> {
        assert!(self.state != State::Uninitialized);
        self.phibeta1.as_ref().unwrap()
    }

    pub fn phibeta2(&self) -> &WavefunctionAmplitude<D> {
        assert!(self.state != State::Uninitialized);
        self.phibeta2.as_ref().unwrap()
    }

    /// Build the pairing lists and beta amplitudes from the current alpha
    /// configurations. Both copies must hold the same number of A-particles
    /// of each species.
    pub fn initialize(
        &mut self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        assert!(self.state == State::Uninitialized);

        let r1 = phialpha1.positions();
        let r2 = phialpha2.positions();
        assert_eq!(r1.n_species(), r2.n_species());
        for species in 0..r1.n_species() {
            assert_eq!(r1.n_filled(species), r2.n_filled(species));
        }
        assert_eq!(r1.n_sites(), r2.n_sites());

        let lattice = phialpha1.lattice();
        let n_species = r1.n_species();
        self.copy1_subsystem_indices = vec![Vec::new(); n_species];
        self.copy2_subsystem_indices = vec![Vec::new(); n_species];
        for species in 0..n_species {
            for index in 0..r1.n_filled(species) {
                let particle = Particle::new(index, species);
                if self.subsystem.contains(r1[particle], lattice) {
                    self.copy1_subsystem_indices[species].push(index);
                }
                if self.subsystem.contains(r2[particle], lattice) {
                    self.copy2_subsystem_indices[species].push(index);
                }
            }
        }

        assert!(
            self.subsystem_particle_counts_match(),
            "subsystem particle counts differ between the copies"
        );
        self.reinitialize_phibetas(phialpha1, phialpha2);

        self.state = State::Ready;
    }

    /// Propagate the alpha updates into the betas. At most one particle may
    /// have moved in each copy; if the subsystem occupation changed, it must
    /// have changed identically in both copies.
    pub fn update(
        &mut self,
        particle1: Option<Particle>,
        particle2: Option<Particle>,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        assert!(self.state == State::Ready);
        self.state = State::UpdateInProgress;

        let r1 = phialpha1.positions();
        let r2 = phialpha2.positions();
        debug_assert_eq!(r1.n_species(), r2.n_species());

        assert!(particle1.map_or(true, |p| r1.particle_is_valid(p)));
        assert!(particle2.map_or(true, |p| r2.particle_is_valid(p)));

        let lattice = phialpha1.lattice();

        // pairing position of each moved particle before the move, if it was
        // inside the subsystem
        let pairing_index1 = particle1.and_then(|p| {
            self.copy1_subsystem_indices[p.species]
                .iter()
                .position(|&i| i == p.index)
        });
        let pairing_index2 = particle2.and_then(|p| {
            self.copy2_subsystem_indices[p.species]
                .iter()
                .position(|&i| i == p.index)
        });

        let now_in_1 = particle1.map_or(false, |p| self.subsystem.contains(r1[p], lattice));
        let now_in_2 = particle2.map_or(false, |p| self.subsystem.contains(r2[p], lattice));

        let delta1 = (now_in_1 as i32) - (pairing_index1.is_some() as i32);
        let delta2 = (now_in_2 as i32) - (pairing_index2.is_some() as i32);

        assert!(particle1.is_some() || delta1 == 0);
        assert!(particle2.is_some() || delta2 == 0);
        assert_eq!(delta1, delta2, "subsystem occupation must change identically");
        let delta = delta1;

        assert!(
            delta == 0
                || (particle1.is_some()
                    && particle2.is_some()
                    && particle1.unwrap().species == particle2.unwrap().species),
            "paired boundary crossings must involve one particle of the same species in each copy"
        );
        assert!(delta == 0 || now_in_1 == now_in_2);
        // a single beta update per copy: when the particle number is not
        // changing, only one copy may move a particle
        assert!(delta != 0 || particle1.is_none() || particle2.is_none());

        self.recent_delta = delta;
        self.recent_particle1 = particle1;
        self.recent_particle2 = particle2;

        if delta == -1 {
            // one particle of the same species leaves each subsystem copy;
            // the remaining subsystem particles may need re-pairing
            let particle1 = particle1.unwrap();
            let particle2 = particle2.unwrap();
            let p1 = pairing_index1.expect("departing particle must have been inside");
            let p2 = pairing_index2.expect("departing particle must have been inside");
            debug_assert!(!now_in_1 && !now_in_2);

            let species = particle1.species;

            if p1 != p2 {
                // move the departing pair to the larger pairing index in
                // both copies, keeping the bijection of the remaining pairs
                let c1_a = self.copy1_subsystem_indices[species][p1];
                let c1_b = self.copy1_subsystem_indices[species][p2];
                let c2_a = self.copy2_subsystem_indices[species][p1];
                let c2_b = self.copy2_subsystem_indices[species][p2];
                Arc::make_mut(self.phibeta1.as_mut().unwrap()).swap_particles(c1_a, c1_b, species);
                Arc::make_mut(self.phibeta2.as_mut().unwrap()).swap_particles(c2_a, c2_b, species);
                if p1 < p2 {
                    self.copy1_subsystem_indices[species].swap(p1, p2);
                } else {
                    self.copy2_subsystem_indices[species].swap(p1, p2);
                }
            }

            let max_index = p1.max(p2);
            debug_assert!(!self.phibeta1_dirty && !self.phibeta2_dirty);
            let beta1_particle = Particle::new(
                self.copy1_subsystem_indices[species][max_index],
                species,
            );
            let beta2_particle = Particle::new(
                self.copy2_subsystem_indices[species][max_index],
                species,
            );
            Arc::make_mut(self.phibeta1.as_mut().unwrap()).perform_move(vec![
                SingleParticleMove {
                    particle: beta1_particle,
                    destination: r1[particle1],
                },
            ]);
            Arc::make_mut(self.phibeta2.as_mut().unwrap()).perform_move(vec![
                SingleParticleMove {
                    particle: beta2_particle,
                    destination: r2[particle2],
                },
            ]);
            self.phibeta1_dirty = true;
            self.phibeta2_dirty = true;

            // drop the departed pair from both lists
            let c1_s = &mut self.copy1_subsystem_indices[species];
            c1_s.swap_remove(max_index);
            let c2_s = &mut self.copy2_subsystem_indices[species];
            c2_s.swap_remove(max_index);
        } else {
            debug_assert!(delta == 0 || delta == 1);

            // either the particles moved without crossing the boundary, or
            // both entered the subsystem and pair with each other at the tail
            let (pairing_index1, pairing_index2) = if delta == 1 {
                let particle1 = particle1.unwrap();
                let particle2 = particle2.unwrap();
                let c1_s = &mut self.copy1_subsystem_indices[particle1.species];
                c1_s.push(particle1.index);
                let i1 = c1_s.len() - 1;
                let c2_s = &mut self.copy2_subsystem_indices[particle2.species];
                c2_s.push(particle2.index);
                let i2 = c2_s.len() - 1;
                (Some(i1), Some(i2))
            } else {
                (pairing_index1, pairing_index2)
            };

            debug_assert!(self.subsystem_particle_counts_match());

            if let Some(particle1) = particle1 {
                // a move inside A lands in the other copy's beta; a move
                // outside A lands in this copy's own beta
                let beta_particle = if now_in_1 {
                    Particle::new(
                        self.copy2_subsystem_indices[particle1.species][pairing_index1.unwrap()],
                        particle1.species,
                    )
                } else {
                    particle1
                };
                let (phibeta, dirty) = if now_in_1 {
                    (&mut self.phibeta2, &mut self.phibeta2_dirty)
                } else {
                    (&mut self.phibeta1, &mut self.phibeta1_dirty)
                };
                assert!(!*dirty, "beta amplitude already has a move in flight");
                Arc::make_mut(phibeta.as_mut().unwrap()).perform_move(vec![SingleParticleMove {
                    particle: beta_particle,
                    destination: r1[particle1],
                }]);
                *dirty = true;
            }

            if let Some(particle2) = particle2 {
                let beta_particle = if now_in_2 {
                    Particle::new(
                        self.copy1_subsystem_indices[particle2.species][pairing_index2.unwrap()],
                        particle2.species,
                    )
                } else {
                    particle2
                };
                let (phibeta, dirty) = if now_in_2 {
                    (&mut self.phibeta1, &mut self.phibeta1_dirty)
                } else {
                    (&mut self.phibeta2, &mut self.phibeta2_dirty)
                };
                // with delta == 1 the two updates land on different betas,
                // so this can never still be dirty here
                assert!(!*dirty, "beta amplitude already has a move in flight");
                Arc::make_mut(phibeta.as_mut().unwrap()).perform_move(vec![SingleParticleMove {
                    particle: beta_particle,
                    destination: r2[particle2],
                }]);
                *dirty = true;
            }
        }
    }

    /// Commit the staged beta moves and the pairing-list changes.
    pub fn finish_update(
        &mut self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        assert!(self.state == State::UpdateInProgress);
        self.state = State::Ready;

        assert!(self.subsystem_particle_counts_match());

        if self.phibeta1_dirty {
            Arc::make_mut(self.phibeta1.as_mut().unwrap()).finish_move();
        }
        self.phibeta1_dirty = false;
        if self.phibeta2_dirty {
            Arc::make_mut(self.phibeta2.as_mut().unwrap()).finish_move();
        }
        self.phibeta2_dirty = false;

        if CAREFUL_VERIFICATION {
            self.verify_phibetas(phialpha1, phialpha2);
        }
    }

    /// Roll back the staged beta moves and the pairing-list changes.
    pub fn cancel_update(
        &mut self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        assert!(self.state == State::UpdateInProgress);
        self.state = State::Ready;

        if self.phibeta1_dirty {
            Arc::make_mut(self.phibeta1.as_mut().unwrap()).cancel_move();
        }
        self.phibeta1_dirty = false;
        if self.phibeta2_dirty {
            Arc::make_mut(self.phibeta2.as_mut().unwrap()).cancel_move();
        }
        self.phibeta2_dirty = false;

        if self.recent_delta != 0 {
            let particle1 = self.recent_particle1.unwrap();
            let particle2 = self.recent_particle2.unwrap();
            debug_assert_eq!(particle1.species, particle2.species);
            let species = particle1.species;
            if self.recent_delta == 1 {
                // the entrants had paired at the tail; drop them again
                self.copy1_subsystem_indices[species].pop();
                self.copy2_subsystem_indices[species].pop();
            } else {
                debug_assert_eq!(self.recent_delta, -1);
                // the departers return to the subsystem, re-pairing at the
                // tail
                self.copy1_subsystem_indices[species].push(particle1.index);
                self.copy2_subsystem_indices[species].push(particle2.index);
            }
        }

        assert!(self.subsystem_particle_counts_match());

        if CAREFUL_VERIFICATION {
            self.verify_phibetas(phialpha1, phialpha2);
        }
    }

    fn subsystem_particle_counts_match(&self) -> bool {
        debug_assert_eq!(
            self.copy1_subsystem_indices.len(),
            self.copy2_subsystem_indices.len()
        );
        self.copy1_subsystem_indices
            .iter()
            .zip(self.copy2_subsystem_indices.iter())
            .all(|(a, b)| a.len() == b.len())
    }

    /// Swapped configurations implied by the current pairing lists.
    fn swapped_positions(
        &self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) -> (Positions, Positions) {
        let r1 = phialpha1.positions();
        let r2 = phialpha2.positions();

        let mut v1: Vec<Vec<usize>> = (0..r1.n_species())
            .map(|s| r1.r_vector(s).to_vec())
            .collect();
        let mut v2: Vec<Vec<usize>> = (0..r2.n_species())
            .map(|s| r2.r_vector(s).to_vec())
            .collect();

        for species in 0..r1.n_species() {
            let c1_s = &self.copy1_subsystem_indices[species];
            let c2_s = &self.copy2_subsystem_indices[species];
            debug_assert_eq!(c1_s.len(), c2_s.len());
            for (&i1, &i2) in c1_s.iter().zip(c2_s.iter()) {
                std::mem::swap(&mut v1[species][i1], &mut v2[species][i2]);
            }
        }

        (
            Positions::new(v1, r1.n_sites()),
            Positions::new(v2, r2.n_sites()),
        )
    }

    /// Rebuild both betas from scratch at the swapped configurations.
    fn reinitialize_phibetas(
        &mut self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        debug_assert!(self.subsystem_particle_counts_match());

        let (swapped_r1, swapped_r2) = self.swapped_positions(phialpha1, phialpha2);

        let mut phibeta1 = phialpha1.clone();
        phibeta1.reset(swapped_r1);
        self.phibeta1 = Some(Arc::new(phibeta1));
        self.phibeta1_dirty = false;

        let mut phibeta2 = phialpha2.clone();
        phibeta2.reset(swapped_r2);
        self.phibeta2 = Some(Arc::new(phibeta2));
        self.phibeta2_dirty = false;

        if CAREFUL_VERIFICATION {
            self.verify_phibetas(phialpha1, phialpha2);
        }
    }

    /// Recheck every beta position against the swap definition from scratch.
    fn verify_phibetas(
        &self,
        phialpha1: &WavefunctionAmplitude<D>,
        phialpha2: &WavefunctionAmplitude<D>,
    ) {
        let r1 = phialpha1.positions();
        let r2 = phialpha2.positions();
        let lattice = phialpha1.lattice();

        assert_eq!(r1.n_species(), r2.n_species());
        assert_eq!(self.copy1_subsystem_indices.len(), r1.n_species());
        assert_eq!(self.copy2_subsystem_indices.len(), r1.n_species());

        for species in 0..r1.n_species() {
            let n = r1.n_filled(species);
            assert_eq!(n, r2.n_filled(species));

            // the index lists hold exactly the subsystem members, without
            // duplicates
            let mut c1 = 0;
            let mut c2 = 0;
            for index in 0..n {
                let particle = Particle::new(index, species);
                let b1 = self.copy1_subsystem_indices[species].contains(&index);
                let b2 = self.copy2_subsystem_indices[species].contains(&index);
                if b1 {
                    c1 += 1;
                }
                if b2 {
                    c2 += 1;
                }
                assert_eq!(b1, self.subsystem.contains(r1[particle], lattice));
                assert_eq!(b2, self.subsystem.contains(r2[particle], lattice));
            }
            assert_eq!(c1, c2);
            assert_eq!(c1, self.copy1_subsystem_indices[species].len());
            assert_eq!(c2, self.copy2_subsystem_indices[species].len());
        }

        let (swapped_r1, swapped_r2) = self.swapped_positions(phialpha1, phialpha2);
        let rb1 = self.phibeta1().positions();
        let rb2 = self.phibeta2().positions();
        for species in 0..r1.n_species() {
            for index in 0..r1.n_filled(species) {
                let particle = Particle::new(index, species);
                assert_eq!(swapped_r1[particle], rb1[particle]);
                assert_eq!(swapped_r2[particle], rb2[particle]);
            }
        }
    }
}

/// Whether a swap between the two amplitudes is currently well-defined.
pub fn subsystem_particle_counts_match<const D: usize>(
    wf1: &WavefunctionAmplitude<D>,
    wf2: &WavefunctionAmplitude<D>,
    subsystem: &SimpleSubsystem<D>,
) -> bool {
    let r1 = wf1.positions();
    let r2 = wf2.positions();
    assert_eq!(r1.n_species(), r2.n_species());
    assert_eq!(r1.n_sites(), r2.n_sites());
    let lattice = wf1.lattice();

    for species in 0..r1.n_species() {
        assert_eq!(r1.n_filled(species), r2.n_filled(species));
        let count1 = (0..r1.n_filled(species))
            .filter(|&i| subsystem.contains(r1[Particle::new(i, species)], lattice))
            .count();
        let count2 = (0..r2.n_filled(species))
            .filter(|&i| subsystem.contains(r2[Particle::new(i, species)], lattice))
            .count();
        if count1 != count2 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::big::Big;
    use crate::boundary::BoundaryCondition;
    use crate::lattice::HypercubicLattice;
    use crate::orbitals::FilledOrbitals;
    use crate::positions::SingleParticleMove;
    use crate::wavefunction::FreeFermion;
    use approx::assert_relative_eq;

    fn chain_amplitude(sites: Vec<usize>) -> Arc<WavefunctionAmplitude<1>> {
        let lattice = Arc::new(HypercubicLattice::new([4]));
        let orbitals = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [1]],
            lattice,
            [BoundaryCondition::periodic()],
        ));
        Arc::new(WavefunctionAmplitude::free_fermion(FreeFermion::new(
            Positions::new(vec![sites], 4),
            orbitals,
        )))
    }

    fn subsystem_a() -> Arc<SimpleSubsystem<1>> {
        Arc::new(SimpleSubsystem::new([2]))
    }

    fn move_and_commit(
        wf: &mut Arc<WavefunctionAmplitude<1>>,
        particle: Particle,
        destination: usize,
    ) {
        let amplitude = Arc::make_mut(wf);
        amplitude.perform_move(vec![SingleParticleMove {
            particle,
            destination,
        }]);
        amplitude.finish_move();
    }

    /// Product psi_b1 * psi_b2, which is invariant under re-pairing.
    fn beta_product(swapped: &SwappedSystem<1>) -> Big {
        swapped.phibeta1().psi() * swapped.phibeta2().psi()
    }

    fn assert_products_match(swapped: &SwappedSystem<1>, fresh: &SwappedSystem<1>) {
        let a = beta_product(swapped).value();
        let b = beta_product(fresh).value();
        assert_relative_eq!(a.re, b.re, epsilon = 1e-10, max_relative = 1e-10);
        assert_relative_eq!(a.im, b.im, epsilon = 1e-10, max_relative = 1e-10);
    }

    fn fresh_swapped(
        alpha1: &Arc<WavefunctionAmplitude<1>>,
        alpha2: &Arc<WavefunctionAmplitude<1>>,
    ) -> SwappedSystem<1> {
        let mut fresh = SwappedSystem::new(subsystem_a());
        fresh.initialize(alpha1, alpha2);
        fresh
    }

    #[test]
    fn test_initialize_with_identical_copies() {
        let alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![0, 2]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);
        // swapping equal configurations is a no-op
        assert_eq!(swapped.phibeta1().positions().r_vector(0), &[0, 2]);
        assert_eq!(swapped.phibeta2().positions().r_vector(0), &[0, 2]);
    }

    #[test]
    fn test_initialize_swaps_subsystem_positions() {
        let alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![1, 3]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);
        // the A-particles (site 0 in copy 1, site 1 in copy 2) exchange
        assert_eq!(swapped.phibeta1().positions().r_vector(0), &[1, 2]);
        assert_eq!(swapped.phibeta2().positions().r_vector(0), &[0, 3]);
    }

    #[test]
    fn test_move_outside_subsystem_updates_own_beta() {
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![1, 3]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        // copy-1 particle 1 moves 2 -> 3 entirely outside A
        move_and_commit(&mut alpha1, Particle::new(1, 0), 3);
        swapped.update(Some(Particle::new(1, 0)), None, &alpha1, &alpha2);
        swapped.finish_update(&alpha1, &alpha2);

        assert_eq!(swapped.phibeta1().positions().r_vector(0), &[1, 3]);
        assert_products_match(&swapped, &fresh_swapped(&alpha1, &alpha2));
    }

    #[test]
    fn test_move_within_subsystem_updates_other_beta() {
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![1, 3]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        // copy-1 particle 0 moves 0 -> 1 inside A; its position is carried
        // by phibeta2
        move_and_commit(&mut alpha1, Particle::new(0, 0), 1);
        swapped.update(Some(Particle::new(0, 0)), None, &alpha1, &alpha2);
        swapped.finish_update(&alpha1, &alpha2);

        assert_eq!(swapped.phibeta2().positions().r_vector(0), &[1, 3]);
        assert_products_match(&swapped, &fresh_swapped(&alpha1, &alpha2));
    }

    #[test]
    fn test_paired_entry_appends_to_pairing() {
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let mut alpha2 = chain_amplitude(vec![0, 2]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        // both copies move their second particle into A (2 -> 1)
        move_and_commit(&mut alpha1, Particle::new(1, 0), 1);
        move_and_commit(&mut alpha2, Particle::new(1, 0), 1);
        swapped.update(
            Some(Particle::new(1, 0)),
            Some(Particle::new(1, 0)),
            &alpha1,
            &alpha2,
        );
        swapped.finish_update(&alpha1, &alpha2);

        assert_products_match(&swapped, &fresh_swapped(&alpha1, &alpha2));
    }

    #[test]
    fn test_paired_exit_pops_pairing() {
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let mut alpha2 = chain_amplitude(vec![0, 2]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        // both copies move their A-particle out (0 -> 3)
        move_and_commit(&mut alpha1, Particle::new(0, 0), 3);
        move_and_commit(&mut alpha2, Particle::new(0, 0), 3);
        swapped.update(
            Some(Particle::new(0, 0)),
            Some(Particle::new(0, 0)),
            &alpha1,
            &alpha2,
        );
        swapped.finish_update(&alpha1, &alpha2);

        assert_products_match(&swapped, &fresh_swapped(&alpha1, &alpha2));
    }

    #[test]
    fn test_paired_exit_with_repairing() {
        // two particles of each copy inside A, paired crosswise so the
        // departing pair has different pairing indices
        let mut alpha1 = chain_amplitude(vec![0, 1, 2]);
        let mut alpha2 = chain_amplitude(vec![1, 0, 2]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        // copy-1 particle 0 (pairing index 0) and copy-2 particle 1
        // (pairing index 1) leave the subsystem simultaneously
        move_and_commit(&mut alpha1, Particle::new(0, 0), 3);
        move_and_commit(&mut alpha2, Particle::new(1, 0), 3);
        swapped.update(
            Some(Particle::new(0, 0)),
            Some(Particle::new(1, 0)),
            &alpha1,
            &alpha2,
        );
        swapped.finish_update(&alpha1, &alpha2);

        assert_products_match(&swapped, &fresh_swapped(&alpha1, &alpha2));
    }

    #[test]
    fn test_cancel_update_restores_betas() {
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![1, 3]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);
        let before = beta_product(&swapped).value();

        // stage a move in copy 1 and roll everything back
        let amplitude = Arc::make_mut(&mut alpha1);
        amplitude.perform_move(vec![SingleParticleMove {
            particle: Particle::new(1, 0),
            destination: 3,
        }]);
        swapped.update(Some(Particle::new(1, 0)), None, &alpha1, &alpha2);
        Arc::make_mut(&mut alpha1).cancel_move();
        swapped.cancel_update(&alpha1, &alpha2);

        let after = beta_product(&swapped).value();
        assert_relative_eq!(before.re, after.re, epsilon = 1e-12);
        assert_relative_eq!(before.im, after.im, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "identically")]
    fn test_one_sided_boundary_crossing_is_forbidden() {
        // copy 1 loses its A-particle while copy 2 keeps its own: the swap
        // becomes undefined and the update must refuse
        let mut alpha1 = chain_amplitude(vec![0, 2]);
        let alpha2 = chain_amplitude(vec![0, 2]);
        let mut swapped = SwappedSystem::new(subsystem_a());
        swapped.initialize(&alpha1, &alpha2);

        move_and_commit(&mut alpha1, Particle::new(0, 0), 3);
        swapped.update(Some(Particle::new(0, 0)), None, &alpha1, &alpha2);
    }
}
