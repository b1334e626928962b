//! The swap-possible Renyi modulus walk.
//!
//! Two independent wavefunction copies are sampled with weight
//! |psi1|^2 |psi2|^2, restricted to the subspace in which the subsystem swap
//! is well-defined (equal subsystem particle counts per species in both
//! copies). Each step moves one particle in one copy; a move that would
//! change that copy's subsystem count is rejected outright. The swapped
//! system is not consulted for the acceptance decision; it is brought up to
//! date when a move is accepted, and the modulus estimator reads it between
//! steps.

use rand::Rng;
use std::sync::Arc;

use super::Walk;
use crate::big::Big;
use crate::positions::Particle;
use crate::random::choose_random_particle;
use crate::subsystem::SimpleSubsystem;
use crate::swapped::{subsystem_particle_counts_match, SwappedSystem};
use crate::wavefunction::WavefunctionAmplitude;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Idle,
    /// Deterministically rejected proposal; nothing was mutated.
    Impossible,
    InProgress {
        copy: usize,
        particle: Particle,
    },
}

#[derive(Debug, Clone)]
pub struct RenyiModPossibleWalk<const D: usize> {
    phialpha1: Arc<WavefunctionAmplitude<D>>,
    phialpha2: Arc<WavefunctionAmplitude<D>>,
    swapped: SwappedSystem<D>,
    subsystem: Arc<SimpleSubsystem<D>>,
    transition: Transition,
}

impl<const D: usize> RenyiModPossibleWalk<D> {
    /// Build from one amplitude; the second copy starts as an identical
    /// clone, which trivially satisfies the swap-possibility precondition.
    pub fn new(wf: &Arc<WavefunctionAmplitude<D>>, subsystem: Arc<SimpleSubsystem<D>>) -> Self {
        let phialpha1 = Arc::clone(wf);
        let phialpha2 = Arc::new((**wf).clone());
        Self::from_copies(phialpha1, phialpha2, subsystem)
    }

    /// Build from two explicit copies, which must already have matching
    /// subsystem particle counts.
    pub fn from_copies(
        phialpha1: Arc<WavefunctionAmplitude<D>>,
        phialpha2: Arc<WavefunctionAmplitude<D>>,
        subsystem: Arc<SimpleSubsystem<D>>,
    ) -> Self {
        assert!(
            subsystem_particle_counts_match(&phialpha1, &phialpha2, &subsystem),
            "a swap must be possible in the starting configurations"
        );
        let mut swapped = SwappedSystem::new(Arc::clone(&subsystem));
        swapped.initialize(&phialpha1, &phialpha2);
        RenyiModPossibleWalk {
            phialpha1,
            phialpha2,
            swapped,
            subsystem,
            transition: Transition::Idle,
        }
    }

    pub fn phialpha1(&self) -> &WavefunctionAmplitude<D> {
        &self.phialpha1
    }

    pub fn phialpha2(&self) -> &WavefunctionAmplitude<D> {
        &self.phialpha2
    }

    pub fn phibeta1(&self) -> &WavefunctionAmplitude<D> {
        self.swapped.phibeta1()
    }

    pub fn phibeta2(&self) -> &WavefunctionAmplitude<D> {
        self.swapped.phibeta2()
    }

    pub fn subsystem(&self) -> &SimpleSubsystem<D> {
        &self.subsystem
    }
}

impl<const D: usize> Walk for RenyiModPossibleWalk<D> {
    fn propose_transition<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        assert!(self.transition == Transition::Idle, "transition in progress");

        let copy = rng.gen_range(0..2usize);
        let alpha = if copy == 0 {
            &self.phialpha1
        } else {
            &self.phialpha2
        };
        let r = alpha.positions();
        let lattice = alpha.lattice();
        let particle = choose_random_particle(r, rng);
        let old_site = r[particle];
        let destination = lattice.plan_particle_move_to_nearby_empty_site(particle, r, rng);

        // a boundary-crossing move would leave the swap-possible subspace
        if self.subsystem.contains(destination, lattice) != self.subsystem.contains(old_site, lattice)
        {
            self.transition = Transition::Impossible;
            return 0.0;
        }

        let alpha = if copy == 0 {
            &mut self.phialpha1
        } else {
            &mut self.phialpha2
        };
        let old_psi = alpha.psi();
        let alpha = Arc::make_mut(alpha);
        alpha.perform_move(vec![crate::positions::SingleParticleMove {
            particle,
            destination,
        }]);
        let new_psi = alpha.psi();
        self.transition = Transition::InProgress { copy, particle };

        if old_psi.is_zero() {
            return f64::INFINITY;
        }
        let ratio = Big::ratio(&new_psi, &old_psi).abs();
        ratio * ratio
    }

    fn accept_transition(&mut self) {
        match self.transition {
            Transition::InProgress { copy, particle } => {
                let alpha = if copy == 0 {
                    &mut self.phialpha1
                } else {
                    &mut self.phialpha2
                };
                Arc::make_mut(alpha).finish_move();

                let (particle1, particle2) = if copy == 0 {
                    (Some(particle), None)
                } else {
                    (None, Some(particle))
                };
                self.swapped
                    .update(particle1, particle2, &self.phialpha1, &self.phialpha2);
                self.swapped.finish_update(&self.phialpha1, &self.phialpha2);
            }
            Transition::Impossible => {}
            Transition::Idle => panic!("no transition to accept"),
        }
        self.transition = Transition::Idle;
    }

    fn reject_transition(&mut self) {
        match self.transition {
            Transition::InProgress { copy, .. } => {
                let alpha = if copy == 0 {
                    &mut self.phialpha1
                } else {
                    &mut self.phialpha2
                };
                Arc::make_mut(alpha).cancel_move();
            }
            Transition::Impossible => {}
            Transition::Idle => panic!("no transition to reject"),
        }
        self.transition = Transition::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryCondition;
    use crate::lattice::HypercubicLattice;
    use crate::orbitals::FilledOrbitals;
    use crate::positions::Positions;
    use crate::wavefunction::FreeFermion;
    use rand_mt::Mt64;

    fn mod_walk() -> RenyiModPossibleWalk<1> {
        let lattice = Arc::new(HypercubicLattice::new([6]));
        let orbitals = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [1], [5]],
            lattice,
            [BoundaryCondition::periodic()],
        ));
        let ff = FreeFermion::new(Positions::new(vec![vec![0, 2, 4]], 6), orbitals);
        let wf = Arc::new(WavefunctionAmplitude::free_fermion(ff));
        RenyiModPossibleWalk::new(&wf, Arc::new(SimpleSubsystem::new([2])))
    }

    fn subsystem_count(walk: &RenyiModPossibleWalk<1>, which: usize) -> usize {
        let alpha = if which == 0 {
            walk.phialpha1()
        } else {
            walk.phialpha2()
        };
        let r = alpha.positions();
        (0..r.n_filled(0))
            .filter(|&i| {
                walk.subsystem()
                    .contains(r[crate::positions::Particle::new(i, 0)], alpha.lattice())
            })
            .count()
    }

    #[test]
    fn test_walk_never_leaves_swap_possible_subspace() {
        let mut walk = mod_walk();
        let mut rng = Mt64::new(99);
        for step in 0..500 {
            let ratio = walk.propose_transition(&mut rng);
            if ratio >= 1.0 || (ratio > 0.0 && rng.gen::<f64>() < ratio) {
                walk.accept_transition();
            } else {
                walk.reject_transition();
            }
            assert_eq!(
                subsystem_count(&walk, 0),
                subsystem_count(&walk, 1),
                "swap broke at step {step}"
            );
        }
    }

    #[test]
    fn test_boundary_crossing_is_rejected_outright() {
        let mut walk = mod_walk();
        let mut rng = Mt64::new(3);
        let mut saw_impossible = false;
        for _ in 0..300 {
            let ratio = walk.propose_transition(&mut rng);
            if ratio == 0.0 {
                saw_impossible = true;
                // the amplitudes were not touched
                assert_eq!(walk.phialpha1().positions().r_vector(0).len(), 3);
                walk.reject_transition();
            } else {
                walk.reject_transition();
            }
        }
        assert!(saw_impossible, "no boundary crossing was ever proposed");
    }
}
