//! The Renyi sign walk.
//!
//! Samples with weight |psi_a1 psi_a2 psi_b1 psi_b2|, where the betas are
//! the swapped-system amplitudes, so the phase estimator only has to read
//! off the residual phase. Each step moves one particle in one copy and must
//! consult the corresponding beta before the acceptance decision, so the
//! swapped system is updated during the proposal and finished or cancelled
//! with it. Boundary-crossing moves are rejected outright, keeping the walk
//! inside the swap-possible subspace.

use rand::Rng;
use std::sync::Arc;

use super::Walk;
use crate::big::Big;
use crate::random::choose_random_particle;
use crate::subsystem::SimpleSubsystem;
use crate::swapped::{subsystem_particle_counts_match, SwappedSystem};
use crate::wavefunction::WavefunctionAmplitude;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Idle,
    Impossible,
    InProgress { copy: usize },
}

#[derive(Debug, Clone)]
pub struct RenyiSignWalk<const D: usize> {
    phialpha1: Arc<WavefunctionAmplitude<D>>,
    phialpha2: Arc<WavefunctionAmplitude<D>>,
    swapped: SwappedSystem<D>,
    subsystem: Arc<SimpleSubsystem<D>>,
    transition: Transition,
}

impl<const D: usize> RenyiSignWalk<D> {
    /// Build from one amplitude; the second copy starts as an identical
    /// clone.
    pub fn new(wf: &Arc<WavefunctionAmplitude<D>>, subsystem: Arc<SimpleSubsystem<D>>) -> Self {
        let phialpha1 = Arc::clone(wf);
        let phialpha2 = Arc::new((**wf).clone());
        Self::from_copies(phialpha1, phialpha2, subsystem)
    }

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
        RenyiSignWalk {
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

    fn beta_product(&self) -> Big {
        self.swapped.phibeta1().psi() * self.swapped.phibeta2().psi()
    }
}

impl<const D: usize> Walk for RenyiSignWalk<D> {
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

        if self.subsystem.contains(destination, lattice) != self.subsystem.contains(old_site, lattice)
        {
            self.transition = Transition::Impossible;
            return 0.0;
        }

        let alpha_old = alpha.psi();
        let beta_old = self.beta_product();

        let alpha = if copy == 0 {
            &mut self.phialpha1
        } else {
            &mut self.phialpha2
        };
        Arc::make_mut(alpha).perform_move(vec![crate::positions::SingleParticleMove {
            particle,
            destination,
        }]);

        let (particle1, particle2) = if copy == 0 {
            (Some(particle), None)
        } else {
            (None, Some(particle))
        };
        self.swapped
            .update(particle1, particle2, &self.phialpha1, &self.phialpha2);

        let alpha_new = if copy == 0 {
            self.phialpha1.psi()
        } else {
            self.phialpha2.psi()
        };
        let beta_new = self.beta_product();
        self.transition = Transition::InProgress { copy };

        let old_product = alpha_old * beta_old;
        if old_product.is_zero() {
            return f64::INFINITY;
        }
        Big::ratio(&(alpha_new * beta_new), &old_product).abs()
    }

    fn accept_transition(&mut self) {
        match self.transition {
            Transition::InProgress { copy } => {
                let alpha = if copy == 0 {
                    &mut self.phialpha1
                } else {
                    &mut self.phialpha2
                };
                Arc::make_mut(alpha).finish_move();
                self.swapped.finish_update(&self.phialpha1, &self.phialpha2);
            }
            Transition::Impossible => {}
            Transition::Idle => panic!("no transition to accept"),
        }
        self.transition = Transition::Idle;
    }

    fn reject_transition(&mut self) {
        match self.transition {
            Transition::InProgress { copy } => {
                // walk the alpha back first so the careful verification in
                // the swapped system sees consistent positions
                let alpha = if copy == 0 {
                    &mut self.phialpha1
                } else {
                    &mut self.phialpha2
                };
                Arc::make_mut(alpha).cancel_move();
                self.swapped.cancel_update(&self.phialpha1, &self.phialpha2);
            }
            Transition::Impossible => {}
            Transition::Idle => panic!("no transition to reject"),
        }
        self.transition = Transition::Idle;
    }
}
