//! The standard single-amplitude walk.

use rand::Rng;
use std::sync::Arc;

use super::Walk;
use crate::big::Big;
use crate::wavefunction::WavefunctionAmplitude;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Idle,
    /// A degenerate proposal (no move available); always accepted as a
    /// repeat of the current configuration.
    Null,
    InProgress,
}

/// Samples |psi(R)|^2 by single random moves of the amplitude's natural
/// kind. The amplitude handle is copy-on-write, so a walk sharing its
/// amplitude with other readers forks it on the first proposal.
#[derive(Debug, Clone)]
pub struct StandardWalk<const D: usize> {
    wf: Arc<WavefunctionAmplitude<D>>,
    transition: Transition,
}

impl<const D: usize> StandardWalk<D> {
    pub fn new(wf: Arc<WavefunctionAmplitude<D>>) -> Self {
        StandardWalk {
            wf,
            transition: Transition::Idle,
        }
    }

    pub fn wavefunction(&self) -> &WavefunctionAmplitude<D> {
        &self.wf
    }
}

impl<const D: usize> Walk for StandardWalk<D> {
    fn propose_transition<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        assert!(self.transition == Transition::Idle, "transition in progress");

        let old_psi = self.wf.psi();
        let mv = self.wf.propose_random_move(rng);
        if mv.is_empty() {
            self.transition = Transition::Null;
            return 1.0;
        }

        let wf = Arc::make_mut(&mut self.wf);
        wf.perform_move(mv);
        let new_psi = wf.psi();
        self.transition = Transition::InProgress;

        if old_psi.is_zero() {
            // degenerate starting configuration; always move away from it
            return f64::INFINITY;
        }
        let ratio = Big::ratio(&new_psi, &old_psi).abs();
        ratio * ratio
    }

    fn accept_transition(&mut self) {
        match self.transition {
            Transition::InProgress => Arc::make_mut(&mut self.wf).finish_move(),
            Transition::Null => {}
            Transition::Idle => panic!("no transition to accept"),
        }
        self.transition = Transition::Idle;
    }

    fn reject_transition(&mut self) {
        match self.transition {
            Transition::InProgress => Arc::make_mut(&mut self.wf).cancel_move(),
            Transition::Null => {}
            Transition::Idle => panic!("no transition to reject"),
        }
        self.transition = Transition::Idle;
    }
}
