//! Wavefunction amplitudes.
//!
//! An amplitude evaluates psi(R) for one variational wavefunction at the
//! configuration it carries, and tracks psi under moves through a
//! transactional interface: `perform_move` stages a configuration change and
//! makes the proposed psi available, and exactly one of `finish_move` /
//! `cancel_move` closes the transaction. The variants dispatch by exhaustive
//! matching; each one owns its determinant trackers.
//!
//! Amplitudes are forked with `Arc` + copy-on-write: cloning the handle is
//! free, and the matrices are only duplicated if a fork is mutated while the
//! original is still alive.

pub mod dbl;
pub mod dmetal;
pub mod free_fermion;
pub mod jastrow;
pub mod rvb;

pub use dbl::Dbl;
pub use dmetal::DMetal;
pub use free_fermion::FreeFermion;
pub use jastrow::Jastrow;
pub use rvb::Rvb;

use rand::Rng;
use std::sync::Arc;

use crate::big::Big;
use crate::lattice::HypercubicLattice;
use crate::positions::{Move, Positions};

/// Book-keeping for an in-flight move: the move itself plus the sites the
/// particles came from, so a cancel can walk everything back.
#[derive(Debug, Clone)]
pub(crate) struct MoveRecord {
    mv: Move,
    old_sites: Vec<usize>,
}

impl MoveRecord {
    /// Apply `mv` to the configuration and remember how to undo it.
    pub fn apply(r: &mut Positions, mv: Move) -> MoveRecord {
        let old_sites = mv.iter().map(|m| r[m.particle]).collect();
        for m in &mv {
            r.update_position(m.particle, m.destination);
        }
        MoveRecord { mv, old_sites }
    }

    pub fn the_move(&self) -> &Move {
        &self.mv
    }

    /// Walk the configuration back, undoing the moves in reverse order.
    pub fn revert(self, r: &mut Positions) {
        for (m, &old_site) in self.mv.iter().zip(self.old_sites.iter()).rev() {
            r.update_position(m.particle, old_site);
        }
    }
}

/// The determinantal part of an amplitude.
#[derive(Debug, Clone)]
pub enum AmplitudeKind<const D: usize> {
    FreeFermion(FreeFermion<D>),
    Dbl(Dbl<D>),
    DMetal(DMetal<D>),
    Rvb(Rvb<D>),
}

/// A wavefunction amplitude: a determinantal part plus an optional Jastrow
/// multiplier.
#[derive(Debug, Clone)]
pub struct WavefunctionAmplitude<const D: usize> {
    kind: AmplitudeKind<D>,
    jastrow: Option<Jastrow>,
}

impl<const D: usize> WavefunctionAmplitude<D> {
    pub fn new(kind: AmplitudeKind<D>, jastrow: Option<Jastrow>) -> Self {
        WavefunctionAmplitude { kind, jastrow }
    }

    pub fn free_fermion(ff: FreeFermion<D>) -> Self {
        Self::new(AmplitudeKind::FreeFermion(ff), None)
    }

    pub fn dbl(dbl: Dbl<D>) -> Self {
        Self::new(AmplitudeKind::Dbl(dbl), None)
    }

    pub fn dmetal(dmetal: DMetal<D>) -> Self {
        Self::new(AmplitudeKind::DMetal(dmetal), None)
    }

    pub fn rvb(rvb: Rvb<D>) -> Self {
        Self::new(AmplitudeKind::Rvb(rvb), None)
    }

    pub fn with_jastrow(mut self, jastrow: Jastrow) -> Self {
        self.jastrow = Some(jastrow);
        self
    }

    /// The current amplitude. During a transaction this reflects the
    /// proposed configuration.
    pub fn psi(&self) -> Big {
        let mut det = match &self.kind {
            AmplitudeKind::FreeFermion(a) => a.psi(),
            AmplitudeKind::Dbl(a) => a.psi(),
            AmplitudeKind::DMetal(a) => a.psi(),
            AmplitudeKind::Rvb(a) => a.psi(),
        };
        if let Some(jastrow) = &self.jastrow {
            let factor = jastrow.factor(self.positions());
            if factor == 0.0 {
                return Big::zero();
            }
            det *= factor;
        }
        det
    }

    pub fn positions(&self) -> &Positions {
        match &self.kind {
            AmplitudeKind::FreeFermion(a) => a.positions(),
            AmplitudeKind::Dbl(a) => a.positions(),
            AmplitudeKind::DMetal(a) => a.positions(),
            AmplitudeKind::Rvb(a) => a.positions(),
        }
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        match &self.kind {
            AmplitudeKind::FreeFermion(a) => a.lattice(),
            AmplitudeKind::Dbl(a) => a.lattice(),
            AmplitudeKind::DMetal(a) => a.lattice(),
            AmplitudeKind::Rvb(a) => a.lattice(),
        }
    }

    /// Stage a move. The caller must ensure the resulting configuration is
    /// legal for the variant.
    pub fn perform_move(&mut self, mv: Move) {
        match &mut self.kind {
            AmplitudeKind::FreeFermion(a) => a.perform_move(mv),
            AmplitudeKind::Dbl(a) => a.perform_move(mv),
            AmplitudeKind::DMetal(a) => a.perform_move(mv),
            AmplitudeKind::Rvb(a) => a.perform_move(mv),
        }
    }

    /// Commit the staged move.
    pub fn finish_move(&mut self) {
        match &mut self.kind {
            AmplitudeKind::FreeFermion(a) => a.finish_move(),
            AmplitudeKind::Dbl(a) => a.finish_move(),
            AmplitudeKind::DMetal(a) => a.finish_move(),
            AmplitudeKind::Rvb(a) => a.finish_move(),
        }
    }

    /// Roll the staged move back.
    pub fn cancel_move(&mut self) {
        match &mut self.kind {
            AmplitudeKind::FreeFermion(a) => a.cancel_move(),
            AmplitudeKind::Dbl(a) => a.cancel_move(),
            AmplitudeKind::DMetal(a) => a.cancel_move(),
            AmplitudeKind::Rvb(a) => a.cancel_move(),
        }
    }

    /// Exchange the identities of two same-species particles; the amplitude
    /// changes only by the fermionic sign.
    pub fn swap_particles(&mut self, index1: usize, index2: usize, species: usize) {
        match &mut self.kind {
            AmplitudeKind::FreeFermion(a) => a.swap_particles(index1, index2, species),
            AmplitudeKind::Dbl(a) => a.swap_particles(index1, index2, species),
            AmplitudeKind::DMetal(a) => a.swap_particles(index1, index2, species),
            AmplitudeKind::Rvb(a) => a.swap_particles(index1, index2, species),
        }
    }

    /// Reinitialize at an arbitrary configuration.
    pub fn reset(&mut self, r: Positions) {
        match &mut self.kind {
            AmplitudeKind::FreeFermion(a) => a.reset(r),
            AmplitudeKind::Dbl(a) => a.reset(r),
            AmplitudeKind::DMetal(a) => a.reset(r),
            AmplitudeKind::Rvb(a) => a.reset(r),
        }
    }

    /// Propose a random move appropriate for the variant. May return an
    /// empty move when no change is possible from the current configuration.
    pub fn propose_random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Move {
        match &self.kind {
            AmplitudeKind::FreeFermion(a) => a.propose_random_move(rng),
            AmplitudeKind::Dbl(a) => a.propose_random_move(rng),
            AmplitudeKind::DMetal(a) => a.propose_random_move(rng),
            AmplitudeKind::Rvb(a) => a.propose_random_move(rng),
        }
    }
}
