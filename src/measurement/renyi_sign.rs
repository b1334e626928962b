//! Swap-phase estimator for the second Renyi entropy.

use num_complex::Complex64;

use super::Measurement;
use crate::big::Big;
use crate::estimate::BinnedEstimate;
use crate::walk::RenyiSignWalk;

/// Accumulates the unit phase of psi_a1 psi_a2 / (psi_b1 psi_b2) along a
/// sign walk, whose stationary weight makes the moduli cancel.
#[derive(Debug, Clone, Default)]
pub struct RenyiSignMeasurement<const D: usize> {
    estimate: BinnedEstimate<Complex64>,
}

impl<const D: usize> RenyiSignMeasurement<D> {
    pub fn new() -> Self {
        RenyiSignMeasurement {
            estimate: BinnedEstimate::new(),
        }
    }

    fn current_value(walk: &RenyiSignWalk<D>) -> Complex64 {
        let alpha = walk.phialpha1().psi() * walk.phialpha2().psi();
        let beta = walk.phibeta1().psi() * walk.phibeta2().psi();
        Big::ratio(&alpha, &beta).phase()
    }

    pub fn get(&self) -> Complex64 {
        self.estimate.cumulative_result()
    }

    pub fn estimate(&self) -> &BinnedEstimate<Complex64> {
        &self.estimate
    }
}

impl<const D: usize> Measurement<RenyiSignWalk<D>> for RenyiSignMeasurement<D> {
    fn initialize(&mut self, _walk: &RenyiSignWalk<D>) {}

    fn step_advanced(&mut self, walk: &RenyiSignWalk<D>) {
        self.estimate.add_value(Self::current_value(walk));
    }

    fn step_repeated(&mut self, walk: &RenyiSignWalk<D>) {
        self.estimate.add_value(Self::current_value(walk));
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryCondition;
    use crate::lattice::HypercubicLattice;
    use crate::orbitals::FilledOrbitals;
    use crate::positions::Positions;
    use crate::subsystem::SimpleSubsystem;
    use crate::wavefunction::{FreeFermion, WavefunctionAmplitude};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_identical_copies_give_unit_phase() {
        let lattice = Arc::new(HypercubicLattice::new([6]));
        let orbitals = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [1], [5]],
            lattice,
            [BoundaryCondition::periodic()],
        ));
        let ff = FreeFermion::new(Positions::new(vec![vec![0, 1, 4]], 6), orbitals);
        let wf = Arc::new(WavefunctionAmplitude::free_fermion(ff));
        let walk = RenyiSignWalk::new(&wf, Arc::new(SimpleSubsystem::new([2])));

        let mut m = RenyiSignMeasurement::new();
        m.initialize(&walk);
        m.step_advanced(&walk);
        let phase = m.get();
        assert_relative_eq!(phase.re, 1.0, epsilon = 1e-10);
        assert_relative_eq!(phase.im, 0.0, epsilon = 1e-10);
    }
}
