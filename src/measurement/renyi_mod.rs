//! Swap-modulus estimator for the second Renyi entropy.

use super::Measurement;
use crate::big::Big;
use crate::estimate::BinnedEstimate;
use crate::walk::RenyiModPossibleWalk;

/// Accumulates |psi_b1 psi_b2 / (psi_a1 psi_a2)| along a swap-possible
/// modulus walk.
#[derive(Debug, Clone, Default)]
pub struct RenyiModMeasurement<const D: usize> {
    estimate: BinnedEstimate<f64>,
}

impl<const D: usize> RenyiModMeasurement<D> {
    pub fn new() -> Self {
        RenyiModMeasurement {
            estimate: BinnedEstimate::new(),
        }
    }

    fn current_value(walk: &RenyiModPossibleWalk<D>) -> f64 {
        let alpha = walk.phialpha1().psi() * walk.phialpha2().psi();
        let beta = walk.phibeta1().psi() * walk.phibeta2().psi();
        if beta.is_zero() {
            return 0.0;
        }
        Big::ratio(&beta, &alpha).abs()
    }

    pub fn get(&self) -> f64 {
        self.estimate.cumulative_result()
    }

    pub fn estimate(&self) -> &BinnedEstimate<f64> {
        &self.estimate
    }
}

impl<const D: usize> Measurement<RenyiModPossibleWalk<D>> for RenyiModMeasurement<D> {
    fn initialize(&mut self, _walk: &RenyiModPossibleWalk<D>) {}

    fn step_advanced(&mut self, walk: &RenyiModPossibleWalk<D>) {
        self.estimate.add_value(Self::current_value(walk));
    }

    fn step_repeated(&mut self, walk: &RenyiModPossibleWalk<D>) {
        self.estimate.add_value(Self::current_value(walk));
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
