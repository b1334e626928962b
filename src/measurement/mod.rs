//! Observables measured along a walk.

pub mod density;
pub mod renyi_mod;
pub mod renyi_sign;

pub use density::DensityDensityMeasurement;
pub use renyi_mod::RenyiModMeasurement;
pub use renyi_sign::RenyiSignMeasurement;

use std::any::Any;

/// An observable attached to a Metropolis simulation over walk type `W`.
///
/// The driver calls `initialize` once after equilibration, `step_advanced`
/// after every committed transition, and `step_repeated` after every
/// rejected one. Rejected steps re-count the current sample, which the
/// Metropolis estimator requires.
pub trait Measurement<W>: Any {
    /// Whether this measurement can be attached to the given walk. Checked
    /// by the driver before any stepping.
    fn is_valid_walk(&self, _walk: &W) -> bool {
        true
    }

    fn initialize(&mut self, walk: &W);

    fn step_advanced(&mut self, walk: &W);

    fn step_repeated(&mut self, walk: &W);

    /// For recovering the concrete measurement from a driver's list.
    fn as_any(&self) -> &dyn Any;
}
