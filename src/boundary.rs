//! Boundary conditions for one lattice axis.

use num_complex::Complex64;
use num_rational::Ratio;
use std::f64::consts::PI;

/// A boundary condition on an axis of a toroidal lattice.
///
/// The twist `p` is the fraction of 2π by which a complex amplitude advances
/// when wrapping once around the system along this axis: 1 is periodic, 1/2
/// antiperiodic, 0 open, and anything else a twisted boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryCondition {
    p: Ratio<i64>,
}

impl BoundaryCondition {
    /// Build from an exact rational twist in [0, 1].
    pub fn new(p: Ratio<i64>) -> Self {
        assert!(
            p >= Ratio::new(0, 1) && p <= Ratio::new(1, 1),
            "boundary twist must lie in [0, 1]"
        );
        BoundaryCondition { p }
    }

    pub fn open() -> Self {
        BoundaryCondition::new(Ratio::new(0, 1))
    }

    pub fn periodic() -> Self {
        BoundaryCondition::new(Ratio::new(1, 1))
    }

    pub fn antiperiodic() -> Self {
        BoundaryCondition::new(Ratio::new(1, 2))
    }

    pub fn p(&self) -> Ratio<i64> {
        self.p
    }

    /// The twist reduced modulo 1, as a float. Periodic wraps to 0.
    pub fn twist_fraction(&self) -> f64 {
        let f = self.p.fract();
        *f.numer() as f64 / *f.denom() as f64
    }

    /// Phase change when crossing the boundary in the positive direction.
    /// Open boundaries kill the amplitude outright (phase 0).
    pub fn phase(&self) -> Complex64 {
        // exact values where we can provide them
        if self.p == Ratio::new(0, 1) {
            Complex64::new(0.0, 0.0)
        } else if self.p == Ratio::new(1, 1) {
            Complex64::new(1.0, 0.0)
        } else if self.p == Ratio::new(1, 2) {
            Complex64::new(-1.0, 0.0)
        } else if self.p == Ratio::new(1, 4) {
            Complex64::new(0.0, 1.0)
        } else if self.p == Ratio::new(3, 4) {
            Complex64::new(0.0, -1.0)
        } else {
            let angle = 2.0 * PI * (*self.p.numer() as f64) / (*self.p.denom() as f64);
            Complex64::new(angle.cos(), angle.sin())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_phases() {
        assert_eq!(BoundaryCondition::periodic().phase(), Complex64::new(1.0, 0.0));
        assert_eq!(
            BoundaryCondition::antiperiodic().phase(),
            Complex64::new(-1.0, 0.0)
        );
        assert_eq!(BoundaryCondition::open().phase(), Complex64::new(0.0, 0.0));
        assert_eq!(
            BoundaryCondition::new(Ratio::new(1, 4)).phase(),
            Complex64::new(0.0, 1.0)
        );
    }

    #[test]
    fn test_generic_twist_phase() {
        let bc = BoundaryCondition::new(Ratio::new(1, 3));
        let phase = bc.phase();
        assert_relative_eq!(phase.re, -0.5, epsilon = 1e-12);
        assert_relative_eq!(phase.im, 3.0_f64.sqrt() / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_twist_fraction_wraps_periodic() {
        assert_relative_eq!(BoundaryCondition::periodic().twist_fraction(), 0.0);
        assert_relative_eq!(BoundaryCondition::antiperiodic().twist_fraction(), 0.5);
    }
}
