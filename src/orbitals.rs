//! Precomputed single-particle orbital tables.
//!
//! For momentum-space filled orbitals the table entry is
//! `exp(2 pi i k . x)` with the allowed momenta per axis
//! `k = (m + theta) / L`, where `m` is an integer momentum index and `theta`
//! the fractional boundary twist along that axis. Antiperiodic boundaries on
//! a chain of length 4 thus give k in {1/8, 3/8, 5/8, 7/8}.

use std::f64::consts::PI;
use std::sync::Arc;

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::boundary::BoundaryCondition;
use crate::lattice::HypercubicLattice;

/// A dense table of filled single-particle orbitals: rows are orbitals,
/// columns are lattice sites. Immutable after construction.
#[derive(Debug, Clone)]
pub struct FilledOrbitals<const D: usize> {
    table: DMatrix<Complex64>,
    lattice: Arc<HypercubicLattice<D>>,
    boundary_conditions: [BoundaryCondition; D],
}

impl<const D: usize> FilledOrbitals<D> {
    /// Build plane-wave orbitals from integer momentum indices, one set of
    /// indices per filled orbital. Momentum indices must lie in
    /// `[0, length)` along each axis.
    pub fn from_momenta(
        filled_momenta: &[[usize; D]],
        lattice: Arc<HypercubicLattice<D>>,
        boundary_conditions: [BoundaryCondition; D],
    ) -> Self {
        assert!(!filled_momenta.is_empty(), "at least one orbital must be filled");
        for momentum in filled_momenta {
            for (d, &m) in momentum.iter().enumerate() {
                assert!(m < lattice.length()[d], "momentum index out of range");
            }
        }

        let n_filled = filled_momenta.len();
        let n_sites = lattice.total_sites();

        // k per axis, including the fractional twist
        let mut momenta = Vec::with_capacity(n_filled);
        for momentum in filled_momenta {
            let mut k = [0.0f64; D];
            for d in 0..D {
                let theta = boundary_conditions[d].twist_fraction();
                k[d] = (momentum[d] as f64 + theta) / lattice.length()[d] as f64;
            }
            momenta.push(k);
        }

        let table = DMatrix::from_fn(n_filled, n_sites, |n, r| {
            let site = lattice.site_from_index(r);
            let mut angle = 0.0;
            for d in 0..D {
                angle += momenta[n][d] * site.coords[d] as f64;
            }
            angle *= 2.0 * PI;
            Complex64::new(angle.cos(), angle.sin())
        });

        FilledOrbitals {
            table,
            lattice,
            boundary_conditions,
        }
    }

    pub fn n_filled(&self) -> usize {
        self.table.nrows()
    }

    pub fn n_sites(&self) -> usize {
        self.table.ncols()
    }

    /// All orbital amplitudes at one site (a column of the table).
    pub fn at_site(&self, site_index: usize) -> nalgebra::DVectorView<'_, Complex64> {
        self.table.column(site_index)
    }

    pub fn table(&self) -> &DMatrix<Complex64> {
        &self.table
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        &self.lattice
    }

    pub fn boundary_conditions(&self) -> &[BoundaryCondition; D] {
        &self.boundary_conditions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chain4() -> Arc<HypercubicLattice<1>> {
        Arc::new(HypercubicLattice::new([4]))
    }

    #[test]
    fn test_periodic_chain_momenta() {
        let orbitals = FilledOrbitals::from_momenta(
            &[[0], [1]],
            chain4(),
            [BoundaryCondition::periodic()],
        );
        // k = n / 4
        for n in 0..2 {
            for r in 0..4 {
                let expected = 2.0 * PI * (n as f64) * (r as f64) / 4.0;
                let entry = orbitals.table()[(n, r)];
                assert_relative_eq!(entry.re, expected.cos(), epsilon = 1e-12);
                assert_relative_eq!(entry.im, expected.sin(), epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_antiperiodic_chain_momenta() {
        let orbitals = FilledOrbitals::from_momenta(
            &[[0], [1], [2], [3]],
            chain4(),
            [BoundaryCondition::antiperiodic()],
        );
        // k = (n + 1/2) / 4, i.e. 1/8, 3/8, 5/8, 7/8
        for (n, k) in [(0, 0.125), (1, 0.375), (2, 0.625), (3, 0.875)] {
            let entry = orbitals.table()[(n, 1)];
            let angle: f64 = 2.0 * PI * k;
            assert_relative_eq!(entry.re, angle.cos(), epsilon = 1e-12);
            assert_relative_eq!(entry.im, angle.sin(), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_column_view_matches_entries() {
        let orbitals = FilledOrbitals::from_momenta(
            &[[0], [2]],
            chain4(),
            [BoundaryCondition::periodic()],
        );
        let col = orbitals.at_site(3);
        assert_eq!(col.len(), 2);
        assert_eq!(col[0], orbitals.table()[(0, 3)]);
        assert_eq!(col[1], orbitals.table()[(1, 3)]);
    }
}
