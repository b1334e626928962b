//! Subsystem geometry for entanglement cuts.

use crate::lattice::HypercubicLattice;

/// An axis-aligned box of sites anchored at the origin. Works for any
/// subsystem that is a parallelepiped along the lattice's primitive vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleSubsystem<const D: usize> {
    lengths: [usize; D],
}

impl<const D: usize> SimpleSubsystem<D> {
    pub fn new(lengths: [usize; D]) -> Self {
        SimpleSubsystem { lengths }
    }

    /// A cube of the given side.
    pub fn cube(side: usize) -> Self {
        SimpleSubsystem {
            lengths: [side; D],
        }
    }

    pub fn lengths(&self) -> &[usize; D] {
        &self.lengths
    }

    /// Whether the site with the given index lies inside the box. Basis
    /// indices are ignored: the cut is purely a Bravais-cell cut.
    pub fn contains(&self, site_index: usize, lattice: &HypercubicLattice<D>) -> bool {
        let site = lattice.site_from_index(site_index);
        (0..D).all(|d| (site.coords[d] as usize) < self.lengths[d])
    }

    /// Number of lattice sites inside the box.
    pub fn site_count(&self, lattice: &HypercubicLattice<D>) -> usize {
        let cells: usize = (0..D)
            .map(|d| self.lengths[d].min(lattice.length()[d]))
            .product();
        cells * lattice.basis_indices()
    }
}
