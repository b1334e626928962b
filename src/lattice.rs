//! Hypercubic lattices with an optional site basis.
//!
//! The lattice is a read-only service: it numbers sites, translates between
//! site objects and flat indices, applies boundary conditions (returning the
//! phase picked up when wrapping), and proposes nearest-neighbor moves for
//! the walks. It is shared across chains behind an `Arc`.

use num_complex::Complex64;
use rand::Rng;

use crate::boundary::BoundaryCondition;
use crate::positions::{Particle, Positions};

/// Coordinates of a Bravais cell.
pub type BravaisSite<const D: usize> = [i64; D];

/// A lattice site: Bravais coordinates plus an index into the cell basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Site<const D: usize> {
    pub coords: BravaisSite<D>,
    pub basis_index: i64,
}

impl<const D: usize> Site<D> {
    pub fn bravais_site(&self) -> BravaisSite<D> {
        self.coords
    }
}

/// A step direction in configuration space: a Bravais offset plus a basis
/// offset.
#[derive(Debug, Clone, Copy)]
struct MoveAxis<const D: usize> {
    step: [i64; D],
    basis_step: i64,
}

/// A D-dimensional hypercubic lattice.
#[derive(Debug, Clone)]
pub struct HypercubicLattice<const D: usize> {
    length: [usize; D],
    basis_indices: usize,
    offset: [usize; D],
    basis_offset: usize,
    total_sites: usize,
    move_axes: Vec<MoveAxis<D>>,
}

impl<const D: usize> HypercubicLattice<D> {
    /// A Bravais lattice (single-site basis) with the given axis lengths.
    pub fn new(length: [usize; D]) -> Self {
        Self::with_basis(length, 1)
    }

    /// A lattice whose unit cell carries `basis_indices` sites.
    pub fn with_basis(length: [usize; D], basis_indices: usize) -> Self {
        assert!(basis_indices > 0);
        assert!(length.iter().all(|&l| l > 0), "axis lengths must be positive");

        let mut offset = [0usize; D];
        let mut c = 1usize;
        for i in 0..D {
            offset[i] = c;
            c *= length[i];
        }
        let basis_offset = c;
        let total_sites = c * basis_indices;

        let mut move_axes = Vec::with_capacity(D + 1);
        for i in 0..D {
            let mut step = [0i64; D];
            step[i] = 1;
            move_axes.push(MoveAxis {
                step,
                basis_step: 0,
            });
        }
        if basis_indices > 1 {
            move_axes.push(MoveAxis {
                step: [0i64; D],
                basis_step: 1,
            });
        }

        HypercubicLattice {
            length,
            basis_indices,
            offset,
            basis_offset,
            total_sites,
            move_axes,
        }
    }

    pub fn total_sites(&self) -> usize {
        self.total_sites
    }

    pub fn length(&self) -> &[usize; D] {
        &self.length
    }

    pub fn basis_indices(&self) -> usize {
        self.basis_indices
    }

    pub fn site_is_valid(&self, site: &Site<D>) -> bool {
        site.coords
            .iter()
            .zip(self.length.iter())
            .all(|(&x, &l)| x >= 0 && (x as usize) < l)
            && site.basis_index >= 0
            && (site.basis_index as usize) < self.basis_indices
    }

    pub fn site_from_index(&self, mut n: usize) -> Site<D> {
        assert!(n < self.total_sites, "site index out of range");
        let mut coords = [0i64; D];
        for i in 0..D {
            coords[i] = (n % self.length[i]) as i64;
            n /= self.length[i];
        }
        Site {
            coords,
            basis_index: n as i64,
        }
    }

    pub fn site_to_index(&self, site: &Site<D>) -> usize {
        debug_assert!(self.site_is_valid(site));
        let mut n = 0usize;
        for i in 0..D {
            n += site.coords[i] as usize * self.offset[i];
        }
        n + site.basis_index as usize * self.basis_offset
    }

    /// Shift `site` by a Bravais vector and re-wrap it, returning the
    /// boundary phase if boundary conditions were supplied.
    pub fn add_site_vector(
        &self,
        site: &mut Site<D>,
        other: &BravaisSite<D>,
        bcs: Option<&[BoundaryCondition; D]>,
    ) -> Complex64 {
        for i in 0..D {
            site.coords[i] += other[i];
        }
        self.enforce_boundary(site, bcs)
    }

    /// Shift `site` by the negative of a Bravais vector and re-wrap it.
    pub fn subtract_site_vector(
        &self,
        site: &mut Site<D>,
        other: &BravaisSite<D>,
        bcs: Option<&[BoundaryCondition; D]>,
    ) -> Complex64 {
        for i in 0..D {
            site.coords[i] -= other[i];
        }
        self.enforce_boundary(site, bcs)
    }

    /// Wrap a possibly out-of-range site back onto the lattice. The return
    /// value is the phase accumulated from every boundary crossing, or 1 if
    /// no boundary conditions were supplied.
    pub fn enforce_boundary(
        &self,
        site: &mut Site<D>,
        bcs: Option<&[BoundaryCondition; D]>,
    ) -> Complex64 {
        let mut phase = Complex64::new(1.0, 0.0);
        for dim in 0..D {
            let l = self.length[dim] as i64;
            while site.coords[dim] >= l {
                site.coords[dim] -= l;
                if let Some(bcs) = bcs {
                    phase *= bcs[dim].phase();
                }
            }
            while site.coords[dim] < 0 {
                site.coords[dim] += l;
                if let Some(bcs) = bcs {
                    phase /= bcs[dim].phase();
                }
            }
        }

        let b = self.basis_indices as i64;
        while site.basis_index < 0 {
            site.basis_index += b;
        }
        site.basis_index %= b;

        debug_assert!(self.site_is_valid(site));
        phase
    }

    pub fn move_axes_count(&self) -> usize {
        self.move_axes.len()
    }

    /// Step `site` once along a move axis in the given direction (+1 or -1).
    pub fn move_site(&self, site: &mut Site<D>, move_axis: usize, step_direction: i64) {
        assert!(move_axis < self.move_axes.len());
        assert!(step_direction == 1 || step_direction == -1);
        let axis = &self.move_axes[move_axis];
        for i in 0..D {
            site.coords[i] += step_direction * axis.step[i];
        }
        site.basis_index += step_direction * axis.basis_step;
        self.enforce_boundary(site, None);
    }

    /// Walk from the particle's site along a random axis and direction until
    /// an unoccupied site is found. Returns the particle's own site if the
    /// whole row is occupied.
    pub fn plan_particle_move_to_nearby_empty_site<R: Rng + ?Sized>(
        &self,
        particle: Particle,
        r: &Positions,
        rng: &mut R,
    ) -> usize {
        let move_axis = if self.move_axes.len() == 1 {
            0
        } else {
            rng.gen_range(0..self.move_axes.len())
        };
        let step_direction = if rng.gen_range(0..2) == 0 { -1 } else { 1 };

        let start = r[particle];
        let mut site = self.site_from_index(start);
        loop {
            self.move_site(&mut site, move_axis, step_direction);
            let site_index = self.site_to_index(&site);
            if !r.is_occupied(site_index, particle.species) || site_index == start {
                return site_index;
            }
        }
    }
}
