//! Free-fermion amplitude: a single Slater determinant.

use rand::Rng;
use std::sync::Arc;

use super::MoveRecord;
use crate::big::Big;
use crate::ceperley::CeperleyMatrix;
use crate::lattice::HypercubicLattice;
use crate::orbitals::FilledOrbitals;
use crate::positions::{Move, Positions, SingleParticleMove};
use crate::random::choose_random_particle;

/// A single determinant over one species of fermions. Column j of the
/// Slater matrix is the orbital-table column of the site occupied by
/// particle j.
#[derive(Debug, Clone)]
pub struct FreeFermion<const D: usize> {
    cmat: CeperleyMatrix,
    orbitals: Arc<FilledOrbitals<D>>,
    r: Positions,
    current: Option<MoveRecord>,
}

impl<const D: usize> FreeFermion<D> {
    pub fn new(r: Positions, orbitals: Arc<FilledOrbitals<D>>) -> Self {
        let cmat = Self::build_matrix(&r, &orbitals);
        FreeFermion {
            cmat,
            orbitals,
            r,
            current: None,
        }
    }

    fn build_matrix(r: &Positions, orbitals: &FilledOrbitals<D>) -> CeperleyMatrix {
        assert_eq!(r.n_species(), 1, "free-fermion amplitudes are single-species");
        assert_eq!(
            r.n_filled(0),
            orbitals.n_filled(),
            "particle number must match the number of filled orbitals"
        );
        assert_eq!(r.n_sites(), orbitals.n_sites());

        let n = orbitals.n_filled();
        let mut mat = nalgebra::DMatrix::zeros(n, n);
        for (j, &site) in r.r_vector(0).iter().enumerate() {
            mat.set_column(j, &orbitals.at_site(site));
        }
        CeperleyMatrix::new(mat, false)
    }

    pub fn psi(&self) -> Big {
        self.cmat.determinant()
    }

    pub fn positions(&self) -> &Positions {
        &self.r
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        self.orbitals.lattice()
    }

    pub fn orbitals(&self) -> &Arc<FilledOrbitals<D>> {
        &self.orbitals
    }

    pub fn perform_move(&mut self, mv: Move) {
        assert!(self.current.is_none(), "move already in progress");
        let record = MoveRecord::apply(&mut self.r, mv);
        let cols: Vec<(usize, usize)> = record
            .the_move()
            .iter()
            .map(|m| (m.particle.index, m.destination))
            .collect();
        self.cmat.update_columns(&cols, self.orbitals.table());
        self.current = Some(record);
    }

    pub fn finish_move(&mut self) {
        assert!(self.current.is_some(), "no move in progress");
        self.cmat.finish_columns_update();
        self.current = None;
    }

    pub fn cancel_move(&mut self) {
        let record = self.current.take().expect("no move in progress");
        record.revert(&mut self.r);
        self.cmat.cancel_columns_update();
    }

    pub fn swap_particles(&mut self, index1: usize, index2: usize, species: usize) {
        assert_eq!(species, 0);
        self.r.swap_particles(index1, index2, species);
        self.cmat.swap_columns(index1, index2);
    }

    pub fn reset(&mut self, r: Positions) {
        assert!(self.current.is_none(), "reset during a move");
        self.cmat = Self::build_matrix(&r, &self.orbitals);
        self.r = r;
    }

    pub fn propose_random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Move {
        let particle = choose_random_particle(&self.r, rng);
        let destination =
            self.lattice()
                .plan_particle_move_to_nearby_empty_site(particle, &self.r, rng);
        vec![SingleParticleMove {
            particle,
            destination,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryCondition;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    /// Chain of four sites, two filled momenta.
    fn chain_amplitude(sites: Vec<usize>) -> FreeFermion<1> {
        let lattice = Arc::new(HypercubicLattice::new([4]));
        let orbitals = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [1]],
            lattice,
            [BoundaryCondition::periodic()],
        ));
        FreeFermion::new(Positions::new(vec![sites], 4), orbitals)
    }

    fn assert_psi(ff: &FreeFermion<1>, expected: Complex64) {
        let v = ff.psi().value();
        assert_relative_eq!(v.re, expected.re, epsilon = 1e-10);
        assert_relative_eq!(v.im, expected.im, epsilon = 1e-10);
    }

    #[test]
    fn test_chain_determinant_and_move() {
        // particles on sites {0, 2}: det = 1*exp(i pi) - 1*1 = -2
        let mut ff = chain_amplitude(vec![0, 2]);
        assert_psi(&ff, Complex64::new(-2.0, 0.0));

        // particle 0 -> site 1: columns become (site 1, site 2), so
        // det = exp(i pi) - exp(i pi / 2) = -1 - i
        ff.perform_move(vec![SingleParticleMove {
            particle: crate::positions::Particle::new(0, 0),
            destination: 1,
        }]);
        assert_psi(&ff, Complex64::new(-1.0, -1.0));
        ff.finish_move();
        assert_psi(&ff, Complex64::new(-1.0, -1.0));

        let fresh = chain_amplitude(vec![1, 2]);
        let moved = ff.psi().value();
        let rebuilt = fresh.psi().value();
        assert_relative_eq!(moved.re, rebuilt.re, epsilon = 1e-10);
        assert_relative_eq!(moved.im, rebuilt.im, epsilon = 1e-10);
    }

    #[test]
    fn test_cancelled_move_restores_amplitude() {
        let mut ff = chain_amplitude(vec![0, 2]);
        ff.perform_move(vec![SingleParticleMove {
            particle: crate::positions::Particle::new(1, 0),
            destination: 3,
        }]);
        ff.cancel_move();
        assert_psi(&ff, Complex64::new(-2.0, 0.0));
        assert_eq!(ff.positions().r_vector(0), &[0, 2]);
    }

    #[test]
    fn test_reset_at_current_positions_is_identity() {
        let mut ff = chain_amplitude(vec![0, 2]);
        let before = ff.psi().value();
        let r = ff.positions().clone();
        ff.reset(r);
        let after = ff.psi().value();
        assert_relative_eq!(before.re, after.re, epsilon = 1e-10);
        assert_relative_eq!(before.im, after.im, epsilon = 1e-10);
    }

    #[test]
    fn test_swap_particles_negates_determinant() {
        let mut ff = chain_amplitude(vec![0, 2]);
        ff.swap_particles(0, 1, 0);
        assert_psi(&ff, Complex64::new(2.0, 0.0));
        assert_eq!(ff.positions().r_vector(0), &[2, 0]);
    }
}
