//! Projected BCS / RVB amplitude.
//!
//! A single determinant whose (i, j) entry is phi(r_up_i - r_down_j) for a
//! translation-invariant pair amplitude phi, Gutzwiller-projected to one
//! particle per site: both species sit at exactly half filling and together
//! cover every site. The natural update is a two-particle move exchanging an
//! up particle with a down particle, which replaces one row and one column
//! of the matrix in a single rank-2 transaction.

use rand::Rng;
use std::sync::Arc;

use super::MoveRecord;
use crate::big::Big;
use crate::ceperley::{Amplitude, CeperleyMatrix};
use crate::lattice::HypercubicLattice;
use crate::positions::{Move, Particle, Positions, SingleParticleMove};
use crate::random::choose_random_particle;

#[derive(Debug, Clone)]
pub struct Rvb<const D: usize> {
    cmat: CeperleyMatrix,
    /// Pair amplitude indexed by the site index of r_up - r_down.
    phi: Vec<Amplitude>,
    lattice: Arc<HypercubicLattice<D>>,
    r: Positions,
    current: Option<MoveRecord>,
}

impl<const D: usize> Rvb<D> {
    pub fn new(r: Positions, lattice: Arc<HypercubicLattice<D>>, phi: Vec<Amplitude>) -> Self {
        let cmat = Self::build_matrix(&r, &lattice, &phi);
        Rvb {
            cmat,
            phi,
            lattice,
            r,
            current: None,
        }
    }

    fn build_matrix(
        r: &Positions,
        lattice: &HypercubicLattice<D>,
        phi: &[Amplitude],
    ) -> CeperleyMatrix {
        assert_eq!(r.n_species(), 2, "RVB amplitudes need two species");
        assert_eq!(r.n_sites(), lattice.total_sites());
        assert_eq!(
            2 * r.n_filled(0),
            lattice.total_sites(),
            "up species must be at half filling"
        );
        assert_eq!(
            2 * r.n_filled(1),
            lattice.total_sites(),
            "down species must be at half filling"
        );
        assert_eq!(phi.len(), r.n_sites());

        let m = r.n_filled(0);
        let up_pos = r.r_vector(0);
        let down_pos = r.r_vector(1);
        let mat = nalgebra::DMatrix::from_fn(m, m, |i, j| {
            Self::pair_amplitude(lattice, phi, up_pos[i], down_pos[j])
        });
        CeperleyMatrix::new(mat, false)
    }

    /// phi evaluated at the wrapped separation r_up - r_down.
    fn pair_amplitude(
        lattice: &HypercubicLattice<D>,
        phi: &[Amplitude],
        up_site: usize,
        down_site: usize,
    ) -> Amplitude {
        let mut separation = lattice.site_from_index(up_site);
        let down = lattice.site_from_index(down_site);
        lattice.subtract_site_vector(&mut separation, &down.bravais_site(), None);
        phi[lattice.site_to_index(&separation)]
    }

    pub fn psi(&self) -> Big {
        self.cmat.determinant()
    }

    pub fn positions(&self) -> &Positions {
        &self.r
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        &self.lattice
    }

    /// Stage a two-particle up/down exchange. The move must swap the sites
    /// of one up and one down particle.
    pub fn perform_move(&mut self, mv: Move) {
        assert!(self.current.is_none(), "move already in progress");
        assert_eq!(mv.len(), 2, "RVB moves exchange exactly two particles");
        assert_ne!(mv[0].particle.species, mv[1].particle.species);
        assert_eq!(self.r[mv[0].particle], mv[1].destination);
        assert_eq!(self.r[mv[1].particle], mv[0].destination);

        let (up_move, down_move) = if mv[0].particle.species == 0 {
            (&mv[0], &mv[1])
        } else {
            (&mv[1], &mv[0])
        };
        let row = up_move.particle.index;
        let col = down_move.particle.index;

        let record = MoveRecord::apply(&mut self.r, mv);

        // source matrix carrying the replaced row and column, evaluated at
        // the post-move positions
        let m = self.r.n_filled(0);
        let mut srcmat = nalgebra::DMatrix::zeros(m, m);
        let up_pos = self.r.r_vector(0);
        let down_pos = self.r.r_vector(1);
        for j in 0..m {
            srcmat[(row, j)] =
                Self::pair_amplitude(&self.lattice, &self.phi, up_pos[row], down_pos[j]);
        }
        for i in 0..m {
            srcmat[(i, col)] =
                Self::pair_amplitude(&self.lattice, &self.phi, up_pos[i], down_pos[col]);
        }

        self.cmat.update_rows_and_columns(&[row], &[col], &srcmat);
        self.current = Some(record);
    }

    pub fn finish_move(&mut self) {
        assert!(self.current.is_some(), "no move in progress");
        self.cmat.finish_rows_and_columns_update();
        self.current = None;
    }

    pub fn cancel_move(&mut self) {
        let record = self.current.take().expect("no move in progress");
        record.revert(&mut self.r);
        self.cmat.cancel_rows_and_columns_update();
    }

    pub fn swap_particles(&mut self, index1: usize, index2: usize, species: usize) {
        self.r.swap_particles(index1, index2, species);
        if species == 0 {
            self.cmat.swap_rows(index1, index2);
        } else {
            assert_eq!(species, 1);
            self.cmat.swap_columns(index1, index2);
        }
    }

    pub fn reset(&mut self, r: Positions) {
        assert!(self.current.is_none(), "reset during a move");
        self.cmat = Self::build_matrix(&r, &self.lattice, &self.phi);
        self.r = r;
    }

    /// Propose exchanging a random particle with the opposite-species
    /// occupant of a nearby site. Empty when no exchange is available.
    pub fn propose_random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Move {
        let particle = choose_random_particle(&self.r, rng);
        let proposed_site =
            self.lattice
                .plan_particle_move_to_nearby_empty_site(particle, &self.r, rng);
        if proposed_site == self.r[particle] {
            return Vec::new();
        }

        let other_species = particle.species ^ 1;
        let other_index = self
            .r
            .particle_index_at(proposed_site, other_species)
            .expect("every site of a projected spin configuration is occupied");
        let other_particle = Particle::new(other_index, other_species);

        vec![
            SingleParticleMove {
                particle,
                destination: proposed_site,
            },
            SingleParticleMove {
                particle: other_particle,
                destination: self.r[particle],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use num_complex::Complex64;

    fn pair_phi(l: usize) -> Vec<Amplitude> {
        // short-range pairing: strongest on-site, decaying with separation
        (0..l)
            .map(|n| Complex64::new(1.0 / (1.0 + n as f64), 0.0))
            .collect()
    }

    fn rvb_amplitude(up: Vec<usize>, down: Vec<usize>) -> Rvb<1> {
        let lattice = Arc::new(HypercubicLattice::new([6]));
        let phi = pair_phi(6);
        Rvb::new(Positions::new(vec![up, down], 6), lattice, phi)
    }

    fn assert_same_psi(a: &Rvb<1>, b: &Rvb<1>) {
        let x = a.psi().value();
        let y = b.psi().value();
        assert_relative_eq!(x.re, y.re, epsilon = 1e-10, max_relative = 1e-10);
        assert_relative_eq!(x.im, y.im, epsilon = 1e-10, max_relative = 1e-10);
    }

    #[test]
    fn test_exchange_move_matches_rebuild() {
        let mut rvb = rvb_amplitude(vec![0, 2, 4], vec![1, 3, 5]);
        // swap up particle 1 (site 2) with down particle 1 (site 3)
        rvb.perform_move(vec![
            SingleParticleMove {
                particle: Particle::new(1, 0),
                destination: 3,
            },
            SingleParticleMove {
                particle: Particle::new(1, 1),
                destination: 2,
            },
        ]);
        rvb.finish_move();
        assert_same_psi(&rvb, &rvb_amplitude(vec![0, 3, 4], vec![1, 2, 5]));
    }

    #[test]
    fn test_cancelled_exchange_is_invisible() {
        let mut rvb = rvb_amplitude(vec![0, 2, 4], vec![1, 3, 5]);
        let before = rvb.psi().value();
        rvb.perform_move(vec![
            SingleParticleMove {
                particle: Particle::new(0, 0),
                destination: 5,
            },
            SingleParticleMove {
                particle: Particle::new(2, 1),
                destination: 0,
            },
        ]);
        rvb.cancel_move();
        let after = rvb.psi().value();
        assert_relative_eq!(before.re, after.re, epsilon = 1e-12);
        assert_relative_eq!(before.im, after.im, epsilon = 1e-12);
        assert_eq!(rvb.positions().r_vector(0), &[0, 2, 4]);
    }

    #[test]
    fn test_swap_particles_negates_determinant() {
        let mut rvb = rvb_amplitude(vec![0, 2, 4], vec![1, 3, 5]);
        let before = rvb.psi().value();
        rvb.swap_particles(0, 2, 1);
        let after = rvb.psi().value();
        assert_relative_eq!(after.re, -before.re, epsilon = 1e-10);
        assert_relative_eq!(after.im, -before.im, epsilon = 1e-10);
    }

    #[test]
    fn test_proposed_moves_are_exchanges() {
        use rand_mt::Mt64;
        let rvb = rvb_amplitude(vec![0, 2, 4], vec![1, 3, 5]);
        let mut rng = Mt64::new(17);
        for _ in 0..50 {
            let mv = rvb.propose_random_move(&mut rng);
            if mv.is_empty() {
                continue;
            }
            assert_eq!(mv.len(), 2);
            assert_ne!(mv[0].particle.species, mv[1].particle.species);
            assert_eq!(rvb.positions()[mv[0].particle], mv[1].destination);
            assert_eq!(rvb.positions()[mv[1].particle], mv[0].destination);
        }
    }
}
