//! D-metal amplitude: four coupled determinants.
//!
//! The "d" determinants run over both species combined (down-spin particles
//! occupy columns offset by the up-spin count); the "f" determinants run
//! over one species each. The amplitude is the product of the four, each
//! raised to its own real exponent.

use rand::Rng;
use std::sync::Arc;

use super::MoveRecord;
use crate::big::Big;
use crate::ceperley::CeperleyMatrix;
use crate::lattice::HypercubicLattice;
use crate::orbitals::FilledOrbitals;
use crate::positions::{Move, Positions, SingleParticleMove};
use crate::random::choose_random_particle;

#[derive(Debug, Clone)]
pub struct DMetal<const D: usize> {
    cmat_d1: CeperleyMatrix,
    cmat_d2: CeperleyMatrix,
    cmat_f_up: CeperleyMatrix,
    cmat_f_down: CeperleyMatrix,
    orbital_d1: Arc<FilledOrbitals<D>>,
    orbital_d2: Arc<FilledOrbitals<D>>,
    orbital_f_up: Arc<FilledOrbitals<D>>,
    orbital_f_down: Arc<FilledOrbitals<D>>,
    d1_exponent: f64,
    d2_exponent: f64,
    f_up_exponent: f64,
    f_down_exponent: f64,
    r: Positions,
    current: Option<MoveRecord>,
    /// Which of the per-species trackers took part in the pending move.
    f_up_touched: bool,
    f_down_touched: bool,
}

impl<const D: usize> DMetal<D> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        r: Positions,
        orbital_d1: Arc<FilledOrbitals<D>>,
        orbital_d2: Arc<FilledOrbitals<D>>,
        orbital_f_up: Arc<FilledOrbitals<D>>,
        orbital_f_down: Arc<FilledOrbitals<D>>,
        exponents: [f64; 4],
    ) -> Self {
        let [d1_exponent, d2_exponent, f_up_exponent, f_down_exponent] = exponents;
        let (cmat_d1, cmat_d2, cmat_f_up, cmat_f_down) = Self::build_matrices(
            &r,
            &orbital_d1,
            &orbital_d2,
            &orbital_f_up,
            &orbital_f_down,
            exponents,
        );
        DMetal {
            cmat_d1,
            cmat_d2,
            cmat_f_up,
            cmat_f_down,
            orbital_d1,
            orbital_d2,
            orbital_f_up,
            orbital_f_down,
            d1_exponent,
            d2_exponent,
            f_up_exponent,
            f_down_exponent,
            r,
            current: None,
            f_up_touched: false,
            f_down_touched: false,
        }
    }

    fn build_matrices(
        r: &Positions,
        orbital_d1: &FilledOrbitals<D>,
        orbital_d2: &FilledOrbitals<D>,
        orbital_f_up: &FilledOrbitals<D>,
        orbital_f_down: &FilledOrbitals<D>,
        exponents: [f64; 4],
    ) -> (CeperleyMatrix, CeperleyMatrix, CeperleyMatrix, CeperleyMatrix) {
        assert_eq!(r.n_species(), 2, "D-metal amplitudes need two species");
        let n_up = r.n_filled(0);
        let n_down = r.n_filled(1);
        let n = n_up + n_down;
        assert_eq!(n, orbital_d1.n_filled());
        assert_eq!(n, orbital_d2.n_filled());
        assert_eq!(n_up, orbital_f_up.n_filled());
        assert_eq!(n_down, orbital_f_down.n_filled());
        assert_eq!(r.n_sites(), orbital_d1.n_sites());

        let mut mat_d1 = nalgebra::DMatrix::zeros(n, n);
        let mut mat_d2 = nalgebra::DMatrix::zeros(n, n);
        let mut mat_f_up = nalgebra::DMatrix::zeros(n_up, n_up);
        let mut mat_f_down = nalgebra::DMatrix::zeros(n_down, n_down);

        for (i, &site) in r.r_vector(0).iter().enumerate() {
            mat_d1.set_column(i, &orbital_d1.at_site(site));
            mat_d2.set_column(i, &orbital_d2.at_site(site));
            mat_f_up.set_column(i, &orbital_f_up.at_site(site));
        }
        for (i, &site) in r.r_vector(1).iter().enumerate() {
            mat_d1.set_column(i + n_up, &orbital_d1.at_site(site));
            mat_d2.set_column(i + n_up, &orbital_d2.at_site(site));
            mat_f_down.set_column(i, &orbital_f_down.at_site(site));
        }

        (
            CeperleyMatrix::new(mat_d1, exponents[0] < 0.0),
            CeperleyMatrix::new(mat_d2, exponents[1] < 0.0),
            CeperleyMatrix::new(mat_f_up, exponents[2] < 0.0),
            CeperleyMatrix::new(mat_f_down, exponents[3] < 0.0),
        )
    }

    /// Column of the combined "d" matrices belonging to a particle.
    fn d_column(&self, particle: crate::positions::Particle) -> usize {
        if particle.species == 0 {
            particle.index
        } else {
            particle.index + self.r.n_filled(0)
        }
    }

    pub fn psi(&self) -> Big {
        self.cmat_d1.determinant().powf(self.d1_exponent)
            * self.cmat_d2.determinant().powf(self.d2_exponent)
            * self.cmat_f_up.determinant().powf(self.f_up_exponent)
            * self.cmat_f_down.determinant().powf(self.f_down_exponent)
    }

    pub fn positions(&self) -> &Positions {
        &self.r
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        self.orbital_d1.lattice()
    }

    pub fn perform_move(&mut self, mv: Move) {
        assert!(self.current.is_none(), "move already in progress");
        let record = MoveRecord::apply(&mut self.r, mv);

        let mut d_cols = Vec::with_capacity(record.the_move().len());
        let mut f_up_cols = Vec::new();
        let mut f_down_cols = Vec::new();
        for m in record.the_move() {
            d_cols.push((self.d_column(m.particle), m.destination));
            if m.particle.species == 0 {
                f_up_cols.push((m.particle.index, m.destination));
            } else {
                f_down_cols.push((m.particle.index, m.destination));
            }
        }

        self.cmat_d1.update_columns(&d_cols, self.orbital_d1.table());
        self.cmat_d2.update_columns(&d_cols, self.orbital_d2.table());
        self.f_up_touched = !f_up_cols.is_empty();
        if self.f_up_touched {
            self.cmat_f_up
                .update_columns(&f_up_cols, self.orbital_f_up.table());
        }
        self.f_down_touched = !f_down_cols.is_empty();
        if self.f_down_touched {
            self.cmat_f_down
                .update_columns(&f_down_cols, self.orbital_f_down.table());
        }

        self.current = Some(record);
    }

    pub fn finish_move(&mut self) {
        assert!(self.current.is_some(), "no move in progress");
        self.cmat_d1.finish_columns_update();
        self.cmat_d2.finish_columns_update();
        if self.f_up_touched {
            self.cmat_f_up.finish_columns_update();
        }
        if self.f_down_touched {
            self.cmat_f_down.finish_columns_update();
        }
        self.current = None;
    }

    pub fn cancel_move(&mut self) {
        let record = self.current.take().expect("no move in progress");
        record.revert(&mut self.r);
        self.cmat_d1.cancel_columns_update();
        self.cmat_d2.cancel_columns_update();
        if self.f_up_touched {
            self.cmat_f_up.cancel_columns_update();
        }
        if self.f_down_touched {
            self.cmat_f_down.cancel_columns_update();
        }
    }

    pub fn swap_particles(&mut self, index1: usize, index2: usize, species: usize) {
        let n_up = self.r.n_filled(0);
        self.r.swap_particles(index1, index2, species);
        if species == 0 {
            self.cmat_d1.swap_columns(index1, index2);
            self.cmat_d2.swap_columns(index1, index2);
            self.cmat_f_up.swap_columns(index1, index2);
        } else {
            self.cmat_d1.swap_columns(index1 + n_up, index2 + n_up);
            self.cmat_d2.swap_columns(index1 + n_up, index2 + n_up);
            self.cmat_f_down.swap_columns(index1, index2);
        }
    }

    pub fn reset(&mut self, r: Positions) {
        assert!(self.current.is_none(), "reset during a move");
        let exponents = [
            self.d1_exponent,
            self.d2_exponent,
            self.f_up_exponent,
            self.f_down_exponent,
        ];
        let (d1, d2, f_up, f_down) = Self::build_matrices(
            &r,
            &self.orbital_d1,
            &self.orbital_d2,
            &self.orbital_f_up,
            &self.orbital_f_down,
            exponents,
        );
        self.cmat_d1 = d1;
        self.cmat_d2 = d2;
        self.cmat_f_up = f_up;
        self.cmat_f_down = f_down;
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
    use crate::positions::Particle;
    use approx::assert_relative_eq;

    fn dmetal_amplitude(up: Vec<usize>, down: Vec<usize>) -> DMetal<1> {
        let lattice = Arc::new(HypercubicLattice::new([6]));
        let bcs = [BoundaryCondition::periodic()];
        let d1 = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [1], [5], [2]],
            lattice.clone(),
            bcs,
        ));
        let d2 = Arc::new(FilledOrbitals::from_momenta(
            &[[0], [3], [1], [5]],
            lattice.clone(),
            bcs,
        ));
        let f_up = Arc::new(FilledOrbitals::from_momenta(&[[0], [1]], lattice.clone(), bcs));
        let f_down = Arc::new(FilledOrbitals::from_momenta(&[[0], [5]], lattice, bcs));
        DMetal::new(
            Positions::new(vec![up, down], 6),
            d1,
            d2,
            f_up,
            f_down,
            [1.0, 1.0, 1.0, 1.0],
        )
    }

    fn assert_same_psi(a: &DMetal<1>, b: &DMetal<1>) {
        let x = a.psi().value();
        let y = b.psi().value();
        assert_relative_eq!(x.re, y.re, epsilon = 1e-10, max_relative = 1e-10);
        assert_relative_eq!(x.im, y.im, epsilon = 1e-10, max_relative = 1e-10);
    }

    #[test]
    fn test_up_move_matches_rebuild() {
        let mut dm = dmetal_amplitude(vec![0, 2], vec![1, 4]);
        dm.perform_move(vec![SingleParticleMove {
            particle: Particle::new(0, 0),
            destination: 3,
        }]);
        dm.finish_move();
        assert_same_psi(&dm, &dmetal_amplitude(vec![3, 2], vec![1, 4]));
    }

    #[test]
    fn test_down_move_matches_rebuild() {
        let mut dm = dmetal_amplitude(vec![0, 2], vec![1, 4]);
        dm.perform_move(vec![SingleParticleMove {
            particle: Particle::new(1, 1),
            destination: 5,
        }]);
        dm.finish_move();
        assert_same_psi(&dm, &dmetal_amplitude(vec![0, 2], vec![1, 5]));
    }

    #[test]
    fn test_cancel_restores_all_trackers() {
        let mut dm = dmetal_amplitude(vec![0, 2], vec![1, 4]);
        let before = dm.psi().value();
        dm.perform_move(vec![SingleParticleMove {
            particle: Particle::new(1, 1),
            destination: 3,
        }]);
        dm.cancel_move();
        let after = dm.psi().value();
        assert_relative_eq!(before.re, after.re, epsilon = 1e-12);
        assert_relative_eq!(before.im, after.im, epsilon = 1e-12);
    }

    #[test]
    fn test_swap_within_species_flips_two_dets() {
        let mut dm = dmetal_amplitude(vec![0, 2], vec![1, 4]);
        let before = dm.psi().value();
        // the d1, d2, and f_up determinants each change sign, so the
        // product changes sign once
        dm.swap_particles(0, 1, 0);
        let after = dm.psi().value();
        assert_relative_eq!(after.re, -before.re, epsilon = 1e-10);
        assert_relative_eq!(after.im, -before.im, epsilon = 1e-10);
    }
}
