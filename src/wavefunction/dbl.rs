//! D-wave Bose liquid amplitude: a product of two determinants.

use rand::Rng;
use std::sync::Arc;

use super::MoveRecord;
use crate::big::Big;
use crate::ceperley::CeperleyMatrix;
use crate::lattice::HypercubicLattice;
use crate::orbitals::FilledOrbitals;
use crate::positions::{Move, Positions, SingleParticleMove};
use crate::random::choose_random_particle;

/// det(D1)^a1 * det(D2)^a2 over a single unpolarized species; both
/// determinants run over the full configuration.
#[derive(Debug, Clone)]
pub struct Dbl<const D: usize> {
    cmat1: CeperleyMatrix,
    cmat2: CeperleyMatrix,
    orbitals1: Arc<FilledOrbitals<D>>,
    orbitals2: Arc<FilledOrbitals<D>>,
    d1_exponent: f64,
    d2_exponent: f64,
    r: Positions,
    current: Option<MoveRecord>,
}

impl<const D: usize> Dbl<D> {
    pub fn new(
        r: Positions,
        orbitals1: Arc<FilledOrbitals<D>>,
        orbitals2: Arc<FilledOrbitals<D>>,
        d1_exponent: f64,
        d2_exponent: f64,
    ) -> Self {
        let (cmat1, cmat2) =
            Self::build_matrices(&r, &orbitals1, &orbitals2, d1_exponent, d2_exponent);
        Dbl {
            cmat1,
            cmat2,
            orbitals1,
            orbitals2,
            d1_exponent,
            d2_exponent,
            r,
            current: None,
        }
    }

    fn build_matrices(
        r: &Positions,
        orbitals1: &FilledOrbitals<D>,
        orbitals2: &FilledOrbitals<D>,
        d1_exponent: f64,
        d2_exponent: f64,
    ) -> (CeperleyMatrix, CeperleyMatrix) {
        assert_eq!(r.n_species(), 1, "DBL amplitudes are single-species");
        assert_eq!(r.n_filled(0), orbitals1.n_filled());
        assert_eq!(r.n_filled(0), orbitals2.n_filled());
        assert_eq!(r.n_sites(), orbitals1.n_sites());
        assert_eq!(r.n_sites(), orbitals2.n_sites());

        let n = r.n_filled(0);
        let mut mat1 = nalgebra::DMatrix::zeros(n, n);
        let mut mat2 = nalgebra::DMatrix::zeros(n, n);
        for (j, &site) in r.r_vector(0).iter().enumerate() {
            mat1.set_column(j, &orbitals1.at_site(site));
            mat2.set_column(j, &orbitals2.at_site(site));
        }
        // a negative exponent blows up near-singular determinants, which is
        // exactly when the tracker must not trust a tiny det-ratio
        (
            CeperleyMatrix::new(mat1, d1_exponent < 0.0),
            CeperleyMatrix::new(mat2, d2_exponent < 0.0),
        )
    }

    pub fn psi(&self) -> Big {
        self.cmat1.determinant().powf(self.d1_exponent)
            * self.cmat2.determinant().powf(self.d2_exponent)
    }

    pub fn positions(&self) -> &Positions {
        &self.r
    }

    pub fn lattice(&self) -> &Arc<HypercubicLattice<D>> {
        self.orbitals1.lattice()
    }

    pub fn perform_move(&mut self, mv: Move) {
        assert!(self.current.is_none(), "move already in progress");
        let record = MoveRecord::apply(&mut self.r, mv);
        let cols: Vec<(usize, usize)> = record
            .the_move()
            .iter()
            .map(|m| (m.particle.index, m.destination))
            .collect();
        self.cmat1.update_columns(&cols, self.orbitals1.table());
        self.cmat2.update_columns(&cols, self.orbitals2.table());
        self.current = Some(record);
    }

    pub fn finish_move(&mut self) {
        assert!(self.current.is_some(), "no move in progress");
        self.cmat1.finish_columns_update();
        self.cmat2.finish_columns_update();
        self.current = None;
    }

    pub fn cancel_move(&mut self) {
        let record = self.current.take().expect("no move in progress");
        record.revert(&mut self.r);
        self.cmat1.cancel_columns_update();
        self.cmat2.cancel_columns_update();
    }

    pub fn swap_particles(&mut self, index1: usize, index2: usize, species: usize) {
        assert_eq!(species, 0);
        self.r.swap_particles(index1, index2, species);
        self.cmat1.swap_columns(index1, index2);
        self.cmat2.swap_columns(index1, index2);
    }

    pub fn reset(&mut self, r: Positions) {
        assert!(self.current.is_none(), "reset during a move");
        let (cmat1, cmat2) = Self::build_matrices(
            &r,
            &self.orbitals1,
            &self.orbitals2,
            self.d1_exponent,
            self.d2_exponent,
        );
        self.cmat1 = cmat1;
        self.cmat2 = cmat2;
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
