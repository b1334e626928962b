//! Density-density correlation measurement.

use nalgebra::{DMatrix, DVector};

use super::Measurement;
use crate::positions::Particle;
use crate::walk::StandardWalk;

/// Accumulates <n_{i+delta} n_i> over displacements delta, binned by the
/// basis index of the reference site. Rows of the result are basis indices,
/// columns are displacement site indices.
#[derive(Debug, Clone)]
pub struct DensityDensityMeasurement<const D: usize> {
    density_accum: DMatrix<u64>,
    current_density_accum: DMatrix<u64>,
    denominator: DVector<u64>,
    current_denominator: DVector<u64>,
}

impl<const D: usize> DensityDensityMeasurement<D> {
    pub fn new() -> Self {
        DensityDensityMeasurement {
            density_accum: DMatrix::zeros(0, 0),
            current_density_accum: DMatrix::zeros(0, 0),
            denominator: DVector::zeros(0),
            current_denominator: DVector::zeros(0),
        }
    }

    pub fn basis_indices(&self) -> usize {
        self.density_accum.nrows()
    }

    pub fn n_sites(&self) -> usize {
        self.density_accum.ncols()
    }

    /// Normalized correlation at a displacement index, for one basis row.
    pub fn get(&self, site_index: usize, basis_index: usize) -> f64 {
        assert!(site_index < self.density_accum.ncols());
        assert!(basis_index < self.density_accum.nrows());
        self.density_accum[(basis_index, site_index)] as f64
            / self.denominator[basis_index] as f64
    }

    /// All rows, for serialization.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.basis_indices())
            .map(|basis| {
                (0..self.n_sites())
                    .map(|site| self.get(site, basis))
                    .collect()
            })
            .collect()
    }

    /// Tally the current configuration into the scratch accumulators.
    fn measure(&mut self, walk: &StandardWalk<D>) {
        let wf = walk.wavefunction();
        let r = wf.positions();
        let lattice = wf.lattice();

        self.current_density_accum.fill(0);
        self.current_denominator.fill(0);

        for species_i in 0..r.n_species() {
            for i in 0..r.n_filled(species_i) {
                let site_i = lattice.site_from_index(r[Particle::new(i, species_i)]);
                for species_j in 0..r.n_species() {
                    for j in 0..r.n_filled(species_j) {
                        let mut site_j =
                            lattice.site_from_index(r[Particle::new(j, species_j)]);
                        lattice.subtract_site_vector(&mut site_j, &site_i.bravais_site(), None);
                        self.current_density_accum
                            [(site_i.basis_index as usize, lattice.site_to_index(&site_j))] += 1;
                    }
                }
                self.current_denominator[site_i.basis_index as usize] += 1;
            }
        }
    }

    fn accumulate(&mut self) {
        self.density_accum += &self.current_density_accum;
        self.denominator += &self.current_denominator;
    }
}

impl<const D: usize> Measurement<StandardWalk<D>> for DensityDensityMeasurement<D> {
    fn initialize(&mut self, walk: &StandardWalk<D>) {
        let lattice = walk.wavefunction().lattice();
        let total_sites = lattice.total_sites();
        assert!(total_sites > 0);
        let basis_indices = lattice.basis_indices();
        self.density_accum = DMatrix::zeros(basis_indices, total_sites);
        self.current_density_accum = DMatrix::zeros(basis_indices, total_sites);
        self.denominator = DVector::zeros(basis_indices);
        self.current_denominator = DVector::zeros(basis_indices);
    }

    fn step_advanced(&mut self, walk: &StandardWalk<D>) {
        self.measure(walk);
        self.accumulate();
    }

    fn step_repeated(&mut self, _walk: &StandardWalk<D>) {
        // a rejected step re-counts the configuration measured last
        self.accumulate();
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
