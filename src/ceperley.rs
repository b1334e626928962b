//! Determinant tracking under low-rank updates.
//!
//! `CeperleyMatrix` keeps a square matrix together with its inverse and its
//! determinant, updating all three in O(N) or O(N^2) when rows or columns are
//! replaced, via the Sherman-Morrison-Woodbury identity. The type is a small
//! state machine: every `update_*` call must be closed by the matching
//! `finish_*` or `cancel_*` before any other mutating call, and the
//! determinant of the proposed matrix is available between the two. The
//! inverse is only patched on `finish_*`, so a rejected Monte Carlo move
//! never pays the O(N^2) cost.
//!
//! The determinant is stored as a `Big` whose base is reset to the unit
//! circle at every from-scratch refresh; when the base drifts outside the
//! cutoffs, or when the matrix may have turned singular, the inverse and
//! determinant are recomputed by full-pivot LU.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector, RowDVector};
use num_complex::Complex64;

use crate::big::Big;

pub type Amplitude = Complex64;

/// Pending transaction state. `None` is the ready state; every other variant
/// carries exactly what is needed to finish or cancel the update.
#[derive(Debug, Clone)]
enum Pending {
    None,
    Row {
        index: usize,
        old_row: RowDVector<Amplitude>,
    },
    Column {
        index: usize,
        old_col: DVector<Amplitude>,
    },
    Columns {
        indices: Vec<usize>,
        old_cols: DMatrix<Amplitude>,
        cols_offset: DMatrix<Amplitude>,
        detrat_inv: Option<DMatrix<Amplitude>>,
    },
    RowsAndColumns {
        row_indices: Vec<usize>,
        col_indices: Vec<usize>,
        old_rows: DMatrix<Amplitude>,
        old_cols: DMatrix<Amplitude>,
        rows_offset: DMatrix<Amplitude>,
        cols_offset: DMatrix<Amplitude>,
        detrat_inv: Option<DMatrix<Amplitude>>,
    },
}

impl Pending {
    fn is_none(&self) -> bool {
        matches!(self, Pending::None)
    }
}

/// A square matrix tracked together with its inverse and determinant.
#[derive(Debug, Clone)]
pub struct CeperleyMatrix {
    mat: DMatrix<Amplitude>,
    invmat: DMatrix<Amplitude>,
    det: Big,
    old_det: Big,
    detrat: Amplitude,
    /// A provable lower bound on the nullity; zero exactly when the matrix
    /// is known invertible.
    nullity_lower_bound: i64,
    new_nullity_lower_bound: i64,
    /// Inverse recomputed mid-update, awaiting commit on `finish_*`.
    new_invmat: Option<DMatrix<Amplitude>>,
    be_extra_careful: bool,
    pending: Pending,
}

impl CeperleyMatrix {
    /// Outside this interval of the determinant base's modulus, `finish_*`
    /// refreshes from scratch instead of patching the inverse.
    pub const LOWER_CUTOFF: f64 = 1e-50;
    pub const UPPER_CUTOFF: f64 = 1e50;

    /// Threshold for the eager mid-update refresh in extra-careful mode. A
    /// base this small often means the matrix went singular, which must be
    /// detected before the new determinant is trusted (e.g. when a negative
    /// exponent will be applied to it).
    pub const SAFE_LOWER_CUTOFF: f64 = 1e-6;

    const INVERSE_ERROR_WARNING: f64 = 1e-4;

    /// Track the given square matrix. `be_extra_careful` requests the eager
    /// refresh whenever the determinant base drops below
    /// [`Self::SAFE_LOWER_CUTOFF`] during an update.
    pub fn new(mat: DMatrix<Amplitude>, be_extra_careful: bool) -> Self {
        assert_eq!(mat.nrows(), mat.ncols(), "matrix must be square");
        let n = mat.nrows();
        let mut cm = CeperleyMatrix {
            mat,
            invmat: DMatrix::zeros(n, n),
            det: Big::zero(),
            old_det: Big::zero(),
            detrat: Amplitude::new(0.0, 0.0),
            nullity_lower_bound: 0,
            new_nullity_lower_bound: 0,
            new_invmat: None,
            be_extra_careful,
            pending: Pending::None,
        };
        cm.calculate_inverse(false);
        cm
    }

    pub fn dimension(&self) -> usize {
        self.mat.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<Amplitude> {
        &self.mat
    }

    /// The tracked inverse. Only meaningful between transactions and while
    /// the matrix is known invertible.
    pub fn inverse(&self) -> &DMatrix<Amplitude> {
        assert!(self.pending.is_none(), "inverse read during an update");
        assert!(self.nullity_lower_bound == 0, "inverse of a singular matrix");
        &self.invmat
    }

    /// The current determinant; O(1), valid in every state.
    pub fn determinant(&self) -> Big {
        self.det
    }

    pub fn is_singular(&self) -> bool {
        self.det.is_zero()
    }

    /// Swap two rows in place, negating the determinant. No transaction.
    pub fn swap_rows(&mut self, r1: usize, r2: usize) {
        assert!(self.pending.is_none());
        assert!(r1 < self.mat.nrows() && r2 < self.mat.nrows() && r1 != r2);

        self.mat.swap_rows(r1, r2);
        if self.nullity_lower_bound == 0 {
            self.invmat.swap_columns(r1, r2);
        }
        self.det *= Amplitude::new(-1.0, 0.0);
    }

    /// Swap two columns in place, negating the determinant. No transaction.
    pub fn swap_columns(&mut self, c1: usize, c2: usize) {
        assert!(self.pending.is_none());
        assert!(c1 < self.mat.ncols() && c2 < self.mat.ncols() && c1 != c2);

        self.mat.swap_columns(c1, c2);
        if self.nullity_lower_bound == 0 {
            self.invmat.swap_rows(c1, c2);
        }
        self.det *= Amplitude::new(-1.0, 0.0);
    }

    /// Replace row `r`, making the new determinant available in O(N).
    /// The inverse is not updated until [`Self::finish_row_update`].
    pub fn update_row(&mut self, r: usize, row: &RowDVector<Amplitude>) {
        assert!(r < self.mat.nrows());
        assert_eq!(row.ncols(), self.mat.ncols());
        assert!(self.pending.is_none(), "update started during a transaction");
        assert!(self.new_invmat.is_none());

        let old_row = self.mat.row(r).clone_owned();
        self.old_det = self.det;
        self.new_nullity_lower_bound = self.nullity_lower_bound;

        self.mat.set_row(r, row);

        if self.nullity_lower_bound == 0 {
            // Sherman-Morrison: the det ratio is the new row against the
            // tracked inverse's corresponding column.
            self.detrat = row
                .iter()
                .zip(self.invmat.column(r).iter())
                .map(|(a, b)| a * b)
                .sum();
            self.det *= self.detrat;

            if self.det.is_nonzero() {
                if self.be_extra_careful && self.det.base().norm() < Self::SAFE_LOWER_CUTOFF {
                    self.calculate_inverse(true);
                }
            } else {
                self.new_nullity_lower_bound = 1;
            }
        } else {
            self.perform_singular_update(1);
        }

        self.pending = Pending::Row { index: r, old_row };
    }

    /// Replace column `c`. Mirror image of [`Self::update_row`].
    pub fn update_column(&mut self, c: usize, col: &DVector<Amplitude>) {
        assert!(c < self.mat.ncols());
        assert_eq!(col.nrows(), self.mat.nrows());
        assert!(self.pending.is_none(), "update started during a transaction");
        assert!(self.new_invmat.is_none());

        let old_col = self.mat.column(c).clone_owned();
        self.old_det = self.det;
        self.new_nullity_lower_bound = self.nullity_lower_bound;

        self.mat.set_column(c, col);

        if self.nullity_lower_bound == 0 {
            self.detrat = col
                .iter()
                .zip(self.invmat.row(c).iter())
                .map(|(a, b)| a * b)
                .sum();
            self.det *= self.detrat;

            if self.det.is_nonzero() {
                if self.be_extra_careful && self.det.base().norm() < Self::SAFE_LOWER_CUTOFF {
                    self.calculate_inverse(true);
                }
            } else {
                self.new_nullity_lower_bound = 1;
            }
        } else {
            self.perform_singular_update(1);
        }

        self.pending = Pending::Column { index: c, old_col };
    }

    /// Replace one or more columns. Each pair is `(destination column in the
    /// tracked matrix, source column in srcmat)`, so large source tables can
    /// be used without copying columns out first.
    pub fn update_columns(&mut self, cols: &[(usize, usize)], srcmat: &DMatrix<Amplitude>) {
        let n = self.mat.nrows();
        let k = cols.len();
        assert!(k > 0 && k <= self.mat.ncols());
        assert_eq!(srcmat.nrows(), n);
        assert!(self.pending.is_none(), "update started during a transaction");
        assert!(self.new_invmat.is_none());
        assert!(self.nullity_lower_bound >= 0);

        let mut old_cols = DMatrix::zeros(n, k);
        let mut cols_offset = DMatrix::zeros(n, k);
        let mut indices = Vec::with_capacity(k);
        for (i, &(dest, src)) in cols.iter().enumerate() {
            assert!(dest < self.mat.ncols());
            assert!(src < srcmat.ncols());
            debug_assert!(!indices.contains(&dest), "duplicate destination column");
            old_cols.set_column(i, &self.mat.column(dest));
            // everything downstream is based on the offset columns, which is
            // essential for stability
            let offset = srcmat.column(src) - self.mat.column(dest);
            cols_offset.set_column(i, &offset);
            let updated = self.mat.column(dest) + cols_offset.column(i);
            self.mat.set_column(dest, &updated);
            indices.push(dest);
        }
        self.old_det = self.det;
        self.new_nullity_lower_bound = self.nullity_lower_bound;

        let mut detrat_inv = None;
        if self.nullity_lower_bound != 0 {
            self.perform_singular_update(k as i64);
        } else {
            let mut detrat_m = DMatrix::<Amplitude>::zeros(k, k);
            for i in 0..k {
                for j in 0..k {
                    detrat_m[(i, j)] = self
                        .invmat
                        .row(indices[i])
                        .iter()
                        .zip(cols_offset.column(j).iter())
                        .map(|(a, b)| a * b)
                        .sum();
                }
                detrat_m[(i, i)] += Amplitude::new(1.0, 0.0);
            }

            self.apply_block_detrat(detrat_m, &mut detrat_inv);
        }

        self.pending = Pending::Columns {
            indices,
            old_cols,
            cols_offset,
            detrat_inv,
        };
    }

    /// Replace one or more rows and/or columns in a single rank-k
    /// transaction. Entries of `srcmat` outside the named rows and columns
    /// are ignored. O(N) when only rows or only columns are given, O(N^2)
    /// when both are.
    pub fn update_rows_and_columns(
        &mut self,
        rows: &[usize],
        cols: &[usize],
        srcmat: &DMatrix<Amplitude>,
    ) {
        let n = self.mat.nrows();
        let nr = rows.len();
        let nc = cols.len();
        assert!(nr > 0 || nc > 0);
        assert!(nr <= n && nc <= self.mat.ncols());
        assert_eq!(srcmat.nrows(), n);
        assert_eq!(srcmat.ncols(), self.mat.ncols());
        assert!(self.pending.is_none(), "update started during a transaction");
        assert!(self.new_invmat.is_none());

        let mut old_rows = DMatrix::zeros(nr, self.mat.ncols());
        let mut rows_offset = DMatrix::zeros(nr, self.mat.ncols());
        for (i, &r) in rows.iter().enumerate() {
            assert!(r < n);
            debug_assert!(!rows[..i].contains(&r), "duplicate row index");
            old_rows.set_row(i, &self.mat.row(r));
            let offset = srcmat.row(r) - self.mat.row(r);
            rows_offset.set_row(i, &offset);
            let updated = self.mat.row(r) + rows_offset.row(i);
            self.mat.set_row(r, &updated);
        }

        let mut old_cols = DMatrix::zeros(n, nc);
        let mut cols_offset = DMatrix::zeros(n, nc);
        for (i, &c) in cols.iter().enumerate() {
            assert!(c < self.mat.ncols());
            debug_assert!(!cols[..i].contains(&c), "duplicate column index");
            old_cols.set_column(i, &self.mat.column(c));
            let offset = srcmat.column(c) - self.mat.column(c);
            cols_offset.set_column(i, &offset);
            let updated = self.mat.column(c) + cols_offset.column(i);
            self.mat.set_column(c, &updated);
        }

        self.old_det = self.det;
        self.new_nullity_lower_bound = self.nullity_lower_bound;

        let mut detrat_inv = None;
        if self.nullity_lower_bound != 0 {
            self.perform_singular_update((nr + nc) as i64);
        } else {
            let m = nc + nr;
            let mut detrat_m = DMatrix::<Amplitude>::zeros(m, m);
            for i in 0..nc {
                for j in 0..nc {
                    detrat_m[(i, j)] = self
                        .invmat
                        .row(cols[i])
                        .iter()
                        .zip(cols_offset.column(j).iter())
                        .map(|(a, b)| a * b)
                        .sum();
                }
                for j in 0..nr {
                    detrat_m[(i, j + nc)] = self.invmat[(cols[i], rows[j])];
                }
                detrat_m[(i, i)] += Amplitude::new(1.0, 0.0);
            }
            for i in 0..nr {
                // the row-column cross terms need a full pass over the
                // inverse, which is what makes mixed updates O(N^2)
                let row_through_inv = rows_offset.row(i).clone_owned() * &self.invmat;
                for j in 0..nc {
                    detrat_m[(i + nc, j)] = row_through_inv
                        .iter()
                        .zip(cols_offset.column(j).iter())
                        .map(|(a, b)| a * b)
                        .sum();
                }
                for j in 0..nr {
                    detrat_m[(i + nc, j + nc)] = rows_offset
                        .row(i)
                        .iter()
                        .zip(self.invmat.column(rows[j]).iter())
                        .map(|(a, b)| a * b)
                        .sum();
                }
                detrat_m[(i + nc, i + nc)] += Amplitude::new(1.0, 0.0);
            }

            self.apply_block_detrat(detrat_m, &mut detrat_inv);
        }

        self.pending = Pending::RowsAndColumns {
            row_indices: rows.to_vec(),
            col_indices: cols.to_vec(),
            old_rows,
            old_cols,
            rows_offset,
            cols_offset,
            detrat_inv,
        };
    }

    /// Commit a row update, patching the inverse in O(N^2).
    pub fn finish_row_update(&mut self) {
        let (index, detrat) = match &self.pending {
            Pending::Row { index, .. } => (*index, self.detrat),
            _ => panic!("finish_row_update without a pending row update"),
        };

        if self.new_nullity_lower_bound == 0 && self.new_invmat.is_none() {
            if self.base_outside_cutoffs() {
                self.calculate_inverse(true);
            } else {
                // rank-1 inverse patch, eqn (12) of Ceperley et al.
                let old_col = self.invmat.column(index).clone_owned();
                let row_times_inv = self.mat.row(index).clone_owned() * &self.invmat;
                self.invmat -= (&old_col / detrat) * row_times_inv;
                self.invmat.set_column(index, &(old_col / detrat));
            }
        }

        self.commit();
    }

    /// Commit a column update, patching the inverse in O(N^2).
    pub fn finish_column_update(&mut self) {
        let (index, detrat) = match &self.pending {
            Pending::Column { index, .. } => (*index, self.detrat),
            _ => panic!("finish_column_update without a pending column update"),
        };

        if self.new_nullity_lower_bound == 0 && self.new_invmat.is_none() {
            if self.base_outside_cutoffs() {
                self.calculate_inverse(true);
            } else {
                let old_row = self.invmat.row(index).clone_owned();
                let inv_times_col = &self.invmat * self.mat.column(index);
                self.invmat -= inv_times_col * (&old_row / detrat);
                self.invmat.set_row(index, &(old_row / detrat));
            }
        }

        self.commit();
    }

    /// Commit a multi-column update.
    pub fn finish_columns_update(&mut self) {
        assert!(
            matches!(self.pending, Pending::Columns { .. }),
            "finish_columns_update without a pending columns update"
        );

        if self.new_nullity_lower_bound == 0 && self.new_invmat.is_none() {
            if self.base_outside_cutoffs() {
                self.calculate_inverse(true);
            } else if let Pending::Columns {
                indices,
                cols_offset,
                detrat_inv: Some(detrat_inv),
                ..
            } = &self.pending
            {
                let n = self.mat.nrows();
                let mut offset = DMatrix::<Amplitude>::zeros(n, n);
                for (i, &ci) in indices.iter().enumerate() {
                    let scale = cols_offset * detrat_inv.column(i);
                    let v = &self.invmat * scale;
                    offset -= v * self.invmat.row(ci).clone_owned();
                }
                self.invmat += offset;
            } else {
                unreachable!("non-singular columns update lost its block inverse");
            }
        }

        self.commit();
    }

    /// Commit a mixed rows-and-columns update.
    pub fn finish_rows_and_columns_update(&mut self) {
        assert!(
            matches!(self.pending, Pending::RowsAndColumns { .. }),
            "finish_rows_and_columns_update without a pending update"
        );

        if self.new_nullity_lower_bound == 0 && self.new_invmat.is_none() {
            if self.base_outside_cutoffs() {
                self.calculate_inverse(true);
            } else if let Pending::RowsAndColumns {
                row_indices,
                col_indices,
                rows_offset,
                cols_offset,
                detrat_inv: Some(detrat_inv),
                ..
            } = &self.pending
            {
                let n = self.mat.nrows();
                let nr = row_indices.len();
                let nc = col_indices.len();
                let cm = &self.invmat * cols_offset;
                let rm = rows_offset * &self.invmat;
                let mut offset = DMatrix::<Amplitude>::zeros(n, n);
                for i in 0..nc {
                    let inv_row_ci = self.invmat.row(col_indices[i]).clone_owned();
                    let v = &cm * detrat_inv.view((0, i), (nc, 1)).clone_owned();
                    offset -= v * &inv_row_ci;
                    for j in 0..nr {
                        let inv_col_rj = self.invmat.column(row_indices[j]).clone_owned();
                        offset -= (inv_col_rj * &inv_row_ci) * detrat_inv[(j + nc, i)];
                    }
                }
                for j in 0..nr {
                    let inv_col_rj = self.invmat.column(row_indices[j]).clone_owned();
                    let w = detrat_inv.view((j + nc, nc), (1, nr)).clone_owned() * &rm;
                    offset -= inv_col_rj * w;
                }
                offset -= &cm * detrat_inv.view((0, nc), (nc, nr)).clone_owned() * &rm;
                self.invmat += offset;
            } else {
                unreachable!("non-singular mixed update lost its block inverse");
            }
        }

        self.commit();
    }

    /// Abort a row update, restoring the matrix and determinant.
    pub fn cancel_row_update(&mut self) {
        let pending = std::mem::replace(&mut self.pending, Pending::None);
        match pending {
            Pending::Row { index, old_row } => self.mat.set_row(index, &old_row),
            _ => panic!("cancel_row_update without a pending row update"),
        }
        self.rollback();
    }

    /// Abort a column update.
    pub fn cancel_column_update(&mut self) {
        let pending = std::mem::replace(&mut self.pending, Pending::None);
        match pending {
            Pending::Column { index, old_col } => self.mat.set_column(index, &old_col),
            _ => panic!("cancel_column_update without a pending column update"),
        }
        self.rollback();
    }

    /// Abort a multi-column update.
    pub fn cancel_columns_update(&mut self) {
        let pending = std::mem::replace(&mut self.pending, Pending::None);
        match pending {
            Pending::Columns {
                indices, old_cols, ..
            } => {
                for (i, &c) in indices.iter().enumerate() {
                    self.mat.set_column(c, &old_cols.column(i).clone_owned());
                }
            }
            _ => panic!("cancel_columns_update without a pending columns update"),
        }
        self.rollback();
    }

    /// Abort a mixed rows-and-columns update.
    pub fn cancel_rows_and_columns_update(&mut self) {
        let pending = std::mem::replace(&mut self.pending, Pending::None);
        match pending {
            Pending::RowsAndColumns {
                row_indices,
                col_indices,
                old_rows,
                old_cols,
                ..
            } => {
                // columns were saved after the rows had been written, so they
                // must be restored first
                for (i, &c) in col_indices.iter().enumerate() {
                    self.mat.set_column(c, &old_cols.column(i).clone_owned());
                }
                for (i, &r) in row_indices.iter().enumerate() {
                    self.mat.set_row(r, &old_rows.row(i).clone_owned());
                }
            }
            _ => panic!("cancel_rows_and_columns_update without a pending update"),
        }
        self.rollback();
    }

    /// Recompute the inverse and determinant from scratch.
    pub fn refresh(&mut self) {
        assert!(self.pending.is_none(), "refresh during a transaction");
        self.calculate_inverse(false);
    }

    /// Total absolute deviation of `mat * target` from the identity.
    pub fn inverse_error(&self, target: &DMatrix<Amplitude>) -> f64 {
        let n = self.mat.nrows();
        let mut product = &self.mat * target;
        for i in 0..n {
            product[(i, i)] -= Amplitude::new(1.0, 0.0);
        }
        product.iter().map(|z| z.norm()).sum()
    }

    fn base_outside_cutoffs(&self) -> bool {
        let base_abs = self.det.base().norm();
        (!self.be_extra_careful && base_abs < Self::LOWER_CUTOFF) || base_abs > Self::UPPER_CUTOFF
    }

    /// Shared tail of every `finish_*`.
    fn commit(&mut self) {
        self.nullity_lower_bound = self.new_nullity_lower_bound;
        if let Some(inv) = self.new_invmat.take() {
            self.invmat = inv;
        }
        self.pending = Pending::None;
    }

    /// Shared tail of every `cancel_*`. The inverse was never patched, so
    /// only a mid-update refresh result needs discarding.
    fn rollback(&mut self) {
        self.det = self.old_det;
        self.new_invmat = None;
    }

    /// Book-keeping for updates applied while the matrix is singular: the
    /// update can reduce the nullity by at most its rank.
    fn perform_singular_update(&mut self, update_rank: i64) {
        debug_assert!(self.det.is_zero());
        debug_assert!(self.new_nullity_lower_bound == self.nullity_lower_bound);
        debug_assert!(self.new_nullity_lower_bound > 0);
        self.new_nullity_lower_bound -= update_rank;
        if self.new_nullity_lower_bound <= 0 {
            self.calculate_inverse(true);
        }
    }

    /// Block det-ratio and inverse for a rank-k update; shared by the
    /// multi-column and mixed paths.
    fn apply_block_detrat(
        &mut self,
        detrat_m: DMatrix<Amplitude>,
        detrat_inv: &mut Option<DMatrix<Amplitude>>,
    ) {
        let k = detrat_m.nrows();
        if k == 1 {
            self.detrat = detrat_m[(0, 0)];
            if self.detrat != Amplitude::new(0.0, 0.0) {
                *detrat_inv = Some(DMatrix::from_element(
                    1,
                    1,
                    Amplitude::new(1.0, 0.0) / self.detrat,
                ));
            }
        } else {
            let lu = detrat_m.full_piv_lu();
            if lu.is_invertible() {
                self.detrat = lu.determinant();
                *detrat_inv = lu.try_inverse();
            } else {
                // the LU determinant is not guaranteed to come out as zero
                // for a singular block, so force it
                self.detrat = Amplitude::new(0.0, 0.0);
            }
        }

        self.det *= self.detrat;

        if self.det.is_zero() {
            self.new_nullity_lower_bound = 1;
        } else if self.be_extra_careful && self.det.base().norm() < Self::SAFE_LOWER_CUTOFF {
            self.calculate_inverse(true);
        }
    }

    /// Full-pivot LU refresh of the determinant, inverse, and nullity bound.
    /// During an update the results are staged in `new_*` so a cancel can
    /// drop them.
    fn calculate_inverse(&mut self, update_in_progress: bool) {
        debug!("recalculating inverse (update_in_progress: {update_in_progress})");

        let n = self.mat.nrows();
        let lu = self.mat.clone().full_piv_lu();
        let diagonal = lu.u().diagonal();

        // rank with a widened relative threshold; too tight a threshold
        // fails to recognize singular matrices
        let max_abs = diagonal.iter().map(|z| z.norm()).fold(0.0f64, f64::max);
        let threshold = max_abs * f64::EPSILON * n as f64 * 10.0;
        let rank = diagonal.iter().filter(|z| z.norm() > threshold).count();
        let nullity = n as i64 - rank as i64;

        if update_in_progress {
            self.new_nullity_lower_bound = nullity;
        } else {
            self.nullity_lower_bound = nullity;
        }

        if nullity > 0 {
            self.det = Big::zero();
            self.new_invmat = None;
            return;
        }

        match lu.try_inverse() {
            Some(inverse) => {
                let mut phase = Amplitude::new(1.0, 0.0)
                    * lu.p().determinant::<f64>()
                    * lu.q().determinant::<f64>();
                let mut log_magnitude = 0.0;
                for d in diagonal.iter() {
                    phase *= *d / d.norm();
                    log_magnitude += d.norm().ln();
                }
                self.det = Big::new(phase, log_magnitude);

                // significant inverse error usually means the orbitals are
                // not linearly independent
                let error = self.inverse_error(&inverse);
                if error > Self::INVERSE_ERROR_WARNING {
                    warn!("inverse matrix error of {error}");
                }

                if update_in_progress {
                    self.new_invmat = Some(inverse);
                } else {
                    self.invmat = inverse;
                    self.new_invmat = None;
                }
            }
            None => {
                // numerically singular despite the rank estimate
                self.det = Big::zero();
                self.new_invmat = None;
                if update_in_progress {
                    self.new_nullity_lower_bound = 1;
                } else {
                    self.nullity_lower_bound = 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;
    use rand_mt::Mt64;

    fn c(re: f64, im: f64) -> Amplitude {
        Amplitude::new(re, im)
    }

    fn random_matrix<R: Rng>(n: usize, rng: &mut R) -> DMatrix<Amplitude> {
        DMatrix::from_fn(n, n, |_, _| {
            c(rng.gen::<f64>() * 2.0 - 1.0, rng.gen::<f64>() * 2.0 - 1.0)
        })
    }

    fn random_vector<R: Rng>(n: usize, rng: &mut R) -> DVector<Amplitude> {
        DVector::from_fn(n, |_, _| {
            c(rng.gen::<f64>() * 2.0 - 1.0, rng.gen::<f64>() * 2.0 - 1.0)
        })
    }

    fn reference_determinant(mat: &DMatrix<Amplitude>) -> Amplitude {
        mat.clone().full_piv_lu().determinant()
    }

    fn assert_close(a: Amplitude, b: Amplitude, epsilon: f64) {
        assert_relative_eq!(a.re, b.re, epsilon = epsilon, max_relative = epsilon);
        assert_relative_eq!(a.im, b.im, epsilon = epsilon, max_relative = epsilon);
    }

    fn assert_tracker_consistent(cm: &CeperleyMatrix) {
        let expected = reference_determinant(cm.matrix());
        assert_close(cm.determinant().value(), expected, 1e-8);
        if !cm.is_singular() {
            assert!(cm.inverse_error(cm.inverse()) < 1e-8);
        }
    }

    #[test]
    fn test_row_update_on_identity() {
        let mut cm = CeperleyMatrix::new(DMatrix::identity(2, 2), false);
        let row = RowDVector::from_vec(vec![c(2.0, 0.0), c(0.0, 0.0)]);
        cm.update_row(0, &row);
        assert_close(cm.determinant().value(), c(2.0, 0.0), 1e-12);
        cm.finish_row_update();

        assert_close(cm.inverse()[(0, 0)], c(0.5, 0.0), 1e-12);
        assert_close(cm.inverse()[(0, 1)], c(0.0, 0.0), 1e-12);
        assert_close(cm.inverse()[(1, 1)], c(1.0, 0.0), 1e-12);
    }

    #[test]
    fn test_row_update_cancel_restores_state() {
        let mut rng = Mt64::new(21);
        let mat = random_matrix(5, &mut rng);
        let mut cm = CeperleyMatrix::new(mat.clone(), false);
        let det_before = cm.determinant();
        let inv_before = cm.inverse().clone();

        let row = RowDVector::from_fn(5, |_, _| c(rng.gen::<f64>(), rng.gen::<f64>()));
        cm.update_row(2, &row);
        cm.cancel_row_update();

        assert_eq!(cm.matrix(), &mat);
        assert_eq!(cm.determinant(), det_before);
        assert_eq!(cm.inverse(), &inv_before);
    }

    #[test]
    fn test_two_column_update_of_identity() {
        let mut cm = CeperleyMatrix::new(DMatrix::identity(3, 3), false);
        let srcmat = DMatrix::from_diagonal_element(3, 3, c(2.0, 0.0));
        cm.update_columns(&[(0, 0), (1, 1)], &srcmat);
        assert_close(cm.determinant().value(), c(4.0, 0.0), 1e-12);
        cm.finish_columns_update();

        for (i, expected) in [0.5, 0.5, 1.0].iter().enumerate() {
            assert_close(cm.inverse()[(i, i)], c(*expected, 0.0), 1e-12);
        }
    }

    #[test]
    fn test_swap_rows_negates_and_is_involutive() {
        let mut rng = Mt64::new(33);
        let mat = random_matrix(4, &mut rng);
        let mut cm = CeperleyMatrix::new(mat.clone(), false);
        let det_before = cm.determinant().value();
        let inv_before = cm.inverse().clone();

        cm.swap_rows(1, 3);
        assert_close(cm.determinant().value(), -det_before, 1e-12);
        cm.swap_rows(1, 3);
        assert_close(cm.determinant().value(), det_before, 1e-12);
        assert_eq!(cm.matrix(), &mat);
        assert_eq!(cm.inverse(), &inv_before);
    }

    #[test]
    fn test_randomized_update_sequences_match_lu() {
        let mut rng = Mt64::new(12345);
        for n in [2usize, 5, 8, 16, 32] {
            let mut cm = CeperleyMatrix::new(random_matrix(n, &mut rng), false);
            for step in 0..40 {
                match step % 4 {
                    0 => {
                        let r = rng.gen_range(0..n);
                        let row = random_vector(n, &mut rng).transpose();
                        cm.update_row(r, &row);
                        cm.finish_row_update();
                    }
                    1 => {
                        let c_index = rng.gen_range(0..n);
                        let col = random_vector(n, &mut rng);
                        cm.update_column(c_index, &col);
                        cm.finish_column_update();
                    }
                    2 => {
                        let k = 2.min(n);
                        let srcmat = random_matrix(n, &mut rng);
                        let mut dests: Vec<usize> = (0..n).collect();
                        for i in 0..k {
                            let j = rng.gen_range(i..n);
                            dests.swap(i, j);
                        }
                        let cols: Vec<(usize, usize)> =
                            (0..k).map(|i| (dests[i], i)).collect();
                        cm.update_columns(&cols, &srcmat);
                        cm.finish_columns_update();
                    }
                    _ => {
                        let srcmat = random_matrix(n, &mut rng);
                        let r = rng.gen_range(0..n);
                        let c_index = rng.gen_range(0..n);
                        cm.update_rows_and_columns(&[r], &[c_index], &srcmat);
                        cm.finish_rows_and_columns_update();
                    }
                }
                assert_tracker_consistent(&cm);
            }
        }
    }

    #[test]
    fn test_randomized_cancel_sequences_leave_no_trace() {
        let mut rng = Mt64::new(777);
        let n = 6;
        let mat = random_matrix(n, &mut rng);
        let mut cm = CeperleyMatrix::new(mat.clone(), false);
        let det_before = cm.determinant();
        let inv_before = cm.inverse().clone();

        for step in 0..20 {
            match step % 4 {
                0 => {
                    let row = random_vector(n, &mut rng).transpose();
                    cm.update_row(rng.gen_range(0..n), &row);
                    cm.cancel_row_update();
                }
                1 => {
                    let col = random_vector(n, &mut rng);
                    cm.update_column(rng.gen_range(0..n), &col);
                    cm.cancel_column_update();
                }
                2 => {
                    let srcmat = random_matrix(n, &mut rng);
                    cm.update_columns(&[(1, 0), (4, 2)], &srcmat);
                    cm.cancel_columns_update();
                }
                _ => {
                    let srcmat = random_matrix(n, &mut rng);
                    cm.update_rows_and_columns(&[0, 3], &[2], &srcmat);
                    cm.cancel_rows_and_columns_update();
                }
            }
            assert_eq!(cm.matrix(), &mat);
            assert_eq!(cm.determinant(), det_before);
            assert_eq!(cm.inverse(), &inv_before);
        }
    }

    #[test]
    fn test_singular_matrix_recovers_rank() {
        // two identical columns: rank 2 out of 3
        let mut mat = DMatrix::identity(3, 3);
        mat.set_column(1, &DVector::from_vec(vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)]));
        let mut cm = CeperleyMatrix::new(mat, false);
        assert!(cm.is_singular());

        cm.update_column(1, &DVector::from_vec(vec![c(0.0, 0.0), c(3.0, 0.0), c(0.0, 0.0)]));
        assert!(!cm.is_singular());
        assert_close(cm.determinant().value(), c(3.0, 0.0), 1e-12);
        cm.finish_column_update();
        assert_tracker_consistent(&cm);
    }

    #[test]
    fn test_update_into_singularity_and_back() {
        let mut cm = CeperleyMatrix::new(DMatrix::identity(2, 2), false);
        // make the two columns identical
        cm.update_column(1, &DVector::from_vec(vec![c(1.0, 0.0), c(0.0, 0.0)]));
        cm.finish_column_update();
        assert!(cm.is_singular());

        cm.update_column(1, &DVector::from_vec(vec![c(0.0, 0.0), c(2.0, 0.0)]));
        cm.finish_column_update();
        assert!(!cm.is_singular());
        assert_close(cm.determinant().value(), c(2.0, 0.0), 1e-12);
    }

    #[test]
    fn test_refresh_is_idempotent_on_observables() {
        let mut rng = Mt64::new(9);
        let mut cm = CeperleyMatrix::new(random_matrix(7, &mut rng), false);
        let det_before = cm.determinant().value();
        cm.refresh();
        assert_close(cm.determinant().value(), det_before, 1e-10);
        assert_tracker_consistent(&cm);
    }

    #[test]
    fn test_extra_careful_refresh_during_update() {
        let mut cm = CeperleyMatrix::new(DMatrix::identity(2, 2), true);
        let tiny = DVector::from_vec(vec![c(1e-8, 0.0), c(0.0, 0.0)]);

        // the det ratio drops below the safe cutoff, forcing an eager
        // refresh; cancelling must discard it completely
        cm.update_column(0, &tiny);
        assert_relative_eq!(cm.determinant().abs(), 1e-8, max_relative = 1e-10);
        cm.cancel_column_update();
        assert_close(cm.determinant().value(), c(1.0, 0.0), 1e-12);
        assert!(cm.inverse_error(cm.inverse()) < 1e-12);

        // committing installs the refreshed inverse
        cm.update_column(0, &tiny);
        cm.finish_column_update();
        assert_relative_eq!(cm.determinant().abs(), 1e-8, max_relative = 1e-10);
        assert!(cm.inverse_error(cm.inverse()) < 1e-8);
        assert_close(cm.inverse()[(0, 0)], c(1e8, 0.0), 1e-4);
    }

    #[test]
    #[should_panic]
    fn test_update_during_update_panics() {
        let mut cm = CeperleyMatrix::new(DMatrix::identity(2, 2), false);
        let col = DVector::from_vec(vec![c(1.0, 0.0), c(1.0, 0.0)]);
        cm.update_column(0, &col);
        cm.update_column(1, &col);
    }
}
