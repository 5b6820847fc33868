//! LU factorization, pivot search and substitution for [`SparseMatrix`].
//!
//! `order_and_factor` performs the full Markowitz-pivoted elimination;
//! `factor` refactors in place using the pivot order established earlier.
//! Both store U's diagonal as reciprocals so substitution never divides.

use crate::error::{Error, Result};

use super::matrix::{ElemId, SparseMatrix};
use super::scalar::Scalar;
use super::vector::SparseVector;

/// Stop scanning further diagonal candidates once this many ties per unit of
/// Markowitz cost have been seen; the ordering cannot improve enough to pay
/// for the scan.
const TIES_MULTIPLIER: usize = 5;

impl<F: Scalar> SparseMatrix<F> {
    /// In-place LU factorization of the previously ordered matrix.
    ///
    /// Uses the diagonal as the pivot sequence without any search. Returns
    /// `false` (not an error) on a numerically zero pivot; callers should
    /// fall back to [`order_and_factor`](Self::order_and_factor).
    pub fn factor(&mut self) -> bool {
        if !self.is_fixed() {
            return false;
        }
        self.factored = false;
        for step in 1..=self.order() {
            let pivot = match self.get_diagonal(step) {
                Some(p) => p,
                None => return false,
            };
            if self.entries[pivot.0].value.is_zero() {
                return false;
            }
            self.eliminate(pivot, step, false);
        }
        self.factored = true;
        true
    }

    /// Full factorization with Markowitz pivot search.
    ///
    /// When the matrix was ordered before and `needs_reordering` is clear,
    /// the previous diagonal pivots are reused for as long as each passes
    /// the threshold validity test; the search takes over at the first step
    /// that fails. Fails with [`Error::SingularMatrix`] when no acceptable
    /// pivot exists in the active submatrix.
    pub fn order_and_factor(&mut self) -> Result<()> {
        self.fix_equations();
        self.factored = false;

        // The active-submatrix counts start out as the structural counts.
        for i in 0..=self.order() {
            self.mkz_row[i] = self.row_count[i];
            self.mkz_col[i] = self.col_count[i];
        }

        let mut step = 1;
        if !self.needs_ordering {
            while step <= self.order() {
                let pivot = match self.get_diagonal(step) {
                    Some(p) if self.pivot_acceptable(p, step) => p,
                    _ => {
                        log::debug!("pivot reuse failed at step {step}; re-ordering");
                        self.needs_ordering = true;
                        break;
                    }
                };
                self.eliminate(pivot, step, true);
                step += 1;
            }
            if step > self.order() {
                self.factored = true;
                return Ok(());
            }
        }

        for k in step..=self.order() {
            let pivot = self
                .search_diagonal(k)
                .or_else(|| self.search_submatrix(k))
                .ok_or(Error::SingularMatrix { step: k })?;
            let pr = self.entries[pivot.0].row;
            let pc = self.entries[pivot.0].col;
            self.swap_rows_int(pr, k);
            self.swap_cols_int(pc, k);
            self.eliminate(pivot, k, true);
        }
        self.needs_ordering = false;
        self.factored = true;
        Ok(())
    }

    /// One elimination step at pivot position `step`.
    ///
    /// The pivot value is replaced by its reciprocal, the pivot column below
    /// the diagonal is scaled into L multipliers (scattered through `dest`),
    /// and every remaining element of the active submatrix is updated,
    /// creating fill-in where the update lands on a structural zero.
    fn eliminate(&mut self, pivot: ElemId, step: usize, track_counts: bool) {
        let recip = self.entries[pivot.0].value.recip();
        self.entries[pivot.0].value = recip;

        // Scale the pivot column; dest[row] carries the multipliers.
        let mut lower = self.entries[pivot.0].below;
        while let Some(l) = lower {
            let mult = self.entries[l.0].value * recip;
            self.entries[l.0].value = mult;
            self.dest[self.entries[l.0].row] = mult;
            lower = self.entries[l.0].below;
        }

        // Update the submatrix column by column under each pivot-row element.
        let mut upper = self.entries[pivot.0].right;
        while let Some(u) = upper {
            let ucol = self.entries[u.0].col;
            let uval = self.entries[u.0].value;

            let mut sub = self.entries[u.0].below;
            let mut lower = self.entries[pivot.0].below;
            while let Some(l) = lower {
                let lrow = self.entries[l.0].row;
                while let Some(s) = sub {
                    if self.entries[s.0].row >= lrow {
                        break;
                    }
                    sub = self.entries[s.0].below;
                }
                let target = match sub {
                    Some(s) if self.entries[s.0].row == lrow => s,
                    _ => self.insert_fillin(lrow, ucol),
                };
                let delta = self.dest[lrow] * uval;
                self.entries[target.0].value -= delta;
                sub = self.entries[target.0].below;
                lower = self.entries[l.0].below;
            }

            if track_counts {
                self.mkz_col[ucol] -= 1;
            }
            upper = self.entries[u.0].right;
        }

        if track_counts {
            // The pivot row and column leave the active submatrix.
            self.mkz_row[step] -= 1;
            self.mkz_col[step] -= 1;
            let mut lower = self.entries[pivot.0].below;
            while let Some(l) = lower {
                self.mkz_row[self.entries[l.0].row] -= 1;
                lower = self.entries[l.0].below;
            }
        }
    }

    /// Largest magnitude in the column of `id`, from `id` downwards.
    fn largest_in_col_from(&self, id: ElemId) -> f64 {
        let mut best = self.entries[id.0].value.norm();
        let mut cur = self.entries[id.0].below;
        while let Some(c) = cur {
            best = best.max(self.entries[c.0].value.norm());
            cur = self.entries[c.0].below;
        }
        best
    }

    /// Threshold validity test: `|p| ≥ threshold · max|column entries|`.
    fn pivot_acceptable(&self, id: ElemId, _step: usize) -> bool {
        let n = self.entries[id.0].value.norm();
        n > 0.0 && n >= self.threshold * self.largest_in_col_from(id)
    }

    fn markowitz_product(&self, id: ElemId) -> usize {
        let e = &self.entries[id.0];
        let mr = self.mkz_row[e.row].saturating_sub(1);
        let mc = self.mkz_col[e.col].saturating_sub(1);
        mr * mc
    }

    /// Search the remaining diagonal for the cheapest acceptable pivot.
    fn search_diagonal(&self, step: usize) -> Option<ElemId> {
        let mut best: Option<ElemId> = None;
        let mut best_cost = usize::MAX;
        let mut best_ratio = 0.0f64;
        let mut ties = 0usize;

        for k in step..=self.order() {
            let d = match self.diag[k] {
                Some(d) => d,
                None => continue,
            };
            let n = self.entries[d.0].value.norm();
            if n == 0.0 {
                continue;
            }
            let colmax = self.largest_in_col_from(d);
            if n < self.threshold * colmax {
                continue;
            }
            let cost = self.markowitz_product(d);
            if cost < best_cost {
                best = Some(d);
                best_cost = cost;
                best_ratio = n / colmax;
                ties = 0;
            } else if cost == best_cost {
                ties += 1;
                let ratio = n / colmax;
                if ratio > best_ratio {
                    best = Some(d);
                    best_ratio = ratio;
                }
                if ties >= best_cost * TIES_MULTIPLIER {
                    return best;
                }
            }
        }
        best
    }

    /// Search the whole active submatrix, row-major so the first element
    /// encountered wins ties.
    fn search_submatrix(&self, step: usize) -> Option<ElemId> {
        // Per-column magnitude maxima over the active rows.
        let mut colmax = vec![0.0f64; self.order() + 1];
        for c in step..=self.order() {
            let mut cur = self.col_head[c];
            while let Some(id) = cur {
                let e = &self.entries[id.0];
                if e.row >= step {
                    colmax[c] = colmax[c].max(e.value.norm());
                }
                cur = e.below;
            }
        }

        let mut best: Option<ElemId> = None;
        let mut best_cost = usize::MAX;
        for r in step..=self.order() {
            let mut cur = self.row_head[r];
            while let Some(id) = cur {
                let e = &self.entries[id.0];
                cur = e.right;
                if e.col < step {
                    continue;
                }
                let n = e.value.norm();
                if n == 0.0 || n < self.threshold * colmax[e.col] {
                    continue;
                }
                let cost = self.markowitz_product(id);
                if cost < best_cost {
                    best = Some(id);
                    best_cost = cost;
                }
            }
        }
        best
    }

    /// Solve `A·x = b`. Requires a factored matrix.
    ///
    /// `solution` is dense, indexed by external variable (slot 0 is ground
    /// and comes back zero). All-zero forward sub-steps are skipped, so a
    /// sparse `b` costs proportionally less.
    pub fn solve(&mut self, rhs: &SparseVector<F>, solution: &mut [F]) -> Result<()> {
        if !self.is_factored() {
            return Err(Error::NotFactored);
        }
        let n = self.order();

        for v in self.intermediate.iter_mut() {
            *v = F::zero();
        }
        for (idx, val) in rhs.iter() {
            if idx <= n {
                self.intermediate[self.rows.int_of(idx)] = val;
            }
        }

        // Forward substitution L·c = b (unit lower diagonal).
        for k in 1..=n {
            let ck = self.intermediate[k];
            if ck.is_zero() {
                continue;
            }
            let di = self.diag[k].ok_or(Error::NotFactored)?;
            let mut cur = self.entries[di.0].below;
            while let Some(id) = cur {
                let row = self.entries[id.0].row;
                let val = self.entries[id.0].value;
                self.intermediate[row] -= val * ck;
                cur = self.entries[id.0].below;
            }
        }

        // Backward substitution U·x = c; the diagonal holds reciprocals.
        for k in (1..=n).rev() {
            let di = self.diag[k].ok_or(Error::NotFactored)?;
            let mut sum = self.intermediate[k];
            let mut cur = self.entries[di.0].right;
            while let Some(id) = cur {
                let col = self.entries[id.0].col;
                let val = self.entries[id.0].value;
                sum -= val * self.intermediate[col];
                cur = self.entries[id.0].right;
            }
            self.intermediate[k] = sum * self.entries[di.0].value;
        }

        self.unscramble(solution);
        Ok(())
    }

    /// Solve `Aᵀ·x = b` using the factorization of `A`.
    pub fn solve_transposed(&mut self, rhs: &SparseVector<F>, solution: &mut [F]) -> Result<()> {
        if !self.is_factored() {
            return Err(Error::NotFactored);
        }
        let n = self.order();

        for v in self.intermediate.iter_mut() {
            *v = F::zero();
        }
        for (idx, val) in rhs.iter() {
            if idx <= n {
                self.intermediate[self.cols.int_of(idx)] = val;
            }
        }

        // Forward substitution Uᵀ·y = b (Uᵀ is lower triangular).
        for k in 1..=n {
            let di = self.diag[k].ok_or(Error::NotFactored)?;
            let yk = self.intermediate[k] * self.entries[di.0].value;
            self.intermediate[k] = yk;
            if yk.is_zero() {
                continue;
            }
            let mut cur = self.entries[di.0].right;
            while let Some(id) = cur {
                let col = self.entries[id.0].col;
                let val = self.entries[id.0].value;
                self.intermediate[col] -= val * yk;
                cur = self.entries[id.0].right;
            }
        }

        // Backward substitution Lᵀ·x = y (unit diagonal).
        for k in (1..=n).rev() {
            let di = self.diag[k].ok_or(Error::NotFactored)?;
            let mut sum = self.intermediate[k];
            let mut cur = self.entries[di.0].below;
            while let Some(id) = cur {
                let row = self.entries[id.0].row;
                let val = self.entries[id.0].value;
                sum -= val * self.intermediate[row];
                cur = self.entries[id.0].below;
            }
            self.intermediate[k] = sum;
        }

        // The transposed system unwinds through the row permutation.
        solution[0] = F::zero();
        let last = n.min(solution.len().saturating_sub(1));
        for ext in 1..=last {
            solution[ext] = self.intermediate[self.rows.int_of(ext)];
        }
        Ok(())
    }

    /// Copy `intermediate` into the caller's dense solution, inverting the
    /// column permutation applied during factoring.
    pub fn unscramble(&self, solution: &mut [F]) {
        solution[0] = F::zero();
        let last = self.order().min(solution.len().saturating_sub(1));
        for ext in 1..=last {
            solution[ext] = self.intermediate[self.cols.int_of(ext)];
        }
    }
}

#[cfg(test)]
mod tests {
    use num_complex::Complex;

    use super::*;

    fn build(entries: &[(usize, usize, f64)]) -> SparseMatrix<f64> {
        let mut m = SparseMatrix::new();
        for &(r, c, v) in entries {
            let id = m.get_element(r, c).unwrap();
            m[id] += v;
        }
        m
    }

    fn rhs_from(values: &[(usize, f64)]) -> SparseVector<f64> {
        let mut v = SparseVector::new();
        for &(i, x) in values {
            let id = v.get_element(i);
            v[id] += x;
        }
        v
    }

    /// Residual check ‖A·x − b‖∞ against the unfactored copy.
    fn residual(entries: &[(usize, usize, f64)], x: &[f64], b: &[(usize, f64)]) -> f64 {
        let n = x.len() - 1;
        let mut ax = vec![0.0; n + 1];
        for &(r, c, v) in entries {
            ax[r] += v * x[c];
        }
        let mut bd = vec![0.0; n + 1];
        for &(i, v) in b {
            bd[i] += v;
        }
        (1..=n)
            .map(|i| (ax[i] - bd[i]).abs())
            .fold(0.0f64, f64::max)
    }

    #[test]
    fn test_order_factor_solve_3x3() {
        let entries = [
            (1, 1, 2.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 3.0),
            (2, 3, 1.0),
            (3, 2, 1.0),
            (3, 3, 4.0),
        ];
        let mut m = build(&entries);
        m.order_and_factor().unwrap();

        let b = [(1, 5.0), (2, 10.0), (3, 9.0)];
        let rhs = rhs_from(&b);
        let mut x = vec![0.0; 4];
        m.solve(&rhs, &mut x).unwrap();

        assert!(
            residual(&entries, &x, &b) < 1e-12,
            "residual too large, x = {:?}",
            x
        );
    }

    #[test]
    fn test_zero_diagonal_needs_pivoting() {
        // [[0, 1], [1, 0]] · x = [3, 7] → x = [7, 3]
        let entries = [(1, 2, 1.0), (2, 1, 1.0)];
        let mut m = build(&entries);
        m.order_and_factor().unwrap();

        let rhs = rhs_from(&[(1, 3.0), (2, 7.0)]);
        let mut x = vec![0.0; 3];
        m.solve(&rhs, &mut x).unwrap();
        assert!((x[1] - 7.0).abs() < 1e-12, "x = {:?}", x);
        assert!((x[2] - 3.0).abs() < 1e-12, "x = {:?}", x);
    }

    #[test]
    fn test_singular_matrix_detected() {
        // Row 2 is a duplicate of row 1.
        let entries = [(1, 1, 1.0), (1, 2, 2.0), (2, 1, 1.0), (2, 2, 2.0)];
        let mut m = build(&entries);
        let err = m.order_and_factor().unwrap_err();
        assert!(matches!(err, Error::SingularMatrix { .. }));
        assert!(!m.is_factored());
    }

    #[test]
    fn test_solve_before_factor_fails() {
        let mut m = build(&[(1, 1, 1.0)]);
        let rhs = rhs_from(&[(1, 1.0)]);
        let mut x = vec![0.0; 2];
        assert!(matches!(m.solve(&rhs, &mut x), Err(Error::NotFactored)));
    }

    #[test]
    fn test_factor_reuses_ordering() {
        let entries = [
            (1, 1, 4.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 3.0),
            (3, 3, 2.0),
        ];
        let mut m = build(&entries);
        m.order_and_factor().unwrap();

        // Same structure, new values: restamp and refactor without a search.
        m.clear();
        let changed = [
            (1, 1, 5.0),
            (1, 2, 2.0),
            (2, 1, 1.0),
            (2, 2, 4.0),
            (3, 3, 8.0),
        ];
        for &(r, c, v) in &changed {
            let id = m.get_element(r, c).unwrap();
            m[id] += v;
        }
        assert!(m.factor(), "refactor on the same pattern should succeed");

        let b = [(1, 9.0), (2, 9.0), (3, 16.0)];
        let rhs = rhs_from(&b);
        let mut x = vec![0.0; 4];
        m.solve(&rhs, &mut x).unwrap();
        assert!(residual(&changed, &x, &b) < 1e-12, "x = {:?}", x);
    }

    #[test]
    fn test_factor_reports_zero_pivot() {
        let mut m = build(&[(1, 1, 1.0), (2, 2, 1.0)]);
        m.order_and_factor().unwrap();
        m.clear();
        // Leave the (2,2) pivot at exactly zero.
        let id = m.get_element(1, 1).unwrap();
        m[id] = 1.0;
        assert!(!m.factor());
        assert!(!m.is_factored());
    }

    #[test]
    fn test_fillin_created_and_solved() {
        // Arrow pattern: eliminating (1,1) without pivoting fills (2,3),(3,2).
        let entries = [
            (1, 1, 4.0),
            (1, 2, 1.0),
            (1, 3, 1.0),
            (2, 1, 1.0),
            (2, 2, 4.0),
            (3, 1, 1.0),
            (3, 3, 4.0),
        ];
        let mut m = build(&entries);
        m.fix_equations();
        assert!(m.factor());
        assert_eq!(m.fillin_count(), 2);

        let b = [(1, 6.0), (2, 5.0), (3, 5.0)];
        let rhs = rhs_from(&b);
        let mut x = vec![0.0; 4];
        m.solve(&rhs, &mut x).unwrap();
        assert!(residual(&entries, &x, &b) < 1e-12, "x = {:?}", x);
    }

    #[test]
    fn test_diagonal_reciprocals_finite_after_factor() {
        let mut m = build(&[
            (1, 1, 1e-6),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 3.0),
            (3, 3, 7.0),
        ]);
        m.order_and_factor().unwrap();
        for k in 1..=m.order() {
            let d = m.get_diagonal(k).unwrap();
            assert!(
                m[d].norm().is_finite() && m[d].norm() > 0.0,
                "stored reciprocal at step {} is not finite",
                k
            );
        }
    }

    #[test]
    fn test_transpose_solve_law() {
        let entries = [
            (1, 1, 3.0),
            (1, 2, 1.0),
            (2, 2, 2.0),
            (2, 3, 5.0),
            (3, 1, 4.0),
            (3, 3, 1.0),
        ];
        let transposed: Vec<_> = entries.iter().map(|&(r, c, v)| (c, r, v)).collect();

        let mut a = build(&entries);
        let mut at = build(&transposed);
        a.order_and_factor().unwrap();
        at.order_and_factor().unwrap();

        let b = [(1, 1.0), (2, -2.0), (3, 4.0)];
        let rhs = rhs_from(&b);

        let mut x1 = vec![0.0; 4];
        a.solve_transposed(&rhs, &mut x1).unwrap();
        let mut x2 = vec![0.0; 4];
        at.solve(&rhs, &mut x2).unwrap();

        for i in 1..=3 {
            assert!(
                (x1[i] - x2[i]).abs() < 1e-12,
                "transpose law violated at {}: {} vs {}",
                i,
                x1[i],
                x2[i]
            );
        }
    }

    #[test]
    fn test_complex_solve() {
        // (1+j)·x = 2 → x = 1−j
        let mut m = SparseMatrix::<Complex<f64>>::new();
        let id = m.get_element(1, 1).unwrap();
        m[id] = Complex::new(1.0, 1.0);
        m.order_and_factor().unwrap();

        let mut rhs = SparseVector::new();
        let r = rhs.get_element(1);
        rhs[r] = Complex::new(2.0, 0.0);

        let mut x = vec![Complex::new(0.0, 0.0); 2];
        m.solve(&rhs, &mut x).unwrap();
        assert!((x[1].re - 1.0).abs() < 1e-12);
        assert!((x[1].im + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sparse_rhs_skips_zero_substeps() {
        // A lower-triangular-ish system with b sparse in the upper indices:
        // the solve must still be exact.
        let entries = [
            (1, 1, 1.0),
            (2, 1, 2.0),
            (2, 2, 1.0),
            (3, 2, 3.0),
            (3, 3, 1.0),
        ];
        let mut m = build(&entries);
        m.order_and_factor().unwrap();
        let b = [(3, 6.0)];
        let rhs = rhs_from(&b);
        let mut x = vec![0.0; 4];
        m.solve(&rhs, &mut x).unwrap();
        assert!(residual(&entries, &x, &b) < 1e-12, "x = {:?}", x);
    }
}
