//! Doubly-linked sparse matrix structure.
//!
//! Every non-zero is an [`Entry`] in an arena; four neighbor links (`left`,
//! `right`, `above`, `below`) thread each entry into its row and column
//! lists. Rows are sorted strictly ascending by column, columns strictly
//! ascending by row. Devices cache [`ElemId`] handles once at bind time and
//! stamp through raw integer indexing afterwards.
//!
//! Rows and columns are 1-based; index 0 is ground. Arena slot 0 is a ground
//! sink that absorbs every stamp touching row 0 or column 0, so device code
//! needs no ground special cases.

use std::ops::{Index, IndexMut};

use crate::error::{Error, Result};

use super::perm::Permutation;
use super::scalar::Scalar;

/// Handle to a matrix element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElemId(pub(crate) usize);

impl ElemId {
    /// The ground sink. Writes to it never reach the system.
    pub const SINK: ElemId = ElemId(0);
}

#[derive(Debug, Clone)]
pub(crate) struct Entry<F> {
    pub(crate) row: usize,
    pub(crate) col: usize,
    pub(crate) value: F,
    pub(crate) left: Option<ElemId>,
    pub(crate) right: Option<ElemId>,
    pub(crate) above: Option<ElemId>,
    pub(crate) below: Option<ElemId>,
    pub(crate) fillin: bool,
}

/// Sparse matrix with Markowitz-pivoted LU factorization.
///
/// The lifecycle mirrors the solver protocol: elements are created freely
/// while the matrix is unfixed; [`fix_equations`](SparseMatrix::fix_equations)
/// freezes the structure (only elimination fill-in may be inserted after
/// that) and allocates the scratch vectors used by factorization.
#[derive(Debug, Clone)]
pub struct SparseMatrix<F: Scalar> {
    pub(crate) entries: Vec<Entry<F>>,
    pub(crate) row_head: Vec<Option<ElemId>>,
    pub(crate) col_head: Vec<Option<ElemId>>,
    pub(crate) diag: Vec<Option<ElemId>>,
    pub(crate) row_count: Vec<usize>,
    pub(crate) col_count: Vec<usize>,
    /// Active-submatrix non-zero counts maintained during elimination.
    pub(crate) mkz_row: Vec<usize>,
    pub(crate) mkz_col: Vec<usize>,
    pub(crate) rows: Permutation,
    pub(crate) cols: Permutation,
    order: usize,
    fixed: bool,
    pub(crate) factored: bool,
    pub(crate) needs_ordering: bool,
    /// Relative pivot threshold for the Markowitz validity test.
    pub(crate) threshold: f64,
    /// Scratch for substitution, 1-based like the matrix.
    pub(crate) intermediate: Vec<F>,
    /// Scatter buffer for the pivot column during factorization.
    pub(crate) dest: Vec<F>,
    fillin_count: usize,
}

impl<F: Scalar> SparseMatrix<F> {
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                row: 0,
                col: 0,
                value: F::zero(),
                left: None,
                right: None,
                above: None,
                below: None,
                fillin: false,
            }],
            row_head: vec![None],
            col_head: vec![None],
            diag: vec![None],
            row_count: vec![0],
            col_count: vec![0],
            mkz_row: vec![0],
            mkz_col: vec![0],
            rows: Permutation::identity(0),
            cols: Permutation::identity(0),
            order: 0,
            fixed: false,
            factored: false,
            needs_ordering: true,
            threshold: 1e-3,
            intermediate: Vec::new(),
            dest: Vec::new(),
            fillin_count: 0,
        }
    }

    /// Matrix dimension (highest used row/column index).
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn is_factored(&self) -> bool {
        self.factored
    }

    pub fn needs_reordering(&self) -> bool {
        self.needs_ordering
    }

    /// Force a full pivot search on the next `order_and_factor`.
    pub fn set_needs_reordering(&mut self) {
        self.needs_ordering = true;
    }

    /// Relative pivot threshold (default 1e-3).
    pub fn set_pivot_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Number of stored non-zeros, not counting the ground sink.
    pub fn nnz(&self) -> usize {
        self.entries.len() - 1
    }

    /// Number of fill-in elements created by elimination so far.
    pub fn fillin_count(&self) -> usize {
        self.fillin_count
    }

    /// Get the element at external `(row, col)`, creating it if absent.
    ///
    /// Touching row 0 or column 0 returns the ground sink. Creating a new
    /// element on a fixed matrix fails with [`Error::MatrixFrozen`].
    pub fn get_element(&mut self, row: usize, col: usize) -> Result<ElemId> {
        if row == 0 || col == 0 {
            return Ok(ElemId::SINK);
        }
        if !self.fixed {
            self.grow(row.max(col));
        } else if row > self.order || col > self.order {
            return Err(Error::MatrixFrozen { row, col });
        }
        let r = self.rows.int_of(row);
        let c = self.cols.int_of(col);
        if let Some(id) = self.find(r, c) {
            return Ok(id);
        }
        if self.fixed {
            return Err(Error::MatrixFrozen { row, col });
        }
        Ok(self.insert(r, c, false))
    }

    /// The diagonal element at pivot position `i`, if present. No creation.
    pub fn get_diagonal(&self, i: usize) -> Option<ElemId> {
        self.diag.get(i).copied().flatten()
    }

    /// Freeze the structure: create any missing diagonal elements, allocate
    /// the substitution scratch vectors. Idempotent.
    pub fn fix_equations(&mut self) {
        if self.fixed {
            return;
        }
        for i in 1..=self.order {
            if self.diag[i].is_none() {
                self.insert(i, i, false);
            }
        }
        self.intermediate = vec![F::zero(); self.order + 1];
        self.dest = vec![F::zero(); self.order + 1];
        self.fixed = true;
    }

    /// Unfreeze the structure and release the scratch vectors.
    pub fn unfix_equations(&mut self) {
        self.fixed = false;
        self.factored = false;
        self.intermediate = Vec::new();
        self.dest = Vec::new();
    }

    /// Zero every stored value. O(nnz); the structure (including fill-in
    /// from earlier factorizations) is kept.
    pub fn clear(&mut self) {
        for e in &mut self.entries {
            e.value = F::zero();
        }
        self.factored = false;
    }

    /// Dense value lookup by external indices; zero where no element exists.
    pub fn value_at(&self, row: usize, col: usize) -> F {
        if row == 0 || col == 0 || row > self.order || col > self.order {
            return F::zero();
        }
        let r = self.rows.int_of(row);
        let c = self.cols.int_of(col);
        match self.find(r, c) {
            Some(id) => self.entries[id.0].value,
            None => F::zero(),
        }
    }

    /// External row of an element (follows the row permutation).
    pub fn row_of(&self, id: ElemId) -> usize {
        self.rows.ext_of(self.entries[id.0].row)
    }

    /// External column of an element.
    pub fn col_of(&self, id: ElemId) -> usize {
        self.cols.ext_of(self.entries[id.0].col)
    }

    fn grow(&mut self, to: usize) {
        while self.order < to {
            self.order += 1;
            self.row_head.push(None);
            self.col_head.push(None);
            self.diag.push(None);
            self.row_count.push(0);
            self.col_count.push(0);
            self.mkz_row.push(0);
            self.mkz_col.push(0);
        }
        self.rows.grow(self.order);
        self.cols.grow(self.order);
    }

    /// Find an element by internal coordinates.
    pub(crate) fn find(&self, r: usize, c: usize) -> Option<ElemId> {
        if r == c {
            return self.diag[r];
        }
        self.find_in_row(r, c)
    }

    /// Row-list walk that does not consult the diagonal cache; the swap
    /// routines use it while `diag` is being rebuilt.
    fn find_in_row(&self, r: usize, c: usize) -> Option<ElemId> {
        let mut cur = self.row_head[r];
        while let Some(id) = cur {
            let e = &self.entries[id.0];
            if e.col == c {
                return Some(id);
            }
            if e.col > c {
                return None;
            }
            cur = e.right;
        }
        None
    }

    /// Create an element at internal `(r, c)` and splice it into both lists.
    pub(crate) fn insert(&mut self, r: usize, c: usize, fillin: bool) -> ElemId {
        let id = ElemId(self.entries.len());
        self.entries.push(Entry {
            row: r,
            col: c,
            value: F::zero(),
            left: None,
            right: None,
            above: None,
            below: None,
            fillin,
        });
        self.splice_row(id);
        self.splice_col(id);
        self.row_count[r] += 1;
        self.col_count[c] += 1;
        if r == c {
            self.diag[r] = Some(id);
        }
        if fillin {
            // Fill-in enters the active submatrix during elimination.
            self.mkz_row[r] += 1;
            self.mkz_col[c] += 1;
            self.fillin_count += 1;
        }
        id
    }

    /// Create an elimination fill-in; allowed even when the matrix is fixed.
    pub(crate) fn insert_fillin(&mut self, r: usize, c: usize) -> ElemId {
        self.insert(r, c, true)
    }

    pub(crate) fn splice_row(&mut self, id: ElemId) {
        let (r, c) = {
            let e = &self.entries[id.0];
            (e.row, e.col)
        };
        let mut after: Option<ElemId> = None;
        let mut cur = self.row_head[r];
        while let Some(x) = cur {
            if self.entries[x.0].col < c {
                after = cur;
                cur = self.entries[x.0].right;
            } else {
                break;
            }
        }
        self.entries[id.0].left = after;
        self.entries[id.0].right = cur;
        match after {
            None => self.row_head[r] = Some(id),
            Some(a) => self.entries[a.0].right = Some(id),
        }
        if let Some(n) = cur {
            self.entries[n.0].left = Some(id);
        }
    }

    pub(crate) fn splice_col(&mut self, id: ElemId) {
        let (r, c) = {
            let e = &self.entries[id.0];
            (e.row, e.col)
        };
        let mut after: Option<ElemId> = None;
        let mut cur = self.col_head[c];
        while let Some(x) = cur {
            if self.entries[x.0].row < r {
                after = cur;
                cur = self.entries[x.0].below;
            } else {
                break;
            }
        }
        self.entries[id.0].above = after;
        self.entries[id.0].below = cur;
        match after {
            None => self.col_head[c] = Some(id),
            Some(a) => self.entries[a.0].below = Some(id),
        }
        if let Some(n) = cur {
            self.entries[n.0].above = Some(id);
        }
    }

    pub(crate) fn unlink_row(&mut self, id: ElemId) {
        let (r, left, right) = {
            let e = &self.entries[id.0];
            (e.row, e.left, e.right)
        };
        match left {
            None => self.row_head[r] = right,
            Some(l) => self.entries[l.0].right = right,
        }
        if let Some(n) = right {
            self.entries[n.0].left = left;
        }
    }

    pub(crate) fn unlink_col(&mut self, id: ElemId) {
        let (c, above, below) = {
            let e = &self.entries[id.0];
            (e.col, e.above, e.below)
        };
        match above {
            None => self.col_head[c] = below,
            Some(a) => self.entries[a.0].below = below,
        }
        if let Some(n) = below {
            self.entries[n.0].above = above;
        }
    }

    fn row_ids(&self, r: usize) -> Vec<ElemId> {
        let mut ids = Vec::new();
        let mut cur = self.row_head[r];
        while let Some(id) = cur {
            ids.push(id);
            cur = self.entries[id.0].right;
        }
        ids
    }

    fn col_ids(&self, c: usize) -> Vec<ElemId> {
        let mut ids = Vec::new();
        let mut cur = self.col_head[c];
        while let Some(id) = cur {
            ids.push(id);
            cur = self.entries[id.0].below;
        }
        ids
    }

    /// Exchange two internal rows, relinking every affected column list.
    pub(crate) fn swap_rows_int(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let ids_a = self.row_ids(a);
        let ids_b = self.row_ids(b);
        for &id in ids_a.iter().chain(&ids_b) {
            self.unlink_col(id);
        }
        for &id in &ids_a {
            self.entries[id.0].row = b;
        }
        for &id in &ids_b {
            self.entries[id.0].row = a;
        }
        for &id in ids_a.iter().chain(&ids_b) {
            self.splice_col(id);
        }
        self.row_head.swap(a, b);
        self.row_count.swap(a, b);
        self.mkz_row.swap(a, b);
        self.diag[a] = self.find_in_row(a, a);
        self.diag[b] = self.find_in_row(b, b);
        self.rows.swap_int(a, b);
    }

    /// Exchange two internal columns, relinking every affected row list.
    pub(crate) fn swap_cols_int(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let ids_a = self.col_ids(a);
        let ids_b = self.col_ids(b);
        for &id in ids_a.iter().chain(&ids_b) {
            self.unlink_row(id);
        }
        for &id in &ids_a {
            self.entries[id.0].col = b;
        }
        for &id in &ids_b {
            self.entries[id.0].col = a;
        }
        for &id in ids_a.iter().chain(&ids_b) {
            self.splice_row(id);
        }
        self.col_head.swap(a, b);
        self.col_count.swap(a, b);
        self.mkz_col.swap(a, b);
        self.diag[a] = self.find_in_row(a, a);
        self.diag[b] = self.find_in_row(b, b);
        self.cols.swap_int(a, b);
    }
}

impl<F: Scalar> Default for SparseMatrix<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Scalar> Index<ElemId> for SparseMatrix<F> {
    type Output = F;

    fn index(&self, id: ElemId) -> &F {
        &self.entries[id.0].value
    }
}

impl<F: Scalar> IndexMut<ElemId> for SparseMatrix<F> {
    fn index_mut(&mut self, id: ElemId) -> &mut F {
        &mut self.entries[id.0].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordering_holds(m: &SparseMatrix<f64>) -> bool {
        for r in 1..=m.order() {
            let mut last = 0;
            let mut cur = m.row_head[r];
            while let Some(id) = cur {
                let e = &m.entries[id.0];
                if e.row != r || (last > 0 && e.col <= last) {
                    return false;
                }
                last = e.col;
                cur = e.right;
            }
        }
        for c in 1..=m.order() {
            let mut last = 0;
            let mut cur = m.col_head[c];
            while let Some(id) = cur {
                let e = &m.entries[id.0];
                if e.col != c || (last > 0 && e.row <= last) {
                    return false;
                }
                last = e.row;
                cur = e.below;
            }
        }
        true
    }

    #[test]
    fn test_get_element_creates_once() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_element(1, 2).unwrap();
        let b = m.get_element(1, 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.order(), 2);
    }

    #[test]
    fn test_ground_sink() {
        let mut m = SparseMatrix::<f64>::new();
        let g = m.get_element(0, 3).unwrap();
        assert_eq!(g, ElemId::SINK);
        m[g] += 5.0;
        assert_eq!(m.order(), 0);
    }

    #[test]
    fn test_row_col_ordering_invariant() {
        let mut m = SparseMatrix::<f64>::new();
        for &(r, c) in &[(2, 3), (1, 1), (3, 1), (2, 1), (1, 3), (3, 3), (2, 2)] {
            m.get_element(r, c).unwrap();
        }
        assert!(ordering_holds(&m));
    }

    #[test]
    fn test_frozen_matrix_rejects_new_elements() {
        let mut m = SparseMatrix::<f64>::new();
        m.get_element(1, 1).unwrap();
        m.get_element(2, 2).unwrap();
        m.fix_equations();

        // Existing elements remain reachable.
        assert!(m.get_element(1, 1).is_ok());
        // New structural positions are rejected.
        assert!(matches!(
            m.get_element(1, 2),
            Err(Error::MatrixFrozen { row: 1, col: 2 })
        ));
        assert!(matches!(
            m.get_element(3, 3),
            Err(Error::MatrixFrozen { .. })
        ));
    }

    #[test]
    fn test_fix_creates_missing_diagonals() {
        let mut m = SparseMatrix::<f64>::new();
        m.get_element(1, 2).unwrap();
        m.get_element(2, 1).unwrap();
        m.fix_equations();
        assert!(m.get_diagonal(1).is_some());
        assert!(m.get_diagonal(2).is_some());
    }

    #[test]
    fn test_swap_rows_preserves_ordering() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_element(1, 1).unwrap();
        let b = m.get_element(1, 3).unwrap();
        m.get_element(2, 2).unwrap();
        m.get_element(3, 1).unwrap();
        m.get_element(3, 2).unwrap();
        m[a] = 1.0;
        m[b] = 2.0;

        m.swap_rows_int(1, 3);
        assert!(ordering_holds(&m));
        // Cached handles keep pointing at the same logical cell.
        assert_eq!(m.row_of(a), 1);
        assert_eq!(m.col_of(a), 1);
        assert_eq!(m.value_at(1, 1), 1.0);
        assert_eq!(m.value_at(1, 3), 2.0);
    }

    #[test]
    fn test_swap_cols_preserves_ordering() {
        let mut m = SparseMatrix::<f64>::new();
        for &(r, c) in &[(1, 1), (1, 2), (2, 2), (2, 3), (3, 1), (3, 3)] {
            let id = m.get_element(r, c).unwrap();
            m[id] = (10 * r + c) as f64;
        }
        m.swap_cols_int(1, 3);
        assert!(ordering_holds(&m));
        for &(r, c) in &[(1, 1), (1, 2), (2, 2), (2, 3), (3, 1), (3, 3)] {
            assert_eq!(m.value_at(r, c), (10 * r + c) as f64);
        }
    }

    #[test]
    fn test_clear_zeroes_values_keeps_structure() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_element(1, 1).unwrap();
        m[a] = 3.0;
        m.clear();
        assert_eq!(m.value_at(1, 1), 0.0);
        assert_eq!(m.nnz(), 1);
    }
}
