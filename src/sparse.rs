//! Compressed Sparse Row (CSR) matrix.
//!
//! Holds the banded finite-difference derivative operator and the row blocks
//! each rank multiplies against the broadcast field.

use std::ops::Range;

/// Sparse matrix in Compressed Sparse Row format.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    pub nrows: usize,
    pub ncols: usize,
    /// Non-zero values, stored row by row.
    pub values: Vec<f64>,
    /// Column index for each non-zero value.
    pub col_indices: Vec<usize>,
    /// `row_pointers[i]` is the index into values/col_indices where row i starts.
    /// `row_pointers[nrows]` = total number of non-zeros.
    pub row_pointers: Vec<usize>,
}

impl CsrMatrix {
    /// Create an empty matrix with no non-zero entries.
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_pointers: vec![0; nrows + 1],
        }
    }

    /// Number of non-zero entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Build CSR matrix from (row, col, value) triplets.
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        if triplets.is_empty() {
            return Self::new(nrows, ncols);
        }

        let mut sorted = triplets.to_vec();
        sorted.sort_by_key(|&(row, col, _)| (row, col));

        let mut values = Vec::with_capacity(sorted.len());
        let mut col_indices = Vec::with_capacity(sorted.len());
        let mut row_pointers = vec![0usize; nrows + 1];

        let (mut cur_row, mut cur_col, mut cur_val) = sorted[0];
        for &(row, col, val) in &sorted[1..] {
            if row == cur_row && col == cur_col {
                cur_val += val;
            } else {
                values.push(cur_val);
                col_indices.push(cur_col);
                row_pointers[cur_row + 1] += 1;
                cur_row = row;
                cur_col = col;
                cur_val = val;
            }
        }
        // Emit last accumulated entry
        values.push(cur_val);
        col_indices.push(cur_col);
        row_pointers[cur_row + 1] += 1;

        // Convert per-row counts to cumulative offsets
        for i in 1..=nrows {
            row_pointers[i] += row_pointers[i - 1];
        }

        Self {
            nrows,
            ncols,
            values,
            col_indices,
            row_pointers,
        }
    }

    /// Copy of the contiguous rows `rows`, keeping every column.
    pub fn row_block(&self, rows: Range<usize>) -> Self {
        assert!(rows.end <= self.nrows, "row block out of range");
        let start = self.row_pointers[rows.start];
        let end = self.row_pointers[rows.end];
        let row_pointers = self.row_pointers[rows.start..=rows.end]
            .iter()
            .map(|&p| p - start)
            .collect();
        Self {
            nrows: rows.len(),
            ncols: self.ncols,
            values: self.values[start..end].to_vec(),
            col_indices: self.col_indices[start..end].to_vec(),
            row_pointers,
        }
    }

    /// Convert to dense matrix (row-major). For testing and small matrices only.
    pub fn to_dense(&self) -> Vec<Vec<f64>> {
        let mut dense = vec![vec![0.0; self.ncols]; self.nrows];
        for (row, dense_row) in dense.iter_mut().enumerate() {
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                dense_row[self.col_indices[idx]] = self.values[idx];
            }
        }
        dense
    }

    /// Sparse matrix-vector multiply: y = A * x
    pub fn spmv(&self, x: &[f64]) -> Vec<f64> {
        let mut y = vec![0.0; self.nrows];
        self.spmv_into(x, &mut y);
        y
    }

    /// y = A * x into a caller-owned buffer.
    pub fn spmv_into(&self, x: &[f64], y: &mut [f64]) {
        assert_eq!(x.len(), self.ncols, "spmv dimension mismatch");
        assert_eq!(y.len(), self.nrows, "spmv output dimension mismatch");
        for (row, yi) in y.iter_mut().enumerate() {
            let mut sum = 0.0;
            for idx in self.row_pointers[row]..self.row_pointers[row + 1] {
                sum += self.values[idx] * x[self.col_indices[idx]];
            }
            *yi = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_matrix() {
        let m = CsrMatrix::new(3, 3);
        assert_eq!(m.nnz(), 0);
        assert_eq!(m.row_pointers, vec![0, 0, 0, 0]);
        assert_eq!(m.spmv(&[1.0, 2.0, 3.0]), vec![0.0; 3]);
    }

    #[test]
    fn test_from_triplets_duplicates_summed() {
        let triplets = vec![(0, 0, 1.0), (0, 0, 2.0), (1, 1, 3.0)];
        let m = CsrMatrix::from_triplets(2, 2, &triplets);
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.to_dense(), vec![vec![3.0, 0.0], vec![0.0, 3.0]]);
    }

    #[test]
    fn test_from_triplets_leaves_empty_rows() {
        let m = CsrMatrix::from_triplets(3, 3, &[(1, 2, 4.0)]);
        assert_eq!(m.row_pointers, vec![0, 0, 1, 1]);
        assert_eq!(m.to_dense()[1], vec![0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_spmv() {
        // [[2, 1], [0, 3]] * [1, 2] = [4, 6]
        let triplets = vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 3.0)];
        let m = CsrMatrix::from_triplets(2, 2, &triplets);
        assert_eq!(m.spmv(&[1.0, 2.0]), vec![4.0, 6.0]);
    }

    #[test]
    fn test_row_block_matches_dense_rows() {
        let triplets = vec![
            (0, 0, 1.0),
            (1, 1, 2.0),
            (1, 3, -1.0),
            (2, 0, 5.0),
            (3, 2, 7.0),
        ];
        let m = CsrMatrix::from_triplets(4, 4, &triplets);
        let block = m.row_block(1..3);
        assert_eq!(block.nrows, 2);
        assert_eq!(block.ncols, 4);
        let dense = m.to_dense();
        assert_eq!(block.to_dense(), vec![dense[1].clone(), dense[2].clone()]);

        let x = [1.0, 2.0, 3.0, 4.0];
        let full = m.spmv(&x);
        assert_eq!(block.spmv(&x), full[1..3].to_vec());
    }
}
