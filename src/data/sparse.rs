use anyhow::{anyhow, bail, Result};
use nalgebra_sparse::csr::CsrMatrix;
use rayon::slice::ParallelSliceMut;

use super::slice::AxisSelect;

/// Assemble a CSR matrix from unordered COO triples.
///
/// Store layers keep X as `(row, col, value)` triple tables with no ordering
/// guarantee; duplicate coordinates are a corrupt layer and are rejected.
pub fn csr_from_coo<T>(
    nrows: usize,
    ncols: usize,
    mut triples: Vec<(usize, usize, T)>,
) -> Result<CsrMatrix<T>>
where
    T: Clone + Send,
{
    if let Some((r, c, _)) = triples
        .iter()
        .find(|(r, c, _)| *r >= nrows || *c >= ncols)
    {
        bail!(
            "coordinate ({}, {}) out of bounds for a {} x {} matrix",
            r,
            c,
            nrows,
            ncols
        );
    }
    triples.par_sort_unstable_by_key(|(r, c, _)| (*r, *c));

    let mut indptr = Vec::with_capacity(nrows + 1);
    let mut indices = Vec::with_capacity(triples.len());
    let mut values = Vec::with_capacity(triples.len());
    let mut prev: Option<(usize, usize)> = None;
    for (r, c, v) in triples {
        if prev == Some((r, c)) {
            bail!("duplicate coordinate ({}, {}) in sparse layer", r, c);
        }
        prev = Some((r, c));
        while indptr.len() <= r {
            indptr.push(indices.len());
        }
        indices.push(c);
        values.push(v);
    }
    while indptr.len() <= nrows {
        indptr.push(indices.len());
    }

    CsrMatrix::try_from_csr_data(nrows, ncols, indptr, indices, values)
        .map_err(|e| anyhow!("cannot assemble csr matrix: {}", e))
}

/// Extract the selected rows and columns of a CSR matrix, in selection order.
pub fn csr_select<T: Clone>(
    csr: &CsrMatrix<T>,
    rows: &AxisSelect,
    cols: &AxisSelect,
) -> Result<CsrMatrix<T>> {
    rows.bound_check(csr.nrows())?;
    cols.bound_check(csr.ncols())?;
    let (indptr, indices, values) = csr.csr_data();

    let (new_indptr, new_indices, new_values) = match (rows, cols) {
        (AxisSelect::All, AxisSelect::All) => return Ok(csr.clone()),
        (rows, AxisSelect::All) => take_rows(rows.iter(csr.nrows()), indptr, indices, values),
        (rows, cols) => take_rows_cols(
            rows.iter(csr.nrows()),
            cols.iter(csr.ncols()),
            csr.ncols(),
            indptr,
            indices,
            values,
        ),
    };

    CsrMatrix::try_from_csr_data(
        rows.len(csr.nrows()),
        cols.len(csr.ncols()),
        new_indptr,
        new_indices,
        new_values,
    )
    .map_err(|e| anyhow!("cannot assemble csr matrix: {}", e))
}

/// Gather whole rows. Each selected row's lane is copied verbatim.
fn take_rows<T: Clone>(
    rows: impl Iterator<Item = usize>,
    indptr: &[usize],
    indices: &[usize],
    values: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    let mut new_indptr = vec![0];
    let mut new_indices = Vec::new();
    let mut new_values = Vec::new();
    let mut nnz = 0;
    for r in rows {
        let (start, end) = (indptr[r], indptr[r + 1]);
        nnz += end - start;
        new_indptr.push(nnz);
        new_indices.extend_from_slice(&indices[start..end]);
        new_values.extend_from_slice(&values[start..end]);
    }
    (new_indptr, new_indices, new_values)
}

/// Gather rows and columns together.
///
/// A column selected more than once is emitted once per occurrence, at the
/// output position of each occurrence; lanes are re-sorted so the result
/// stays canonical CSR.
fn take_rows_cols<T: Clone>(
    rows: impl Iterator<Item = usize> + Clone,
    cols: impl Iterator<Item = usize> + Clone,
    ncols: usize,
    indptr: &[usize],
    indices: &[usize],
    values: &[T],
) -> (Vec<usize>, Vec<usize>, Vec<T>) {
    // How often each store column is selected, then its cumulative offset.
    let mut col_count = vec![0usize; ncols];
    cols.clone().for_each(|c| col_count[c] += 1);

    let mut nnz = 0;
    let new_indptr: Vec<usize> = std::iter::once(0)
        .chain(rows.clone().map(|r| {
            (indptr[r]..indptr[r + 1]).for_each(|k| nnz += col_count[indices[k]]);
            nnz
        }))
        .collect();

    (1..ncols).for_each(|c| col_count[c] += col_count[c - 1]);

    // Output positions of the selected columns, grouped by store column.
    let mut order: Vec<(usize, usize)> = cols.enumerate().map(|(out, c)| (c, out)).collect();
    order.sort_by_key(|(c, _)| *c);
    let col_order: Vec<usize> = order.into_iter().map(|(_, out)| out).collect();

    let mut new_indices = vec![0usize; nnz];
    let mut new_values: Vec<T> = Vec::with_capacity(nnz);
    let mut n = 0;
    for r in rows {
        let lane_start = n;
        for k in indptr[r]..indptr[r + 1] {
            let c = indices[k];
            let lo = if c == 0 { 0 } else { col_count[c - 1] };
            for slot in lo..col_count[c] {
                new_indices[n] = col_order[slot];
                new_values.push(values[k].clone());
                n += 1;
            }
        }
        let mut perm = permutation::sort(&new_indices[lane_start..n]);
        perm.apply_slice_in_place(&mut new_indices[lane_start..n]);
        perm.apply_slice_in_place(&mut new_values[lane_start..n]);
    }

    (new_indptr, new_indices, new_values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use proptest::prelude::*;
    use rand::Rng;

    fn dense(csr: &CsrMatrix<f32>) -> DMatrix<f32> {
        let mut m = DMatrix::zeros(csr.nrows(), csr.ncols());
        csr.triplet_iter().for_each(|(r, c, v)| m[(r, c)] = *v);
        m
    }

    fn dense_select(m: &DMatrix<f32>, rows: &[usize], cols: &[usize]) -> DMatrix<f32> {
        m.select_rows(rows).select_columns(cols)
    }

    fn rand_triples(nrows: usize, ncols: usize, nnz: usize) -> Vec<(usize, usize, f32)> {
        let mut rng = rand::thread_rng();
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        while out.len() < nnz {
            let (r, c) = (rng.gen_range(0..nrows), rng.gen_range(0..ncols));
            if seen.insert((r, c)) {
                out.push((r, c, rng.gen_range(-100.0..100.0)));
            }
        }
        out
    }

    #[test]
    fn assembles_from_unordered_triples() {
        let csr = csr_from_coo(3, 4, vec![(2, 1, 5.0f32), (0, 3, 1.0), (0, 0, 2.0)]).unwrap();
        let m = dense(&csr);
        assert_eq!(m[(0, 0)], 2.0);
        assert_eq!(m[(0, 3)], 1.0);
        assert_eq!(m[(2, 1)], 5.0);
        assert_eq!(csr.nnz(), 3);
    }

    #[test]
    fn rejects_duplicates_and_out_of_bounds() {
        assert!(csr_from_coo(2, 2, vec![(0, 0, 1.0f32), (0, 0, 2.0)]).is_err());
        assert!(csr_from_coo(2, 2, vec![(2, 0, 1.0f32)]).is_err());
        assert!(csr_from_coo(2, 2, vec![(0, 2, 1.0f32)]).is_err());
    }

    #[test]
    fn empty_selection_gives_zero_rows() {
        let csr = csr_from_coo(3, 4, rand_triples(3, 4, 6)).unwrap();
        let out = csr_select(&csr, &AxisSelect::from(vec![]), &AxisSelect::All).unwrap();
        assert_eq!((out.nrows(), out.ncols()), (0, 4));
        assert_eq!(out.nnz(), 0);
    }

    #[test]
    fn row_selection_matches_dense_reference() {
        let csr = csr_from_coo(10, 7, rand_triples(10, 7, 30)).unwrap();
        let rows = vec![8, 1, 1, 4];
        let out = csr_select(&csr, &rows.clone().into(), &AxisSelect::All).unwrap();
        assert_eq!(dense(&out), dense_select(&dense(&csr), &rows, &(0..7).collect::<Vec<_>>()));
    }

    #[test]
    fn row_and_column_selection_matches_dense_reference() {
        let csr = csr_from_coo(10, 7, rand_triples(10, 7, 30)).unwrap();
        let (rows, cols) = (vec![9, 0, 3], vec![6, 6, 2, 0]);
        let out = csr_select(&csr, &rows.clone().into(), &cols.clone().into()).unwrap();
        assert_eq!(dense(&out), dense_select(&dense(&csr), &rows, &cols));
    }

    proptest! {
        #[test]
        fn selection_always_matches_dense_reference(
            nnz in 0usize..60,
            rows in proptest::collection::vec(0usize..12, 0..8),
            cols in proptest::collection::vec(0usize..9, 0..8),
        ) {
            let csr = csr_from_coo(12, 9, rand_triples(12, 9, nnz)).unwrap();
            let out = csr_select(&csr, &rows.clone().into(), &cols.clone().into()).unwrap();
            prop_assert_eq!(dense(&out), dense_select(&dense(&csr), &rows, &cols));
        }
    }
}
