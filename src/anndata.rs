use anyhow::{ensure, Context, Result};
use itertools::Itertools;
use nalgebra_sparse::csr::CsrMatrix;
use ndarray::Array2;
use polars::prelude::DataFrame;

use crate::data::NameIndex;

/// The soma_joinid column names the store row of every observation and
/// variable; it doubles as the axis label when present.
const JOINID_COLUMN: &str = "soma_joinid";

/// An in-memory annotated expression matrix: observations x variables with
/// a row and a column annotation table.
///
/// Produced by [`crate::get_anndata`]; never mutated afterwards.
pub struct AnnData {
    x: CsrMatrix<f32>,
    obs: DataFrame,
    var: DataFrame,
    obs_names: NameIndex,
    var_names: NameIndex,
}

impl AnnData {
    pub fn new(x: CsrMatrix<f32>, obs: DataFrame, var: DataFrame) -> Result<Self> {
        ensure!(
            x.nrows() == obs.height(),
            "X has {} rows but obs has {}",
            x.nrows(),
            obs.height()
        );
        ensure!(
            x.ncols() == var.height(),
            "X has {} columns but var has {}",
            x.ncols(),
            var.height()
        );
        let obs_names = NameIndex::from_frame(&obs, JOINID_COLUMN)?;
        let var_names = NameIndex::from_frame(&var, JOINID_COLUMN)?;
        Ok(Self {
            x,
            obs,
            var,
            obs_names,
            var_names,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_vars(&self) -> usize {
        self.x.ncols()
    }

    pub fn x(&self) -> &CsrMatrix<f32> {
        &self.x
    }

    pub fn obs(&self) -> &DataFrame {
        &self.obs
    }

    pub fn var(&self) -> &DataFrame {
        &self.var
    }

    pub fn obs_names(&self) -> &NameIndex {
        &self.obs_names
    }

    pub fn var_names(&self) -> &NameIndex {
        &self.var_names
    }

    /// Positions of the named observations.
    pub fn obs_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>> {
        names
            .into_iter()
            .map(|name| {
                self.obs_names
                    .get(name)
                    .context(format!("'{}' does not exist in obs_names", name))
            })
            .collect()
    }

    /// Positions of the named variables.
    pub fn var_ix<'a, I: IntoIterator<Item = &'a str>>(&self, names: I) -> Result<Vec<usize>> {
        names
            .into_iter()
            .map(|name| {
                self.var_names
                    .get(name)
                    .context(format!("'{}' does not exist in var_names", name))
            })
            .collect()
    }

    /// Densify X. Intended for small query results.
    pub fn x_dense(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.n_obs(), self.n_vars()));
        self.x.triplet_iter().for_each(|(r, c, v)| out[[r, c]] = *v);
        out
    }
}

impl std::fmt::Debug for AnnData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl std::fmt::Display for AnnData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AnnData object with n_obs x n_vars = {} x {}",
            self.n_obs(),
            self.n_vars()
        )?;
        let obs = self.obs.get_column_names();
        if !obs.is_empty() {
            write!(f, "\n    obs: '{}'", obs.into_iter().join("', '"))?;
        }
        let var = self.var.get_column_names();
        if !var.is_empty() {
            write!(f, "\n    var: '{}'", var.into_iter().join("', '"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::csr_from_coo;
    use polars::df;

    fn example() -> AnnData {
        let x = csr_from_coo(3, 2, vec![(0, 0, 1.0f32), (2, 1, 3.0)]).unwrap();
        let obs = df!(
            "soma_joinid" => &[7i64, 8, 9],
            "cell_type" => &["B cell", "B cell", "neuron"],
        )
        .unwrap();
        let var = df!(
            "soma_joinid" => &[0i64, 1],
            "feature_id" => &["ENSG01", "ENSG02"],
        )
        .unwrap();
        AnnData::new(x, obs, var).unwrap()
    }

    #[test]
    fn shape_follows_x() {
        let adata = example();
        assert_eq!((adata.n_obs(), adata.n_vars()), (3, 2));
        assert_eq!(adata.obs().height(), 3);
    }

    #[test]
    fn mismatched_annotations_are_rejected() {
        let x = csr_from_coo::<f32>(2, 2, vec![]).unwrap();
        let obs = df!("soma_joinid" => &[0i64]).unwrap();
        let var = df!("soma_joinid" => &[0i64, 1]).unwrap();
        assert!(AnnData::new(x, obs, var).is_err());
    }

    #[test]
    fn names_come_from_joinids() {
        let adata = example();
        assert_eq!(adata.obs_ix(["8", "7"]).unwrap(), vec![1, 0]);
        assert!(adata.obs_ix(["nope"]).is_err());
        assert_eq!(adata.var_names().get("1"), Some(1));
    }

    #[test]
    fn densify_round_trips_triplets() {
        let dense = example().x_dense();
        assert_eq!(dense[[0, 0]], 1.0);
        assert_eq!(dense[[2, 1]], 3.0);
        assert_eq!(dense[[1, 0]], 0.0);
    }

    #[test]
    fn display_lists_annotation_columns() {
        let text = format!("{}", example());
        assert!(text.starts_with("AnnData object with n_obs x n_vars = 3 x 2"));
        assert!(text.contains("obs: 'soma_joinid', 'cell_type'"));
    }
}
