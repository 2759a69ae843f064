use anyhow::Result;
use polars::prelude::{ChunkedArray, DataFrame};

use crate::anndata::AnnData;
use crate::census::Census;
use crate::data::{csr_select, AxisSelect};
use crate::filter::ValueFilter;

/// What to fetch from an experiment.
///
/// The defaults read the `raw` X layer of the `RNA` measurement with all
/// annotation columns and no filters.
#[derive(Debug, Clone)]
pub struct AnnDataQuery {
    measurement: String,
    x_name: String,
    obs_value_filter: Option<String>,
    var_value_filter: Option<String>,
    obs_column_names: Option<Vec<String>>,
    var_column_names: Option<Vec<String>>,
}

impl Default for AnnDataQuery {
    fn default() -> Self {
        Self {
            measurement: "RNA".to_owned(),
            x_name: "raw".to_owned(),
            obs_value_filter: None,
            var_value_filter: None,
            obs_column_names: None,
            var_column_names: None,
        }
    }
}

impl AnnDataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measurement(mut self, name: impl Into<String>) -> Self {
        self.measurement = name.into();
        self
    }

    /// Which X layer to materialize.
    pub fn x_name(mut self, name: impl Into<String>) -> Self {
        self.x_name = name.into();
        self
    }

    /// Filter over the observation (cell) annotations.
    pub fn obs_value_filter(mut self, filter: impl Into<String>) -> Self {
        self.obs_value_filter = Some(filter.into());
        self
    }

    /// Filter over the variable (feature) annotations.
    pub fn var_value_filter(mut self, filter: impl Into<String>) -> Self {
        self.var_value_filter = Some(filter.into());
        self
    }

    /// Keep only these obs columns in the result.
    pub fn obs_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.obs_column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Keep only these var columns in the result.
    pub fn var_column_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.var_column_names = Some(names.into_iter().map(Into::into).collect());
        self
    }
}

/// Fetch a filtered, fully materialized annotated matrix from a census.
///
/// Rows are the observations matching `obs_value_filter`, columns the
/// variables matching `var_value_filter`, both in store order; an empty
/// match on either axis yields an empty (not erroneous) result.
pub fn get_anndata(census: &Census, organism: &str, query: &AnnDataQuery) -> Result<AnnData> {
    let experiment = census.experiment(organism)?;
    let obs = experiment.obs()?;
    let measurement = experiment.measurement(&query.measurement)?;
    let var = measurement.var()?;

    let obs_select = axis_select(&obs, query.obs_value_filter.as_deref())?;
    let var_select = axis_select(&var, query.var_value_filter.as_deref())?;

    let x = experiment.x(&query.measurement, &query.x_name)?;
    let x = csr_select(&x, &obs_select, &var_select)?;

    let obs = take_axis(&obs, &obs_select, query.obs_column_names.as_deref())?;
    let var = take_axis(&var, &var_select, query.var_column_names.as_deref())?;

    AnnData::new(x, obs, var)
}

fn axis_select(df: &DataFrame, filter: Option<&str>) -> Result<AxisSelect> {
    match filter {
        None => Ok(AxisSelect::All),
        Some(text) => {
            let filter = ValueFilter::parse(text)?;
            Ok(AxisSelect::Index(filter.matches(df)?))
        }
    }
}

fn take_axis(df: &DataFrame, select: &AxisSelect, columns: Option<&[String]>) -> Result<DataFrame> {
    let df = match columns {
        Some(names) => df.select(names.iter().map(String::as_str))?,
        None => df.clone(),
    };
    match select {
        AxisSelect::All => Ok(df),
        AxisSelect::Index(idx) => {
            let idx: Vec<u32> = idx.iter().map(|&i| i as u32).collect();
            Ok(df.take(&ChunkedArray::from_vec("idx", idx))?)
        }
    }
}
