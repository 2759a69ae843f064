use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use nalgebra_sparse::csr::CsrMatrix;
use parking_lot::Mutex;
use polars::prelude::{DataFrame, DataType};

use crate::data::csr_from_coo;
use crate::store::{CensusStore, DATASETS_TABLE, SUMMARY_TABLE};

/// A table or matrix loaded at most once and shared for the lifetime of
/// the handle.
struct Lazy<T>(Mutex<Option<Arc<T>>>);

impl<T> Lazy<T> {
    fn empty() -> Self {
        Lazy(Mutex::new(None))
    }

    fn get_or_load(&self, load: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
        let mut slot = self.0.lock();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = Arc::new(load()?);
        *slot = Some(value.clone());
        Ok(value)
    }
}

/// An open census handle.
///
/// Holds the snapshot location plus whatever tables and layers queries have
/// pulled in so far; dropped state is simply re-read on the next query.
pub struct Census {
    store: Arc<CensusStore>,
    summary: Lazy<DataFrame>,
    datasets: Lazy<DataFrame>,
    experiments: Mutex<HashMap<String, Arc<Experiment>>>,
}

impl std::fmt::Debug for Census {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Census").finish_non_exhaustive()
    }
}

impl Census {
    pub(crate) fn new(store: CensusStore) -> Self {
        Self {
            store: Arc::new(store),
            summary: Lazy::empty(),
            datasets: Lazy::empty(),
            experiments: Mutex::new(HashMap::new()),
        }
    }

    pub fn uri(&self) -> String {
        self.store.uri()
    }

    /// The census-wide summary table (label/value pairs).
    pub fn summary(&self) -> Result<DataFrame> {
        let df = self
            .summary
            .get_or_load(|| self.store.read_table(SUMMARY_TABLE))?;
        Ok(df.as_ref().clone())
    }

    /// The table describing every source dataset in the census.
    pub fn datasets(&self) -> Result<DataFrame> {
        let df = self
            .datasets
            .get_or_load(|| self.store.read_table(DATASETS_TABLE))?;
        Ok(df.as_ref().clone())
    }

    /// The experiment for an organism, by its human-readable name
    /// (`"Homo sapiens"`) or its snapshot key (`homo_sapiens`).
    pub fn experiment(&self, organism: &str) -> Result<Arc<Experiment>> {
        let key = organism_key(organism)?;
        let mut experiments = self.experiments.lock();
        if let Some(experiment) = experiments.get(&key) {
            return Ok(experiment.clone());
        }
        let base = format!("census_data/{}", key);
        if !self.store.exists(&format!("{}/obs.arrow", base)) {
            match self.store.list_dir("census_data") {
                Some(available) if !available.is_empty() => bail!(
                    "organism '{}' not found in census at '{}'; available: {}",
                    organism,
                    self.uri(),
                    available.join(", ")
                ),
                _ => bail!(
                    "organism '{}' not found in census at '{}'",
                    organism,
                    self.uri()
                ),
            }
        }
        let experiment = Arc::new(Experiment {
            store: self.store.clone(),
            name: key.clone(),
            base,
            obs: Lazy::empty(),
            measurements: Mutex::new(HashMap::new()),
        });
        experiments.insert(key, experiment.clone());
        Ok(experiment)
    }
}

impl std::fmt::Display for Census {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Census at '{}'", self.uri())?;
        if let Some(organisms) = self.store.list_dir("census_data") {
            if !organisms.is_empty() {
                write!(f, "\n    census_data: '{}'", organisms.join("', '"))?;
            }
        }
        Ok(())
    }
}

/// Snapshot directory key of an organism name.
fn organism_key(organism: &str) -> Result<String> {
    let key = organism
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    ensure!(!key.is_empty(), "organism name is empty");
    Ok(key)
}

/// All census data for one organism: the obs table plus one or more named
/// measurements.
pub struct Experiment {
    store: Arc<CensusStore>,
    name: String,
    base: String,
    obs: Lazy<DataFrame>,
    measurements: Mutex<HashMap<String, Arc<Measurement>>>,
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Experiment {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The per-cell annotation table.
    pub fn obs(&self) -> Result<DataFrame> {
        let df = self
            .obs
            .get_or_load(|| self.store.read_table(&format!("{}/obs.arrow", self.base)))?;
        Ok(df.as_ref().clone())
    }

    pub fn measurement(&self, name: &str) -> Result<Arc<Measurement>> {
        let mut measurements = self.measurements.lock();
        if let Some(measurement) = measurements.get(name) {
            return Ok(measurement.clone());
        }
        let base = format!("{}/ms/{}", self.base, name);
        if !self.store.exists(&format!("{}/var.arrow", base)) {
            match self.store.list_dir(&format!("{}/ms", self.base)) {
                Some(available) if !available.is_empty() => bail!(
                    "measurement '{}' not found in experiment '{}'; available: {}",
                    name,
                    self.name,
                    available.join(", ")
                ),
                _ => bail!("measurement '{}' not found in experiment '{}'", name, self.name),
            }
        }
        let measurement = Arc::new(Measurement {
            store: self.store.clone(),
            name: name.to_owned(),
            base,
            var: Lazy::empty(),
            layers: Mutex::new(HashMap::new()),
        });
        measurements.insert(name.to_owned(), measurement.clone());
        Ok(measurement)
    }

    /// The named X layer of a measurement, shaped obs x var.
    pub fn x(&self, measurement: &str, layer: &str) -> Result<Arc<CsrMatrix<f32>>> {
        let n_obs = self.obs()?.height();
        self.measurement(measurement)?.x(layer, n_obs)
    }
}

/// One measurement of an experiment: a var table and its X layers.
pub struct Measurement {
    store: Arc<CensusStore>,
    name: String,
    base: String,
    var: Lazy<DataFrame>,
    layers: Mutex<HashMap<String, Arc<CsrMatrix<f32>>>>,
}

impl std::fmt::Debug for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Measurement")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Measurement {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The per-feature annotation table.
    pub fn var(&self) -> Result<DataFrame> {
        let df = self
            .var
            .get_or_load(|| self.store.read_table(&format!("{}/var.arrow", self.base)))?;
        Ok(df.as_ref().clone())
    }

    pub(crate) fn x(&self, layer: &str, n_obs: usize) -> Result<Arc<CsrMatrix<f32>>> {
        let mut layers = self.layers.lock();
        if let Some(x) = layers.get(layer) {
            return Ok(x.clone());
        }
        let n_vars = self.var()?.height();
        let relpath = format!("{}/X/{}.arrow", self.base, layer);
        if !self.store.exists(&relpath) {
            match self.store.list_dir(&format!("{}/X", self.base)) {
                Some(available) if !available.is_empty() => bail!(
                    "X layer '{}' not found in measurement '{}'; available: {}",
                    layer,
                    self.name,
                    available
                        .iter()
                        .map(|f| f.trim_end_matches(".arrow"))
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                _ => bail!("X layer '{}' not found in measurement '{}'", layer, self.name),
            }
        }
        let x = Arc::new(load_layer(
            &self.store.read_table(&relpath)?,
            n_obs,
            n_vars,
        )?);
        layers.insert(layer.to_owned(), x.clone());
        Ok(x)
    }
}

/// Turn a COO triple table (`soma_dim_0`, `soma_dim_1`, `soma_data`) into
/// a CSR matrix of the given shape.
fn load_layer(table: &DataFrame, n_obs: usize, n_vars: usize) -> Result<CsrMatrix<f32>> {
    let rows = coordinate_column(table, "soma_dim_0")?;
    let cols = coordinate_column(table, "soma_dim_1")?;
    let data = table
        .column("soma_data")
        .context("sparse layer is missing 'soma_data'")?
        .cast(&DataType::Float32)?;
    let data = data.f32()?;
    ensure!(
        data.null_count() == 0,
        "sparse layer holds null values in 'soma_data'"
    );

    let triples = itertools::izip!(rows.iter(), cols.iter(), data.into_no_null_iter())
        .map(|(r, c, v)| (*r, *c, v))
        .collect();
    csr_from_coo(n_obs, n_vars, triples)
}

fn coordinate_column(table: &DataFrame, name: &str) -> Result<Vec<usize>> {
    let column = table
        .column(name)
        .with_context(|| format!("sparse layer is missing '{}'", name))?
        .cast(&DataType::Int64)?;
    let column = column.i64()?;
    ensure!(
        column.null_count() == 0,
        "sparse layer holds null values in '{}'",
        name
    );
    column
        .into_no_null_iter()
        .map(|v| {
            usize::try_from(v).with_context(|| format!("negative coordinate in '{}'", name))
        })
        .collect()
}
