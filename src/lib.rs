//! Query a released single-cell census and materialize a filtered,
//! annotated expression matrix.
//!
//! ```no_run
//! use cell_census::{get_anndata, AnnDataQuery};
//!
//! let census = cell_census::open("stable")?;
//! let adata = get_anndata(
//!     &census,
//!     "Homo sapiens",
//!     &AnnDataQuery::new()
//!         .var_value_filter("feature_id in ['ENSG00000161798', 'ENSG00000188229']")
//!         .obs_value_filter("cell_type == 'B cell' and disease == 'COVID-19'"),
//! )?;
//! println!("{}", adata);
//! # anyhow::Ok(())
//! ```

mod anndata;
mod census;
pub mod data;
pub mod filter;
mod open;
mod query;
pub mod release;
pub mod store;

pub use crate::anndata::AnnData;
pub use census::{Census, Experiment, Measurement};
pub use filter::ValueFilter;
pub use open::{
    download_source_h5ad, get_source_h5ad_uri, open, open_with, CensusOptions,
};
pub use query::{get_anndata, AnnDataQuery};
pub use release::{
    get_census_version_description, get_census_version_directory, CensusLocator,
    CensusVersionDescription, Mirror, MirrorDirectory, ReleaseDirectory,
};
