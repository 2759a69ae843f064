use anyhow::{bail, Result};
use indexmap::IndexMap;
use polars::prelude::{DataFrame, DataType};

use super::slice::AxisSelect;

/// An ordered label -> position index over one axis of an annotated matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameIndex {
    name: String,
    lookup: IndexMap<String, usize>,
}

impl NameIndex {
    pub fn new<I, S>(name: &str, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lookup = IndexMap::new();
        for label in labels {
            let label = label.into();
            let n = lookup.len();
            if lookup.insert(label.clone(), n).is_some() {
                bail!("duplicate label '{}' in index '{}'", label, name);
            }
        }
        Ok(Self {
            name: name.to_owned(),
            lookup,
        })
    }

    /// Build from a frame column, falling back to positional labels when the
    /// column is absent.
    pub fn from_frame(df: &DataFrame, column: &str) -> Result<Self> {
        match df.column(column) {
            Ok(series) => {
                let labels = series.cast(&DataType::String)?;
                let labels = labels.str()?;
                Self::new(
                    column,
                    labels
                        .into_iter()
                        .map(|x| x.unwrap_or_default().to_owned()),
                )
            }
            Err(_) => Self::new(column, (0..df.height()).map(|i| i.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Position of a label, if present.
    pub fn get(&self, label: &str) -> Option<usize> {
        self.lookup.get(label).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.lookup.keys().map(String::as_str)
    }

    pub fn select(&self, select: &AxisSelect) -> Result<Self> {
        select.bound_check(self.len())?;
        Self::new(
            &self.name,
            select
                .iter(self.len())
                .map(|i| self.lookup.get_index(i).map(|(k, _)| k.clone()).unwrap_or_default()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn lookup_follows_insertion_order() {
        let index = NameIndex::new("feature_id", ["a", "b", "c"]).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.get("b"), Some(1));
        assert_eq!(index.get("z"), None);
        assert_eq!(index.labels().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        assert!(NameIndex::new("obs", ["x", "x"]).is_err());
    }

    #[test]
    fn from_frame_uses_the_column_when_present() {
        let df = df!("soma_joinid" => &[10i64, 11, 12], "other" => &[0i64, 0, 0]).unwrap();
        let index = NameIndex::from_frame(&df, "soma_joinid").unwrap();
        assert_eq!(index.get("11"), Some(1));
        assert_eq!(index.name(), "soma_joinid");
    }

    #[test]
    fn from_frame_falls_back_to_positions() {
        let df = df!("other" => &[1i64, 2]).unwrap();
        let index = NameIndex::from_frame(&df, "soma_joinid").unwrap();
        assert_eq!(index.get("0"), Some(0));
        assert_eq!(index.get("1"), Some(1));
    }

    #[test]
    fn select_reorders_labels() {
        let index = NameIndex::new("obs", ["a", "b", "c", "d"]).unwrap();
        let picked = index.select(&AxisSelect::from(vec![2, 0])).unwrap();
        assert_eq!(picked.labels().collect::<Vec<_>>(), vec!["c", "a"]);
        assert_eq!(picked.get("a"), Some(1));
    }
}
